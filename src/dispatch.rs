use std::collections::HashMap;
use std::thread;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::warn;

use crate::catalog::ItemId;
use crate::data::ReactionRecord;
use crate::reactions::ReactionState;

/// Completion of a background job, applied on the main loop by `Session::poll_async`.
#[derive(Debug)]
pub enum AsyncResponse {
    Reactions {
        item_id: ItemId,
        generation: u64,
        result: Result<Vec<ReactionRecord>>,
    },
    ReactionsChanged {
        item_id: ItemId,
        generation: u64,
    },
    ReactionWritten {
        item_id: ItemId,
        generation: u64,
        previous: ReactionState,
        optimistic: ReactionState,
        result: Result<()>,
    },
    LikeCounts {
        result: Result<HashMap<ItemId, u64>>,
    },
    ViewCount {
        item_id: ItemId,
        recorded: Option<Result<()>>,
        result: Result<u64>,
    },
    ViewRecorded {
        item_id: ItemId,
        result: Result<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One thread per job, plus one worker for ordered jobs.
    #[default]
    Background,
    /// Run the job on the calling thread; the response is still queued on the channel.
    Inline,
}

type Job = Box<dyn FnOnce() -> AsyncResponse + Send + 'static>;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    mode: Mode,
    tx: Sender<AsyncResponse>,
    ordered: Option<Sender<Job>>,
}

impl Dispatcher {
    pub fn new(mode: Mode) -> (Self, Receiver<AsyncResponse>) {
        let (tx, rx) = unbounded();
        let ordered = match mode {
            Mode::Background => start_ordered_worker(tx.clone()),
            Mode::Inline => None,
        };
        (Self { mode, tx, ordered }, rx)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn sender(&self) -> Sender<AsyncResponse> {
        self.tx.clone()
    }

    pub fn spawn<F>(&self, label: &str, job: F)
    where
        F: FnOnce() -> AsyncResponse + Send + 'static,
    {
        let tx = self.tx.clone();
        match self.mode {
            Mode::Inline => {
                let _ = tx.send(job());
            }
            Mode::Background => {
                let spawned = thread::Builder::new()
                    .name(label.to_string())
                    .spawn(move || {
                        let _ = tx.send(job());
                    });
                if let Err(err) = spawned {
                    warn!(job = label, error = %err, "dispatch: failed to spawn worker");
                }
            }
        }
    }

    /// Runs `job` after every ordered job queued before it. Responses arrive in queue order.
    pub fn spawn_ordered<F>(&self, label: &str, job: F)
    where
        F: FnOnce() -> AsyncResponse + Send + 'static,
    {
        match (self.mode, &self.ordered) {
            (Mode::Inline, _) => {
                let _ = self.tx.send(job());
            }
            (Mode::Background, Some(queue)) => {
                if let Err(err) = queue.send(Box::new(job)) {
                    warn!(job = label, "dispatch: ordered worker gone, running unordered");
                    self.spawn(label, err.into_inner());
                }
            }
            (Mode::Background, None) => self.spawn(label, job),
        }
    }
}

/// Exits once every `Dispatcher` clone holding the queue is dropped.
fn start_ordered_worker(tx: Sender<AsyncResponse>) -> Option<Sender<Job>> {
    let (jobs_tx, jobs_rx) = unbounded::<Job>();
    let spawned = thread::Builder::new()
        .name("ordered-jobs".to_string())
        .spawn(move || {
            for job in jobs_rx.iter() {
                if tx.send(job()).is_err() {
                    break;
                }
            }
        });
    match spawned {
        Ok(_) => Some(jobs_tx),
        Err(err) => {
            warn!(error = %err, "dispatch: failed to start ordered worker");
            None
        }
    }
}
