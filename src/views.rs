use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::ItemId;
use crate::data::ViewService;
use crate::dispatch::{AsyncResponse, Dispatcher};

/// Items already counted during this browsing session. Lives only as long as the session.
#[derive(Debug, Default)]
pub struct SessionViews {
    viewed: HashSet<ItemId>,
}

impl SessionViews {
    /// Marks `item_id` as viewed; returns false if it already was.
    pub fn mark(&mut self, item_id: ItemId) -> bool {
        self.viewed.insert(item_id)
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.viewed.contains(&item_id)
    }
}

pub struct ViewCounter {
    service: Arc<dyn ViewService>,
    dispatcher: Dispatcher,
    counts: HashMap<ItemId, u64>,
    requested: HashSet<ItemId>,
    session: SessionViews,
}

impl ViewCounter {
    pub fn new(service: Arc<dyn ViewService>, dispatcher: Dispatcher) -> Self {
        Self {
            service,
            dispatcher,
            counts: HashMap::new(),
            requested: HashSet::new(),
            session: SessionViews::default(),
        }
    }

    pub fn count(&self, item_id: ItemId) -> Option<u64> {
        self.counts.get(&item_id).copied()
    }

    /// Appends one view event unless this session already counted `item_id`.
    pub fn record_view_if_new(&mut self, item_id: ItemId) -> bool {
        if !self.session.mark(item_id) {
            debug!(item_id, "views: already counted this session");
            return false;
        }

        let service = Arc::clone(&self.service);
        if let Some(count) = self.counts.get_mut(&item_id) {
            *count += 1;
            self.dispatcher
                .spawn("view-record", move || AsyncResponse::ViewRecorded {
                    item_id,
                    result: service.record(item_id),
                });
        } else {
            // First access: record, then read the aggregate that already includes this view.
            self.requested.insert(item_id);
            self.dispatcher.spawn("view-record", move || {
                let recorded = service.record(item_id);
                AsyncResponse::ViewCount {
                    item_id,
                    recorded: Some(recorded),
                    result: service.count(item_id),
                }
            });
        }
        true
    }

    /// Fetches the aggregate once per item.
    pub fn ensure_count(&mut self, item_id: ItemId) {
        if !self.requested.insert(item_id) {
            return;
        }
        let service = Arc::clone(&self.service);
        self.dispatcher
            .spawn("view-count", move || AsyncResponse::ViewCount {
                item_id,
                recorded: None,
                result: service.count(item_id),
            });
    }

    pub fn handle(&mut self, response: AsyncResponse) -> bool {
        match response {
            AsyncResponse::ViewCount {
                item_id,
                recorded,
                result,
            } => {
                if let Some(Err(err)) = recorded {
                    warn!(item_id, error = %err, "views: failed to record view");
                }
                match result {
                    Ok(count) => {
                        self.counts.insert(item_id, count);
                        true
                    }
                    Err(err) => {
                        warn!(item_id, error = %err, "views: failed to fetch count");
                        // Allow a later retry.
                        self.requested.remove(&item_id);
                        false
                    }
                }
            }
            AsyncResponse::ViewRecorded { item_id, result } => {
                if let Err(err) = result {
                    warn!(item_id, error = %err, "views: failed to record view");
                }
                false
            }
            other => {
                debug!(?other, "views: ignoring unrelated response");
                false
            }
        }
    }
}

pub fn format_views(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
