use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::catalog::ItemId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionRecord {
    pub item_id: ItemId,
    pub user_id: String,
}

pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Shared `(item, user)` reaction table with a per-item change feed.
pub trait ReactionService: Send + Sync {
    fn list(&self, item_id: ItemId) -> Result<Vec<ReactionRecord>>;
    fn counts(&self) -> Result<HashMap<ItemId, u64>>;
    fn insert(&self, item_id: ItemId, user_id: &str) -> Result<()>;
    fn delete(&self, item_id: ItemId, user_id: &str) -> Result<()>;
    /// Invokes `on_change` whenever any reaction on `item_id` changes, until the handle drops.
    fn watch(&self, item_id: ItemId, on_change: ChangeCallback) -> Result<Watch>;
}

/// Append-only view log.
pub trait ViewService: Send + Sync {
    fn record(&self, item_id: ItemId) -> Result<()>;
    fn count(&self, item_id: ItemId) -> Result<u64>;
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote store unavailable")]
    Unavailable,
}

/// Change-feed subscription. Dropping it tears the feed down.
pub struct Watch {
    item_id: ItemId,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Watch {
    pub fn new(item_id: ItemId, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            item_id,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("item_id", &self.item_id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

type WatcherMap = HashMap<u64, (ItemId, ChangeCallback)>;

#[derive(Default)]
pub struct MockReactionService {
    records: Mutex<Vec<ReactionRecord>>,
    watchers: Arc<Mutex<WatcherMap>>,
    next_watch: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MockReactionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record without firing the change feed.
    pub fn seed(&self, item_id: ItemId, user_id: &str) {
        let mut records = self.records.lock();
        if !records
            .iter()
            .any(|r| r.item_id == item_id && r.user_id == user_id)
        {
            records.push(ReactionRecord {
                item_id,
                user_id: user_id.to_string(),
            });
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn watcher_count(&self, item_id: ItemId) -> usize {
        self.watchers
            .lock()
            .values()
            .filter(|(watched, _)| *watched == item_id)
            .count()
    }

    /// Fires the change feed for `item_id` as the shared store would after an external write.
    pub fn notify(&self, item_id: ItemId) {
        let callbacks: Vec<ChangeCallback> = self
            .watchers
            .lock()
            .values()
            .filter(|(watched, _)| *watched == item_id)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    fn check_write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable.into());
        }
        Ok(())
    }
}

impl ReactionService for MockReactionService {
    fn list(&self, item_id: ItemId) -> Result<Vec<ReactionRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable.into());
        }
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|record| record.item_id == item_id)
            .cloned()
            .collect())
    }

    fn counts(&self) -> Result<HashMap<ItemId, u64>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable.into());
        }
        let mut counts = HashMap::new();
        for record in self.records.lock().iter() {
            *counts.entry(record.item_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn insert(&self, item_id: ItemId, user_id: &str) -> Result<()> {
        self.check_write()?;
        self.seed(item_id, user_id);
        self.notify(item_id);
        Ok(())
    }

    fn delete(&self, item_id: ItemId, user_id: &str) -> Result<()> {
        self.check_write()?;
        self.records
            .lock()
            .retain(|r| !(r.item_id == item_id && r.user_id == user_id));
        self.notify(item_id);
        Ok(())
    }

    fn watch(&self, item_id: ItemId, on_change: ChangeCallback) -> Result<Watch> {
        let id = self.next_watch.fetch_add(1, Ordering::SeqCst);
        self.watchers.lock().insert(id, (item_id, on_change));
        let watchers = Arc::clone(&self.watchers);
        Ok(Watch::new(item_id, move || {
            watchers.lock().remove(&id);
        }))
    }
}

#[derive(Default)]
pub struct MockViewService {
    counts: Mutex<HashMap<ItemId, u64>>,
    fail: AtomicBool,
    inserts: AtomicUsize,
}

impl MockViewService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, item_id: ItemId, count: u64) {
        self.counts.lock().insert(item_id, count);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

impl ViewService for MockViewService {
    fn record(&self, item_id: ItemId) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable.into());
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        *self.counts.lock().entry(item_id).or_insert(0) += 1;
        Ok(())
    }

    fn count(&self, item_id: ItemId) -> Result<u64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable.into());
        }
        Ok(self.counts.lock().get(&item_id).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_watch_stops_notifications() {
        let service = MockReactionService::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let watch = service
            .watch(
                3,
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        service.insert(3, "user-a").unwrap();
        service.insert(4, "user-a").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(service.watcher_count(3), 1);

        drop(watch);
        assert_eq!(service.watcher_count(3), 0);
        service.delete(3, "user-a").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reaction_pairs_are_unique() {
        let service = MockReactionService::new();
        service.insert(1, "user-a").unwrap();
        service.insert(1, "user-a").unwrap();
        service.insert(1, "user-b").unwrap();
        assert_eq!(service.list(1).unwrap().len(), 2);
        assert_eq!(service.counts().unwrap().get(&1), Some(&2));
    }

    #[test]
    fn failed_writes_leave_records_untouched() {
        let service = MockReactionService::new();
        service.set_fail_writes(true);
        assert!(service.insert(1, "user-a").is_err());
        assert!(service.list(1).unwrap().is_empty());
        assert_eq!(service.write_count(), 1);
    }

    #[test]
    fn view_log_counts_records() {
        let views = MockViewService::new();
        views.seed(9, 41);
        views.record(9).unwrap();
        assert_eq!(views.count(9).unwrap(), 42);
        assert_eq!(views.count(10).unwrap(), 0);
        views.set_fail(true);
        assert!(views.record(9).is_err());
        assert_eq!(views.insert_count(), 1);
    }
}
