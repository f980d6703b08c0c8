use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::ItemId;
use crate::data::{ReactionService, Watch};
use crate::dispatch::{AsyncResponse, Dispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReactionState {
    pub count: u64,
    pub liked_by_me: bool,
}

impl ReactionState {
    fn toggled(self) -> Self {
        if self.liked_by_me {
            Self {
                count: self.count.saturating_sub(1),
                liked_by_me: false,
            }
        } else {
            Self {
                count: self.count + 1,
                liked_by_me: true,
            }
        }
    }
}

/// Writes still in flight for one item, and whether a refresh was held back meanwhile.
#[derive(Debug, Default)]
struct PendingWrites {
    in_flight: usize,
    refresh_deferred: bool,
}

struct Subscription {
    item_id: ItemId,
    generation: u64,
    user_id: Option<String>,
    _watch: Option<Watch>,
}

/// Per-item like state mirrored from the shared reaction table.
///
/// Local mutations are optimistic; every fetch result for the subscribed item overwrites the
/// cached state, so the most recently completed fetch is authoritative. Responses addressed to
/// an earlier subscription are dropped.
pub struct ReactionStore {
    service: Arc<dyn ReactionService>,
    dispatcher: Dispatcher,
    states: HashMap<ItemId, ReactionState>,
    counts: HashMap<ItemId, u64>,
    subscription: Option<Subscription>,
    pending: HashMap<ItemId, PendingWrites>,
    generation: u64,
    rollback_on_failure: bool,
}

impl ReactionStore {
    pub fn new(
        service: Arc<dyn ReactionService>,
        dispatcher: Dispatcher,
        rollback_on_failure: bool,
    ) -> Self {
        Self {
            service,
            dispatcher,
            states: HashMap::new(),
            counts: HashMap::new(),
            subscription: None,
            pending: HashMap::new(),
            generation: 0,
            rollback_on_failure,
        }
    }

    pub fn state(&self, item_id: ItemId) -> ReactionState {
        self.states.get(&item_id).copied().unwrap_or_else(|| ReactionState {
            count: self.counts.get(&item_id).copied().unwrap_or(0),
            liked_by_me: false,
        })
    }

    /// Catalog-wide aggregates, used to order the Popular view.
    pub fn like_counts(&self) -> &HashMap<ItemId, u64> {
        &self.counts
    }

    pub fn subscribed_item(&self) -> Option<ItemId> {
        self.subscription.as_ref().map(|sub| sub.item_id)
    }

    /// Replaces any previous subscription, opens the change feed for `item_id` and fetches it.
    pub fn subscribe(&mut self, item_id: ItemId, user_id: Option<&str>) {
        self.unsubscribe();
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        let tx = self.dispatcher.sender();
        let watch = match self.service.watch(
            item_id,
            Arc::new(move || {
                let _ = tx.send(AsyncResponse::ReactionsChanged {
                    item_id,
                    generation,
                });
            }),
        ) {
            Ok(watch) => Some(watch),
            Err(err) => {
                warn!(item_id, error = %err, "reactions: change feed unavailable");
                None
            }
        };

        debug!(item_id, generation, "reactions: subscribed");
        self.subscription = Some(Subscription {
            item_id,
            generation,
            user_id: user_id.map(str::to_string),
            _watch: watch,
        });
        self.fetch(item_id, generation);
    }

    pub fn unsubscribe(&mut self) {
        if let Some(sub) = self.subscription.take() {
            debug!(
                item_id = sub.item_id,
                generation = sub.generation,
                "reactions: unsubscribed"
            );
        }
    }

    /// Flips `liked_by_me` locally, then issues the matching insert or delete.
    pub fn toggle(&mut self, item_id: ItemId, user_id: &str) -> ReactionState {
        let previous = self.state(item_id);
        let optimistic = previous.toggled();
        self.apply(item_id, optimistic);

        let generation = match self.subscription.as_mut() {
            Some(sub) if sub.item_id == item_id => {
                sub.user_id = Some(user_id.to_string());
                sub.generation
            }
            _ => 0,
        };

        info!(
            item_id,
            liked = optimistic.liked_by_me,
            count = optimistic.count,
            "reactions: toggled"
        );

        self.pending.entry(item_id).or_default().in_flight += 1;
        let service = Arc::clone(&self.service);
        let user_id = user_id.to_string();
        self.dispatcher.spawn_ordered("reaction-write", move || {
            let result = if optimistic.liked_by_me {
                service.insert(item_id, &user_id)
            } else {
                service.delete(item_id, &user_id)
            };
            AsyncResponse::ReactionWritten {
                item_id,
                generation,
                previous,
                optimistic,
                result,
            }
        });
        optimistic
    }

    /// Re-reads aggregates for every item.
    pub fn refresh_counts(&self) {
        let service = Arc::clone(&self.service);
        self.dispatcher
            .spawn("reaction-counts", move || AsyncResponse::LikeCounts {
                result: service.counts(),
            });
    }

    /// Applies a completed job. Returns whether visible state may have changed.
    pub fn handle(&mut self, response: AsyncResponse) -> bool {
        match response {
            AsyncResponse::Reactions {
                item_id,
                generation,
                result,
            } => {
                if !self.is_current(item_id, generation) {
                    debug!(item_id, generation, "reactions: discarding stale fetch");
                    return false;
                }
                if self.defer_refresh(item_id) {
                    debug!(item_id, "reactions: write in flight, holding fetch result");
                    return false;
                }
                match result {
                    Ok(records) => {
                        let user_id = self
                            .subscription
                            .as_ref()
                            .and_then(|sub| sub.user_id.as_deref());
                        let state = ReactionState {
                            count: records.len() as u64,
                            liked_by_me: user_id
                                .map(|me| records.iter().any(|record| record.user_id == me))
                                .unwrap_or(false),
                        };
                        debug!(item_id, count = state.count, "reactions: reconciled");
                        self.apply(item_id, state);
                        true
                    }
                    Err(err) => {
                        warn!(item_id, error = %err, "reactions: fetch failed, keeping cached state");
                        false
                    }
                }
            }
            AsyncResponse::ReactionsChanged {
                item_id,
                generation,
            } => {
                if !self.is_current(item_id, generation) {
                    debug!(item_id, generation, "reactions: ignoring change for inactive item");
                    return false;
                }
                if !self.defer_refresh(item_id) {
                    self.fetch(item_id, generation);
                }
                false
            }
            AsyncResponse::ReactionWritten {
                item_id,
                generation,
                previous,
                optimistic,
                result,
            } => {
                let (settled, deferred) = self.finish_write(item_id);
                match result {
                    Ok(()) => {
                        if settled && self.is_current(item_id, generation) {
                            self.fetch(item_id, generation);
                        }
                        false
                    }
                    Err(err) => {
                        warn!(item_id, error = %err, "reactions: write failed");
                        if settled && self.rollback_on_failure && self.state(item_id) == optimistic {
                            info!(item_id, "reactions: rolling back optimistic change");
                            self.apply(item_id, previous);
                            return true;
                        }
                        if settled && deferred && self.is_current(item_id, generation) {
                            self.fetch(item_id, generation);
                        }
                        false
                    }
                }
            }
            AsyncResponse::LikeCounts { result } => match result {
                Ok(mut counts) => {
                    // The subscribed item and items with writes in flight keep their own count.
                    let subscribed = self.subscribed_item();
                    for (item_id, state) in self.states.iter_mut() {
                        if Some(*item_id) == subscribed || self.pending.contains_key(item_id) {
                            counts.insert(*item_id, state.count);
                        } else {
                            state.count = counts.get(item_id).copied().unwrap_or(0);
                        }
                    }
                    self.counts = counts;
                    true
                }
                Err(err) => {
                    warn!(error = %err, "reactions: count refresh failed");
                    false
                }
            },
            other => {
                debug!(?other, "reactions: ignoring unrelated response");
                false
            }
        }
    }

    fn is_current(&self, item_id: ItemId, generation: u64) -> bool {
        self.subscription
            .as_ref()
            .map(|sub| sub.item_id == item_id && sub.generation == generation)
            .unwrap_or(false)
    }

    /// Marks a refresh as owed when writes are still in flight for `item_id`.
    fn defer_refresh(&mut self, item_id: ItemId) -> bool {
        match self.pending.get_mut(&item_id) {
            Some(pending) => {
                pending.refresh_deferred = true;
                true
            }
            None => false,
        }
    }

    /// Returns whether no writes remain for `item_id`, and whether a refresh was deferred.
    fn finish_write(&mut self, item_id: ItemId) -> (bool, bool) {
        let Some(pending) = self.pending.get_mut(&item_id) else {
            return (true, false);
        };
        pending.in_flight = pending.in_flight.saturating_sub(1);
        if pending.in_flight > 0 {
            return (false, pending.refresh_deferred);
        }
        let deferred = pending.refresh_deferred;
        self.pending.remove(&item_id);
        (true, deferred)
    }

    fn fetch(&self, item_id: ItemId, generation: u64) {
        let service = Arc::clone(&self.service);
        self.dispatcher
            .spawn_ordered("reaction-fetch", move || AsyncResponse::Reactions {
                item_id,
                generation,
                result: service.list(item_id),
            });
    }

    fn apply(&mut self, item_id: ItemId, state: ReactionState) {
        self.states.insert(item_id, state);
        self.counts.insert(item_id, state.count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChangeCallback, MockReactionService, ReactionRecord};
    use crate::dispatch::Mode;
    use anyhow::Result;
    use crossbeam_channel::Receiver;
    use std::thread;
    use std::time::Duration;

    fn setup(rollback: bool) -> (ReactionStore, Arc<MockReactionService>, Receiver<AsyncResponse>) {
        let service = Arc::new(MockReactionService::new());
        let (dispatcher, rx) = Dispatcher::new(Mode::Inline);
        let store = ReactionStore::new(service.clone(), dispatcher, rollback);
        (store, service, rx)
    }

    fn drain(store: &mut ReactionStore, rx: &Receiver<AsyncResponse>) {
        while let Ok(message) = rx.try_recv() {
            store.handle(message);
        }
    }

    #[test]
    fn subscribe_counts_records_and_detects_own_like() {
        let (mut store, service, rx) = setup(false);
        service.seed(1, "user-a");
        service.seed(1, "me");
        service.seed(2, "user-b");
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);
        assert_eq!(
            store.state(1),
            ReactionState {
                count: 2,
                liked_by_me: true
            }
        );
    }

    #[test]
    fn toggle_is_optimistic_before_any_response() {
        let (mut store, service, rx) = setup(false);
        service.seed(1, "user-a");
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);

        let state = store.toggle(1, "me");
        assert_eq!(
            state,
            ReactionState {
                count: 2,
                liked_by_me: true
            }
        );
        assert_eq!(store.state(1), state);
        assert_eq!(store.like_counts().get(&1), Some(&2));
    }

    #[test]
    fn double_toggle_restores_original_state() {
        let (mut store, service, rx) = setup(false);
        service.seed(1, "user-a");
        service.seed(1, "user-b");
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);
        let before = store.state(1);

        store.toggle(1, "me");
        store.toggle(1, "me");
        assert_eq!(store.state(1), before);
        drain(&mut store, &rx);
        assert_eq!(store.state(1), before);
        assert_eq!(service.list(1).unwrap().len(), 2);
    }

    #[test]
    fn external_change_is_reconciled() {
        let (mut store, service, rx) = setup(false);
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);
        assert_eq!(store.state(1).count, 0);

        service.insert(1, "someone-else").unwrap();
        drain(&mut store, &rx);
        assert_eq!(
            store.state(1),
            ReactionState {
                count: 1,
                liked_by_me: false
            }
        );
    }

    #[test]
    fn stale_fetch_for_previous_item_is_discarded() {
        let (mut store, service, rx) = setup(false);
        service.seed(1, "user-a");
        store.subscribe(1, Some("me"));
        // The fetch for item 1 is still queued when the viewer moves on.
        store.subscribe(2, Some("me"));
        drain(&mut store, &rx);
        assert_eq!(store.subscribed_item(), Some(2));
        assert_eq!(store.state(1).count, 0);
        assert_eq!(service.watcher_count(1), 0);
        assert_eq!(service.watcher_count(2), 1);
    }

    #[test]
    fn unsubscribe_tears_down_feed_and_ignores_late_changes() {
        let (mut store, service, rx) = setup(false);
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);
        store.unsubscribe();
        assert_eq!(service.watcher_count(1), 0);

        store.handle(AsyncResponse::Reactions {
            item_id: 1,
            generation: 1,
            result: Ok(vec![crate::data::ReactionRecord {
                item_id: 1,
                user_id: "x".into(),
            }]),
        });
        assert_eq!(store.state(1).count, 0);
    }

    #[test]
    fn failed_write_keeps_optimistic_state_by_default() {
        let (mut store, service, rx) = setup(false);
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);
        service.set_fail_writes(true);
        store.toggle(1, "me");
        drain(&mut store, &rx);
        assert_eq!(
            store.state(1),
            ReactionState {
                count: 1,
                liked_by_me: true
            }
        );
    }

    #[test]
    fn failed_write_rolls_back_when_configured() {
        let (mut store, service, rx) = setup(true);
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);
        service.set_fail_writes(true);
        store.toggle(1, "me");
        drain(&mut store, &rx);
        assert_eq!(store.state(1), ReactionState::default());
    }

    #[test]
    fn failed_fetch_keeps_last_known_state() {
        let (mut store, service, rx) = setup(false);
        service.seed(1, "user-a");
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);
        service.set_fail_reads(true);
        service.notify(1);
        drain(&mut store, &rx);
        assert_eq!(store.state(1).count, 1);
    }

    #[test]
    fn unlike_never_goes_below_zero() {
        let state = ReactionState {
            count: 0,
            liked_by_me: true,
        };
        assert_eq!(state.toggled().count, 0);
    }

    #[test]
    fn like_counts_refresh_updates_catalog_aggregates() {
        let (mut store, service, rx) = setup(false);
        service.seed(3, "a");
        service.seed(3, "b");
        service.seed(4, "a");
        store.refresh_counts();
        drain(&mut store, &rx);
        assert_eq!(store.like_counts().get(&3), Some(&2));
        assert_eq!(store.state(4).count, 1);
    }

    #[test]
    fn count_refresh_keeps_subscribed_item_state() {
        let (mut store, service, rx) = setup(true);
        store.subscribe(1, Some("me"));
        drain(&mut store, &rx);

        store.refresh_counts();
        service.set_fail_writes(true);
        let optimistic = store.toggle(1, "me");

        let counts = rx.try_recv().unwrap();
        assert!(matches!(counts, AsyncResponse::LikeCounts { .. }));
        store.handle(counts);
        assert_eq!(store.state(1), optimistic);
        assert_eq!(store.like_counts().get(&1), Some(&1));

        drain(&mut store, &rx);
        assert_eq!(store.state(1), ReactionState::default());
        assert_eq!(store.like_counts().get(&1), Some(&0));
    }

    struct SlowInserts(Arc<MockReactionService>);

    impl ReactionService for SlowInserts {
        fn list(&self, item_id: ItemId) -> Result<Vec<ReactionRecord>> {
            self.0.list(item_id)
        }

        fn counts(&self) -> Result<HashMap<ItemId, u64>> {
            self.0.counts()
        }

        fn insert(&self, item_id: ItemId, user_id: &str) -> Result<()> {
            thread::sleep(Duration::from_millis(150));
            self.0.insert(item_id, user_id)
        }

        fn delete(&self, item_id: ItemId, user_id: &str) -> Result<()> {
            self.0.delete(item_id, user_id)
        }

        fn watch(&self, item_id: ItemId, on_change: ChangeCallback) -> Result<Watch> {
            self.0.watch(item_id, on_change)
        }
    }

    fn settle(store: &mut ReactionStore, rx: &Receiver<AsyncResponse>) {
        while let Ok(message) = rx.recv_timeout(Duration::from_millis(500)) {
            store.handle(message);
        }
    }

    #[test]
    fn rapid_toggles_reach_the_store_in_order() {
        let service = Arc::new(MockReactionService::new());
        service.seed(1, "user-a");
        let (dispatcher, rx) = Dispatcher::new(Mode::Background);
        let mut store = ReactionStore::new(Arc::new(SlowInserts(service.clone())), dispatcher, false);
        store.subscribe(1, Some("me"));
        settle(&mut store, &rx);
        let before = store.state(1);
        assert_eq!(before.count, 1);

        store.toggle(1, "me");
        store.toggle(1, "me");
        assert_eq!(store.state(1), before);
        settle(&mut store, &rx);

        assert_eq!(store.state(1), before);
        assert_eq!(
            service.list(1).unwrap(),
            vec![ReactionRecord {
                item_id: 1,
                user_id: "user-a".into()
            }]
        );
    }
}
