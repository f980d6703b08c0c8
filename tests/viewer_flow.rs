use std::sync::Arc;

use lightbox_tui::catalog::{Catalog, Category, MediaItem, SortMode};
use lightbox_tui::data::{MockReactionService, MockViewService};
use lightbox_tui::dispatch::Mode;
use lightbox_tui::session::{Options, Session};
use lightbox_tui::storage::Store;
use lightbox_tui::viewer::{Direction, Input, ZoomOrigin};

struct Harness {
    session: Session,
    reactions: Arc<MockReactionService>,
    views: Arc<MockViewService>,
    store: Store,
}

fn items(n: i64) -> Vec<MediaItem> {
    (1..=n)
        .map(|id| MediaItem {
            id,
            source: format!("/photos/{id}.jpg"),
            title: format!("Photo {id}"),
            category: if id % 2 == 0 { "Street" } else { "Portrait" }.to_string(),
        })
        .collect()
}

fn harness_with(
    n: i64,
    rollback_on_failure: bool,
    seed: impl FnOnce(&MockReactionService),
) -> Harness {
    let reactions = Arc::new(MockReactionService::new());
    seed(&reactions);
    let views = Arc::new(MockViewService::new());
    let store = Store::in_memory().unwrap();
    let mut opts = Options::new(reactions.clone(), views.clone(), store.clone());
    opts.dispatch = Mode::Inline;
    opts.rollback_on_failure = rollback_on_failure;
    let mut session = Session::new(Catalog::new(items(n)).unwrap(), opts).unwrap();
    session.poll_async();
    Harness {
        session,
        reactions,
        views,
        store,
    }
}

fn harness(n: i64) -> Harness {
    harness_with(n, false, |_| {})
}

fn index(session: &Session) -> Option<usize> {
    session.viewer().open_state().map(|open| open.index)
}

#[test]
fn open_navigate_zoom_escape_scenario() {
    let mut h = harness(5);
    h.session.open(2).unwrap();
    h.session.handle_input(Input::Navigate(Direction::Next));
    assert_eq!(index(&h.session), Some(3));

    h.session.handle_input(Input::ToggleZoom(ZoomOrigin::new(25.0, 75.0)));
    assert!(h.session.viewer().open_state().unwrap().zoomed);
    h.session.handle_input(Input::Navigate(Direction::Next));
    assert_eq!(index(&h.session), Some(3));

    h.session.handle_input(Input::Escape);
    assert!(!h.session.viewer().open_state().unwrap().zoomed);
    h.session.handle_input(Input::Escape);
    assert!(!h.session.viewer().is_open());
    assert_eq!(h.session.subscribed_item(), None);
    assert_eq!(h.reactions.watcher_count(4), 0);
}

#[test]
fn navigation_wraps_around_the_view() {
    let mut h = harness(4);
    h.session.open(3).unwrap();
    h.session.handle_input(Input::Navigate(Direction::Next));
    assert_eq!(index(&h.session), Some(0));
    h.session.handle_input(Input::Navigate(Direction::Prev));
    assert_eq!(index(&h.session), Some(3));
}

#[test]
fn toggle_twice_restores_state() {
    let mut h = harness_with(3, false, |svc| svc.seed(1, "user-someoneelse"));
    h.session.open(0).unwrap();
    h.session.poll_async();
    let before = h.session.reaction(1);
    assert_eq!(before.count, 1);
    assert!(!before.liked_by_me);

    let liked = h.session.toggle_like().unwrap().unwrap();
    assert!(liked.liked_by_me);
    assert_eq!(liked.count, 2);
    h.session.poll_async();
    assert_eq!(h.session.reaction(1).count, 2);

    h.session.toggle_like().unwrap();
    h.session.poll_async();
    assert_eq!(h.session.reaction(1), before);
    assert_eq!(h.reactions.write_count(), 2);
}

#[test]
fn view_is_counted_once_per_session() {
    let mut h = harness(3);
    h.views.seed(2, 1_499);
    h.session.open(1).unwrap();
    h.session.poll_async();
    assert_eq!(h.session.view_count(2), Some(1_500));

    h.session.close();
    h.session.open(1).unwrap();
    h.session.handle_input(Input::Navigate(Direction::Next));
    h.session.handle_input(Input::Navigate(Direction::Prev));
    h.session.poll_async();
    assert_eq!(h.session.view_count(2), Some(1_500));
    assert_eq!(h.views.insert_count(), 2);
}

#[test]
fn popular_sort_is_stable() {
    let mut h = harness_with(5, false, |svc| {
        svc.seed(4, "user-a");
        svc.seed(4, "user-b");
        svc.seed(2, "user-a");
        svc.seed(5, "user-a");
    });
    h.session.toggle_sort();
    h.session.poll_async();
    assert_eq!(h.session.sort(), SortMode::Popular);
    assert_eq!(h.session.view().ids(), vec![4, 2, 5, 1, 3]);
}

#[test]
fn viewer_follows_item_when_popular_order_changes() {
    let mut h = harness(3);
    h.session.toggle_sort();
    h.session.poll_async();
    h.session.open(2).unwrap();
    assert_eq!(h.session.viewer().current_item(), Some(3));

    h.session.toggle_like().unwrap();
    h.session.refresh();
    h.session.poll_async();
    assert_eq!(h.session.view().ids(), vec![3, 1, 2]);
    assert_eq!(index(&h.session), Some(0));
    assert_eq!(h.session.viewer().current_item(), Some(3));
}

#[test]
fn external_change_overwrites_local_state() {
    let mut h = harness(2);
    h.session.open(0).unwrap();
    h.session.poll_async();
    assert_eq!(h.session.reaction(1).count, 0);

    h.reactions.seed(1, "user-elsewhere");
    h.reactions.notify(1);
    h.session.poll_async();
    assert_eq!(h.session.reaction(1).count, 1);
    assert!(!h.session.reaction(1).liked_by_me);
}

#[test]
fn responses_for_previous_item_are_discarded() {
    let mut h = harness(3);
    h.reactions.seed(1, "user-late");
    h.reactions.seed(2, "user-late");
    h.session.open(0).unwrap();
    h.session.handle_input(Input::Navigate(Direction::Next));
    h.session.poll_async();

    assert_eq!(h.session.subscribed_item(), Some(2));
    assert_eq!(h.session.reaction(2).count, 1);
    assert_eq!(h.session.reaction(1).count, 0);
    assert_eq!(h.reactions.watcher_count(1), 0);
    assert_eq!(h.reactions.watcher_count(2), 1);
}

#[test]
fn failed_write_keeps_optimistic_state_by_default() {
    let mut h = harness(2);
    h.session.open(0).unwrap();
    h.session.poll_async();
    h.reactions.set_fail_writes(true);
    h.session.toggle_like().unwrap();
    h.session.poll_async();
    let state = h.session.reaction(1);
    assert!(state.liked_by_me);
    assert_eq!(state.count, 1);
}

#[test]
fn failed_write_rolls_back_when_configured() {
    let mut h = harness_with(2, true, |_| {});
    h.session.open(0).unwrap();
    h.session.poll_async();
    h.reactions.set_fail_writes(true);
    h.session.toggle_like().unwrap();
    h.session.poll_async();
    let state = h.session.reaction(1);
    assert!(!state.liked_by_me);
    assert_eq!(state.count, 0);
}

#[test]
fn read_failure_keeps_last_known_values() {
    let mut h = harness_with(2, false, |svc| svc.seed(1, "user-a"));
    h.session.open(0).unwrap();
    h.session.poll_async();
    assert_eq!(h.session.reaction(1).count, 1);

    h.reactions.set_fail_reads(true);
    h.reactions.notify(1);
    h.session.poll_async();
    assert_eq!(h.session.reaction(1).count, 1);
}

#[test]
fn comment_scenario() {
    let mut h = harness(2);
    h.session.open(0).unwrap();
    h.session.handle_input(Input::TogglePanel);

    assert!(h.session.submit_comment("", "hello").unwrap().is_none());
    assert!(h.session.submit_comment("Ada", "").unwrap().is_none());
    let comment = h.session.submit_comment("Ada", "hi").unwrap().unwrap();

    let thread = h.session.comments().unwrap();
    assert_eq!(thread.list().last(), Some(&comment));
    assert_eq!(thread.len(), 1);
    assert!(!comment.id.is_empty());
    assert_eq!(h.session.identity().display_name(), Some("Ada"));

    let second = h.session.submit_comment("Ada", "again").unwrap().unwrap();
    assert_ne!(second.id, comment.id);
    assert!(h
        .store
        .get(&lightbox_tui::storage::comments_key(1))
        .unwrap()
        .is_some());
}

#[test]
fn entering_comments_clears_zoom() {
    let mut h = harness(2);
    h.session.open(0).unwrap();
    h.session.handle_input(Input::ToggleZoom(ZoomOrigin::default()));
    h.session.handle_input(Input::TogglePanel);
    let open = h.session.viewer().open_state().unwrap();
    assert!(!open.zoomed);
    assert!(open.panel.is_some());
    assert!(h.session.comments().is_some());
}

#[test]
fn category_change_keeps_viewer_on_a_visible_item() {
    let mut h = harness(4);
    h.session.open(2).unwrap();
    assert_eq!(h.session.viewer().current_item(), Some(3));

    h.session.set_category(Category::from_label("Portrait"));
    assert_eq!(h.session.view().ids(), vec![1, 3]);
    assert_eq!(index(&h.session), Some(1));

    h.session.set_category(Category::from_label("Street"));
    assert_eq!(h.session.viewer().current_item(), Some(4));
    assert_eq!(h.session.subscribed_item(), Some(4));

    h.session.set_category(Category::from_label("Landscape"));
    assert!(!h.session.viewer().is_open());
}
