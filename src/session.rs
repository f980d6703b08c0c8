use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::{Catalog, CatalogError, CatalogView, Category, ItemId, MediaItem, SortMode};
use crate::comments::{Comment, CommentThread};
use crate::data::{ReactionService, ViewService};
use crate::dispatch::{AsyncResponse, Dispatcher, Mode};
use crate::download;
use crate::identity::IdentityProvider;
use crate::reactions::{ReactionState, ReactionStore};
use crate::share::{Platform, ShareLinkBuilder};
use crate::storage::Store;
use crate::viewer::{Effect, Input, ViewerStateMachine, DEFAULT_SWIPE_THRESHOLD};
use crate::views::ViewCounter;

pub struct Options {
    pub reactions: Arc<dyn ReactionService>,
    pub views: Arc<dyn ViewService>,
    pub store: Store,
    pub dispatch: Mode,
    pub rollback_on_failure: bool,
    pub swipe_threshold: f32,
    pub share_base_url: String,
}

impl Options {
    pub fn new(
        reactions: Arc<dyn ReactionService>,
        views: Arc<dyn ViewService>,
        store: Store,
    ) -> Self {
        Self {
            reactions,
            views,
            store,
            dispatch: Mode::Background,
            rollback_on_failure: false,
            swipe_threshold: DEFAULT_SWIPE_THRESHOLD,
            share_base_url: crate::config::DEFAULT_SHARE_BASE_URL.to_string(),
        }
    }
}

/// One browsing visit: owns every piece of mutable viewer state and applies all async
/// completions on the caller's thread.
pub struct Session {
    catalog: Catalog,
    categories: Vec<Category>,
    category: Category,
    sort: SortMode,
    viewer: ViewerStateMachine,
    reactions: ReactionStore,
    views: ViewCounter,
    comments: Option<CommentThread>,
    identity: IdentityProvider,
    store: Store,
    share: ShareLinkBuilder,
    responses: Receiver<AsyncResponse>,
}

impl Session {
    pub fn new(catalog: Catalog, opts: Options) -> Result<Self> {
        let (dispatcher, responses) = Dispatcher::new(opts.dispatch);
        let identity = IdentityProvider::load(opts.store.clone())?;
        let share = ShareLinkBuilder::new(&opts.share_base_url)?;
        let reactions = ReactionStore::new(
            opts.reactions,
            dispatcher.clone(),
            opts.rollback_on_failure,
        );
        reactions.refresh_counts();
        Ok(Self {
            categories: catalog.categories(),
            catalog,
            category: Category::All,
            sort: SortMode::Recent,
            viewer: ViewerStateMachine::new(opts.swipe_threshold),
            reactions,
            views: ViewCounter::new(opts.views, dispatcher),
            comments: None,
            identity,
            store: opts.store,
            share,
            responses,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    /// Derived from the current inputs on every call.
    pub fn view(&self) -> CatalogView {
        self.catalog
            .view(&self.category, self.sort, self.reactions.like_counts())
    }

    pub fn viewer(&self) -> &ViewerStateMachine {
        &self.viewer
    }

    pub fn current_item(&self) -> Option<&MediaItem> {
        self.viewer
            .current_item()
            .and_then(|id| self.catalog.get(id))
    }

    pub fn reaction(&self, item_id: ItemId) -> ReactionState {
        self.reactions.state(item_id)
    }

    pub fn subscribed_item(&self) -> Option<ItemId> {
        self.reactions.subscribed_item()
    }

    pub fn view_count(&self, item_id: ItemId) -> Option<u64> {
        self.views.count(item_id)
    }

    pub fn comments(&self) -> Option<&CommentThread> {
        self.comments.as_ref()
    }

    pub fn identity(&self) -> &IdentityProvider {
        &self.identity
    }

    pub fn cycle_category(&mut self, forward: bool) {
        let len = self.categories.len();
        if len == 0 {
            return;
        }
        let current = self
            .categories
            .iter()
            .position(|category| *category == self.category)
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        let category = self.categories[next].clone();
        self.set_category(category);
    }

    pub fn set_category(&mut self, category: Category) {
        debug!(category = category.label(), "session: category");
        self.category = category;
        self.sync_viewer();
    }

    pub fn toggle_sort(&mut self) {
        self.sort = self.sort.toggled();
        debug!(sort = self.sort.label(), "session: sort");
        if self.sort == SortMode::Popular {
            self.reactions.refresh_counts();
        }
        self.sync_viewer();
    }

    pub fn refresh(&mut self) {
        self.reactions.refresh_counts();
    }

    pub fn open(&mut self, index: usize) -> Result<()> {
        let view = self.view();
        let item_id = view
            .get(index)
            .map(|item| item.id)
            .with_context(|| format!("session: no item at index {index}"))?;
        let effects = self.viewer.open(&view, item_id, index)?;
        self.apply(effects);
        Ok(())
    }

    /// Opens the item a deep link points at.
    pub fn open_item(&mut self, item_id: ItemId) -> Result<()> {
        let view = self.view();
        let index = view
            .position(item_id)
            .ok_or(CatalogError::UnknownItem(item_id))?;
        let effects = self.viewer.open(&view, item_id, index)?;
        self.apply(effects);
        Ok(())
    }

    pub fn close(&mut self) {
        let effects = self.viewer.close();
        self.apply(effects);
    }

    pub fn handle_input(&mut self, input: Input) {
        let view = self.view();
        let effects = self.viewer.handle(&view, input);
        self.apply(effects);
    }

    /// Toggles the local user's like on the displayed item, issuing an identity if needed.
    pub fn toggle_like(&mut self) -> Result<Option<ReactionState>> {
        let Some(item_id) = self.viewer.current_item() else {
            return Ok(None);
        };
        let user_id = self.identity.ensure()?.user_id.clone();
        Ok(Some(self.reactions.toggle(item_id, &user_id)))
    }

    /// Appends to the open comment thread. `None` when the panel is closed or input is blank.
    pub fn submit_comment(&mut self, author: &str, text: &str) -> Result<Option<Comment>> {
        let Some(thread) = self.comments.as_mut() else {
            return Ok(None);
        };
        thread.append(&mut self.identity, author, text)
    }

    pub fn clear_display_name(&mut self) -> Result<()> {
        self.identity.clear_display_name()
    }

    pub fn share_link(&self) -> Option<Url> {
        self.viewer
            .current_item()
            .map(|id| self.share.build_link(id))
    }

    pub fn share_intent(&self, platform: Platform) -> Option<Url> {
        self.current_item()
            .map(|item| self.share.build_intent(platform, item.id, &item.title))
    }

    pub fn link_for(&self, item_id: ItemId) -> Result<Url> {
        self.catalog
            .get(item_id)
            .ok_or(CatalogError::UnknownItem(item_id))?;
        Ok(self.share.build_link(item_id))
    }

    pub fn download(&self, dir: &Path) -> Result<Option<PathBuf>> {
        match self.current_item() {
            Some(item) => download::export(item, dir).map(Some),
            None => Ok(None),
        }
    }

    /// Drains completed jobs. Returns whether anything visible may have changed.
    pub fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.responses.try_recv() {
            changed |= match response {
                response @ (AsyncResponse::Reactions { .. }
                | AsyncResponse::ReactionsChanged { .. }
                | AsyncResponse::ReactionWritten { .. }
                | AsyncResponse::LikeCounts { .. }) => self.reactions.handle(response),
                response @ (AsyncResponse::ViewCount { .. }
                | AsyncResponse::ViewRecorded { .. }) => self.views.handle(response),
            };
        }
        if changed && self.sort == SortMode::Popular {
            self.sync_viewer();
        }
        changed
    }

    fn sync_viewer(&mut self) {
        let view = self.view();
        let effects = self.viewer.sync(&view);
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Shown { item_id, previous } => {
                    debug!(item_id, ?previous, "session: showing item");
                    self.comments = None;
                    self.reactions.subscribe(item_id, self.identity.user_id());
                    self.views.record_view_if_new(item_id);
                    self.views.ensure_count(item_id);
                }
                Effect::Closed { item_id } => {
                    info!(item_id, "session: viewer closed");
                    self.comments = None;
                    self.reactions.unsubscribe();
                }
                Effect::PanelOpened { item_id } => {
                    self.comments = match CommentThread::open(self.store.clone(), item_id) {
                        Ok(thread) => Some(thread),
                        Err(err) => {
                            warn!(item_id, error = %err, "session: comments unavailable");
                            None
                        }
                    };
                }
                Effect::PanelClosed { .. } => {
                    self.comments = None;
                }
            }
        }
    }
}
