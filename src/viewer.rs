use tracing::{debug, info};

use crate::catalog::{CatalogView, ItemId};

pub const DEFAULT_SWIPE_THRESHOLD: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Comments,
}

/// Point inside the displayed image, in percent of its width and height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomOrigin {
    pub x: f32,
    pub y: f32,
}

impl ZoomOrigin {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_percent(x),
            y: clamp_percent(y),
        }
    }
}

impl Default for ZoomOrigin {
    fn default() -> Self {
        Self { x: 50.0, y: 50.0 }
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        50.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    Escape,
    Navigate(Direction),
    ToggleZoom(ZoomOrigin),
    PointerMoved(ZoomOrigin),
    TogglePanel,
    /// Horizontal positions, in pixels, where a drag started and ended.
    Swipe { start_x: f32, end_x: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenState {
    pub index: usize,
    pub item_id: ItemId,
    pub zoomed: bool,
    pub zoom_origin: ZoomOrigin,
    pub panel: Option<Panel>,
}

impl OpenState {
    fn showing(index: usize, item_id: ItemId) -> Self {
        Self {
            index,
            item_id,
            zoomed: false,
            zoom_origin: ZoomOrigin::default(),
            panel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ViewerState {
    #[default]
    Closed,
    Open(OpenState),
}

/// Side effects the owner of the machine must carry out, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// A new item is on screen: subscribe reactions, record the view.
    Shown {
        item_id: ItemId,
        previous: Option<ItemId>,
    },
    Closed {
        item_id: ItemId,
    },
    PanelOpened {
        item_id: ItemId,
    },
    PanelClosed {
        item_id: ItemId,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ViewerError {
    #[error("viewer: index {index} is outside a view of {len} items")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("viewer: item {requested} is not at index {index} (found {found})")]
    ItemMismatch {
        requested: ItemId,
        index: usize,
        found: ItemId,
    },
}

/// Navigation, zoom and panel state of the full-screen viewer.
///
/// The machine never owns the catalog view; every transition takes the view as derived at that
/// moment and first re-locates the displayed item in it.
#[derive(Debug)]
pub struct ViewerStateMachine {
    state: ViewerState,
    swipe_threshold: f32,
}

impl Default for ViewerStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_SWIPE_THRESHOLD)
    }
}

impl ViewerStateMachine {
    pub fn new(swipe_threshold: f32) -> Self {
        Self {
            state: ViewerState::Closed,
            swipe_threshold: swipe_threshold.abs(),
        }
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn open_state(&self) -> Option<&OpenState> {
        match &self.state {
            ViewerState::Open(open) => Some(open),
            ViewerState::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ViewerState::Open(_))
    }

    pub fn current_item(&self) -> Option<ItemId> {
        self.open_state().map(|open| open.item_id)
    }

    pub fn swipe_threshold(&self) -> f32 {
        self.swipe_threshold
    }

    /// Direction a drag of this length maps to, if it is long enough to count as a swipe.
    pub fn swipe_direction(&self, start_x: f32, end_x: f32) -> Option<Direction> {
        let dx = end_x - start_x;
        if dx <= -self.swipe_threshold {
            Some(Direction::Next)
        } else if dx >= self.swipe_threshold {
            Some(Direction::Prev)
        } else {
            None
        }
    }

    pub fn open(
        &mut self,
        view: &CatalogView,
        item_id: ItemId,
        index: usize,
    ) -> Result<Vec<Effect>, ViewerError> {
        let found = view
            .get(index)
            .ok_or(ViewerError::IndexOutOfRange {
                index,
                len: view.len(),
            })?
            .id;
        if found != item_id {
            return Err(ViewerError::ItemMismatch {
                requested: item_id,
                index,
                found,
            });
        }

        let mut effects = Vec::new();
        let previous = match self.state {
            ViewerState::Open(open) => {
                if open.panel.is_some() {
                    effects.push(Effect::PanelClosed {
                        item_id: open.item_id,
                    });
                }
                Some(open.item_id)
            }
            ViewerState::Closed => None,
        };
        info!(item_id, index, "viewer: open");
        self.state = ViewerState::Open(OpenState::showing(index, item_id));
        effects.push(Effect::Shown { item_id, previous });
        Ok(effects)
    }

    pub fn close(&mut self) -> Vec<Effect> {
        let ViewerState::Open(open) = self.state else {
            return Vec::new();
        };
        let mut effects = Vec::new();
        if open.panel.is_some() {
            effects.push(Effect::PanelClosed {
                item_id: open.item_id,
            });
        }
        info!(item_id = open.item_id, "viewer: close");
        self.state = ViewerState::Closed;
        effects.push(Effect::Closed {
            item_id: open.item_id,
        });
        effects
    }

    /// Re-locates the displayed item in `view`. If it is gone, the item now at the clamped index
    /// is shown instead; an empty view closes the viewer.
    pub fn sync(&mut self, view: &CatalogView) -> Vec<Effect> {
        let ViewerState::Open(open) = self.state else {
            return Vec::new();
        };
        if let Some(index) = view.position(open.item_id) {
            if index != open.index {
                debug!(item_id = open.item_id, from = open.index, to = index, "viewer: item moved");
                self.state = ViewerState::Open(OpenState { index, ..open });
            }
            return Vec::new();
        }
        if view.is_empty() {
            debug!(item_id = open.item_id, "viewer: view emptied");
            return self.close();
        }
        let index = open.index.min(view.len() - 1);
        let Some(item) = view.get(index) else {
            return self.close();
        };
        debug!(item_id = open.item_id, replacement = item.id, "viewer: item left the view");
        self.show(open, index, item.id)
    }

    pub fn navigate(&mut self, view: &CatalogView, direction: Direction) -> Vec<Effect> {
        let mut effects = self.sync(view);
        let ViewerState::Open(open) = self.state else {
            return effects;
        };
        if open.zoomed {
            debug!(item_id = open.item_id, "viewer: navigation ignored while zoomed");
            return effects;
        }
        let len = view.len();
        let index = match direction {
            Direction::Next => (open.index + 1) % len,
            Direction::Prev => (open.index + len - 1) % len,
        };
        let Some(item) = view.get(index) else {
            return effects;
        };
        debug!(from = open.index, to = index, ?direction, "viewer: navigate");
        effects.extend(self.show(open, index, item.id));
        effects
    }

    pub fn toggle_zoom(&mut self, origin: ZoomOrigin) -> Vec<Effect> {
        let ViewerState::Open(open) = &mut self.state else {
            return Vec::new();
        };
        if open.panel.is_some() {
            debug!(item_id = open.item_id, "viewer: zoom ignored while panel is open");
            return Vec::new();
        }
        open.zoomed = !open.zoomed;
        if open.zoomed {
            open.zoom_origin = ZoomOrigin::new(origin.x, origin.y);
        }
        debug!(item_id = open.item_id, zoomed = open.zoomed, "viewer: zoom");
        Vec::new()
    }

    /// Pans while zoomed; ignored otherwise.
    pub fn pointer_moved(&mut self, origin: ZoomOrigin) {
        if let ViewerState::Open(open) = &mut self.state {
            if open.zoomed {
                open.zoom_origin = ZoomOrigin::new(origin.x, origin.y);
            }
        }
    }

    /// Opening the panel while zoomed drops the zoom first.
    pub fn toggle_panel(&mut self) -> Vec<Effect> {
        let ViewerState::Open(open) = &mut self.state else {
            return Vec::new();
        };
        let item_id = open.item_id;
        match open.panel {
            Some(_) => {
                open.panel = None;
                debug!(item_id, "viewer: panel closed");
                vec![Effect::PanelClosed { item_id }]
            }
            None => {
                open.zoomed = false;
                open.panel = Some(Panel::Comments);
                debug!(item_id, "viewer: panel opened");
                vec![Effect::PanelOpened { item_id }]
            }
        }
    }

    /// Zoom, then panel, then the viewer itself.
    pub fn escape(&mut self) -> Vec<Effect> {
        let ViewerState::Open(open) = &mut self.state else {
            return Vec::new();
        };
        if open.zoomed {
            open.zoomed = false;
            return Vec::new();
        }
        if open.panel.is_some() {
            open.panel = None;
            return vec![Effect::PanelClosed {
                item_id: open.item_id,
            }];
        }
        self.close()
    }

    pub fn handle(&mut self, view: &CatalogView, input: Input) -> Vec<Effect> {
        let mut effects = self.sync(view);
        if !self.is_open() {
            return effects;
        }
        let more = match input {
            Input::Escape => self.escape(),
            Input::Navigate(direction) => self.navigate(view, direction),
            Input::ToggleZoom(origin) => self.toggle_zoom(origin),
            Input::PointerMoved(origin) => {
                self.pointer_moved(origin);
                Vec::new()
            }
            Input::TogglePanel => self.toggle_panel(),
            Input::Swipe { start_x, end_x } => {
                let zoomed = self.open_state().is_some_and(|open| open.zoomed);
                match self.swipe_direction(start_x, end_x) {
                    Some(direction) if !zoomed => self.navigate(view, direction),
                    _ => Vec::new(),
                }
            }
        };
        effects.extend(more);
        effects
    }

    fn show(&mut self, current: OpenState, index: usize, item_id: ItemId) -> Vec<Effect> {
        let mut effects = Vec::new();
        if current.panel.is_some() {
            effects.push(Effect::PanelClosed {
                item_id: current.item_id,
            });
        }
        self.state = ViewerState::Open(OpenState::showing(index, item_id));
        effects.push(Effect::Shown {
            item_id,
            previous: Some(current.item_id),
        });
        effects
    }
}
