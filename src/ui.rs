use std::cell::Cell;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, window_size, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction as LayoutDirection, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use tracing::{info, warn};
use unicode_width::UnicodeWidthStr;

use crate::comments::{self, AVATAR_PALETTE};
use crate::preview::PreviewCache;
use crate::session::Session;
use crate::share::{self, Platform};
use crate::viewer::{Direction, Input, OpenState, ZoomOrigin};
use crate::views::format_views;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_LIKED: Color = Color::Rgb(243, 139, 168);

const COPY_CONFIRMATION: Duration = Duration::from_secs(2);
const ICON_LIKE: &str = "♥";
const ICON_LIKE_EMPTY: &str = "♡";
const ICON_VIEWS: &str = "👁";

#[derive(Clone, Copy)]
struct CellMetrics {
    width: f64,
    height: f64,
}

fn terminal_cell_metrics() -> CellMetrics {
    static METRICS: OnceLock<CellMetrics> = OnceLock::new();
    *METRICS.get_or_init(|| {
        window_size().ok().map_or(
            CellMetrics {
                width: 1.0,
                height: 1.0,
            },
            |size| {
                let per_cell = |pixels: u16, cells: u16| {
                    if pixels > 0 && cells > 0 {
                        f64::from(pixels) / f64::from(cells)
                    } else {
                        1.0
                    }
                };
                CellMetrics {
                    width: per_cell(size.width, size.columns),
                    height: per_cell(size.height, size.rows),
                }
            },
        )
    })
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

/// Pointer position inside `area`, in percent, measured at cell centres.
fn pointer_origin(area: Rect, column: u16, row: u16) -> ZoomOrigin {
    if area.width == 0 || area.height == 0 {
        return ZoomOrigin::default();
    }
    let x = (f32::from(column) - f32::from(area.x) + 0.5) / f32::from(area.width) * 100.0;
    let y = (f32::from(row) - f32::from(area.y) + 0.5) / f32::from(area.height) * 100.0;
    ZoomOrigin::new(x, y)
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x && column < area.x + area.width && row >= area.y && row < area.y + area.height
}

fn truncate(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    for ch in text.chars() {
        if UnicodeWidthStr::width(out.as_str()) + 2 > width {
            break;
        }
        out.push(ch);
    }
    out.push('…');
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pane {
    Categories,
    Catalog,
    Image,
    Comments,
}

impl Pane {
    fn title(self) -> &'static str {
        match self {
            Pane::Categories => "Categories",
            Pane::Catalog => "Catalog",
            Pane::Image => "Viewer",
            Pane::Comments => "Comments",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum DraftField {
    Name,
    #[default]
    Text,
}

#[derive(Default)]
struct CommentDraft {
    name: String,
    text: String,
    field: DraftField,
}

impl CommentDraft {
    fn active_mut(&mut self) -> &mut String {
        match self.field {
            DraftField::Name => &mut self.name,
            DraftField::Text => &mut self.text,
        }
    }
}

pub struct Options {
    pub session: Session,
    pub download_dir: Option<PathBuf>,
    pub status_message: String,
}

pub struct Model {
    session: Session,
    selected: usize,
    catalog_offset: Cell<usize>,
    status_message: String,
    needs_redraw: bool,
    share_menu_visible: bool,
    copied_until: Option<Instant>,
    draft: CommentDraft,
    drag_start: Option<(u16, u16)>,
    image_area: Cell<Option<Rect>>,
    preview: PreviewCache,
    download_dir: Option<PathBuf>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        Self {
            session: options.session,
            selected: 0,
            catalog_offset: Cell::new(0),
            status_message: options.status_message,
            needs_redraw: true,
            share_menu_visible: false,
            copied_until: None,
            draft: CommentDraft::default(),
            drag_start: None,
            image_area: Cell::new(None),
            preview: PreviewCache::default(),
            download_dir: options.download_dir,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.expire_copy_confirmation() {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn poll_async(&mut self) -> bool {
        let changed = self.session.poll_async();
        if changed {
            self.clamp_selection();
        }
        changed
    }

    fn expire_copy_confirmation(&mut self) -> bool {
        match self.copied_until {
            Some(until) if Instant::now() >= until => {
                self.copied_until = None;
                true
            }
            _ => false,
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.session.view().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    fn viewer_state(&self) -> Option<OpenState> {
        self.session.viewer().open_state().copied()
    }

    fn panel_open(&self) -> bool {
        self.viewer_state()
            .is_some_and(|open| open.panel.is_some())
    }

    fn send(&mut self, input: Input) {
        let before = self.session.viewer().current_item();
        self.session.handle_input(input);
        match self.session.viewer().current_item() {
            Some(current) if Some(current) != before => {
                self.draft = CommentDraft::default();
                self.drag_start = None;
            }
            Some(_) => {}
            None => {
                self.share_menu_visible = false;
                self.draft = CommentDraft::default();
                self.drag_start = None;
                self.image_area.set(None);
                if let Some(position) = before.and_then(|id| self.session.view().position(id)) {
                    self.selected = position;
                }
                self.clamp_selection();
            }
        }
        self.mark_dirty();
    }

    fn needs_name(&self) -> bool {
        self.session.identity().display_name().is_none()
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }
        if self.share_menu_visible {
            return self.handle_share_key(key.code);
        }
        match self.viewer_state() {
            None => self.handle_grid_key(key.code),
            Some(open) if open.panel.is_some() => self.handle_panel_key(key),
            Some(open) => self.handle_lightbox_key(key.code, open),
        }
    }

    fn handle_grid_key(&mut self, code: KeyCode) -> Result<bool> {
        let len = self.session.view().len();
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < len {
                    self.selected += 1;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Home | KeyCode::Char('g') => self.selected = 0,
            KeyCode::End | KeyCode::Char('G') => self.selected = len.saturating_sub(1),
            KeyCode::Tab => {
                self.session.cycle_category(true);
                self.selected = 0;
                self.status_message = format!("Showing {}.", self.session.category().label());
            }
            KeyCode::BackTab => {
                self.session.cycle_category(false);
                self.selected = 0;
                self.status_message = format!("Showing {}.", self.session.category().label());
            }
            KeyCode::Char('p') => {
                self.session.toggle_sort();
                self.selected = 0;
                self.status_message = format!("Sorted by {}.", self.session.sort().label());
            }
            KeyCode::Char('r') => {
                self.session.refresh();
                self.status_message = "Refreshing like counts…".to_string();
            }
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
                if len > 0 {
                    self.session.open(self.selected)?;
                    self.status_message.clear();
                }
            }
            _ => return Ok(false),
        }
        self.mark_dirty();
        Ok(false)
    }

    fn handle_lightbox_key(&mut self, code: KeyCode, open: OpenState) -> Result<bool> {
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Esc | KeyCode::Backspace => self.send(Input::Escape),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('n') => {
                self.send(Input::Navigate(Direction::Next))
            }
            KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('N') => {
                self.send(Input::Navigate(Direction::Prev))
            }
            KeyCode::Char('z') => {
                let origin = if open.zoomed {
                    open.zoom_origin
                } else {
                    ZoomOrigin::default()
                };
                self.send(Input::ToggleZoom(origin));
            }
            KeyCode::Char('c') => {
                self.send(Input::TogglePanel);
                self.draft.field = if self.needs_name() {
                    DraftField::Name
                } else {
                    DraftField::Text
                };
            }
            KeyCode::Char('f') | KeyCode::Char(' ') => {
                if let Some(state) = self.session.toggle_like()? {
                    self.status_message = if state.liked_by_me {
                        "Liked.".to_string()
                    } else {
                        "Like removed.".to_string()
                    };
                }
                self.mark_dirty();
            }
            KeyCode::Char('s') => {
                self.share_menu_visible = true;
                self.mark_dirty();
            }
            KeyCode::Char('d') => self.download(),
            _ => {}
        }
        Ok(false)
    }

    fn handle_panel_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if key.code == KeyCode::Char('r') {
                self.session.clear_display_name()?;
                self.draft.field = DraftField::Name;
                self.status_message = "Enter a new name.".to_string();
                self.mark_dirty();
            }
            return Ok(false);
        }
        match key.code {
            KeyCode::Esc => self.send(Input::Escape),
            KeyCode::Tab | KeyCode::BackTab => {
                self.draft.field = match self.draft.field {
                    DraftField::Name => DraftField::Text,
                    DraftField::Text if self.needs_name() => DraftField::Name,
                    DraftField::Text => DraftField::Text,
                };
                self.mark_dirty();
            }
            KeyCode::Enter => self.submit_comment()?,
            KeyCode::Backspace => {
                self.draft.active_mut().pop();
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                self.draft.active_mut().push(ch);
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn draft_author(&self) -> String {
        match self.session.identity().display_name() {
            Some(name) => name.to_string(),
            None => self.draft.name.clone(),
        }
    }

    fn submit_comment(&mut self) -> Result<()> {
        let author = self.draft_author();
        if !comments::can_submit(&author, &self.draft.text) {
            if self.needs_name() && author.trim().is_empty() {
                self.draft.field = DraftField::Name;
            }
            self.mark_dirty();
            return Ok(());
        }
        if self
            .session
            .submit_comment(&author, &self.draft.text)?
            .is_some()
        {
            self.draft.text.clear();
            self.draft.name.clear();
            self.draft.field = DraftField::Text;
            self.status_message = "Comment posted.".to_string();
        }
        self.mark_dirty();
        Ok(())
    }

    fn handle_share_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc | KeyCode::Char('s') => {
                self.share_menu_visible = false;
            }
            KeyCode::Char('1') | KeyCode::Char('c') | KeyCode::Char('y') => self.copy_link(),
            KeyCode::Char('2') | KeyCode::Char('t') => self.open_intent(Platform::Twitter),
            KeyCode::Char('3') | KeyCode::Char('b') => self.open_intent(Platform::Facebook),
            _ => return Ok(false),
        }
        self.mark_dirty();
        Ok(false)
    }

    fn copy_link(&mut self) {
        let Some(link) = self.session.share_link() else {
            return;
        };
        match share::copy_to_clipboard(link.as_str()) {
            Ok(()) => {
                info!(link = %link, "share: link copied");
                self.copied_until = Some(Instant::now() + COPY_CONFIRMATION);
            }
            Err(err) => warn!(error = %err, "share: copy failed"),
        }
    }

    fn open_intent(&mut self, platform: Platform) {
        let Some(url) = self.session.share_intent(platform) else {
            return;
        };
        match share::open_in_browser(&url) {
            Ok(()) => {
                self.status_message = format!("Opened {} share in browser.", platform.label());
                self.share_menu_visible = false;
            }
            Err(err) => {
                warn!(error = %err, "share: open intent failed");
                self.status_message = format!("Could not open browser: {}", url);
            }
        }
    }

    fn download(&mut self) {
        let Some(dir) = self.download_dir.clone() else {
            self.status_message = "No download directory configured.".to_string();
            self.mark_dirty();
            return;
        };
        match self.session.download(&dir) {
            Ok(Some(path)) => self.status_message = format!("Saved {}.", path.display()),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "download: failed");
                self.status_message = format!("Download failed: {}", err);
            }
        }
        self.mark_dirty();
    }

    fn handle_mouse(&mut self, event: MouseEvent) {
        if self.share_menu_visible {
            return;
        }
        let Some(open) = self.viewer_state() else {
            match event.kind {
                MouseEventKind::ScrollDown => {
                    let _ = self.handle_grid_key(KeyCode::Down);
                }
                MouseEventKind::ScrollUp => {
                    let _ = self.handle_grid_key(KeyCode::Up);
                }
                _ => {}
            }
            return;
        };

        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.drag_start = Some((event.column, event.row));
            }
            MouseEventKind::Up(MouseButton::Left) => {
                let Some((start_col, start_row)) = self.drag_start.take() else {
                    return;
                };
                let metrics = terminal_cell_metrics();
                let start_x = (f64::from(start_col) * metrics.width) as f32;
                let end_x = (f64::from(event.column) * metrics.width) as f32;
                if self
                    .session
                    .viewer()
                    .swipe_direction(start_x, end_x)
                    .is_some()
                {
                    self.send(Input::Swipe { start_x, end_x });
                    return;
                }
                let moved_rows = f64::from(event.row.abs_diff(start_row)) * metrics.height;
                if moved_rows >= f64::from(self.session.viewer().swipe_threshold()) {
                    return;
                }
                if let Some(area) = self.image_area.get() {
                    if contains(area, event.column, event.row) {
                        let origin = pointer_origin(area, event.column, event.row);
                        self.send(Input::ToggleZoom(origin));
                    }
                }
            }
            MouseEventKind::Moved | MouseEventKind::Drag(MouseButton::Left) => {
                if !open.zoomed {
                    return;
                }
                if let Some(area) = self.image_area.get() {
                    let origin = pointer_origin(area, event.column, event.row);
                    self.session.handle_input(Input::PointerMoved(origin));
                    self.mark_dirty();
                }
            }
            MouseEventKind::ScrollDown => self.send(Input::Navigate(Direction::Next)),
            MouseEventKind::ScrollUp => self.send(Input::Navigate(Direction::Prev)),
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_line = Paragraph::new(self.status_text()).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        match self.viewer_state() {
            None => self.draw_grid(frame, layout[1]),
            Some(open) => self.draw_lightbox(frame, layout[1], open),
        }

        let footer = Paragraph::new(self.footer_text())
            .style(Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG));
        frame.render_widget(footer, layout[2]);

        if self.share_menu_visible {
            self.draw_share_menu(frame, full);
        }
    }

    fn status_text(&self) -> String {
        if self.status_message.is_empty() {
            let view = self.session.view();
            format!(
                "Lightbox · {} · {} · {} items",
                self.session.category().label(),
                self.session.sort().label(),
                view.len()
            )
        } else {
            self.status_message.clone()
        }
    }

    fn pane_block(&self, pane: Pane, focused: bool, title: String) -> Block<'static> {
        let border_style = if focused {
            Style::default().fg(COLOR_BORDER_FOCUSED)
        } else {
            Style::default().fg(COLOR_BORDER_IDLE)
        };
        let title_style = if focused {
            Style::default()
                .fg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        let title = if title.is_empty() {
            pane.title().to_string()
        } else {
            title
        };
        Block::default()
            .title(Span::styled(title, title_style))
            .borders(Borders::ALL)
            .border_style(border_style)
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
    }

    fn draw_grid(&self, frame: &mut Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(LayoutDirection::Horizontal)
            .constraints([Constraint::Percentage(22), Constraint::Percentage(78)])
            .split(area);

        let block = self.pane_block(Pane::Categories, false, String::new());
        let items: Vec<ListItem> = self
            .session
            .categories()
            .iter()
            .map(|category| {
                let active = category == self.session.category();
                let style = if active {
                    Style::default()
                        .fg(COLOR_ACCENT)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(COLOR_TEXT_SECONDARY)
                };
                let marker = if active { "● " } else { "  " };
                ListItem::new(Line::from(Span::styled(
                    format!("{marker}{}", category.label()),
                    style,
                )))
            })
            .collect();
        frame.render_widget(List::new(items).block(block), chunks[0]);

        let view = self.session.view();
        let title = format!(
            "{} · {} · {}",
            Pane::Catalog.title(),
            self.session.category().label(),
            self.session.sort().label()
        );
        let block = self.pane_block(Pane::Catalog, true, title);
        let inner = block.inner(chunks[1]);
        frame.render_widget(block, chunks[1]);

        if view.is_empty() {
            let empty = Paragraph::new("No images in this category.")
                .style(Style::default().fg(COLOR_TEXT_SECONDARY));
            frame.render_widget(empty, inner);
            return;
        }

        let title_width = usize::from(inner.width).saturating_sub(24).max(8);
        let rows: Vec<ListItem> = view
            .iter()
            .map(|item| {
                let reaction = self.session.reaction(item.id);
                let heart = if reaction.liked_by_me {
                    Span::styled(
                        format!("{ICON_LIKE} {:>4}", reaction.count),
                        Style::default().fg(COLOR_LIKED),
                    )
                } else {
                    Span::styled(
                        format!("{ICON_LIKE_EMPTY} {:>4}", reaction.count),
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    )
                };
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:<width$}", truncate(&item.title, title_width), width = title_width),
                        Style::default().fg(COLOR_TEXT_PRIMARY),
                    ),
                    Span::raw("  "),
                    Span::styled(
                        format!("{:<12}", truncate(&item.category, 12)),
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    ),
                    heart,
                ]))
            })
            .collect();

        let height = usize::from(inner.height.max(1));
        let mut offset = self.catalog_offset.get();
        if self.selected < offset {
            offset = self.selected;
        } else if self.selected >= offset + height {
            offset = self.selected + 1 - height;
        }
        self.catalog_offset.set(offset);

        let mut state = ListState::default()
            .with_selected(Some(self.selected))
            .with_offset(offset);
        let list = List::new(rows).highlight_style(
            Style::default()
                .bg(COLOR_PANEL_SELECTED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_stateful_widget(list, inner, &mut state);
    }

    fn draw_lightbox(&mut self, frame: &mut Frame<'_>, area: Rect, open: OpenState) {
        let (image_pane, comments_pane) = if open.panel.is_some() {
            let chunks = Layout::default()
                .direction(LayoutDirection::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(area);
            (chunks[0], Some(chunks[1]))
        } else {
            (area, None)
        };

        let Some(item) = self.session.catalog().get(open.item_id).cloned() else {
            return;
        };
        let total = self.session.view().len();
        let mut title = format!("{} ({}/{})", item.title, open.index + 1, total);
        if open.zoomed {
            title.push_str(" · zoom 2×");
        }
        let block = self.pane_block(Pane::Image, comments_pane.is_none(), title);
        let inner = block.inner(image_pane);
        frame.render_widget(block, image_pane);

        let sections = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(2)])
            .split(inner);

        let canvas = sections[0];
        let zoom = open.zoomed.then_some(open.zoom_origin);
        let rendered = self
            .preview
            .render(&item, canvas.width, canvas.height, zoom);
        let painted = Rect {
            x: canvas.x + canvas.width.saturating_sub(rendered.width) / 2,
            y: canvas.y + canvas.height.saturating_sub(rendered.height) / 2,
            width: rendered.width.min(canvas.width),
            height: rendered.height.min(canvas.height),
        };
        self.image_area.set(Some(painted));
        frame.render_widget(Paragraph::new(rendered.text), painted);

        frame.render_widget(self.stats_line(open), sections[1]);

        if let Some(area) = comments_pane {
            self.draw_comments(frame, area);
        }
    }

    fn stats_line(&self, open: OpenState) -> Paragraph<'static> {
        let reaction = self.session.reaction(open.item_id);
        let views = self
            .session
            .view_count(open.item_id)
            .map(format_views)
            .unwrap_or_else(|| "–".to_string());
        let (icon, style) = if reaction.liked_by_me {
            (ICON_LIKE, Style::default().fg(COLOR_LIKED))
        } else {
            (ICON_LIKE_EMPTY, Style::default().fg(COLOR_TEXT_PRIMARY))
        };
        let category = self
            .session
            .catalog()
            .get(open.item_id)
            .map(|item| item.category.clone())
            .unwrap_or_default();
        let line = Line::from(vec![
            Span::styled(format!("{icon} {}", reaction.count), style),
            Span::raw("   "),
            Span::styled(
                format!("{ICON_VIEWS} {views} views"),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
            Span::raw("   "),
            Span::styled(category, Style::default().fg(COLOR_TEXT_SECONDARY)),
        ]);
        Paragraph::new(Text::from(vec![Line::default(), line])).alignment(Alignment::Center)
    }

    fn draw_comments(&self, frame: &mut Frame<'_>, area: Rect) {
        let count = self.session.comments().map_or(0, |thread| thread.len());
        let title = format!("{} · {}", Pane::Comments.title(), comments::count_label(count));
        let block = self.pane_block(Pane::Comments, true, title);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let input_height = if self.needs_name() { 5 } else { 4 };
        let sections = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(input_height)])
            .split(inner);

        let width = usize::from(sections[0].width.max(8));
        let now = Utc::now();
        let mut lines: Vec<Line<'static>> = Vec::new();
        match self.session.comments() {
            Some(thread) if !thread.is_empty() => {
                for comment in thread.list() {
                    let (color, _) = AVATAR_PALETTE[comments::avatar_index(&comment.author)];
                    let avatar = Color::Rgb(color.0, color.1, color.2);
                    lines.push(Line::from(vec![
                        Span::styled(
                            format!(" {:<2} ", comments::initials(&comment.author)),
                            Style::default()
                                .fg(COLOR_BG)
                                .bg(avatar)
                                .add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(" "),
                        Span::styled(
                            comment.author.clone(),
                            Style::default()
                                .fg(COLOR_TEXT_PRIMARY)
                                .add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(
                            format!(" · {}", comments::format_relative(comment.timestamp, now)),
                            Style::default().fg(COLOR_TEXT_SECONDARY),
                        ),
                    ]));
                    for row in wrap(&comment.text, width.saturating_sub(5).max(4)) {
                        lines.push(Line::from(Span::styled(
                            format!("     {row}"),
                            Style::default().fg(COLOR_TEXT_PRIMARY),
                        )));
                    }
                    lines.push(Line::default());
                }
            }
            _ => lines.push(Line::from(Span::styled(
                "No comments yet. Be the first!",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))),
        }
        let visible = usize::from(sections[0].height);
        let skip = lines.len().saturating_sub(visible);
        let list = Paragraph::new(Text::from(lines.split_off(skip)));
        frame.render_widget(list, sections[0]);

        frame.render_widget(self.draft_widget(), sections[1]);
    }

    fn draft_widget(&self) -> Paragraph<'static> {
        let field_style = |field: DraftField| {
            if self.draft.field == field {
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_SECONDARY)
            }
        };
        let cursor = |field: DraftField| if self.draft.field == field { "▏" } else { "" };

        let mut lines = vec![Line::default()];
        match self.session.identity().display_name() {
            Some(name) => lines.push(Line::from(vec![
                Span::styled("Posting as ", Style::default().fg(COLOR_TEXT_SECONDARY)),
                Span::styled(
                    name.to_string(),
                    Style::default()
                        .fg(COLOR_TEXT_PRIMARY)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(" (Ctrl-R change)", Style::default().fg(COLOR_TEXT_SECONDARY)),
            ])),
            None => lines.push(Line::from(vec![
                Span::styled("Name: ", field_style(DraftField::Name)),
                Span::styled(
                    format!("{}{}", self.draft.name, cursor(DraftField::Name)),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                ),
            ])),
        }
        lines.push(Line::from(vec![
            Span::styled("Comment: ", field_style(DraftField::Text)),
            Span::styled(
                format!("{}{}", self.draft.text, cursor(DraftField::Text)),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ),
        ]));
        let ready = comments::can_submit(&self.draft_author(), &self.draft.text);
        lines.push(Line::from(Span::styled(
            "Enter post",
            if ready {
                Style::default().fg(COLOR_SUCCESS).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_BORDER_IDLE)
            },
        )));
        Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false })
    }

    fn draw_share_menu(&self, frame: &mut Frame<'_>, area: Rect) {
        let popup = centered_rect(50, 40, area);
        frame.render_widget(Clear, popup);
        let block = Block::default()
            .title(Span::styled(
                "Share",
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
            .style(Style::default().bg(COLOR_PANEL_FOCUSED_BG))
            .padding(Padding::uniform(1));

        let link = self
            .session
            .share_link()
            .map(|url| url.to_string())
            .unwrap_or_default();
        let copy_label = if self.copied_until.is_some() {
            Span::styled("✓ Link copied!", Style::default().fg(COLOR_SUCCESS))
        } else {
            Span::styled("Copy link", Style::default().fg(COLOR_TEXT_PRIMARY))
        };
        let option = |key: &str, label: Span<'static>| {
            Line::from(vec![
                Span::styled(
                    format!("{key}  "),
                    Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
                ),
                label,
            ])
        };
        let mut lines = vec![
            option("1", copy_label),
            option(
                "2",
                Span::styled(
                    format!("Share on {}", Platform::Twitter.label()),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                ),
            ),
            option(
                "3",
                Span::styled(
                    format!("Share on {}", Platform::Facebook.label()),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                ),
            ),
            Line::default(),
        ];
        lines.push(Line::from(Span::styled(
            link,
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup);
    }

    fn footer_text(&self) -> String {
        if self.share_menu_visible {
            return "Share: 1 copy link · 2 Twitter · 3 Facebook · Esc close".to_string();
        }

        let mut parts: Vec<String> = Vec::new();
        match self.viewer_state() {
            None => {
                parts.push("j/k move".to_string());
                parts.push("Enter open".to_string());
                parts.push("Tab category".to_string());
                parts.push(format!("p sort ({})", self.session.sort().toggled().label()));
                parts.push("r refresh".to_string());
            }
            Some(open) if open.panel.is_some() => {
                parts.push("Type to comment".to_string());
                if self.needs_name() {
                    parts.push("Tab switch field".to_string());
                }
                parts.push("Enter post".to_string());
                parts.push("Esc close comments".to_string());
                return parts.join(" · ");
            }
            Some(open) if open.zoomed => {
                parts.push("Move pointer to pan".to_string());
                parts.push("z/click unzoom".to_string());
                parts.push("Esc unzoom".to_string());
            }
            Some(_) => {
                parts.push("←/→ navigate".to_string());
                parts.push("z zoom".to_string());
                parts.push("f like".to_string());
                parts.push("c comments".to_string());
                parts.push("s share".to_string());
                parts.push("d download".to_string());
                parts.push("Esc close".to_string());
            }
        }
        parts.push("q quit".to_string());
        parts.join(" · ")
    }
}
