//! Per-page dock state machine.
//!
//! `DockController` owns everything a page knows about its dock and reacts
//! to one `PageEvent` at a time.  It never touches the network or a clock:
//! side effects come back as `Effect`s for the host to carry out, and timers
//! report back as events.

use dock_proto::protocol::{find_entry, Intent, PageMessage, Snapshot};
use dock_proto::settings::{DockPosition, DockSettings, KEY_SHOW_SETTINGS};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{fisheye_scale, place_menu, place_stack, Point, Rect, Viewport};
use crate::layout::{menu_rows, menu_size, stack_rows, stack_size, DockLayout};
use crate::menu::{build_menu, delete_confirmation, MenuAction, MenuEntry, ICON_PROMPT, RENAME_PROMPT};
use crate::view::{
    handler_icon, render_snapshot, style_tokens, DockItem, DockView, HandlerView, ItemKind, MenuView,
    PlacedNode, RenderedNode, StackView,
};

/// Grace period between the pointer leaving and the dock hiding.
pub const HIDE_DELAY_MS: u64 = 600;
/// Re-clamp once the slide-in transition has settled.
pub const RENDER_RECLAMP_MS: u64 = 300;
pub const SETTINGS_RECLAMP_MS: u64 = 350;
/// Pointer distance from the dock's screen edge that opens it when the edge
/// trigger is enabled.
pub const EDGE_TRIGGER_DISTANCE: f64 = 4.0;
pub const EMPTY_FOLDER_TEXT: &str = "Empty Folder";

/// Inputs to the controller: pointer and keyboard activity, timers firing,
/// answers to prompts, and messages from the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    PointerMove { x: f64, y: f64 },
    PointerLeaveWindow,
    Click { x: f64, y: f64 },
    ContextMenu { x: f64, y: f64 },
    /// Pick the entry at `index` of the open context menu.
    MenuSelect { index: usize },
    /// An item dragged from one point of the dock and dropped at another.
    DragDrop {
        from_x: f64,
        from_y: f64,
        to_x: f64,
        to_y: f64,
    },
    Escape,
    Resize { width: f64, height: f64 },
    TransitionEnd,
    HideTimerFired { generation: u64 },
    ReclampTimerFired,
    PromptResolved {
        purpose: PromptPurpose,
        #[serde(default)]
        value: Option<String>,
    },
    ConfirmResolved { accepted: bool, intent: Intent },
    Push(PageMessage),
    /// Answer to an `Effect::RequestSnapshot`; `None` when the background
    /// did not answer.
    SnapshotArrived {
        #[serde(default)]
        data: Option<Snapshot>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptPurpose {
    Rename { id: String, current: String },
    Icon { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Fire-and-forget intent to the background.
    Send(Intent),
    /// Ask the background for the current snapshot; the answer comes back
    /// as `PageEvent::SnapshotArrived`.
    RequestSnapshot,
    ScheduleHide { generation: u64, delay_ms: u64 },
    CancelHide,
    ScheduleReclamp { delay_ms: u64 },
    OpenLink { url: String },
    Prompt {
        message: String,
        default: String,
        purpose: PromptPurpose,
    },
    Confirm { message: String, intent: Intent },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Idle,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Outside,
    Handler,
    Dock,
    Stack,
    Menu,
}

impl Region {
    fn is_overlay(self) -> bool {
        matches!(self, Region::Stack | Region::Menu)
    }
}

#[derive(Debug, Clone)]
struct OpenStack {
    parent_id: String,
    item: DockItem,
    rect: Rect,
}

#[derive(Debug, Clone)]
struct OpenMenu {
    item: DockItem,
    entries: Vec<MenuEntry>,
    rect: Rect,
}

pub struct DockController {
    settings: DockSettings,
    viewport: Viewport,
    snapshot: Option<Snapshot>,
    nodes: Vec<RenderedNode>,
    scales: Vec<f64>,
    layout: DockLayout,
    visibility: Visibility,
    idle: bool,
    pending_open: bool,
    hover: Region,
    stack: Option<OpenStack>,
    menu: Option<OpenMenu>,
    hide_generation: u64,
}

impl DockController {
    pub fn new(settings: DockSettings, viewport: Viewport) -> Self {
        let layout = DockLayout::compute(&[], &settings, viewport);
        Self {
            settings,
            viewport,
            snapshot: None,
            nodes: Vec::new(),
            scales: Vec::new(),
            layout,
            visibility: Visibility::Idle,
            idle: true,
            pending_open: false,
            hover: Region::Outside,
            stack: None,
            menu: None,
            hide_generation: 0,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_open(&self) -> bool {
        self.visibility == Visibility::Open
    }

    pub fn settings(&self) -> &DockSettings {
        &self.settings
    }

    pub fn layout(&self) -> &DockLayout {
        &self.layout
    }

    pub fn nodes(&self) -> &[RenderedNode] {
        &self.nodes
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn stack_parent(&self) -> Option<&str> {
        self.stack.as_ref().map(|s| s.parent_id.as_str())
    }

    pub fn menu_target(&self) -> Option<&str> {
        self.menu.as_ref().map(|m| m.item.id.as_str())
    }

    pub fn handle(&mut self, event: PageEvent) -> Vec<Effect> {
        match event {
            PageEvent::PointerMove { x, y } => self.on_pointer_move(Point::new(x, y)),
            PageEvent::PointerLeaveWindow => self.on_hover(Region::Outside, None),
            PageEvent::Click { x, y } => self.on_click(Point::new(x, y)),
            PageEvent::ContextMenu { x, y } => self.on_context_menu(Point::new(x, y)),
            PageEvent::MenuSelect { index } => self.select_menu(index),
            PageEvent::DragDrop {
                from_x,
                from_y,
                to_x,
                to_y,
            } => self.on_drag_drop(Point::new(from_x, from_y), Point::new(to_x, to_y)),
            PageEvent::Escape => self.close(),
            PageEvent::Resize { width, height } => {
                self.viewport = Viewport::new(width, height);
                self.relayout();
                Vec::new()
            }
            PageEvent::TransitionEnd | PageEvent::ReclampTimerFired => {
                self.relayout();
                Vec::new()
            }
            PageEvent::HideTimerFired { generation } => self.on_hide_timer(generation),
            PageEvent::PromptResolved { purpose, value } => on_prompt(purpose, value),
            PageEvent::ConfirmResolved { accepted, intent } => {
                if accepted {
                    vec![Effect::Send(intent)]
                } else {
                    Vec::new()
                }
            }
            PageEvent::Push(msg) => self.on_push(msg),
            PageEvent::SnapshotArrived { data } => self.on_snapshot(data),
        }
    }

    fn on_push(&mut self, msg: PageMessage) -> Vec<Effect> {
        match msg {
            PageMessage::RefreshDock { data } => {
                self.set_snapshot(data);
                vec![Effect::ScheduleReclamp {
                    delay_ms: RENDER_RECLAMP_MS,
                }]
            }
            PageMessage::ToggleDock { data } => {
                self.set_snapshot(data);
                if self.is_open() {
                    self.close()
                } else {
                    self.open()
                }
            }
            PageMessage::ApplySettings { settings } => {
                let moved = self.settings.layout_changed(&settings);
                self.settings = settings;
                if let Some(snapshot) = &self.snapshot {
                    self.nodes = render_snapshot(snapshot, &self.settings);
                }
                if moved {
                    debug!("Dock moved, closing overlays");
                    self.stack = None;
                    self.menu = None;
                }
                self.reset_scales();
                self.relayout();
                vec![Effect::ScheduleReclamp {
                    delay_ms: SETTINGS_RECLAMP_MS,
                }]
            }
        }
    }

    fn on_snapshot(&mut self, data: Option<Snapshot>) -> Vec<Effect> {
        let wanted_open = std::mem::take(&mut self.pending_open);
        let Some(data) = data else {
            debug!("No snapshot from the background, staying idle");
            return Vec::new();
        };
        self.set_snapshot(data);
        if wanted_open && !self.is_open() {
            self.show()
        } else {
            Vec::new()
        }
    }

    /// Replace the rendered items in place.  Visibility is untouched; open
    /// overlays follow their item or close when it is gone.
    fn set_snapshot(&mut self, data: Snapshot) {
        self.nodes = render_snapshot(&data, &self.settings);
        self.snapshot = Some(data);
        self.reset_scales();
        self.relayout();

        if let Some(menu) = self.menu.take() {
            if let Some(item) = self.find_item(&menu.item.id).cloned() {
                let entries = build_menu(&item, self.settings_icon_shown());
                self.menu = Some(OpenMenu {
                    item,
                    entries,
                    ..menu
                });
            }
        }
        if let Some(stack) = self.stack.take() {
            let still_folder = self
                .snapshot
                .as_deref()
                .and_then(|s| find_entry(s, &stack.parent_id))
                .is_some_and(|e| e.children.is_some());
            if still_folder {
                self.stack = self
                    .item_index(&stack.parent_id)
                    .and_then(|index| self.stack_for(index));
            }
        }
    }

    fn on_pointer_move(&mut self, p: Point) -> Vec<Effect> {
        let region = self.region_at(p);
        if !self.is_open() {
            self.hover = region;
            if region == Region::Handler || self.edge_triggered(p) {
                return self.open();
            }
            return Vec::new();
        }
        self.on_hover(region, Some(p))
    }

    fn on_hover(&mut self, region: Region, pointer: Option<Point>) -> Vec<Effect> {
        let prev = std::mem::replace(&mut self.hover, region);
        if !self.is_open() {
            return Vec::new();
        }
        let in_dock = |r: Region| matches!(r, Region::Dock | Region::Handler);
        let mut effects = Vec::new();

        if in_dock(region) {
            if !in_dock(prev) {
                self.idle = false;
                effects.push(self.cancel_hide());
            }
            if let Some(p) = pointer {
                self.magnify(p);
            }
        } else if in_dock(prev) {
            self.idle = true;
            self.reset_scales();
            effects.push(self.schedule_hide());
        }

        if region.is_overlay() && !prev.is_overlay() {
            effects.push(self.cancel_hide());
        } else if prev.is_overlay() && !region.is_overlay() && !in_dock(region) {
            effects.push(self.schedule_hide());
        }
        effects
    }

    fn on_click(&mut self, p: Point) -> Vec<Effect> {
        match self.region_at(p) {
            Region::Menu => {
                let index = self.menu.as_ref().and_then(|menu| {
                    menu_rows(menu.rect, &menu.entries)
                        .iter()
                        .position(|row| row.contains(p))
                });
                match index {
                    Some(index) => self.select_menu(index),
                    None => Vec::new(),
                }
            }
            Region::Stack => {
                self.menu = None;
                let url = self.stack.as_ref().and_then(|stack| {
                    let rows = stack_rows(stack.rect, stack.item.children.len());
                    let row = rows.iter().position(|r| r.contains(p))?;
                    stack.item.children.get(row)?.url.clone()
                });
                url.map(|url| vec![Effect::OpenLink { url }])
                    .unwrap_or_default()
            }
            Region::Handler if !self.is_open() => self.open(),
            Region::Handler | Region::Dock => {
                self.menu = None;
                match self.node_at(p) {
                    Some(index) => self.activate(index),
                    None => Vec::new(),
                }
            }
            Region::Outside => {
                self.menu = None;
                self.stack = None;
                if self.is_open() {
                    self.close()
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn activate(&mut self, index: usize) -> Vec<Effect> {
        let Some(item) = self.nodes.get(index).and_then(RenderedNode::as_item) else {
            return Vec::new();
        };
        match item.kind {
            ItemKind::Link => match item.url.clone().filter(|u| !u.is_empty()) {
                Some(url) => vec![Effect::OpenLink { url }],
                None => Vec::new(),
            },
            ItemKind::Folder => {
                let same = self.stack.as_ref().is_some_and(|s| s.parent_id == item.id);
                if same {
                    self.stack = None;
                    Vec::new()
                } else {
                    self.stack = self.stack_for(index);
                    vec![self.cancel_hide()]
                }
            }
            ItemKind::Settings => {
                let mut effects = vec![Effect::Send(Intent::OpenSettings)];
                effects.extend(self.close());
                effects
            }
        }
    }

    fn on_context_menu(&mut self, p: Point) -> Vec<Effect> {
        if !self.is_open() || !matches!(self.region_at(p), Region::Dock | Region::Handler) {
            return Vec::new();
        }
        let Some(item) = self
            .node_at(p)
            .and_then(|i| self.nodes.get(i))
            .and_then(RenderedNode::as_item)
            .cloned()
        else {
            return Vec::new();
        };
        let entries = build_menu(&item, self.settings_icon_shown());
        let rect = place_menu(p, menu_size(&entries), self.viewport);
        self.menu = Some(OpenMenu {
            item,
            entries,
            rect,
        });
        vec![self.cancel_hide()]
    }

    /// Whether the dock currently shows the settings item.  The last
    /// snapshot decides; the settings record only until one has arrived.
    fn settings_icon_shown(&self) -> bool {
        match &self.snapshot {
            Some(snapshot) => snapshot.iter().any(|e| e.is_settings_item()),
            None => self.settings.show_settings,
        }
    }

    fn select_menu(&mut self, index: usize) -> Vec<Effect> {
        let Some(menu) = self.menu.take() else {
            return Vec::new();
        };
        let Some(entry) = menu.entries.get(index) else {
            return Vec::new();
        };
        let item = menu.item;
        let url = item.url.clone().unwrap_or_default();
        let effect = match entry.action {
            MenuAction::AddCurrentPage => Effect::Send(Intent::AddCurrentTab),
            MenuAction::OpenSettings => Effect::Send(Intent::OpenSettings),
            MenuAction::OpenInNewWindow => Effect::Send(Intent::OpenNewWindow { url }),
            MenuAction::OpenInIncognito => Effect::Send(Intent::OpenIncognito { url }),
            MenuAction::EditName => Effect::Prompt {
                message: RENAME_PROMPT.to_string(),
                default: item.title.clone(),
                purpose: PromptPurpose::Rename {
                    id: item.id,
                    current: item.title,
                },
            },
            MenuAction::ChangeIcon => Effect::Prompt {
                message: ICON_PROMPT.to_string(),
                default: String::new(),
                purpose: PromptPurpose::Icon { id: item.id },
            },
            MenuAction::Remove => Effect::Confirm {
                message: delete_confirmation(&item.title),
                intent: Intent::DeleteBookmark { id: item.id },
            },
            MenuAction::ToggleSettingsIcon => Effect::Send(Intent::SetSetting {
                key: KEY_SHOW_SETTINGS.to_string(),
                value: serde_json::Value::Bool(!self.settings_icon_shown()),
            }),
        };
        vec![effect]
    }

    /// Reorder inside the dock folder.  The index sent is the insertion point
    /// counted before the dragged item is taken out.
    fn on_drag_drop(&mut self, from: Point, to: Point) -> Vec<Effect> {
        if !self.is_open() {
            return Vec::new();
        }
        let Some(source) = self.node_at(from) else {
            return Vec::new();
        };
        let Some(item) = self.nodes[source].as_item() else {
            return Vec::new();
        };
        if item.kind == ItemKind::Settings {
            return Vec::new();
        }
        let real = self
            .snapshot
            .as_deref()
            .map(|s| s.iter().filter(|e| !e.is_synthetic()).count())
            .unwrap_or(0)
            .min(self.layout.slots.len());
        let vertical = self.layout.is_vertical();
        let axis = if vertical { to.y } else { to.x };
        let target = self.layout.slots[..real]
            .iter()
            .position(|slot| {
                let c = slot.center();
                axis < if vertical { c.y } else { c.x }
            })
            .unwrap_or(real);
        if target == source || target == source + 1 {
            return Vec::new();
        }
        vec![Effect::Send(Intent::MoveBookmark {
            id: item.id.clone(),
            parent_id: None,
            index: target as u32,
        })]
    }

    fn on_hide_timer(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.hide_generation || !self.is_open() {
            return Vec::new();
        }
        if self.stack.is_some() || self.menu.is_some() {
            return Vec::new();
        }
        self.close()
    }

    /// Open now if items are cached, otherwise fetch them first.
    fn open(&mut self) -> Vec<Effect> {
        let mut effects = vec![self.cancel_hide()];
        if self.is_open() {
            return effects;
        }
        let has_items = self.nodes.iter().any(|n| n.as_item().is_some());
        if has_items {
            effects.extend(self.show());
        } else if !self.pending_open {
            self.pending_open = true;
            effects.push(Effect::RequestSnapshot);
        }
        effects
    }

    fn show(&mut self) -> Vec<Effect> {
        self.visibility = Visibility::Open;
        self.idle = !matches!(self.hover, Region::Dock | Region::Handler);
        self.relayout();
        vec![Effect::ScheduleReclamp {
            delay_ms: RENDER_RECLAMP_MS,
        }]
    }

    fn close(&mut self) -> Vec<Effect> {
        self.visibility = Visibility::Idle;
        self.stack = None;
        self.menu = None;
        self.idle = true;
        self.reset_scales();
        vec![self.cancel_hide()]
    }

    fn schedule_hide(&mut self) -> Effect {
        self.hide_generation += 1;
        Effect::ScheduleHide {
            generation: self.hide_generation,
            delay_ms: HIDE_DELAY_MS,
        }
    }

    fn cancel_hide(&mut self) -> Effect {
        self.hide_generation += 1;
        Effect::CancelHide
    }

    fn relayout(&mut self) {
        self.layout = DockLayout::compute(&self.nodes, &self.settings, self.viewport);
        if self.scales.len() != self.nodes.len() {
            self.reset_scales();
        }
        if let Some(stack) = &self.stack {
            let rect = place_stack(
                self.anchor_of(&stack.parent_id).unwrap_or(stack.rect),
                stack_size(&stack.item.children),
                self.viewport,
                self.settings.dock_position,
            );
            if let Some(stack) = self.stack.as_mut() {
                stack.rect = rect;
            }
        }
    }

    fn reset_scales(&mut self) {
        self.scales = vec![1.0; self.nodes.len()];
    }

    fn magnify(&mut self, p: Point) {
        let vertical = self.layout.is_vertical();
        let axis = if vertical { p.y } else { p.x };
        self.scales = self
            .nodes
            .iter()
            .zip(&self.layout.slots)
            .map(|(node, slot)| {
                if node.as_item().is_none() {
                    return 1.0;
                }
                let center = if vertical { slot.center().y } else { slot.center().x };
                fisheye_scale(axis - center)
            })
            .collect();
    }

    fn stack_for(&self, index: usize) -> Option<OpenStack> {
        let item = self.nodes.get(index)?.as_item()?.clone();
        let anchor = *self.layout.slots.get(index)?;
        let rect = place_stack(
            anchor,
            stack_size(&item.children),
            self.viewport,
            self.settings.dock_position,
        );
        Some(OpenStack {
            parent_id: item.id.clone(),
            item,
            rect,
        })
    }

    fn region_at(&self, p: Point) -> Region {
        if self.menu.as_ref().is_some_and(|m| m.rect.contains(p)) {
            return Region::Menu;
        }
        if self.stack.as_ref().is_some_and(|s| s.rect.contains(p)) {
            return Region::Stack;
        }
        if self.is_open() && self.layout.container.contains(p) {
            return Region::Dock;
        }
        if self.layout.handler.contains(p) {
            return Region::Handler;
        }
        Region::Outside
    }

    fn edge_triggered(&self, p: Point) -> bool {
        if !self.settings.edge_trigger {
            return false;
        }
        let vp = self.viewport;
        let d = EDGE_TRIGGER_DISTANCE;
        match self.settings.dock_position {
            DockPosition::Left => p.x <= d,
            DockPosition::Right => p.x >= vp.width - d,
            DockPosition::Top => p.y <= d,
            DockPosition::Bottom => p.y >= vp.height - d,
        }
    }

    /// Index of the item node under `p`, using the magnified rectangles.
    fn node_at(&self, p: Point) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.as_item().is_some())
            .find(|(i, _)| self.placed_rect(*i).contains(p))
            .map(|(i, _)| i)
    }

    fn placed_rect(&self, index: usize) -> Rect {
        let slot = self.layout.slots.get(index).copied().unwrap_or_default();
        slot.scaled(self.scales.get(index).copied().unwrap_or(1.0))
    }

    fn item_index(&self, id: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.as_item().is_some_and(|item| item.id == id))
    }

    fn find_item(&self, id: &str) -> Option<&DockItem> {
        self.item_index(id).and_then(|i| self.nodes[i].as_item())
    }

    fn anchor_of(&self, id: &str) -> Option<Rect> {
        self.item_index(id)
            .and_then(|i| self.layout.slots.get(i).copied())
    }

    pub fn view(&self) -> DockView {
        DockView {
            visible: self.is_open(),
            idle: self.idle,
            loading: self.pending_open,
            style: style_tokens(&self.settings),
            handler: HandlerView {
                rect: self.layout.handler,
                icon: handler_icon(&self.settings),
            },
            container: self.layout.container,
            nodes: self
                .nodes
                .iter()
                .enumerate()
                .map(|(i, node)| PlacedNode {
                    node: node.clone(),
                    rect: self.placed_rect(i),
                    scale: self.scales.get(i).copied().unwrap_or(1.0),
                })
                .collect(),
            stack: self.stack.as_ref().map(|stack| StackView {
                parent_id: stack.parent_id.clone(),
                rect: stack.rect,
                entries: stack.item.children.clone(),
                empty_text: stack
                    .item
                    .children
                    .is_empty()
                    .then(|| EMPTY_FOLDER_TEXT.to_string()),
            }),
            menu: self.menu.as_ref().map(|menu| MenuView {
                target_id: menu.item.id.clone(),
                rect: menu.rect,
                entries: menu.entries.clone(),
            }),
        }
    }
}

fn on_prompt(purpose: PromptPurpose, value: Option<String>) -> Vec<Effect> {
    // A dismissed prompt (no value) does nothing.
    let Some(value) = value else {
        return Vec::new();
    };
    match purpose {
        PromptPurpose::Rename { id, current } => {
            let title = value.trim();
            if title.is_empty() || title == current {
                return Vec::new();
            }
            vec![Effect::Send(Intent::RenameBookmark {
                id,
                title: title.to_string(),
            })]
        }
        PromptPurpose::Icon { id } => {
            let url = value.trim();
            vec![Effect::Send(Intent::UpdateIcon {
                id,
                url: (!url.is_empty()).then(|| url.to_string()),
            })]
        }
    }
}
