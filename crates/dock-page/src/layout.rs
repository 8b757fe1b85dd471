use dock_proto::settings::{DockPosition, DockSettings};
use serde::Serialize;

use crate::geometry::{clamp_shift, Rect, Size, Viewport, VIEWPORT_PADDING};
use crate::menu::MenuEntry;
use crate::view::{RenderedNode, StackEntry};

pub const ITEM_GAP: f64 = 8.0;
pub const DOCK_PADDING: f64 = 8.0;
pub const SPACER_EXTENT: f64 = 12.0;
pub const HEADER_EXTENT: f64 = 22.0;
pub const HANDLER_LENGTH: f64 = 60.0;
pub const HANDLER_THICKNESS: f64 = 12.0;

pub const STACK_WIDTH: f64 = 220.0;
pub const STACK_ROW_HEIGHT: f64 = 36.0;
pub const STACK_PADDING: f64 = 8.0;
pub const MENU_WIDTH: f64 = 200.0;
pub const MENU_ROW_HEIGHT: f64 = 28.0;
pub const MENU_SEPARATOR_HEIGHT: f64 = 9.0;
pub const MENU_PADDING: f64 = 4.0;

/// Rest geometry of the dock for one set of nodes, settings and viewport.
///
/// The container is centered on the user's offset along the primary axis and
/// then nudged back inside the viewport; the handler keeps the un-nudged
/// anchor so it does not jump when the dock grows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DockLayout {
    pub position: DockPosition,
    pub container: Rect,
    pub shift: f64,
    pub handler: Rect,
    pub slots: Vec<Rect>,
}

impl DockLayout {
    pub fn compute(nodes: &[RenderedNode], settings: &DockSettings, viewport: Viewport) -> Self {
        let position = settings.dock_position;
        let vertical = position.is_vertical();
        let icon = settings.dock_size as f64;

        let extents: Vec<f64> = nodes
            .iter()
            .map(|node| match node {
                RenderedNode::Spacer => SPACER_EXTENT,
                RenderedNode::Header { .. } => HEADER_EXTENT,
                RenderedNode::Item(_) => icon,
            })
            .collect();
        let gaps = ITEM_GAP * extents.len().saturating_sub(1) as f64;
        let main = 2.0 * DOCK_PADDING + extents.iter().sum::<f64>() + gaps;
        let cross = icon + 2.0 * DOCK_PADDING;

        let extent = viewport.extent(vertical);
        let anchor = extent * settings.vertical_pos / 100.0;
        let start = anchor - main / 2.0;
        let shift = clamp_shift(start, start + main, extent, VIEWPORT_PADDING);

        let (container, handler) = match position {
            DockPosition::Left => (
                Rect::new(0.0, start + shift, cross, main),
                Rect::new(0.0, anchor - HANDLER_LENGTH / 2.0, HANDLER_THICKNESS, HANDLER_LENGTH),
            ),
            DockPosition::Right => (
                Rect::new(viewport.width - cross, start + shift, cross, main),
                Rect::new(
                    viewport.width - HANDLER_THICKNESS,
                    anchor - HANDLER_LENGTH / 2.0,
                    HANDLER_THICKNESS,
                    HANDLER_LENGTH,
                ),
            ),
            DockPosition::Top => (
                Rect::new(start + shift, 0.0, main, cross),
                Rect::new(anchor - HANDLER_LENGTH / 2.0, 0.0, HANDLER_LENGTH, HANDLER_THICKNESS),
            ),
            DockPosition::Bottom => (
                Rect::new(start + shift, viewport.height - cross, main, cross),
                Rect::new(
                    anchor - HANDLER_LENGTH / 2.0,
                    viewport.height - HANDLER_THICKNESS,
                    HANDLER_LENGTH,
                    HANDLER_THICKNESS,
                ),
            ),
        };

        let mut cursor = DOCK_PADDING + if vertical { container.y } else { container.x };
        let slots = extents
            .iter()
            .map(|len| {
                let slot = if vertical {
                    Rect::new(container.x + DOCK_PADDING, cursor, icon, *len)
                } else {
                    Rect::new(cursor, container.y + DOCK_PADDING, *len, icon)
                };
                cursor += len + ITEM_GAP;
                slot
            })
            .collect();

        Self {
            position,
            container,
            shift,
            handler,
            slots,
        }
    }

    pub fn is_vertical(&self) -> bool {
        self.position.is_vertical()
    }

    /// Offset applied to the handler so it stays at the user's anchor.
    pub fn handler_offset(&self) -> f64 {
        -self.shift
    }
}

pub fn stack_size(entries: &[StackEntry]) -> Size {
    let rows = entries.len().max(1) as f64;
    Size::new(STACK_WIDTH, 2.0 * STACK_PADDING + rows * STACK_ROW_HEIGHT)
}

pub fn menu_size(entries: &[MenuEntry]) -> Size {
    let separators = entries.iter().filter(|e| e.separator_before).count() as f64;
    let height = 2.0 * MENU_PADDING
        + entries.len() as f64 * MENU_ROW_HEIGHT
        + separators * MENU_SEPARATOR_HEIGHT;
    Size::new(MENU_WIDTH, height)
}

/// Row rectangles of a menu drawn at `rect`, one per entry.
pub fn menu_rows(rect: Rect, entries: &[MenuEntry]) -> Vec<Rect> {
    let mut y = rect.y + MENU_PADDING;
    entries
        .iter()
        .map(|entry| {
            if entry.separator_before {
                y += MENU_SEPARATOR_HEIGHT;
            }
            let row = Rect::new(rect.x, y, rect.width, MENU_ROW_HEIGHT);
            y += MENU_ROW_HEIGHT;
            row
        })
        .collect()
}

/// Row rectangles of a stack drawn at `rect`.  Rows past the visible height
/// are scrolled out and get no rectangle.
pub fn stack_rows(rect: Rect, count: usize) -> Vec<Rect> {
    (0..count)
        .map(|i| {
            Rect::new(
                rect.x,
                rect.y + STACK_PADDING + i as f64 * STACK_ROW_HEIGHT,
                rect.width,
                STACK_ROW_HEIGHT,
            )
        })
        .take_while(|row| row.bottom() <= rect.bottom())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{DockItem, IconView, ItemKind};

    fn items(n: usize) -> Vec<RenderedNode> {
        (0..n)
            .map(|i| {
                RenderedNode::Item(DockItem {
                    id: i.to_string(),
                    title: format!("Item {}", i),
                    url: Some("https://example.com/".into()),
                    kind: ItemKind::Link,
                    icon: IconView::new(""),
                    tooltip: None,
                    children: Vec::new(),
                })
            })
            .collect()
    }

    #[test]
    fn test_centered_on_offset() {
        let layout = DockLayout::compute(&items(3), &DockSettings::default(), Viewport::new(1000.0, 800.0));
        // 3 * 48 + 2 * 8 gaps + 2 * 8 padding
        assert_eq!(layout.container.height, 176.0);
        assert_eq!(layout.container.center().y, 400.0);
        assert_eq!(layout.shift, 0.0);
        assert_eq!(layout.slots.len(), 3);
        assert_eq!(layout.slots[0].y, layout.container.y + DOCK_PADDING);
        assert_eq!(layout.handler.center().y, 400.0);
    }

    #[test]
    fn test_nudged_inside_viewport() {
        let settings = DockSettings {
            vertical_pos: 95.0,
            ..DockSettings::default()
        };
        let vp = Viewport::new(1000.0, 800.0);
        let layout = DockLayout::compute(&items(5), &settings, vp);
        assert_eq!(layout.container.bottom(), vp.height - VIEWPORT_PADDING);
        assert!(layout.shift < 0.0);
        // The handler stays where the user put it.
        assert_eq!(layout.handler.center().y, 760.0);
        assert_eq!(layout.handler_offset(), -layout.shift);
    }

    #[test]
    fn test_bottom_dock_runs_horizontally() {
        let settings = DockSettings {
            dock_position: DockPosition::Bottom,
            ..DockSettings::default()
        };
        let vp = Viewport::new(1000.0, 800.0);
        let layout = DockLayout::compute(&items(2), &settings, vp);
        assert_eq!(layout.container.bottom(), 800.0);
        assert_eq!(layout.container.center().x, 500.0);
        assert!(layout.slots[1].x > layout.slots[0].right());
        assert_eq!(layout.handler.bottom(), 800.0);
    }

    #[test]
    fn test_stack_rows_respect_height() {
        let rect = Rect::new(0.0, 0.0, STACK_WIDTH, 2.0 * STACK_PADDING + 2.0 * STACK_ROW_HEIGHT);
        assert_eq!(stack_rows(rect, 5).len(), 2);
        assert_eq!(stack_rows(rect, 1).len(), 1);
    }
}
