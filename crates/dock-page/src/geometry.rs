//! Pure viewport geometry: magnification falloff, edge clamping, and overlay
//! placement.  All coordinates are CSS pixels relative to the viewport.

use std::f64::consts::FRAC_PI_2;

use dock_proto::settings::DockPosition;
use serde::{Deserialize, Serialize};

/// Scale of an item right under the pointer.
pub const MAX_SCALE: f64 = 1.8;
/// Distance along the dock axis beyond which items stay at rest size.
pub const INFLUENCE_RADIUS: f64 = 150.0;
/// Minimum gap kept between the dock (or an overlay) and the viewport edge.
pub const VIEWPORT_PADDING: f64 = 10.0;
/// Gap between a folder item and its stack.
pub const STACK_GAP: f64 = 15.0;
/// A stack never grows taller than the viewport minus this.
pub const STACK_VIEWPORT_MARGIN: f64 = 40.0;
/// Offset of the context menu from the cursor.
pub const MENU_OFFSET: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.top() && p.y <= self.bottom()
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Same center, both sides multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let c = self.center();
        let (w, h) = (self.width * factor, self.height * factor);
        Self::new(c.x - w / 2.0, c.y - h / 2.0, w, h)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Length along the dock's primary axis.
    pub fn extent(&self, vertical: bool) -> f64 {
        if vertical {
            self.height
        } else {
            self.width
        }
    }
}

/// Magnification for an item whose center is `distance` away from the pointer
/// along the dock axis: `MAX_SCALE` at 0, sine-eased down to exactly 1.0 at
/// `INFLUENCE_RADIUS`, 1.0 beyond.
pub fn fisheye_scale(distance: f64) -> f64 {
    let d = distance.abs();
    if !d.is_finite() || d >= INFLUENCE_RADIUS {
        return 1.0;
    }
    let t = 1.0 - d / INFLUENCE_RADIUS;
    1.0 + (MAX_SCALE - 1.0) * (t * FRAC_PI_2).sin()
}

/// Shift that brings the span `[start, end]` inside `[padding, extent - padding]`.
///
/// The far edge is checked first; a span longer than the viewport ends up
/// aligned to the far padding.
pub fn clamp_shift(start: f64, end: f64, extent: f64, padding: f64) -> f64 {
    if end > extent - padding {
        -(end - (extent - padding))
    } else if start < padding {
        padding - start
    } else {
        0.0
    }
}

/// Height limit of a folder stack.
pub fn stack_max_height(viewport: Viewport) -> f64 {
    (viewport.height - STACK_VIEWPORT_MARGIN).max(0.0)
}

/// Place a folder stack next to `anchor`, on the side away from the dock's
/// screen edge, centered on the anchor and kept inside the viewport.
pub fn place_stack(anchor: Rect, stack: Size, viewport: Viewport, position: DockPosition) -> Rect {
    let height = stack.height.min(stack_max_height(viewport));
    if position.is_vertical() {
        let mut top = anchor.center().y - height / 2.0;
        if top < VIEWPORT_PADDING {
            top = VIEWPORT_PADDING;
        }
        if top + height > viewport.height - VIEWPORT_PADDING {
            top = viewport.height - height - VIEWPORT_PADDING;
        }
        let left = match position {
            DockPosition::Right => anchor.left() - stack.width - STACK_GAP,
            _ => anchor.right() + STACK_GAP,
        };
        Rect::new(left, top, stack.width, height)
    } else {
        let mut left = anchor.center().x - stack.width / 2.0;
        if left < VIEWPORT_PADDING {
            left = VIEWPORT_PADDING;
        }
        if left + stack.width > viewport.width - VIEWPORT_PADDING {
            left = viewport.width - stack.width - VIEWPORT_PADDING;
        }
        let top = match position {
            DockPosition::Bottom => anchor.top() - height - STACK_GAP,
            _ => anchor.bottom() + STACK_GAP,
        };
        Rect::new(left, top, stack.width, height)
    }
}

/// Place a context menu just below-right of the cursor, flipping to the other
/// side of the cursor on overflow.
pub fn place_menu(cursor: Point, menu: Size, viewport: Viewport) -> Rect {
    let mut x = cursor.x + MENU_OFFSET;
    let mut y = cursor.y + MENU_OFFSET;
    if y + menu.height > viewport.height {
        y = cursor.y - menu.height - MENU_OFFSET;
    }
    if x + menu.width > viewport.width {
        x = cursor.x - menu.width - MENU_OFFSET;
    }
    Rect::new(x.max(MENU_OFFSET), y.max(MENU_OFFSET), menu.width, menu.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_fisheye_bounds() {
        assert!(close(fisheye_scale(0.0), MAX_SCALE));
        assert!(close(fisheye_scale(INFLUENCE_RADIUS), 1.0));
        assert!(close(fisheye_scale(INFLUENCE_RADIUS + 40.0), 1.0));
        assert!(close(fisheye_scale(-30.0), fisheye_scale(30.0)));
        assert!(close(fisheye_scale(f64::NAN), 1.0));
    }

    #[test]
    fn test_fisheye_is_monotonic() {
        let mut last = fisheye_scale(0.0);
        for d in 1..=150 {
            let s = fisheye_scale(d as f64);
            assert!(s <= last);
            last = s;
        }
    }

    #[test]
    fn test_clamp_lands_on_padding() {
        // Overflowing the far edge by 30px.
        let shift = clamp_shift(500.0, 830.0, 800.0, VIEWPORT_PADDING);
        assert!(close(shift, -40.0));
        assert!(close(830.0 + shift, 800.0 - VIEWPORT_PADDING));

        // Underflowing the near edge.
        let shift = clamp_shift(-25.0, 100.0, 800.0, VIEWPORT_PADDING);
        assert!(close(-25.0 + shift, VIEWPORT_PADDING));

        assert_eq!(clamp_shift(20.0, 700.0, 800.0, VIEWPORT_PADDING), 0.0);
    }

    #[test]
    fn test_stack_opens_away_from_edge() {
        let vp = Viewport::new(1000.0, 600.0);
        let anchor = Rect::new(0.0, 100.0, 48.0, 48.0);
        let size = Size::new(200.0, 300.0);

        let left = place_stack(anchor, size, vp, DockPosition::Left);
        assert!(close(left.left(), 48.0 + STACK_GAP));
        // Centered would start at -26; clamped to the padding.
        assert!(close(left.top(), VIEWPORT_PADDING));

        let anchor = Rect::new(952.0, 276.0, 48.0, 48.0);
        let right = place_stack(anchor, size, vp, DockPosition::Right);
        assert!(close(right.right(), 952.0 - STACK_GAP));
        assert!(close(right.center().y, anchor.center().y));
    }

    #[test]
    fn test_stack_height_is_capped() {
        let vp = Viewport::new(1000.0, 300.0);
        let rect = place_stack(
            Rect::new(500.0, 252.0, 48.0, 48.0),
            Size::new(200.0, 900.0),
            vp,
            DockPosition::Bottom,
        );
        assert!(close(rect.height, 260.0));
        assert!(close(rect.bottom(), 252.0 - STACK_GAP));
    }

    #[test]
    fn test_menu_flips_on_overflow() {
        let vp = Viewport::new(800.0, 600.0);
        let size = Size::new(200.0, 150.0);

        let r = place_menu(Point::new(100.0, 100.0), size, vp);
        assert_eq!((r.x, r.y), (105.0, 105.0));

        let r = place_menu(Point::new(700.0, 550.0), size, vp);
        assert_eq!((r.x, r.y), (495.0, 395.0));

        let r = place_menu(Point::new(2.0, 100.0), Size::new(200.0, 700.0), vp);
        assert_eq!(r.y, MENU_OFFSET);
    }
}
