//! Rectangles in logical pixels.

use serde::{Deserialize, Serialize};

use crate::constants::HIDDEN_VIEW_ORIGIN;

/// Signed origin with unsigned size. Window bounds are in screen space, view
/// bounds are relative to their parent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Off-canvas 1x1 rectangle used to hide a view without detaching it.
    pub const fn hidden() -> Self {
        Self::new(HIDDEN_VIEW_ORIGIN, HIDDEN_VIEW_ORIGIN, 1, 1)
    }

    pub fn is_hidden(&self) -> bool {
        self.x <= HIDDEN_VIEW_ORIGIN && self.y <= HIDDEN_VIEW_ORIGIN
    }

    /// Bounds at the origin with the same size, i.e. "fill the parent".
    pub fn local(&self) -> Self {
        Self::new(0, 0, self.width, self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width as i32)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height as i32)
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Squared distance from `p` to the nearest point of this rectangle.
    pub fn distance_sq(&self, p: Point) -> i64 {
        let cx = (p.x as i64).clamp(self.x as i64, self.right() as i64);
        let cy = (p.y as i64).clamp(self.y as i64, self.bottom() as i64);
        let dx = p.x as i64 - cx;
        let dy = p.y as i64 - cy;
        dx * dx + dy * dy
    }

    /// Center a rectangle of `size` inside `self`. The size is not clamped.
    pub fn center_rect(&self, size: Size) -> Bounds {
        let x = self.x + (self.width as i32 - size.width as i32) / 2;
        let y = self.y + (self.height as i32 - size.height as i32) / 2;
        Bounds::new(x, y, size.width, size.height)
    }

    /// Shrink `rect` to fit inside `self` and move it so no edge escapes.
    pub fn clamp_rect(&self, rect: Bounds) -> Bounds {
        let width = rect.width.min(self.width);
        let height = rect.height.min(self.height);
        let max_x = self.right() - width as i32;
        let max_y = self.bottom() - height as i32;
        Bounds::new(
            rect.x.clamp(self.x, max_x),
            rect.y.clamp(self.y, max_y),
            width,
            height,
        )
    }

    pub fn with_position(&self, p: Point) -> Bounds {
        Bounds::new(p.x, p.y, self.width, self.height)
    }

    pub fn apply(&self, patch: &BoundsPatch) -> Bounds {
        Bounds::new(
            patch.x.unwrap_or(self.x),
            patch.y.unwrap_or(self.y),
            patch.width.unwrap_or(self.width),
            patch.height.unwrap_or(self.height),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Component-wise maximum.
    pub fn max(self, other: Size) -> Size {
        Size::new(self.width.max(other.width), self.height.max(other.height))
    }
}

/// Partial bounds update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundsPatch {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl BoundsPatch {
    pub fn height(height: u32) -> Self {
        Self {
            height: Some(height),
            ..Self::default()
        }
    }
}

impl From<Bounds> for BoundsPatch {
    fn from(b: Bounds) -> Self {
        Self {
            x: Some(b.x),
            y: Some(b.y),
            width: Some(b.width),
            height: Some(b.height),
        }
    }
}

/// A physical monitor as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    pub id: u32,
    pub bounds: Bounds,
    /// Bounds minus taskbars and docks.
    pub work_area: Bounds,
    pub primary: bool,
}

impl Display {
    pub fn primary(displays: &[Display]) -> Option<&Display> {
        displays
            .iter()
            .find(|d| d.primary)
            .or_else(|| displays.first())
    }

    /// The display containing `p`, or the closest one when `p` is between
    /// monitors.
    pub fn nearest(displays: &[Display], p: Point) -> Option<&Display> {
        displays
            .iter()
            .find(|d| d.bounds.contains(p))
            .or_else(|| displays.iter().min_by_key(|d| d.bounds.distance_sq(p)))
    }

    /// Left edge of the whole virtual desktop.
    pub fn leftmost_edge(displays: &[Display]) -> i32 {
        displays.iter().map(|d| d.bounds.x).min().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(id: u32, x: i32, primary: bool) -> Display {
        let bounds = Bounds::new(x, 0, 1920, 1080);
        Display {
            id,
            bounds,
            work_area: Bounds::new(x, 0, 1920, 1040),
            primary,
        }
    }

    #[test]
    fn clamp_rect_shrinks_and_moves_inside() {
        let area = Bounds::new(0, 0, 1000, 800);
        assert_eq!(
            area.clamp_rect(Bounds::new(900, -20, 400, 300)),
            Bounds::new(600, 0, 400, 300)
        );
        assert_eq!(
            area.clamp_rect(Bounds::new(10, 10, 2000, 2000)),
            Bounds::new(0, 0, 1000, 800)
        );
    }

    #[test]
    fn center_rect_centers() {
        let area = Bounds::new(100, 0, 1000, 800);
        assert_eq!(
            area.center_rect(Size::new(400, 200)),
            Bounds::new(400, 300, 400, 200)
        );
    }

    #[test]
    fn nearest_display_prefers_containing_then_closest() {
        let displays = [display(1, 0, true), display(2, 1920, false)];
        assert_eq!(
            Display::nearest(&displays, Point::new(2000, 10)).map(|d| d.id),
            Some(2)
        );
        assert_eq!(
            Display::nearest(&displays, Point::new(5000, 500)).map(|d| d.id),
            Some(2)
        );
        assert_eq!(
            Display::nearest(&displays, Point::new(-300, 500)).map(|d| d.id),
            Some(1)
        );
    }

    #[test]
    fn hidden_bounds_are_recognized() {
        assert!(Bounds::hidden().is_hidden());
        assert!(!Bounds::new(0, 0, 10, 10).is_hidden());
    }

    #[test]
    fn patch_keeps_unset_fields() {
        let b = Bounds::new(1, 2, 3, 4);
        assert_eq!(b.apply(&BoundsPatch::height(40)), Bounds::new(1, 2, 3, 40));
    }
}
