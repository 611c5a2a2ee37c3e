//! Integer and float geometry shared by every component.
//!
//! Screen-space values are DIPs; host-space values are physical pixels.

use serde::{Deserialize, Serialize};

/// A point in integer coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by the given delta.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Squared distance to another point.
    pub fn distance_squared(self, other: Point) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }
}

/// A point in sub-pixel coordinates, used while transforming input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Round toward negative infinity on both axes.
    pub fn floor(self) -> Point {
        Point::new(self.x.floor() as i32, self.y.floor() as i32)
    }
}

impl From<Point> for PointF {
    fn from(p: Point) -> Self {
        Self::new(p.x as f32, p.y as f32)
    }
}

/// A width/height pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Swap width and height.
    pub fn transpose(self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// A rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Create a rectangle from an origin and a size.
    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    /// Check if this rectangle intersects with another.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Get the right edge x-coordinate.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Get the bottom edge y-coordinate.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Check whether a point lies inside. The right and bottom edges are exclusive.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Center point, rounded toward the origin.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Nearest point inside the rectangle.
    pub fn clamp_point(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.x, (self.right() - 1).max(self.x)),
            p.y.clamp(self.y, (self.bottom() - 1).max(self.y)),
        )
    }

    /// Shrink by the given insets. Never produces a negative size.
    pub fn inset(&self, insets: Insets) -> Rect {
        Rect::new(
            self.x + insets.left,
            self.y + insets.top,
            (self.width - insets.width()).max(0),
            (self.height - insets.height()).max(0),
        )
    }

    /// Translate by the given delta.
    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Margins on the four edges of a rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Insets {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

impl Insets {
    pub const fn new(top: i32, left: i32, bottom: i32, right: i32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// The same inset on every edge.
    pub const fn uniform(v: i32) -> Self {
        Self::new(v, v, v, v)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn width(&self) -> i32 {
        self.left + self.right
    }

    pub fn height(&self) -> i32 {
        self.top + self.bottom
    }

    /// Scale every edge, rounding to the nearest pixel.
    pub fn scale(&self, factor: f32) -> Insets {
        let s = |v: i32| (v as f32 * factor).round() as i32;
        Insets::new(s(self.top), s(self.left), s(self.bottom), s(self.right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains_is_half_open() {
        let r = Rect::new(0, 0, 100, 50);
        assert!(r.contains(Point::new(0, 0)));
        assert!(r.contains(Point::new(99, 49)));
        assert!(!r.contains(Point::new(100, 10)));
        assert!(!r.contains(Point::new(10, 50)));
    }

    #[test]
    fn test_rect_clamp_point() {
        let r = Rect::new(500, 0, 400, 400);
        assert_eq!(r.clamp_point(Point::new(0, 0)), Point::new(500, 0));
        assert_eq!(r.clamp_point(Point::new(1000, 500)), Point::new(899, 399));
        assert_eq!(r.clamp_point(Point::new(600, 10)), Point::new(600, 10));
    }

    #[test]
    fn test_rect_inset() {
        let r = Rect::new(500, 0, 400, 400);
        assert_eq!(r.inset(Insets::uniform(5)), Rect::new(505, 5, 390, 390));
        assert_eq!(r.inset(Insets::uniform(300)).size(), Size::new(0, 0));
    }

    #[test]
    fn test_rect_display_format() {
        assert_eq!(Rect::new(-200, -50, 200, 200).to_string(), "-200,-50 200x200");
    }

    #[test]
    fn test_insets_scale() {
        let insets = Insets::new(10, 15, 20, 25);
        assert_eq!(insets.scale(2.0), Insets::new(20, 30, 40, 50));
        assert_eq!(insets.width(), 40);
        assert_eq!(insets.height(), 30);
    }

    #[test]
    fn test_point_floor_handles_negatives() {
        assert_eq!(PointF::new(-0.5, 1.5).floor(), Point::new(-1, 1));
    }

    #[test]
    fn test_rect_intersects() {
        let a = Rect::new(0, 0, 100, 100);
        assert!(a.intersects(&Rect::new(50, 50, 100, 100)));
        assert!(!a.intersects(&Rect::new(100, 0, 100, 100)));
    }
}
