use crate::geometry::position::Point2;

/// Axis-aligned inclusive rectangle.
///
/// Rectangles are plain values and are never clamped to map bounds at
/// construction; sector lookups clamp at query time instead, so a view
/// rectangle around an object near the world edge keeps its true extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    /// Build from two opposite corners in any order.
    pub fn from_corners(a: Point2, b: Point2) -> Self {
        let (min_x, max_x) = if a.x <= b.x { (a.x, b.x) } else { (b.x, a.x) };
        let (min_y, max_y) = if a.y <= b.y { (a.y, b.y) } else { (b.y, a.y) };
        Self { min_x, min_y, max_x, max_y }
    }

    /// Square of the given Chebyshev radius around a center point.
    pub fn around(center: Point2, radius: i32) -> Self {
        Self {
            min_x: center.x - radius,
            min_y: center.y - radius,
            max_x: center.x + radius,
            max_y: center.y + radius,
        }
    }

    /// Origin corner plus width and height in tiles (both at least 1).
    pub fn with_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x + width.max(1) - 1,
            max_y: y + height.max(1) - 1,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn contains_point(&self, point: Point2) -> bool {
        self.contains(point.x, point.y)
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Overlap of two rectangles, `None` when they are disjoint.
    pub fn intersect(a: &Rect, b: &Rect) -> Option<Rect> {
        if !a.intersects(b) {
            return None;
        }
        Some(Rect {
            min_x: a.min_x.max(b.min_x),
            min_y: a.min_y.max(b.min_y),
            max_x: a.max_x.min(b.max_x),
            max_y: a.max_y.min(b.max_y),
        })
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y + 1
    }

    pub fn tile_count(&self) -> i64 {
        i64::from(self.width()) * i64::from(self.height())
    }
}
