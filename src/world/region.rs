use crate::geometry::rect::Rect;

/// Index of a region within its map plane's active region list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub u32);

/// Named area of a map plane, covered by one or more rectangles.
/// Higher priority wins where regions overlap.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub priority: u8,
    pub rects: Vec<Rect>,
}

impl Region {
    pub fn new(name: impl Into<String>, priority: u8, rects: Vec<Rect>) -> Self {
        Self {
            name: name.into(),
            priority,
            rects,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|rect| rect.contains(x, y))
    }
}

/// One region rectangle as distributed into a sector's lookup list.
#[derive(Debug, Clone, Copy)]
pub struct RegionRect {
    pub region: RegionId,
    pub priority: u8,
    pub rect: Rect,
}
