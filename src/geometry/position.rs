#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point2 {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point3 {
    pub x: i32,
    pub y: i32,
    pub z: i8,
}

/// Full world coordinate: a point on one of the stacked map planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapPos {
    pub x: i32,
    pub y: i32,
    pub z: i8,
    pub plane: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub dx: i32,
    pub dy: i32,
    pub dz: i8,
}

impl Point2 {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Point3 {
    pub fn new(x: i32, y: i32, z: i8) -> Self {
        Self { x, y, z }
    }

    pub fn point2(self) -> Point2 {
        Point2 { x: self.x, y: self.y }
    }
}

impl MapPos {
    pub fn new(x: i32, y: i32, z: i8, plane: u8) -> Self {
        Self { x, y, z, plane }
    }

    pub fn point2(self) -> Point2 {
        Point2 { x: self.x, y: self.y }
    }

    pub fn point3(self) -> Point3 {
        Point3 { x: self.x, y: self.y, z: self.z }
    }

    pub fn offset(self, delta: PositionDelta) -> Self {
        Self {
            x: self.x + delta.dx,
            y: self.y + delta.dy,
            z: self.z.saturating_add(delta.dz),
            plane: self.plane,
        }
    }

    pub fn step(self, direction: Direction) -> Self {
        self.offset(direction.delta())
    }
}

/// Chebyshev distance: diagonal steps count the same as straight ones.
pub fn simple_distance(a: Point2, b: Point2) -> i32 {
    (a.x - b.x).abs().max((a.y - b.y).abs())
}

impl Direction {
    pub fn delta(self) -> PositionDelta {
        match self {
            Direction::North => PositionDelta { dx: 0, dy: -1, dz: 0 },
            Direction::East => PositionDelta { dx: 1, dy: 0, dz: 0 },
            Direction::South => PositionDelta { dx: 0, dy: 1, dz: 0 },
            Direction::West => PositionDelta { dx: -1, dy: 0, dz: 0 },
            Direction::Northeast => PositionDelta { dx: 1, dy: -1, dz: 0 },
            Direction::Northwest => PositionDelta { dx: -1, dy: -1, dz: 0 },
            Direction::Southeast => PositionDelta { dx: 1, dy: 1, dz: 0 },
            Direction::Southwest => PositionDelta { dx: -1, dy: 1, dz: 0 },
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::Northeast
                | Direction::Northwest
                | Direction::Southeast
                | Direction::Southwest
        )
    }
}
