use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A cell coordinate on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Column; grows to the right.
    pub x: i32,
    /// Row; grows upwards.
    pub y: i32,
}

impl Position {
    /// A position at `(x, y)`.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The region containing this position for the given region size.
    ///
    /// Uses floor division so negative coordinates tile without overlap:
    /// `(-1, -1)` belongs to region `(-1, -1)`, not `(0, 0)`.
    pub fn region(self, region_size: i32) -> Region {
        Region {
            x: self.x.div_euclid(region_size),
            y: self.y.div_euclid(region_size),
        }
    }

    /// The neighbouring cell in `direction`, or `None` on coordinate overflow.
    pub fn step(self, direction: Direction) -> Option<Position> {
        let (dx, dy) = direction.offset();
        Some(Position {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
        })
    }

    /// Chebyshev distance to another position.
    pub fn chebyshev(self, other: Position) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A square tile of `region_size` cells used to scope subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region {
    /// Region column.
    pub x: i32,
    /// Region row.
    pub y: i32,
}

impl Region {
    /// A region by its grid coordinates.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Every position inside the half-open rectangle
    /// `[x*s, x*s+s) x [y*s, y*s+s)`, row by row.
    ///
    /// Empty when the region's origin lies outside the coordinate range.
    pub fn positions(self, region_size: i32) -> impl Iterator<Item = Position> {
        let origin = self
            .x
            .checked_mul(region_size)
            .zip(self.y.checked_mul(region_size));
        let side = if origin.is_some() { region_size.max(0) } else { 0 };
        let (origin_x, origin_y) = origin.unwrap_or_default();
        (0..side).flat_map(move |dy| {
            (0..region_size).filter_map(move |dx| {
                Some(Position::new(
                    origin_x.checked_add(dx)?,
                    origin_y.checked_add(dy)?,
                ))
            })
        })
    }

    /// Whether `pos` lies inside this region.
    pub fn contains(self, pos: Position, region_size: i32) -> bool {
        pos.region(region_size) == self
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region({}, {})", self.x, self.y)
    }
}

/// Inclusive square bounds applied to both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBounds {
    /// Smallest coordinate allowed on either axis.
    pub min: i32,
    /// Largest coordinate allowed on either axis.
    pub max: i32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self { min: -25, max: 25 }
    }
}

impl WorldBounds {
    /// The square `[min, max]` on both axes.
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Whether both coordinates of `pos` lie in `[min, max]`.
    pub fn contains(&self, pos: Position) -> bool {
        (self.min..=self.max).contains(&pos.x) && (self.min..=self.max).contains(&pos.y)
    }

    /// Number of distinct offsets along one axis, minus one.
    pub fn span(&self) -> u32 {
        self.max.abs_diff(self.min)
    }
}

/// A cardinal direction used by agent actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// `+y`
    Up,
    /// `-y`
    Down,
    /// `-x`
    Left,
    /// `+x`
    Right,
}

impl Direction {
    /// `UP` increases `y`; `RIGHT` increases `x`.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_positions_stay_inside_region() {
        let region = Region::new(-2, 3);
        let cells: Vec<_> = region.positions(4).collect();
        assert_eq!(cells.len(), 16);
        assert!(cells.iter().all(|p| p.region(4) == region));
    }

    #[test]
    fn region_positions_empty_when_origin_overflows() {
        assert_eq!(Region::new(200_000_000, 0).positions(16).count(), 0);
        assert_eq!(Region::new(0, i32::MIN).positions(16).count(), 0);
        // The last region still yields the cells that exist.
        let top = Position::new(i32::MAX, 0).region(16);
        assert!(top.positions(16).all(|p| p.region(16) == top));
        assert!(top.positions(16).any(|p| p.x == i32::MAX));
    }

    #[test]
    fn region_floor_divides_negative_coordinates() {
        assert_eq!(Position::new(0, 0).region(16), Region::new(0, 0));
        assert_eq!(Position::new(15, 15).region(16), Region::new(0, 0));
        assert_eq!(Position::new(16, 0).region(16), Region::new(1, 0));
        assert_eq!(Position::new(-1, -1).region(16), Region::new(-1, -1));
        assert_eq!(Position::new(-16, -17).region(16), Region::new(-1, -2));
    }

    #[test]
    fn region_positions_cover_half_open_rectangle() {
        let cells: Vec<Position> = Region::new(-1, 2).positions(4).collect();
        assert_eq!(cells.len(), 16);
        assert_eq!(cells[0], Position::new(-4, 8));
        assert_eq!(cells[15], Position::new(-1, 11));
        assert!(cells.iter().all(|p| p.region(4) == Region::new(-1, 2)));
    }

    #[test]
    fn direction_steps() {
        let p = Position::new(2, 2);
        assert_eq!(p.step(Direction::Up), Some(Position::new(2, 3)));
        assert_eq!(p.step(Direction::Down), Some(Position::new(2, 1)));
        assert_eq!(p.step(Direction::Left), Some(Position::new(1, 2)));
        assert_eq!(p.step(Direction::Right), Some(Position::new(3, 2)));
        assert_eq!(Position::new(i32::MAX, 0).step(Direction::Right), None);
    }

    #[test]
    fn direction_parse() {
        assert_eq!("up".parse::<Direction>(), Ok(Direction::Up));
        assert_eq!("RIGHT".parse::<Direction>(), Ok(Direction::Right));
        assert!("NORTH".parse::<Direction>().is_err());
    }

    #[test]
    fn bounds_contains_inclusive() {
        let bounds = WorldBounds::default();
        assert!(bounds.contains(Position::new(-25, 25)));
        assert!(!bounds.contains(Position::new(26, 0)));
        assert_eq!(bounds.span(), 50);
    }

    #[test]
    fn chebyshev_distance() {
        assert_eq!(Position::new(0, 0).chebyshev(Position::new(-3, 2)), 3);
    }
}
