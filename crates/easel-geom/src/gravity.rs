use serde::{Deserialize, Serialize};

use super::{Expanse, Point, Rect};
use crate::{Error, Result};

/// Horizontal placement band of a gravity.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Horizontal {
    /// Offset from the left screen edge.
    Left,
    /// Offset from the horizontal center.
    Center,
    /// Offset from the right screen edge, growing leftwards.
    Right,
}

/// Vertical placement band of a gravity.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Vertical {
    /// Offset from the top screen edge.
    Top,
    /// Offset from the vertical middle.
    Middle,
    /// Offset from the bottom screen edge, growing upwards.
    Bottom,
}

/// The anchor point that logical canvas offsets are measured from. Codes run
/// row by row, 1 (north-west) to 9 (south-east).
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, Default, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Gravity {
    /// Top left.
    #[default]
    NorthWest = 1,
    /// Top center.
    North = 2,
    /// Top right.
    NorthEast = 3,
    /// Middle left.
    West = 4,
    /// Screen center.
    Center = 5,
    /// Middle right.
    East = 6,
    /// Bottom left.
    SouthWest = 7,
    /// Bottom center.
    South = 8,
    /// Bottom right.
    SouthEast = 9,
}

impl Gravity {
    /// All gravities in code order.
    pub const ALL: [Self; 9] = [
        Self::NorthWest,
        Self::North,
        Self::NorthEast,
        Self::West,
        Self::Center,
        Self::East,
        Self::SouthWest,
        Self::South,
        Self::SouthEast,
    ];

    /// Look up a gravity by its numeric code.
    pub fn from_code(code: i64) -> Result<Self> {
        if (1..=9).contains(&code) {
            Ok(Self::ALL[(code - 1) as usize])
        } else {
            Err(Error::InvalidGravity(code))
        }
    }

    /// The numeric code, in 1..=9.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Horizontal band, selected by `(code - 1) mod 3`.
    pub fn horizontal(self) -> Horizontal {
        match (self.code() - 1) % 3 {
            0 => Horizontal::Left,
            1 => Horizontal::Center,
            _ => Horizontal::Right,
        }
    }

    /// Vertical band, selected by which third of 1..=9 the code falls in.
    pub fn vertical(self) -> Vertical {
        match (self.code() - 1) / 3 {
            0 => Vertical::Top,
            1 => Vertical::Middle,
            _ => Vertical::Bottom,
        }
    }
}

impl TryFrom<i64> for Gravity {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        Self::from_code(code)
    }
}

impl From<Gravity> for u8 {
    fn from(g: Gravity) -> Self {
        g.code()
    }
}

/// Place one dimension. `extent` is the canvas length, `space` the screen
/// length; the result may be negative when the canvas is larger than the
/// screen.
fn axis(offset: i32, extent: u32, space: u32, band: u8) -> i32 {
    let room = i64::from(space) - i64::from(extent);
    let v = match band {
        0 => i64::from(offset),
        1 => (room >> 1) + i64::from(offset),
        _ => room - i64::from(offset),
    };
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Resolve a logical, gravity-relative offset into an absolute position on
/// a screen of the given size. Pure: the same inputs always yield the same
/// output.
pub fn resolve(offset: Point, size: Expanse, screen: Expanse, gravity: Gravity) -> Point {
    let h = match gravity.horizontal() {
        Horizontal::Left => 0,
        Horizontal::Center => 1,
        Horizontal::Right => 2,
    };
    let v = match gravity.vertical() {
        Vertical::Top => 0,
        Vertical::Middle => 1,
        Vertical::Bottom => 2,
    };
    Point {
        x: axis(offset.x, size.w, screen.w, h),
        y: axis(offset.y, size.h, screen.h, v),
    }
}

/// Like [`resolve`], but within an arbitrary area of the root window, such as
/// one monitor of a multi-head layout.
pub fn place(offset: Point, size: Expanse, area: Rect, gravity: Gravity) -> Point {
    resolve(offset, size, area.expanse(), gravity) + area.tl
}
