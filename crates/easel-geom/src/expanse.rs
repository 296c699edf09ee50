use serde::{Deserialize, Serialize};

use super::{Point, Rect};

/// An `Expanse` is a rectangle that has a width and height but no location.
/// Canvas sizes and screen sizes are both expressed this way.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Expanse {
    /// Width in pixels.
    pub w: u32,
    /// Height in pixels.
    pub h: u32,
}

impl Expanse {
    /// Construct a new expanse.
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// Is either dimension zero?
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Return a `Rect` with the same dimensions as the `Expanse`, but a location at (0, 0).
    pub fn rect(&self) -> Rect {
        Rect {
            tl: Point::zero(),
            w: self.w,
            h: self.h,
        }
    }
}
