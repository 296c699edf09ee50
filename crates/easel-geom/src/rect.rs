use serde::{Deserialize, Serialize};

use super::{Expanse, Point};

/// A rectangle with a signed origin and unsigned size. Monitors in a
/// multi-head layout are described this way, relative to the root window.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left corner.
    pub tl: Point,
    /// Width.
    pub w: u32,
    /// Height.
    pub h: u32,
}

impl Rect {
    /// Construct a rectangle from coordinates and size.
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self {
            tl: Point { x, y },
            w,
            h,
        }
    }

    /// The size of this rect, without its location.
    pub fn expanse(&self) -> Expanse {
        Expanse::new(self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expanse() {
        assert_eq!(Rect::new(3, 4, 5, 6).expanse(), Expanse::new(5, 6));
        assert_eq!(Rect::new(-3, 4, 5, 6).tl, Point::new(-3, 4));
    }
}
