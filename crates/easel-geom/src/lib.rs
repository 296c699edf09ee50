//! Geometry primitives used across easel.

#![warn(missing_docs)]

/// Error types for geometry operations.
mod error;
/// Width/height size type.
mod expanse;
/// Anchor positions and the screen placement resolver.
mod gravity;
/// Signed point helpers.
mod point;
/// Signed rectangle operations.
mod rect;

pub use error::{Error, Result};
pub use expanse::Expanse;
pub use gravity::{Gravity, Horizontal, Vertical, place, resolve};
pub use point::Point;
pub use rect::Rect;
