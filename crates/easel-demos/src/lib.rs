//! Desktop widgets used by the easel demos.

/// Command line handling shared by the demo binaries.
pub mod cli;
/// Analog clock widget.
pub mod clock;
/// One tile per gravity, for checking placement on a real display.
pub mod grid;
