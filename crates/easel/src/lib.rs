//! Easel: desktop widget canvases.
//!
//! Easel creates borderless canvas windows on the desktop and drives them
//! from a single event loop. Each canvas has its own refresh interval and a
//! background thread that requests repaints; all drawing happens on the loop
//! thread, through the host's draw callback.
//!
//! # Quick Start
//!
//! The main entry points are:
//! - [`Atelier`] - The canvas registry and its event loop
//! - [`Canvas`] - One on-screen widget
//! - [`Handlers`] - The host callbacks bound to a canvas
//!
//! # Module Organization
//!
//! - [`geom`] - Geometry primitives and the gravity resolver
//! - [`backend`] - Windowing backends: headless, and X11 behind the `x11`
//!   feature

#![warn(missing_docs)]

// Internal core module - re-export specific items below
mod core;

pub use easel_geom as geom;

pub use crate::core::{
    atelier::{Atelier, Pump},
    backend,
    canvas::{ButtonFn, Canvas, CanvasInfo, DrawFn, Handlers, KeyFn, Lifecycle},
    dispatch::dispatch,
    error::{Error, Result},
    event::{ButtonPress, Event, KeyPress, Mods, WindowId},
    options::{CanvasOptions, WindowType, WmState},
};

// Short paths for use inside the crate
pub(crate) use crate::core::{atelier, canvas, error, event, options};
