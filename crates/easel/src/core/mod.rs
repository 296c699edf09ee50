//! Core types for the easel canvas library.

use std::sync::{Mutex, MutexGuard};

/// The canvas registry and its event loop.
pub mod atelier;
/// Windowing backends.
pub mod backend;
/// Canvas lifecycle.
pub mod canvas;
/// Routing of events to canvases.
pub mod dispatch;
/// Core error types.
pub mod error;
/// Protocol event types.
pub mod event;
/// The serialized handle to the shared connection.
pub(crate) mod link;
/// Canvas construction options.
pub mod options;
/// Refresh thread pacing.
pub(crate) mod pacing;

/// Lock a mutex, recovering the guard if a panicking thread poisoned it. The
/// state behind every easel mutex is valid between statements, so a poisoned
/// lock carries no torn data.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
