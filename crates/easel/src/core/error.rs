use std::result::Result as StdResult;

use thiserror::Error;

use crate::{event::WindowId, geom};

/// Result type for easel operations.
pub type Result<T> = StdResult<T, Error>;

/// Core error type.
#[derive(PartialEq, Eq, Error, Debug, Clone)]
pub enum Error {
    #[error("connection: {0}")]
    /// The windowing server connection could not be opened, or has gone away.
    Connection(String),
    #[error("setup: {0}")]
    /// A window or drawing surface could not be created.
    Setup(String),
    #[error("event for unregistered window {0}")]
    /// An event arrived for a window the registry has never seen. This means
    /// the registry and the connection have fallen out of step.
    UnknownWindow(WindowId),
    #[error("callback on window {window}: {message}")]
    /// A host callback failed.
    Callback {
        /// Window of the offending canvas.
        window: WindowId,
        /// Rendered failure message.
        message: String,
    },
    #[error("destroy must run on the event loop thread")]
    /// Destroy was attempted from a thread other than the one driving the loop.
    WrongThread,
    #[error("canvas {0} has been destroyed")]
    /// The canvas has already been torn down.
    Destroyed(WindowId),
    #[error("backend: {0}")]
    /// Any other failure reported by the windowing backend.
    Backend(String),
    #[error("config: {0}")]
    /// Invalid canvas options.
    Config(String),
    #[error("geometry: {0}")]
    /// A geometry value, such as a gravity code, was out of range.
    Geometry(String),
}

impl From<geom::Error> for Error {
    fn from(e: geom::Error) -> Self {
        Self::Geometry(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
