/// In-memory backend for tests and off-screen hosts.
pub mod headless;
/// X11 backend built on x11rb.
#[cfg(feature = "x11")]
pub mod x11;

use crate::{
    error::Result,
    event::{Event, Mods, WindowId},
    geom::{Expanse, Point, Rect},
    options::{WindowType, WmState},
};

/// Everything the backend needs to create a canvas window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    /// Absolute position on the root window.
    pub position: Point,
    /// Window size.
    pub size: Expanse,
    /// Window type classification.
    pub window_type: WindowType,
    /// Window manager state hints.
    pub state: WmState,
}

/// Handles returned by window creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandles {
    /// The server-assigned window handle.
    pub window: WindowId,
    /// Token carried by close-protocol messages for this window.
    pub close_token: u32,
}

/// A drawing surface bound 1:1 to a window. The surface is touched only on
/// the event loop thread; dropping it releases the surface and its context.
pub trait Surface: Send + 'static {
    /// The drawing context handed to draw callbacks.
    type Context;

    /// The drawing context bound to this surface.
    fn context(&mut self) -> &mut Self::Context;

    /// Start buffering drawing operations into a group.
    fn push_group(&mut self);

    /// End the current group. When `commit` is true the group replaces the
    /// accumulated frame, otherwise it is discarded.
    fn pop_group(&mut self, commit: bool);

    /// Composite the accumulated frame onto the visible window.
    fn paint(&mut self) -> Result<()>;
}

/// The drawing context type of a backend.
pub type ContextOf<B> = <<B as Backend>::Surface as Surface>::Context;

/// A connection to a windowing server. Implementations must tolerate calls
/// from several threads: the event loop thread receives while canvas refresh
/// threads submit synthetic events. Easel serializes every call except
/// `next_event` behind its own lock.
pub trait Backend: Send + Sync + 'static {
    /// The surface type created for each window.
    type Surface: Surface;

    /// Geometry of a monitor, or of the whole root window when `monitor` is
    /// `None` or the server cannot report monitors.
    fn screen_geometry(&self, monitor: Option<usize>) -> Result<Rect>;

    /// Create an unmapped window with the given geometry and hints.
    fn create_window(&self, spec: &WindowSpec) -> Result<WindowHandles>;

    /// Create a drawing surface for a window.
    fn create_surface(&self, window: WindowId, size: Expanse) -> Result<Self::Surface>;

    /// Enable delivery of button-press, key-press and expose events.
    fn select_input(&self, window: WindowId) -> Result<()>;

    /// Map a window to the screen.
    fn map_window(&self, window: WindowId) -> Result<()>;

    /// Remove a window from the screen.
    fn unmap_window(&self, window: WindowId) -> Result<()>;

    /// Move a window to an absolute position.
    fn move_window(&self, window: WindowId, position: Point) -> Result<()>;

    /// Release a window's server-side resources.
    fn destroy_window(&self, window: WindowId) -> Result<()>;

    /// Block until the next window event arrives.
    fn next_event(&self) -> Result<Event>;

    /// Return the next event if one is already queued.
    fn poll_event(&self) -> Result<Option<Event>>;

    /// Submit a synthetic event addressed to a window.
    fn send_event(&self, window: WindowId, event: &Event) -> Result<()>;

    /// Translate a physical key code to a symbolic key code under the
    /// current keyboard mapping.
    fn lookup_key(&self, keycode: u8, state: Mods) -> u32;

    /// Push buffered requests to the server.
    fn flush(&self) -> Result<()>;

    /// Close the connection. Further calls fail with a connection error.
    fn close(&self);
}
