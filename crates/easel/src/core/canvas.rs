use std::{
    fmt,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU8, Ordering},
    },
};

use crate::{
    atelier::{Atelier, Shared},
    backend::{Backend, ContextOf, WindowSpec},
    core::{
        link::Link,
        lock,
        pacing::{Pulse, Refresher},
    },
    error::{Error, Result},
    event::{ButtonPress, Event, KeyPress, WindowId},
    geom::{self, Expanse, Gravity, Point, Rect},
    options::CanvasOptions,
};

/// Draw callback: renders one frame into the canvas context.
pub type DrawFn<B> = Box<dyn FnMut(&mut ContextOf<B>, &CanvasInfo) -> anyhow::Result<()> + Send>;
/// Pointer button callback.
pub type ButtonFn<B> = Box<dyn FnMut(&Canvas<B>, ButtonPress) -> anyhow::Result<()> + Send>;
/// Key press callback.
pub type KeyFn<B> = Box<dyn FnMut(&Canvas<B>, KeyPress) -> anyhow::Result<()> + Send>;

/// The host callbacks bound to a canvas. Every slot is optional; an empty
/// slot means the event is ignored.
pub struct Handlers<B: Backend> {
    /// Frame renderer.
    pub(crate) draw: Option<DrawFn<B>>,
    /// Pointer button handler.
    pub(crate) button: Option<ButtonFn<B>>,
    /// Key handler.
    pub(crate) key: Option<KeyFn<B>>,
}

impl<B: Backend> Default for Handlers<B> {
    fn default() -> Self {
        Self {
            draw: None,
            button: None,
            key: None,
        }
    }
}

impl<B: Backend> fmt::Debug for Handlers<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("draw", &self.draw.is_some())
            .field("button", &self.button.is_some())
            .field("key", &self.key.is_some())
            .finish()
    }
}

impl<B: Backend> Handlers<B> {
    /// An empty callback table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the draw callback. It runs on the event loop thread with the
    /// surface held, so it may dispose its canvas but must not destroy it.
    pub fn draw(
        mut self,
        f: impl FnMut(&mut ContextOf<B>, &CanvasInfo) -> anyhow::Result<()> + Send + 'static,
    ) -> Self {
        self.draw = Some(Box::new(f));
        self
    }

    /// Bind the pointer button callback.
    pub fn on_button_pressed(
        mut self,
        f: impl FnMut(&Canvas<B>, ButtonPress) -> anyhow::Result<()> + Send + 'static,
    ) -> Self {
        self.button = Some(Box::new(f));
        self
    }

    /// Bind the key press callback.
    pub fn on_key_pressed(
        mut self,
        f: impl FnMut(&Canvas<B>, KeyPress) -> anyhow::Result<()> + Send + 'static,
    ) -> Self {
        self.key = Some(Box::new(f));
        self
    }
}

/// Lifecycle state of a canvas. States only ever advance.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    /// Window and surface allocated, not yet on screen.
    Created = 0,
    /// Mapped, receiving input, refresh thread running.
    Shown = 1,
    /// Teardown requested, waiting for the event loop to destroy it.
    Disposing = 2,
    /// All resources released.
    Destroyed = 3,
}

impl Lifecycle {
    /// Decode the stored representation.
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Shown,
            2 => Self::Disposing,
            _ => Self::Destroyed,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Shown => "shown",
            Self::Disposing => "disposing",
            Self::Destroyed => "destroyed",
        })
    }
}

/// What a draw callback knows about the canvas it is painting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasInfo {
    /// Window handle.
    pub window: WindowId,
    /// Canvas size.
    pub size: Expanse,
    /// Absolute position on the root window.
    pub position: Point,
}

/// Where a canvas sits.
#[derive(Debug, Clone, Copy)]
struct Placement {
    /// Logical, gravity-relative offset.
    offset: Point,
    /// Anchor.
    gravity: Gravity,
    /// Monitor the canvas is placed on.
    monitor: Option<usize>,
    /// Area the offset is resolved against.
    area: Rect,
    /// Resolved absolute position.
    position: Point,
}

/// The shared body of a canvas.
pub(crate) struct CanvasCell<B: Backend> {
    /// Window handle.
    pub(crate) window: WindowId,
    /// Close-protocol token for this window.
    pub(crate) close_token: u32,
    /// Fixed size.
    size: Expanse,
    /// The shared connection.
    pub(crate) link: Arc<Link<B>>,
    /// Current placement.
    placement: Mutex<Placement>,
    /// Flags shared with the refresh thread.
    pub(crate) pulse: Arc<Pulse>,
    /// Lifecycle state.
    lifecycle: AtomicU8,
    /// Drawing surface. Only touched on the event loop thread; `None` once
    /// destroyed.
    pub(crate) surface: Mutex<Option<B::Surface>>,
    /// Host callbacks.
    pub(crate) handlers: Mutex<Handlers<B>>,
    /// Refresh thread, present while shown.
    refresher: Mutex<Option<Refresher>>,
    /// The registry this canvas belongs to.
    atelier: Weak<Shared<B>>,
}

impl<B: Backend> CanvasCell<B> {
    /// Wake the refresh thread, if there is one, so it re-reads its flags.
    pub(crate) fn wake(&self) {
        if let Some(r) = lock(&self.refresher).as_ref() {
            r.wake();
        }
    }
}

/// A handle to one on-screen widget. Handles are cheap to clone and may be
/// sent between threads; [`Canvas::destroy`] is the only operation tied to
/// the event loop thread.
pub struct Canvas<B: Backend> {
    /// Shared body.
    cell: Arc<CanvasCell<B>>,
}

impl<B: Backend> Clone for Canvas<B> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for Canvas<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("window", &self.cell.window)
            .field("size", &self.cell.size)
            .field("state", &self.state())
            .finish()
    }
}

impl<B: Backend> Canvas<B> {
    /// Create a canvas: open the shared connection if needed, create the
    /// window and its surface, and register with the atelier. Nothing is left
    /// registered if any step fails.
    pub fn new(atelier: &Atelier<B>, opts: CanvasOptions, handlers: Handlers<B>) -> Result<Self> {
        opts.validate()?;
        let cell = atelier.enroll(|link| {
            let area = link.submit(|b| b.screen_geometry(opts.monitor))?;
            let size = opts.size();
            let position = geom::place(opts.offset(), size, area, opts.gravity);
            let spec = WindowSpec {
                position,
                size,
                window_type: opts.window_type,
                state: opts.wm_state(),
            };
            let handles = link.submit(|b| b.create_window(&spec))?;
            let surface = match link.submit(|b| b.create_surface(handles.window, size)) {
                Ok(s) => s,
                Err(e) => {
                    if let Err(e) = link.submit(|b| b.destroy_window(handles.window)) {
                        tracing::warn!("releasing window {}: {e}", handles.window);
                    }
                    return Err(e);
                }
            };
            tracing::info!(
                "canvas {} created at {},{} size {}x{}",
                handles.window,
                position.x,
                position.y,
                size.w,
                size.h
            );
            Ok(Arc::new(CanvasCell {
                window: handles.window,
                close_token: handles.close_token,
                size,
                link: link.clone(),
                placement: Mutex::new(Placement {
                    offset: opts.offset(),
                    gravity: opts.gravity,
                    monitor: opts.monitor,
                    area,
                    position,
                }),
                pulse: Arc::new(Pulse::new(opts.interval, atelier.running_flag())),
                lifecycle: AtomicU8::new(Lifecycle::Created as u8),
                surface: Mutex::new(Some(surface)),
                handlers: Mutex::new(handlers),
                refresher: Mutex::new(None),
                atelier: atelier.downgrade(),
            }))
        })?;
        Ok(Self { cell })
    }

    /// Wrap a registered cell.
    pub(crate) fn from_cell(cell: Arc<CanvasCell<B>>) -> Self {
        Self { cell }
    }

    /// The shared body.
    pub(crate) fn cell(&self) -> &CanvasCell<B> {
        &self.cell
    }

    /// Map the window, enable input and start the refresh thread. Showing a
    /// shown canvas does nothing.
    pub fn show(&self) -> Result<()> {
        let cell = &self.cell;
        match self.state() {
            Lifecycle::Shown => return Ok(()),
            Lifecycle::Disposing | Lifecycle::Destroyed => {
                return Err(Error::Destroyed(cell.window));
            }
            Lifecycle::Created => {}
        }
        let mut refresher = lock(&cell.refresher);
        if refresher.is_some() {
            return Ok(());
        }
        cell.link.submit(|b| {
            b.select_input(cell.window)?;
            b.map_window(cell.window)
        })?;
        *refresher = Some(Refresher::spawn(
            cell.window,
            cell.pulse.clone(),
            cell.link.clone(),
        )?);
        if self.advance(Lifecycle::Shown) {
            tracing::info!("canvas {} shown", cell.window);
        }
        Ok(())
    }

    /// Move the canvas to a new logical offset, resolved against its gravity.
    pub fn move_to(&self, x: i32, y: i32) -> Result<()> {
        let cell = &self.cell;
        if self.state() == Lifecycle::Destroyed {
            return Err(Error::Destroyed(cell.window));
        }
        let mut p = lock(&cell.placement);
        let offset = Point::new(x, y);
        let (area, position) = cell.link.submit(|b| {
            let area = b.screen_geometry(p.monitor).unwrap_or(p.area);
            let position = geom::place(offset, cell.size, area, p.gravity);
            b.move_window(cell.window, position)?;
            Ok((area, position))
        })?;
        p.offset = offset;
        p.area = area;
        p.position = position;
        tracing::debug!("canvas {} moved to {},{}", cell.window, position.x, position.y);
        Ok(())
    }

    /// Request teardown. Safe to call from any thread: the window is unmapped
    /// and the event loop is woken to perform the destroy. The surface is
    /// never touched here. Repeated calls do nothing.
    pub fn dispose(&self) {
        let cell = &self.cell;
        if self.state() == Lifecycle::Destroyed || !cell.pulse.request_dispose() {
            return;
        }
        self.advance(Lifecycle::Disposing);
        tracing::info!("canvas {} disposing", cell.window);
        let sent = cell.link.submit(|b| {
            b.unmap_window(cell.window)?;
            b.send_event(
                cell.window,
                &Event::close_request(cell.window, cell.close_token),
            )
        });
        if let Err(e) = sent {
            tracing::warn!("canvas {} dispose: {e}", cell.window);
        }
        cell.wake();
    }

    /// Release the surface, the window and the refresh thread, and leave the
    /// registry. While an event loop is running this must be called on its
    /// thread. Destroying twice does nothing.
    pub fn destroy(&self) -> Result<()> {
        let cell = &self.cell;
        let atelier = cell.atelier.upgrade().map(Atelier::from_shared);
        if let Some(a) = atelier.as_ref()
            && !a.on_loop_thread()
        {
            return Err(Error::WrongThread);
        }
        let prev = cell
            .lifecycle
            .swap(Lifecycle::Destroyed as u8, Ordering::SeqCst);
        if Lifecycle::from_u8(prev) == Lifecycle::Destroyed {
            return Ok(());
        }
        cell.pulse.request_dispose();

        let refresher = lock(&cell.refresher).take();
        if let Some(mut r) = refresher
            && let Err(e) = r.stop()
        {
            tracing::warn!("canvas {} refresh thread: {e}", cell.window);
        }
        drop(lock(&cell.surface).take());
        if let Err(e) = cell.link.submit(|b| b.destroy_window(cell.window)) {
            tracing::warn!("canvas {} destroy window: {e}", cell.window);
        }
        if let Some(a) = atelier {
            a.unregister(cell.window);
        }
        tracing::info!("canvas {} destroyed", cell.window);
        Ok(())
    }

    /// Move the lifecycle forward to `to`. Returns false if the canvas was
    /// already at or past it.
    fn advance(&self, to: Lifecycle) -> bool {
        self.cell
            .lifecycle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                (s < to as u8).then_some(to as u8)
            })
            .is_ok()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.cell.lifecycle.load(Ordering::SeqCst))
    }

    /// Has teardown been requested or performed?
    pub fn is_disposing(&self) -> bool {
        self.cell.pulse.is_disposing()
    }

    /// The window handle.
    pub fn window(&self) -> WindowId {
        self.cell.window
    }

    /// Token carried by close requests for this canvas.
    pub fn close_token(&self) -> u32 {
        self.cell.close_token
    }

    /// Width and height.
    pub fn size(&self) -> Expanse {
        self.cell.size
    }

    /// The logical, gravity-relative offset.
    pub fn position(&self) -> Point {
        lock(&self.cell.placement).offset
    }

    /// The resolved absolute position on the root window.
    pub fn screen_position(&self) -> Point {
        lock(&self.cell.placement).position
    }

    /// The gravity offsets are measured from.
    pub fn gravity(&self) -> Gravity {
        lock(&self.cell.placement).gravity
    }

    /// Refresh interval in milliseconds.
    pub fn interval(&self) -> u64 {
        self.cell.pulse.interval_ms()
    }

    /// Change the refresh interval. Takes effect on the refresh thread's next
    /// wake, which this triggers.
    pub fn set_interval(&self, ms: u64) {
        self.cell.pulse.set_interval_ms(ms);
        self.cell.wake();
    }

    /// Identity and geometry, as handed to draw callbacks.
    pub fn info(&self) -> CanvasInfo {
        CanvasInfo {
            window: self.cell.window,
            size: self.cell.size,
            position: self.screen_position(),
        }
    }

    /// Do two handles refer to the same canvas?
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::backend::headless::{Headless, Op};

    fn server() -> Headless {
        Headless::new(Expanse::new(1920, 1080))
    }

    #[test]
    fn create_places_window() -> Result<()> {
        let h = server();
        let a = h.atelier();
        let c = a.create_canvas(
            CanvasOptions::new(0, 0, 100, 100).gravity(Gravity::Center),
            Handlers::new(),
        )?;
        assert_eq!(c.state(), Lifecycle::Created);
        assert_eq!(c.screen_position(), Point::new(910, 490));
        assert_eq!(c.size(), Expanse::new(100, 100));
        assert_eq!(c.interval(), 1000);
        assert_eq!(h.count(|op| matches!(op, Op::CreateWindow(..))), 1);
        assert_eq!(h.count(|op| matches!(op, Op::Map(_))), 0);
        assert_eq!(a.len(), 1);
        Ok(())
    }

    #[test]
    fn move_resolves_gravity() -> Result<()> {
        let h = server();
        let a = h.atelier();
        let c = a.create_canvas(
            CanvasOptions::new(0, 0, 200, 100).gravity(Gravity::SouthEast),
            Handlers::new(),
        )?;
        assert_eq!(c.screen_position(), Point::new(1720, 980));
        c.move_to(20, 10)?;
        assert_eq!(c.position(), Point::new(20, 10));
        assert_eq!(c.screen_position(), Point::new(1700, 970));
        assert_eq!(
            h.count(|op| *op == Op::Move(c.window(), Point::new(1700, 970))),
            1
        );
        Ok(())
    }

    #[test]
    fn show_is_idempotent() -> Result<()> {
        let h = server();
        let a = h.atelier();
        let c = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new())?;
        c.show()?;
        c.show()?;
        assert_eq!(c.state(), Lifecycle::Shown);
        assert_eq!(h.count(|op| matches!(op, Op::Map(_))), 1);
        assert_eq!(h.count(|op| matches!(op, Op::SelectInput(_))), 1);
        c.destroy()?;
        assert!(matches!(c.show(), Err(Error::Destroyed(_))));
        Ok(())
    }

    #[test]
    fn dispose_then_destroy() -> Result<()> {
        let h = server();
        let a = h.atelier();
        let c = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new())?;
        c.show()?;
        c.dispose();
        c.dispose();
        assert_eq!(c.state(), Lifecycle::Disposing);
        assert_eq!(h.count(|op| matches!(op, Op::Unmap(_))), 1);
        assert_eq!(
            h.count(|op| *op == Op::Send(c.window(), Event::close_request(c.window(), c.close_token()))),
            1
        );

        c.destroy()?;
        c.destroy()?;
        assert_eq!(c.state(), Lifecycle::Destroyed);
        assert_eq!(h.count(|op| matches!(op, Op::DestroyWindow(_))), 1);
        assert_eq!(h.count(|op| matches!(op, Op::ReleaseSurface(_))), 1);
        assert!(a.is_empty());
        assert!(h.is_closed());
        Ok(())
    }

    #[test]
    fn failed_surface_leaves_nothing() -> Result<()> {
        let h = server();
        let a = h.atelier();
        h.fail_next_surface();
        let r = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new());
        assert!(matches!(r, Err(Error::Setup(_))));
        assert!(a.is_empty());
        assert!(!a.is_connected());
        assert!(h.is_closed());
        assert_eq!(h.count(|op| matches!(op, Op::DestroyWindow(_))), 1);

        let c = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new())?;
        assert_eq!(a.len(), 1);
        assert_eq!(c.state(), Lifecycle::Created);
        Ok(())
    }

    #[test]
    fn invalid_options_rejected() {
        let a = server().atelier();
        let r = a.create_canvas(CanvasOptions::new(0, 0, 0, 10), Handlers::new());
        assert!(matches!(r, Err(Error::Config(_))));
        assert!(!a.is_connected());
    }

    #[test]
    fn interval_change() -> Result<()> {
        let a = server().atelier();
        let c = a.create_canvas(
            CanvasOptions::new(0, 0, 10, 10).interval(250),
            Handlers::new(),
        )?;
        assert_eq!(c.interval(), 250);
        c.set_interval(40);
        assert_eq!(c.interval(), 40);
        Ok(())
    }

    /// Poll `f` for up to a second.
    fn within_a_second(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        f()
    }

    fn refresher_finished(c: &Canvas<Headless>) -> bool {
        lock(&c.cell().refresher)
            .as_ref()
            .is_none_or(Refresher::is_finished)
    }

    #[test]
    fn refresher_parks_without_a_loop() -> Result<()> {
        let h = server();
        let a = h.atelier();
        let c = a.create_canvas(
            CanvasOptions::new(0, 0, 10, 10).interval(10),
            Handlers::new(),
        )?;
        c.show()?;
        thread::sleep(Duration::from_millis(300));
        let idle = c.cell().pulse.passes();
        assert!(idle <= 2, "{idle} passes with no loop");
        assert_eq!(h.count(|op| matches!(op, Op::Send(..))), 0);

        let _pump = a.attach().unwrap();
        assert!(within_a_second(|| h.count(|op| matches!(op, Op::Send(..))) > 0));
        assert!(c.cell().pulse.passes() > idle);
        Ok(())
    }

    #[test]
    fn dispose_stops_an_idle_refresher() -> Result<()> {
        let h = server();
        let a = h.atelier();
        let c = a.create_canvas(
            CanvasOptions::new(0, 0, 10, 10).interval(60_000),
            Handlers::new(),
        )?;
        c.show()?;
        thread::sleep(Duration::from_millis(20));
        assert!(!refresher_finished(&c));

        c.dispose();
        assert!(within_a_second(|| refresher_finished(&c)));
        assert_eq!(c.state(), Lifecycle::Disposing);
        Ok(())
    }
}
