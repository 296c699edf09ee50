//! An in-memory windowing backend.
//!
//! `Headless` keeps a scriptable event queue and a log of every request it
//! receives. Tests push input through it and inspect what the canvas layer
//! asked the "server" to do; hosts can also use it to run canvases entirely
//! off-screen and read back the painted frames.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
};

use super::{Backend, Surface, WindowHandles, WindowSpec};
use crate::{
    atelier::Atelier,
    core::lock,
    error::{Error, Result},
    event::{Event, Mods, WindowId},
    geom::{Expanse, Point, Rect},
};

/// Close token carried by close requests for every headless window.
pub const CLOSE_TOKEN: u32 = 0x1d1;

/// First window handle handed out.
const FIRST_WINDOW: u32 = 0x0040_0001;

/// A request recorded by the headless backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// A connection was opened.
    Open,
    /// The connection was closed.
    Close,
    /// A window was created.
    CreateWindow(WindowId, WindowSpec),
    /// Input was selected on a window.
    SelectInput(WindowId),
    /// A window was mapped.
    Map(WindowId),
    /// A window was unmapped.
    Unmap(WindowId),
    /// A window was moved.
    Move(WindowId, Point),
    /// A window was destroyed.
    DestroyWindow(WindowId),
    /// A synthetic event was submitted.
    Send(WindowId, Event),
    /// A surface was created.
    CreateSurface(WindowId),
    /// A frame was composited to the window.
    Paint(WindowId),
    /// A surface and its context were released.
    ReleaseSurface(WindowId),
}

/// The headless drawing context. Drawing operations are recorded as text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sketch {
    /// Recorded operations, in order.
    ops: Vec<String>,
}

impl Sketch {
    /// Record a drawing operation.
    pub fn draw(&mut self, op: impl Into<String>) {
        self.ops.push(op.into());
    }

    /// The recorded operations.
    pub fn ops(&self) -> &[String] {
        &self.ops
    }

    /// Was nothing drawn?
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Shared state behind every clone of a `Headless` handle.
#[derive(Debug)]
struct State {
    /// Pending events.
    queue: Mutex<VecDeque<Event>>,
    /// Signalled when an event is queued or the connection closes.
    ready: Condvar,
    /// Request log.
    log: Mutex<Vec<Op>>,
    /// Root window size.
    root: Expanse,
    /// Monitor layout, possibly empty.
    monitors: Vec<Rect>,
    /// Key map: keycode to (unshifted, shifted) symbols.
    keymap: Mutex<HashMap<u8, [u32; 2]>>,
    /// Last frame painted to each window.
    frames: Mutex<HashMap<WindowId, Sketch>>,
    /// Next window handle.
    next_window: AtomicU32,
    /// Is the connection closed?
    closed: AtomicBool,
    /// Number of times the connection was opened.
    opens: AtomicUsize,
    /// Fail the next window creation.
    fail_window: AtomicBool,
    /// Fail the next surface creation.
    fail_surface: AtomicBool,
}

/// Handle to an in-memory windowing server. Clones share the same server.
#[derive(Debug, Clone)]
pub struct Headless {
    /// Shared server state.
    state: Arc<State>,
}

impl Headless {
    /// A server with a single screen of the given size.
    pub fn new(screen: Expanse) -> Self {
        Self::with_monitors(screen, vec![])
    }

    /// A server whose root window is split into monitors.
    pub fn with_monitors(screen: Expanse, monitors: Vec<Rect>) -> Self {
        Self {
            state: Arc::new(State {
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                log: Mutex::new(vec![]),
                root: screen,
                monitors,
                keymap: Mutex::new(HashMap::new()),
                frames: Mutex::new(HashMap::new()),
                next_window: AtomicU32::new(FIRST_WINDOW),
                closed: AtomicBool::new(true),
                opens: AtomicUsize::new(0),
                fail_window: AtomicBool::new(false),
                fail_surface: AtomicBool::new(false),
            }),
        }
    }

    /// Open a connection to this server. Used as the registry's connector.
    /// Events left over from a previous connection are discarded.
    pub fn connect(&self) -> Result<Self> {
        lock(&self.state.queue).clear();
        self.state.closed.store(false, Ordering::SeqCst);
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        self.record(Op::Open);
        Ok(self.clone())
    }

    /// A registry whose connections open against this server.
    pub fn atelier(&self) -> Atelier<Self> {
        let server = self.clone();
        Atelier::new(move || server.connect())
    }

    /// Queue an event as if the server had delivered it.
    pub fn push(&self, event: Event) {
        lock(&self.state.queue).push_back(event);
        self.state.ready.notify_all();
    }

    /// Queue a server-generated expose.
    pub fn expose(&self, window: WindowId) {
        self.push(Event::Expose {
            window,
            count: 0,
            synthetic: false,
        });
    }

    /// Queue a pointer button press.
    pub fn click(&self, window: WindowId, button: u8, x: i32, y: i32) {
        self.push(Event::ButtonPress {
            window,
            button,
            state: Mods::default(),
            x,
            y,
        });
    }

    /// Queue a key press.
    pub fn key(&self, window: WindowId, keycode: u8, state: Mods) {
        self.push(Event::KeyPress {
            window,
            keycode,
            state,
        });
    }

    /// Queue a window manager close request.
    pub fn request_close(&self, window: WindowId) {
        self.push(Event::close_request(window, CLOSE_TOKEN));
    }

    /// Bind a keycode to its unshifted and shifted symbols.
    pub fn set_key(&self, keycode: u8, unshifted: u32, shifted: u32) {
        lock(&self.state.keymap).insert(keycode, [unshifted, shifted]);
    }

    /// Make the next window creation fail.
    pub fn fail_next_window(&self) {
        self.state.fail_window.store(true, Ordering::SeqCst);
    }

    /// Make the next surface creation fail.
    pub fn fail_next_surface(&self) {
        self.state.fail_surface.store(true, Ordering::SeqCst);
    }

    /// A copy of the request log.
    pub fn ops(&self) -> Vec<Op> {
        lock(&self.state.log).clone()
    }

    /// Count the logged requests matching a predicate.
    pub fn count(&self, f: impl Fn(&Op) -> bool) -> usize {
        lock(&self.state.log).iter().filter(|op| f(op)).count()
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        lock(&self.state.queue).len()
    }

    /// Is the connection closed?
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of times a connection has been opened.
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// The last frame painted to a window.
    pub fn frame(&self, window: WindowId) -> Option<Sketch> {
        lock(&self.state.frames).get(&window).cloned()
    }

    /// Append to the request log.
    fn record(&self, op: Op) {
        lock(&self.state.log).push(op);
    }

    /// Fail if the connection is closed.
    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Connection("headless connection is closed".into()))
        } else {
            Ok(())
        }
    }
}

impl Backend for Headless {
    type Surface = HeadlessSurface;

    fn screen_geometry(&self, monitor: Option<usize>) -> Result<Rect> {
        self.check_open()?;
        let root = self.state.root.rect();
        Ok(match monitor {
            Some(i) => self.state.monitors.get(i).copied().unwrap_or_else(|| {
                tracing::debug!("monitor {i} not present, using the root window");
                root
            }),
            None => root,
        })
    }

    fn create_window(&self, spec: &WindowSpec) -> Result<WindowHandles> {
        self.check_open()?;
        if self.state.fail_window.swap(false, Ordering::SeqCst) {
            return Err(Error::Setup("headless window creation refused".into()));
        }
        let window = WindowId(self.state.next_window.fetch_add(1, Ordering::SeqCst));
        self.record(Op::CreateWindow(window, spec.clone()));
        Ok(WindowHandles {
            window,
            close_token: CLOSE_TOKEN,
        })
    }

    fn create_surface(&self, window: WindowId, size: Expanse) -> Result<HeadlessSurface> {
        self.check_open()?;
        if self.state.fail_surface.swap(false, Ordering::SeqCst) {
            return Err(Error::Setup("headless surface creation refused".into()));
        }
        self.record(Op::CreateSurface(window));
        Ok(HeadlessSurface {
            window,
            size,
            server: self.clone(),
            frame: Sketch::default(),
            groups: vec![],
        })
    }

    fn select_input(&self, window: WindowId) -> Result<()> {
        self.check_open()?;
        self.record(Op::SelectInput(window));
        Ok(())
    }

    fn map_window(&self, window: WindowId) -> Result<()> {
        self.check_open()?;
        self.record(Op::Map(window));
        Ok(())
    }

    fn unmap_window(&self, window: WindowId) -> Result<()> {
        self.check_open()?;
        self.record(Op::Unmap(window));
        Ok(())
    }

    fn move_window(&self, window: WindowId, position: Point) -> Result<()> {
        self.check_open()?;
        self.record(Op::Move(window, position));
        Ok(())
    }

    fn destroy_window(&self, window: WindowId) -> Result<()> {
        self.check_open()?;
        self.record(Op::DestroyWindow(window));
        Ok(())
    }

    fn next_event(&self) -> Result<Event> {
        let mut queue = lock(&self.state.queue);
        loop {
            if let Some(e) = queue.pop_front() {
                return Ok(e);
            }
            self.check_open()?;
            queue = self
                .state
                .ready
                .wait(queue)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn poll_event(&self) -> Result<Option<Event>> {
        let e = lock(&self.state.queue).pop_front();
        if e.is_none() {
            self.check_open()?;
        }
        Ok(e)
    }

    fn send_event(&self, window: WindowId, event: &Event) -> Result<()> {
        self.check_open()?;
        self.record(Op::Send(window, event.clone()));
        self.push(event.clone());
        Ok(())
    }

    fn lookup_key(&self, keycode: u8, state: Mods) -> u32 {
        match lock(&self.state.keymap).get(&keycode) {
            Some(syms) => syms[usize::from(state.shift())],
            None => u32::from(keycode),
        }
    }

    fn flush(&self) -> Result<()> {
        self.check_open()
    }

    fn close(&self) {
        if !self.state.closed.swap(true, Ordering::SeqCst) {
            self.record(Op::Close);
        }
        // Take the queue lock so a receiver between its check and its wait
        // cannot miss the wakeup.
        let _queue = lock(&self.state.queue);
        self.state.ready.notify_all();
    }
}

/// A surface whose frames are kept in memory.
#[derive(Debug)]
pub struct HeadlessSurface {
    /// Owning window.
    window: WindowId,
    /// Surface size.
    size: Expanse,
    /// Server the frames are reported to.
    server: Headless,
    /// The accumulated frame.
    frame: Sketch,
    /// Open drawing groups, innermost last.
    groups: Vec<Sketch>,
}

impl HeadlessSurface {
    /// The surface size.
    pub fn size(&self) -> Expanse {
        self.size
    }
}

impl Surface for HeadlessSurface {
    type Context = Sketch;

    fn context(&mut self) -> &mut Sketch {
        if self.groups.is_empty() {
            &mut self.frame
        } else {
            let top = self.groups.len() - 1;
            &mut self.groups[top]
        }
    }

    fn push_group(&mut self) {
        self.groups.push(Sketch::default());
    }

    fn pop_group(&mut self, commit: bool) {
        if let Some(group) = self.groups.pop()
            && commit
        {
            self.frame = group;
        }
    }

    fn paint(&mut self) -> Result<()> {
        self.server.check_open()?;
        lock(&self.server.state.frames).insert(self.window, self.frame.clone());
        self.server.record(Op::Paint(self.window));
        Ok(())
    }
}

impl Drop for HeadlessSurface {
    fn drop(&mut self) {
        self.server.record(Op::ReleaseSurface(self.window));
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn queue_and_close() -> Result<()> {
        let h = Headless::new(Expanse::new(800, 600)).connect()?;
        let w = WindowId(7);
        h.click(w, 1, 2, 3);
        h.expose(w);
        assert_eq!(h.pending(), 2);
        assert!(matches!(h.next_event()?, Event::ButtonPress { button: 1, .. }));
        assert!(matches!(h.poll_event()?, Some(Event::Expose { synthetic: false, .. })));
        assert_eq!(h.poll_event()?, None);

        h.close();
        assert!(h.is_closed());
        assert!(matches!(h.next_event(), Err(Error::Connection(_))));
        assert_eq!(h.count(|op| *op == Op::Close), 1);
        Ok(())
    }

    #[test]
    fn close_wakes_receiver() -> Result<()> {
        let h = Headless::new(Expanse::new(800, 600)).connect()?;
        let rx = h.clone();
        let t = thread::spawn(move || rx.next_event());
        thread::sleep(Duration::from_millis(20));
        h.close();
        assert!(t.join().unwrap().is_err());
        Ok(())
    }

    #[test]
    fn groups() -> Result<()> {
        let h = Headless::new(Expanse::new(800, 600)).connect()?;
        let mut s = h.create_surface(WindowId(1), Expanse::new(10, 10))?;
        s.push_group();
        s.context().draw("kept");
        s.pop_group(true);
        s.push_group();
        s.context().draw("dropped");
        s.pop_group(false);
        s.paint()?;
        assert_eq!(h.frame(WindowId(1)).unwrap().ops(), ["kept".to_string()]);
        drop(s);
        assert_eq!(h.count(|op| *op == Op::ReleaseSurface(WindowId(1))), 1);
        Ok(())
    }

    #[test]
    fn keymap() -> Result<()> {
        let h = Headless::new(Expanse::new(800, 600)).connect()?;
        h.set_key(38, 'a' as u32, 'A' as u32);
        assert_eq!(h.lookup_key(38, Mods::default()), 'a' as u32);
        assert_eq!(h.lookup_key(38, Mods(Mods::SHIFT)), 'A' as u32);
        assert_eq!(h.lookup_key(99, Mods::default()), 99);
        Ok(())
    }

    #[test]
    fn monitors() -> Result<()> {
        let h = Headless::with_monitors(
            Expanse::new(3200, 1080),
            vec![Rect::new(0, 0, 1920, 1080), Rect::new(1920, 0, 1280, 1024)],
        )
        .connect()?;
        assert_eq!(h.screen_geometry(None)?, Rect::new(0, 0, 3200, 1080));
        assert_eq!(h.screen_geometry(Some(1))?, Rect::new(1920, 0, 1280, 1024));
        assert_eq!(h.screen_geometry(Some(5))?, Rect::new(0, 0, 3200, 1080));
        Ok(())
    }
}
