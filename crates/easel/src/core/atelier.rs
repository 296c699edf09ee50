use std::{
    collections::HashSet,
    fmt,
    io::Write,
    marker::PhantomData,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, ThreadId},
};

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};

use crate::{
    backend::Backend,
    canvas::{Canvas, CanvasCell, Handlers},
    core::{dispatch::dispatch, link::Link, lock},
    error::{Error, Result},
    event::{Event, WindowId},
    options::CanvasOptions,
};

/// Opens a new connection to the windowing server.
type Connector<B> = Box<dyn Fn() -> Result<B> + Send + Sync>;

/// Registry contents, guarded together.
struct RegistryState<B: Backend> {
    /// The shared connection, present while any canvas is registered.
    link: Option<Arc<Link<B>>>,
    /// Registered canvases.
    canvases: Vec<Arc<CanvasCell<B>>>,
    /// Windows destroyed on the current connection.
    retired: HashSet<WindowId>,
}

/// State shared by every handle to one atelier.
pub(crate) struct Shared<B: Backend> {
    /// Connection factory.
    connector: Connector<B>,
    /// Registry contents.
    state: Mutex<RegistryState<B>>,
    /// The loop flag, also read by refresh threads.
    running: Arc<AtomicBool>,
    /// Thread currently driving the loop.
    loop_thread: Mutex<Option<ThreadId>>,
}

/// The registry of live canvases and owner of the shared connection. The
/// connection is opened when the first canvas is created and closed when the
/// last one is destroyed; after that the atelier is back in its initial state.
///
/// Handles are cheap to clone and all refer to the same registry.
pub struct Atelier<B: Backend> {
    /// Shared state.
    shared: Arc<Shared<B>>,
}

impl<B: Backend> Clone for Atelier<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for Atelier<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atelier")
            .field("canvases", &self.len())
            .field("connected", &self.is_connected())
            .field("running", &self.is_running())
            .finish()
    }
}

/// How an event's window resolved against the registry.
enum Target<B: Backend> {
    /// A registered canvas.
    Live(Arc<CanvasCell<B>>),
    /// A canvas destroyed earlier on this connection.
    Retired,
    /// A window the registry has never seen.
    Unknown,
}

impl<B: Backend> Atelier<B> {
    /// An empty registry. `connector` is called to open the shared connection
    /// whenever a canvas is created while none is open.
    pub fn new(connector: impl Fn() -> Result<B> + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector: Box::new(connector),
                state: Mutex::new(RegistryState {
                    link: None,
                    canvases: vec![],
                    retired: HashSet::new(),
                }),
                running: Arc::new(AtomicBool::new(false)),
                loop_thread: Mutex::new(None),
            }),
        }
    }

    /// Rebuild a handle from shared state.
    pub(crate) fn from_shared(shared: Arc<Shared<B>>) -> Self {
        Self { shared }
    }

    /// A non-owning reference to the shared state.
    pub(crate) fn downgrade(&self) -> Weak<Shared<B>> {
        Arc::downgrade(&self.shared)
    }

    /// The loop flag, for refresh threads.
    pub(crate) fn running_flag(&self) -> Arc<AtomicBool> {
        self.shared.running.clone()
    }

    /// Create a canvas registered with this atelier.
    pub fn create_canvas(&self, opts: CanvasOptions, handlers: Handlers<B>) -> Result<Canvas<B>> {
        Canvas::new(self, opts, handlers)
    }

    /// Build and register a canvas under the registry lock, opening the
    /// connection first if needed. If `build` fails and nothing else is
    /// registered, the connection is closed again.
    pub(crate) fn enroll(
        &self,
        build: impl FnOnce(&Arc<Link<B>>) -> Result<Arc<CanvasCell<B>>>,
    ) -> Result<Arc<CanvasCell<B>>> {
        let mut st = lock(&self.shared.state);
        let link = match st.link.as_ref() {
            Some(l) => l.clone(),
            None => {
                let l = Arc::new(Link::new((self.shared.connector)()?));
                tracing::info!("connection opened");
                st.link = Some(l.clone());
                l
            }
        };
        match build(&link) {
            Ok(cell) => {
                if st.canvases.iter().any(|c| c.window == cell.window) {
                    return Err(Error::Setup(format!(
                        "window {} is already registered",
                        cell.window
                    )));
                }
                st.retired.remove(&cell.window);
                st.canvases.push(cell.clone());
                Ok(cell)
            }
            Err(e) => {
                if st.canvases.is_empty() {
                    Self::teardown(&mut st);
                }
                Err(e)
            }
        }
    }

    /// Remove a canvas. Closes the connection when the registry empties.
    pub(crate) fn unregister(&self, window: WindowId) {
        let removed = {
            let mut st = lock(&self.shared.state);
            let removed = st
                .canvases
                .iter()
                .position(|c| c.window == window)
                .map(|i| st.canvases.remove(i));
            if removed.is_some() {
                st.retired.insert(window);
            }
            if st.canvases.is_empty() {
                Self::teardown(&mut st);
            }
            removed
        };
        drop(removed);
    }

    /// Close and forget the connection.
    fn teardown(st: &mut RegistryState<B>) {
        if let Some(link) = st.link.take() {
            link.close();
            tracing::info!("connection closed");
        }
        st.retired.clear();
    }

    /// Is the calling thread allowed to destroy canvases? True when no loop
    /// is running, or when called from the loop's own thread.
    pub(crate) fn on_loop_thread(&self) -> bool {
        match *lock(&self.shared.loop_thread) {
            Some(id) => id == thread::current().id(),
            None => true,
        }
    }

    /// Take control of the event loop on the calling thread. Returns `None`
    /// if another pump is attached. The loop stops when the returned pump is
    /// dropped.
    pub fn attach(&self) -> Option<Pump<B>> {
        let mut owner = lock(&self.shared.loop_thread);
        if owner.is_some() {
            return None;
        }
        *owner = Some(thread::current().id());
        self.shared.running.store(true, Ordering::SeqCst);
        drop(owner);
        for c in lock(&self.shared.state).canvases.iter() {
            c.wake();
        }
        tracing::debug!("event loop attached");
        Some(Pump {
            atelier: self.clone(),
            _thread: PhantomData,
        })
    }

    /// Run the event loop on the calling thread until it is stopped, the
    /// registry empties, or the connection closes. Returns immediately if a
    /// loop is already attached.
    pub fn start_event_loop(&self) -> Result<()> {
        let Some(mut pump) = self.attach() else {
            tracing::debug!("event loop already running");
            return Ok(());
        };
        tracing::info!("event loop started");
        while pump.dispatch_next()? {}
        tracing::info!("event loop finished");
        Ok(())
    }

    /// Ask the loop to stop. A loop blocked waiting for an event stops after
    /// that event has been handled.
    pub fn stop_event_loop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Is the event loop running?
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Is the shared connection open?
    pub fn is_connected(&self) -> bool {
        lock(&self.shared.state).link.is_some()
    }

    /// Number of registered canvases.
    pub fn len(&self) -> usize {
        lock(&self.shared.state).canvases.len()
    }

    /// Is the registry empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles to every registered canvas.
    pub fn canvases(&self) -> Vec<Canvas<B>> {
        lock(&self.shared.state)
            .canvases
            .iter()
            .cloned()
            .map(Canvas::from_cell)
            .collect()
    }

    /// The connection, if the loop should keep going.
    fn live_link(&self) -> Option<Arc<Link<B>>> {
        if !self.is_running() {
            return None;
        }
        let st = lock(&self.shared.state);
        if st.canvases.is_empty() {
            return None;
        }
        st.link.clone()
    }

    /// Is `link` still the current connection?
    fn is_current(&self, link: &Arc<Link<B>>) -> bool {
        lock(&self.shared.state)
            .link
            .as_ref()
            .is_some_and(|l| Arc::ptr_eq(l, link))
    }

    /// Find the canvas an event is addressed to.
    fn target(&self, window: WindowId) -> Target<B> {
        let st = lock(&self.shared.state);
        match st.canvases.iter().find(|c| c.window == window) {
            Some(c) => Target::Live(c.clone()),
            None if st.retired.contains(&window) => Target::Retired,
            None => Target::Unknown,
        }
    }

    /// Resolve an event's window and hand it to the dispatcher.
    fn route(&self, event: Event) -> Result<()> {
        let window = event.window();
        match self.target(window) {
            Target::Live(cell) => dispatch(&Canvas::from_cell(cell), event),
            Target::Retired => {
                tracing::debug!("dropping {} for destroyed window {window}", event.class());
                Ok(())
            }
            Target::Unknown => {
                tracing::error!("{} for unregistered window {window}", event.class());
                Err(Error::UnknownWindow(window))
            }
        }
    }

    /// Write a table of registered canvases.
    pub fn print_canvas_table(&self, w: &mut dyn Write) -> Result<()> {
        let mut canvases = self.canvases();
        canvases.sort_by_key(Canvas::window);

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["window", "position", "size", "gravity", "state", "interval"]);
        for c in canvases {
            let p = c.screen_position();
            let s = c.size();
            table.add_row(vec![
                Cell::new(c.window()).fg(Color::Green),
                Cell::new(format!("{},{}", p.x, p.y)),
                Cell::new(format!("{}x{}", s.w, s.h)),
                Cell::new(format!("{:?}", c.gravity())),
                Cell::new(c.state()),
                Cell::new(format!("{}ms", c.interval())),
            ]);
        }
        writeln!(w, "{table}").map_err(|x| Error::Backend(x.to_string()))
    }
}

/// Exclusive control of an atelier's event loop, held by the thread that
/// drives it. Hosts with their own main loop can use a pump to service
/// events without blocking.
///
/// A pump is bound to the thread that attached it and cannot be sent to
/// another one: destroys are only permitted on that thread.
///
/// ```compile_fail
/// use easel::{Pump, backend::headless::Headless};
/// fn send<T: Send>() {}
/// send::<Pump<Headless>>();
/// ```
pub struct Pump<B: Backend> {
    /// The atelier being driven.
    atelier: Atelier<B>,
    /// Pins the pump to the attaching thread.
    _thread: PhantomData<*const ()>,
}

impl<B: Backend> fmt::Debug for Pump<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pump").field("atelier", &self.atelier).finish()
    }
}

impl<B: Backend> Pump<B> {
    /// Wait for one event and handle it. Returns `false` without waiting once
    /// the loop has been stopped, the registry is empty, or the connection is
    /// closed.
    pub fn dispatch_next(&mut self) -> Result<bool> {
        let Some(link) = self.atelier.live_link() else {
            return Ok(false);
        };
        let event = match link.next_event() {
            Ok(e) => e,
            Err(_) if !self.atelier.is_current(&link) => return Ok(false),
            Err(e) => return Err(e),
        };
        self.atelier.route(event)?;
        Ok(true)
    }

    /// Handle every event already queued, without waiting. Returns the number
    /// of events handled.
    pub fn dispatch_pending(&mut self) -> Result<usize> {
        let mut n = 0;
        while let Some(link) = self.atelier.live_link() {
            match link.poll_event()? {
                Some(e) => {
                    self.atelier.route(e)?;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    /// The atelier this pump drives.
    pub fn atelier(&self) -> &Atelier<B> {
        &self.atelier
    }
}

impl<B: Backend> Drop for Pump<B> {
    fn drop(&mut self) {
        let mut owner = lock(&self.atelier.shared.loop_thread);
        self.atelier.shared.running.store(false, Ordering::SeqCst);
        *owner = None;
        tracing::debug!("event loop detached");
    }
}
