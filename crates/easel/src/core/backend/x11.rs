//! An X11 backend built on x11rb.
//!
//! Canvases are 32-bit ARGB windows with their own colormap, classified
//! through EWMH properties. Drawing happens into a `tiny_skia::Pixmap`,
//! which is uploaded to the window with `PutImage` when a frame is painted.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use tiny_skia::Pixmap;
use x11rb::{
    connection::{Connection, RequestConnection},
    errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError},
    protocol::{
        Event as XEvent,
        randr::ConnectionExt as _,
        xproto::{
            self, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ColormapAlloc,
            ConfigureWindowAux, ConnectionExt as _, CreateGCAux, CreateWindowAux, EventMask,
            ExposeEvent, ImageFormat, PropMode, Screen, VisualClass, WindowClass,
        },
    },
    rust_connection::RustConnection,
    wrapper::ConnectionExt as _,
};

use super::{Backend, Surface, WindowHandles, WindowSpec};
use crate::{
    core::lock,
    error::{Error, Result},
    event::{Event, Mods, WindowId},
    geom::{Expanse, Point, Rect},
};

/// Size of the fixed part of a `PutImage` request.
const PUT_IMAGE_HEADER: usize = 24;

/// Keysym value meaning "no symbol".
const NO_SYMBOL: u32 = 0;

impl From<ConnectError> for Error {
    fn from(e: ConnectError) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<ReplyError> for Error {
    fn from(e: ReplyError) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<ReplyOrIdError> for Error {
    fn from(e: ReplyOrIdError) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Cached keyboard mapping.
#[derive(Debug, Default)]
struct Keymap {
    /// First keycode covered by `syms`.
    min_keycode: u8,
    /// Symbols per keycode.
    per_keycode: usize,
    /// Flattened symbol table.
    syms: Vec<u32>,
}

impl Keymap {
    /// The symbol for a keycode, honouring shift and caps lock.
    fn lookup(&self, keycode: u8, state: Mods) -> Option<u32> {
        if self.per_keycode == 0 || keycode < self.min_keycode {
            return None;
        }
        let base = usize::from(keycode - self.min_keycode) * self.per_keycode;
        let row = self.syms.get(base..base + self.per_keycode)?;
        let plain = *row.first()?;
        let shifted = row.get(1).copied().filter(|s| *s != NO_SYMBOL);
        let sym = if state.shift() {
            shifted.unwrap_or(plain)
        } else {
            plain
        };
        if state.contains(Mods::LOCK) && !state.shift() && (0x61..=0x7a).contains(&sym) {
            return Some(sym - 0x20);
        }
        (sym != NO_SYMBOL).then_some(sym)
    }
}

/// Connection-wide state shared by the backend and its surfaces.
struct Inner {
    /// The connection. `None` once closed.
    conn: RwLock<Option<RustConnection>>,
    /// Root window of the default screen.
    root: xproto::Window,
    /// Root window size.
    root_size: Expanse,
    /// Depth of canvas windows.
    depth: u8,
    /// Visual of canvas windows.
    visual: xproto::Visualid,
    /// Colormap matching `visual`.
    colormap: xproto::Colormap,
    /// Interned atoms.
    atoms: Mutex<HashMap<&'static str, xproto::Atom>>,
    /// Keyboard mapping cache.
    keymap: Mutex<Keymap>,
    /// The keyboard mapping changed since it was cached.
    keymap_stale: AtomicBool,
}

/// A connection to an X server. Clones share the connection.
#[derive(Clone)]
pub struct X11 {
    /// Shared state.
    inner: Arc<Inner>,
}

impl fmt::Debug for X11 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X11")
            .field("root", &self.inner.root)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

/// Find a 32-bit TrueColor visual on a screen.
fn argb_visual(screen: &Screen) -> Option<(u8, xproto::Visualid)> {
    screen
        .allowed_depths
        .iter()
        .filter(|d| d.depth == 32)
        .flat_map(|d| d.visuals.iter())
        .find(|v| v.class == VisualClass::TRUE_COLOR)
        .map(|v| (32, v.visual_id))
}

impl X11 {
    /// Connect to the display named by `$DISPLAY`.
    pub fn connect() -> Result<Self> {
        Self::connect_to(None)
    }

    /// Connect to a named display.
    pub fn connect_to(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(display)?;
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| Error::Connection(format!("no screen {screen_num}")))?;
        let root = screen.root;
        let root_size = Expanse::new(
            u32::from(screen.width_in_pixels),
            u32::from(screen.height_in_pixels),
        );
        let (depth, visual) = argb_visual(screen).unwrap_or_else(|| {
            tracing::warn!("no 32-bit visual, canvases will be opaque");
            (screen.root_depth, screen.root_visual)
        });
        let colormap = conn.generate_id()?;
        conn.create_colormap(ColormapAlloc::NONE, colormap, root, visual)?;

        let x = Self {
            inner: Arc::new(Inner {
                conn: RwLock::new(Some(conn)),
                root,
                root_size,
                depth,
                visual,
                colormap,
                atoms: Mutex::new(HashMap::new()),
                keymap: Mutex::new(Keymap::default()),
                keymap_stale: AtomicBool::new(true),
            }),
        };
        tracing::info!(
            "connected to X server, screen {screen_num} {}x{} depth {depth}",
            root_size.w,
            root_size.h
        );
        Ok(x)
    }

    /// Run `f` against the open connection.
    fn with<R>(&self, f: impl FnOnce(&RustConnection) -> Result<R>) -> Result<R> {
        let g = self.inner.conn.read().unwrap_or_else(|e| e.into_inner());
        match g.as_ref() {
            Some(c) => f(c),
            None => Err(Error::Connection("X connection is closed".into())),
        }
    }

    /// Intern an atom, caching the result.
    fn atom(&self, c: &RustConnection, name: &'static str) -> Result<xproto::Atom> {
        if let Some(a) = lock(&self.inner.atoms).get(name) {
            return Ok(*a);
        }
        let a = c.intern_atom(false, name.as_bytes())?.reply()?.atom;
        lock(&self.inner.atoms).insert(name, a);
        Ok(a)
    }

    /// Re-read the keyboard mapping from the server.
    fn refresh_keymap(&self, c: &RustConnection) -> Result<()> {
        let setup = c.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = c.get_keyboard_mapping(min, max - min + 1)?.reply()?;
        *lock(&self.inner.keymap) = Keymap {
            min_keycode: min,
            per_keycode: usize::from(reply.keysyms_per_keycode),
            syms: reply.keysyms,
        };
        Ok(())
    }

    /// Convert a server event. Events the canvas layer has no use for, and
    /// that may not belong to any canvas window, are consumed here.
    fn translate(&self, e: XEvent) -> Option<Event> {
        match e {
            XEvent::Expose(e) => Some(Event::Expose {
                window: WindowId(e.window),
                count: e.count,
                synthetic: e.response_type & 0x80 != 0,
            }),
            XEvent::ButtonPress(e) => Some(Event::ButtonPress {
                window: WindowId(e.event),
                button: e.detail,
                state: Mods(u16::from(e.state)),
                x: i32::from(e.event_x),
                y: i32::from(e.event_y),
            }),
            XEvent::KeyPress(e) => Some(Event::KeyPress {
                window: WindowId(e.event),
                keycode: e.detail,
                state: Mods(u16::from(e.state)),
            }),
            XEvent::ClientMessage(e) if e.format == 32 => Some(Event::ClientMessage {
                window: WindowId(e.window),
                data: e.data.as_data32(),
            }),
            XEvent::MapNotify(_)
            | XEvent::UnmapNotify(_)
            | XEvent::ConfigureNotify(_)
            | XEvent::ReparentNotify(_)
            | XEvent::GravityNotify(_)
            | XEvent::CirculateNotify(_) => {
                tracing::trace!("structure change {e:?}");
                None
            }
            XEvent::DestroyNotify(e) => {
                tracing::debug!("window {} destroyed by the server", WindowId(e.window));
                None
            }
            XEvent::MappingNotify(_) => {
                self.inner.keymap_stale.store(true, Ordering::SeqCst);
                None
            }
            XEvent::Error(e) => {
                tracing::warn!("X error: {e:?}");
                None
            }
            e => {
                tracing::debug!("ignoring X event {e:?}");
                None
            }
        }
    }
}

/// Events selected on every shown canvas window.
fn input_mask() -> EventMask {
    EventMask::BUTTON_PRESS
        | EventMask::KEY_PRESS
        | EventMask::EXPOSURE
        | EventMask::STRUCTURE_NOTIFY
}

impl Backend for X11 {
    type Surface = X11Surface;

    fn screen_geometry(&self, monitor: Option<usize>) -> Result<Rect> {
        let root = self.inner.root_size.rect();
        let Some(i) = monitor else {
            return Ok(root);
        };
        self.with(|c| {
            let monitors = c
                .randr_get_monitors(self.inner.root, true)
                .map_err(Error::from)
                .and_then(|cookie| cookie.reply().map_err(Error::from));
            Ok(match monitors {
                Ok(r) => match r.monitors.get(i) {
                    Some(m) => Rect::new(
                        i32::from(m.x),
                        i32::from(m.y),
                        u32::from(m.width),
                        u32::from(m.height),
                    ),
                    None => {
                        tracing::warn!("monitor {i} not present, using the root window");
                        root
                    }
                },
                Err(e) => {
                    tracing::warn!("monitor query failed, using the root window: {e}");
                    root
                }
            })
        })
    }

    fn create_window(&self, spec: &WindowSpec) -> Result<WindowHandles> {
        self.with(|c| {
            let win = c.generate_id()?;
            let aux = CreateWindowAux::new()
                .background_pixel(0)
                .border_pixel(0)
                .colormap(self.inner.colormap);
            c.create_window(
                self.inner.depth,
                win,
                self.inner.root,
                clamp16(spec.position.x),
                clamp16(spec.position.y),
                dim16(spec.size.w)?,
                dim16(spec.size.h)?,
                0,
                WindowClass::INPUT_OUTPUT,
                self.inner.visual,
                &aux,
            )?;

            let window_type = self.atom(c, "_NET_WM_WINDOW_TYPE")?;
            let kind = self.atom(c, spec.window_type.atom_name())?;
            c.change_property32(PropMode::REPLACE, win, window_type, AtomEnum::ATOM, &[kind])?;

            let wm_state = self.atom(c, "_NET_WM_STATE")?;
            let states = spec
                .state
                .atom_names()
                .into_iter()
                .map(|n| self.atom(c, n))
                .collect::<Result<Vec<_>>>()?;
            c.change_property32(PropMode::REPLACE, win, wm_state, AtomEnum::ATOM, &states)?;

            let protocols = self.atom(c, "WM_PROTOCOLS")?;
            let delete = self.atom(c, "WM_DELETE_WINDOW")?;
            c.change_property32(PropMode::REPLACE, win, protocols, AtomEnum::ATOM, &[delete])?;

            Ok(WindowHandles {
                window: WindowId(win),
                close_token: delete,
            })
        })
    }

    fn create_surface(&self, window: WindowId, size: Expanse) -> Result<X11Surface> {
        let frame = Pixmap::new(size.w, size.h)
            .ok_or_else(|| Error::Setup(format!("cannot allocate {}x{} pixmap", size.w, size.h)))?;
        let gc = self.with(|c| {
            let gc = c.generate_id()?;
            c.create_gc(gc, window.0, &CreateGCAux::new())?;
            Ok(gc)
        })?;
        Ok(X11Surface {
            server: self.clone(),
            window: window.0,
            gc,
            frame,
            groups: vec![],
        })
    }

    fn select_input(&self, window: WindowId) -> Result<()> {
        self.with(|c| {
            let aux = ChangeWindowAttributesAux::new().event_mask(input_mask());
            c.change_window_attributes(window.0, &aux)?;
            Ok(())
        })
    }

    fn map_window(&self, window: WindowId) -> Result<()> {
        self.with(|c| {
            c.map_window(window.0)?;
            Ok(())
        })
    }

    fn unmap_window(&self, window: WindowId) -> Result<()> {
        self.with(|c| {
            c.unmap_window(window.0)?;
            Ok(())
        })
    }

    fn move_window(&self, window: WindowId, position: Point) -> Result<()> {
        self.with(|c| {
            let aux = ConfigureWindowAux::new()
                .x(position.x)
                .y(position.y);
            c.configure_window(window.0, &aux)?;
            Ok(())
        })
    }

    fn destroy_window(&self, window: WindowId) -> Result<()> {
        self.with(|c| {
            c.destroy_window(window.0)?;
            Ok(())
        })
    }

    fn next_event(&self) -> Result<Event> {
        loop {
            let e = self.with(|c| Ok(c.wait_for_event()?))?;
            if let Some(e) = self.translate(e) {
                return Ok(e);
            }
        }
    }

    fn poll_event(&self) -> Result<Option<Event>> {
        loop {
            let Some(e) = self.with(|c| Ok(c.poll_for_event()?))? else {
                return Ok(None);
            };
            if let Some(e) = self.translate(e) {
                return Ok(Some(e));
            }
        }
    }

    fn send_event(&self, window: WindowId, event: &Event) -> Result<()> {
        self.with(|c| {
            match *event {
                Event::Expose { count, .. } => {
                    let e = ExposeEvent {
                        response_type: xproto::EXPOSE_EVENT,
                        sequence: 0,
                        window: window.0,
                        x: 0,
                        y: 0,
                        width: 0,
                        height: 0,
                        count,
                    };
                    c.send_event(false, window.0, EventMask::EXPOSURE, e)?;
                }
                Event::ClientMessage { data, .. } => {
                    let protocols = self.atom(c, "WM_PROTOCOLS")?;
                    let e = ClientMessageEvent::new(32, window.0, protocols, data);
                    c.send_event(true, window.0, EventMask::NO_EVENT, e)?;
                }
                ref other => {
                    return Err(Error::Backend(format!(
                        "cannot send {} events",
                        other.class()
                    )));
                }
            }
            Ok(())
        })
    }

    fn lookup_key(&self, keycode: u8, state: Mods) -> u32 {
        if self.inner.keymap_stale.swap(false, Ordering::SeqCst)
            && let Err(e) = self.with(|c| self.refresh_keymap(c))
        {
            tracing::warn!("keyboard mapping refresh failed: {e}");
        }
        lock(&self.inner.keymap)
            .lookup(keycode, state)
            .unwrap_or_else(|| u32::from(keycode))
    }

    fn flush(&self) -> Result<()> {
        self.with(|c| Ok(c.flush()?))
    }

    fn close(&self) {
        let conn = self
            .inner
            .conn
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(c) = conn {
            if let Err(e) = c.free_colormap(self.inner.colormap).map(|_| ()).and_then(|()| c.flush()) {
                tracing::debug!("releasing colormap: {e}");
            }
            tracing::info!("X connection closed");
        }
    }
}

/// Clamp a coordinate to the protocol's 16-bit range.
fn clamp16(v: i32) -> i16 {
    i16::try_from(v).unwrap_or(if v < 0 { i16::MIN } else { i16::MAX })
}

/// A window dimension as the protocol's 16-bit value.
fn dim16(v: u32) -> Result<u16> {
    u16::try_from(v).map_err(|_| Error::Setup(format!("dimension {v} exceeds protocol limits")))
}

/// A window's drawing surface: a front pixmap holding the last committed
/// frame, plus any open drawing groups.
pub struct X11Surface {
    /// The connection.
    server: X11,
    /// Target window.
    window: xproto::Window,
    /// Graphics context for uploads.
    gc: xproto::Gcontext,
    /// The committed frame.
    frame: Pixmap,
    /// Open drawing groups, innermost last.
    groups: Vec<Pixmap>,
}

impl fmt::Debug for X11Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X11Surface")
            .field("window", &self.window)
            .field("width", &self.frame.width())
            .field("height", &self.frame.height())
            .finish()
    }
}

impl Surface for X11Surface {
    type Context = Pixmap;

    fn context(&mut self) -> &mut Pixmap {
        if self.groups.is_empty() {
            &mut self.frame
        } else {
            let top = self.groups.len() - 1;
            &mut self.groups[top]
        }
    }

    fn push_group(&mut self) {
        match Pixmap::new(self.frame.width(), self.frame.height()) {
            Some(p) => self.groups.push(p),
            // Same dimensions as the frame, which was allocated.
            None => self.groups.push(self.frame.clone()),
        }
    }

    fn pop_group(&mut self, commit: bool) {
        if let Some(group) = self.groups.pop()
            && commit
        {
            self.frame = group;
        }
    }

    fn paint(&mut self) -> Result<()> {
        let width = self.frame.width();
        let stride = width as usize * 4;
        // Premultiplied RGBA to the server's BGRA byte order.
        let mut data = self.frame.data().to_vec();
        for px in data.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        let w16 = dim16(width)?;
        self.server.with(|c| {
            let budget = c.maximum_request_bytes().saturating_sub(PUT_IMAGE_HEADER);
            let rows = (budget / stride).max(1);
            for (i, chunk) in data.chunks(stride * rows).enumerate() {
                let y = clamp16(i32::try_from(i * rows).unwrap_or(i32::MAX));
                let h = dim16(u32::try_from(chunk.len() / stride).unwrap_or(u32::MAX))?;
                c.put_image(
                    ImageFormat::Z_PIXMAP,
                    self.window,
                    self.gc,
                    w16,
                    h,
                    0,
                    y,
                    0,
                    self.server.inner.depth,
                    chunk,
                )?;
            }
            Ok(())
        })
    }
}

impl Drop for X11Surface {
    fn drop(&mut self) {
        let gc = self.gc;
        if let Err(e) = self.server.with(|c| {
            c.free_gc(gc)?;
            Ok(())
        }) {
            tracing::debug!("releasing graphics context: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keymap() -> Keymap {
        // Keycodes 10 and 11: 'a'/'A' and '1'/'!', two symbols each.
        Keymap {
            min_keycode: 10,
            per_keycode: 2,
            syms: vec![0x61, 0x41, 0x31, 0x21],
        }
    }

    #[test]
    fn keymap_lookup() {
        let k = keymap();
        assert_eq!(k.lookup(10, Mods::default()), Some(0x61));
        assert_eq!(k.lookup(10, Mods(Mods::SHIFT)), Some(0x41));
        assert_eq!(k.lookup(10, Mods(Mods::LOCK)), Some(0x41));
        assert_eq!(k.lookup(11, Mods(Mods::LOCK)), Some(0x31));
        assert_eq!(k.lookup(11, Mods(Mods::SHIFT)), Some(0x21));
        assert_eq!(k.lookup(9, Mods::default()), None);
        assert_eq!(k.lookup(12, Mods::default()), None);
    }

    #[test]
    fn selected_events() {
        let mask = u32::from(input_mask());
        for m in [
            EventMask::BUTTON_PRESS,
            EventMask::KEY_PRESS,
            EventMask::EXPOSURE,
            EventMask::STRUCTURE_NOTIFY,
        ] {
            assert_ne!(mask & u32::from(m), 0, "{m:?}");
        }
        assert_eq!(mask & u32::from(EventMask::POINTER_MOTION), 0);
    }

    #[test]
    fn coordinate_limits() {
        assert_eq!(clamp16(70_000), i16::MAX);
        assert_eq!(clamp16(-70_000), i16::MIN);
        assert_eq!(clamp16(-12), -12);
        assert!(dim16(65_536).is_err());
        assert_eq!(dim16(640).ok(), Some(640));
    }
}
