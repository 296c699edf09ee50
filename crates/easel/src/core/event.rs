//! Protocol events as seen by the dispatcher.
use std::fmt;

/// Opaque window handle assigned by the windowing server.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u32> for WindowId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Modifier and button mask attached to input events, in the protocol's raw
/// bit layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Mods(pub u16);

impl Mods {
    /// Shift is held.
    pub const SHIFT: u16 = 1 << 0;
    /// Caps lock is on.
    pub const LOCK: u16 = 1 << 1;
    /// Control is held.
    pub const CONTROL: u16 = 1 << 2;
    /// Mod1, usually Alt.
    pub const MOD1: u16 = 1 << 3;
    /// Mod2, usually Num lock.
    pub const MOD2: u16 = 1 << 4;
    /// Mod3.
    pub const MOD3: u16 = 1 << 5;
    /// Mod4, usually Super.
    pub const MOD4: u16 = 1 << 6;
    /// Mod5.
    pub const MOD5: u16 = 1 << 7;

    /// The raw mask.
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Is every bit in `mask` set?
    pub fn contains(self, mask: u16) -> bool {
        self.0 & mask == mask
    }

    /// Shift is active.
    pub fn shift(self) -> bool {
        self.contains(Self::SHIFT)
    }

    /// Control is active.
    pub fn ctrl(self) -> bool {
        self.contains(Self::CONTROL)
    }

    /// Alt is active.
    pub fn alt(self) -> bool {
        self.contains(Self::MOD1)
    }

    /// Super is active.
    pub fn logo(self) -> bool {
        self.contains(Self::MOD4)
    }
}

impl From<u16> for Mods {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// A pointer button press, as delivered to `on_button_pressed`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct ButtonPress {
    /// Button number, 1 being the primary button.
    pub button: u8,
    /// Modifier mask at the time of the press.
    pub mods: Mods,
    /// Pointer x, relative to the canvas.
    pub x: i32,
    /// Pointer y, relative to the canvas.
    pub y: i32,
}

/// A key press, resolved to a symbolic key code.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct KeyPress {
    /// Symbolic key code under the current keyboard mapping.
    pub key: u32,
    /// Modifier mask at the time of the press.
    pub mods: Mods,
}

/// An event received from, or submitted to, the windowing server.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Event {
    /// A region of the window needs repainting.
    Expose {
        /// Target window.
        window: WindowId,
        /// Number of expose events still to follow in this batch.
        count: u16,
        /// Sent by a client rather than generated by the server.
        synthetic: bool,
    },
    /// A pointer button went down over the window.
    ButtonPress {
        /// Target window.
        window: WindowId,
        /// Button number.
        button: u8,
        /// Modifier mask.
        state: Mods,
        /// Pointer x.
        x: i32,
        /// Pointer y.
        y: i32,
    },
    /// A key went down while the window had focus.
    KeyPress {
        /// Target window.
        window: WindowId,
        /// Physical key code.
        keycode: u8,
        /// Modifier mask.
        state: Mods,
    },
    /// A client message, such as a window manager close request.
    ClientMessage {
        /// Target window.
        window: WindowId,
        /// Message payload.
        data: [u32; 5],
    },
    /// Anything the dispatcher has no route for.
    Other {
        /// Target window.
        window: WindowId,
        /// Protocol event code.
        kind: u8,
    },
}

impl Event {
    /// The window this event is addressed to.
    pub fn window(&self) -> WindowId {
        match self {
            Self::Expose { window, .. }
            | Self::ButtonPress { window, .. }
            | Self::KeyPress { window, .. }
            | Self::ClientMessage { window, .. }
            | Self::Other { window, .. } => *window,
        }
    }

    /// A short name for the event class, for logging.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Expose { .. } => "expose",
            Self::ButtonPress { .. } => "button-press",
            Self::KeyPress { .. } => "key-press",
            Self::ClientMessage { .. } => "client-message",
            Self::Other { .. } => "other",
        }
    }

    /// A synthetic repaint request for a window.
    pub fn redraw(window: WindowId) -> Self {
        Self::Expose {
            window,
            count: 0,
            synthetic: true,
        }
    }

    /// A close-protocol message carrying the given token.
    pub fn close_request(window: WindowId, token: u32) -> Self {
        Self::ClientMessage {
            window,
            data: [token, 0, 0, 0, 0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mods() {
        let m = Mods(Mods::SHIFT | Mods::MOD1);
        assert!(m.shift());
        assert!(m.alt());
        assert!(!m.ctrl());
        assert!(!m.logo());
        assert_eq!(m.bits(), 9);
    }

    #[test]
    fn event_window() {
        let w = WindowId(0x2a);
        assert_eq!(Event::redraw(w).window(), w);
        assert_eq!(Event::close_request(w, 7).window(), w);
        assert_eq!(Event::close_request(w, 7).class(), "client-message");
        assert_eq!(format!("{w}"), "0x2a");
    }
}
