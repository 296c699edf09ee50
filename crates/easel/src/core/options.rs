use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    geom::{Expanse, Gravity, Point},
};

/// Window manager classification for a canvas window.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// An ordinary top-level window.
    Normal,
    /// A desktop-level window, drawn beneath everything else.
    #[default]
    Desktop,
    /// A dock or panel.
    Dock,
    /// A small undecorated window.
    Undecorated,
}

impl WindowType {
    /// Look up a window type by the numeric code used by the host binding.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Desktop),
            2 => Ok(Self::Dock),
            3 => Ok(Self::Undecorated),
            _ => Err(Error::Config(format!("invalid window type {code}"))),
        }
    }

    /// The EWMH `_NET_WM_WINDOW_TYPE` atom name for this type.
    pub fn atom_name(self) -> &'static str {
        match self {
            Self::Normal => "_NET_WM_WINDOW_TYPE_NORMAL",
            Self::Desktop => "_NET_WM_WINDOW_TYPE_DESKTOP",
            Self::Dock => "_NET_WM_WINDOW_TYPE_DOCK",
            Self::Undecorated => "_NET_WM_WINDOW_TYPE_TOOLBAR",
        }
    }
}

/// Window manager state hints, each toggled independently at creation.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct WmState {
    /// Visible on every workspace.
    pub sticky: bool,
    /// Stacked below other windows.
    pub keep_below: bool,
    /// Hidden from the taskbar.
    pub skip_taskbar: bool,
    /// Hidden from the pager.
    pub skip_pager: bool,
}

impl WmState {
    /// The `_NET_WM_STATE` atom names for the enabled hints, in a stable order.
    pub fn atom_names(&self) -> Vec<&'static str> {
        let mut v = vec![];
        if self.keep_below {
            v.push("_NET_WM_STATE_BELOW");
        }
        if self.sticky {
            v.push("_NET_WM_STATE_STICKY");
        }
        if self.skip_taskbar {
            v.push("_NET_WM_STATE_SKIP_TASKBAR");
        }
        if self.skip_pager {
            v.push("_NET_WM_STATE_SKIP_PAGER");
        }
        v
    }
}

/// Everything needed to construct a canvas. Field defaults match a desktop
/// widget: desktop window type, north-west gravity, one second refresh, and
/// every window manager hint enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanvasOptions {
    /// Logical x offset, relative to the gravity anchor.
    pub x: i32,
    /// Logical y offset, relative to the gravity anchor.
    pub y: i32,
    /// Width in pixels. Fixed after creation.
    pub width: u32,
    /// Height in pixels. Fixed after creation.
    pub height: u32,
    /// Refresh interval in milliseconds.
    pub interval: u64,
    /// Window type classification.
    pub window_type: WindowType,
    /// Anchor the offsets are measured from.
    pub gravity: Gravity,
    /// Show on all workspaces.
    pub sticky: bool,
    /// Keep below other windows.
    pub keep_below: bool,
    /// Skip the taskbar.
    pub skip_taskbar: bool,
    /// Skip the pager.
    pub skip_pager: bool,
    /// Monitor to place the canvas on. `None` uses the whole root window.
    pub monitor: Option<usize>,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            interval: 1000,
            window_type: WindowType::Desktop,
            gravity: Gravity::NorthWest,
            sticky: true,
            keep_below: true,
            skip_taskbar: true,
            skip_pager: true,
            monitor: None,
        }
    }
}

impl CanvasOptions {
    /// Options for a canvas at a logical offset with a fixed size, everything
    /// else defaulted.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Self::default()
        }
    }

    /// Parse options from a TOML document.
    pub fn from_toml(s: &str) -> Result<Self> {
        let opts: Self = toml::from_str(s)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Check that the options describe a creatable canvas.
    pub fn validate(&self) -> Result<()> {
        if self.size().is_empty() {
            return Err(Error::Config(format!(
                "canvas size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            return Err(Error::Config(format!(
                "canvas size {}x{} exceeds protocol limits",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Set the refresh interval in milliseconds.
    pub fn interval(mut self, ms: u64) -> Self {
        self.interval = ms;
        self
    }

    /// Set the window type.
    pub fn window_type(mut self, t: WindowType) -> Self {
        self.window_type = t;
        self
    }

    /// Set the gravity.
    pub fn gravity(mut self, g: Gravity) -> Self {
        self.gravity = g;
        self
    }

    /// Set the gravity from its numeric code, 1 (north-west) to 9
    /// (south-east).
    pub fn gravity_code(self, code: i64) -> Result<Self> {
        Ok(self.gravity(Gravity::from_code(code)?))
    }

    /// Set the window type from its numeric code.
    pub fn window_type_code(self, code: i64) -> Result<Self> {
        Ok(self.window_type(WindowType::from_code(code)?))
    }

    /// Toggle the sticky hint.
    pub fn sticky(mut self, v: bool) -> Self {
        self.sticky = v;
        self
    }

    /// Toggle the keep-below hint.
    pub fn keep_below(mut self, v: bool) -> Self {
        self.keep_below = v;
        self
    }

    /// Toggle the skip-taskbar hint.
    pub fn skip_taskbar(mut self, v: bool) -> Self {
        self.skip_taskbar = v;
        self
    }

    /// Toggle the skip-pager hint.
    pub fn skip_pager(mut self, v: bool) -> Self {
        self.skip_pager = v;
        self
    }

    /// Place the canvas on a specific monitor.
    pub fn monitor(mut self, index: usize) -> Self {
        self.monitor = Some(index);
        self
    }

    /// The logical offset.
    pub fn offset(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The canvas size.
    pub fn size(&self) -> Expanse {
        Expanse::new(self.width, self.height)
    }

    /// The window manager hints.
    pub fn wm_state(&self) -> WmState {
        WmState {
            sticky: self.sticky,
            keep_below: self.keep_below,
            skip_taskbar: self.skip_taskbar,
            skip_pager: self.skip_pager,
        }
    }
}
