use std::f32::consts::TAU;

use anyhow::{Result, anyhow};
use chrono::{Local, Timelike};
use easel::{
    ButtonPress, Canvas, CanvasInfo, CanvasOptions, Handlers, backend::x11::X11, geom::Gravity,
};
use tiny_skia::{Color, FillRule, LineCap, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// Default placement: 200px square, 40px in from the top right corner.
pub fn options() -> CanvasOptions {
    CanvasOptions::new(40, 40, 200, 200)
        .gravity(Gravity::NorthEast)
        .interval(1000)
}

/// Hand angles in radians, clockwise from twelve o'clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hands {
    /// Hour hand.
    pub hour: f32,
    /// Minute hand.
    pub minute: f32,
    /// Second hand.
    pub second: f32,
}

impl Hands {
    /// Hand positions for a wall clock time. Hours wrap at twelve.
    pub fn at(hour: u32, minute: u32, second: u32) -> Self {
        let s = (second % 60) as f32;
        let m = (minute % 60) as f32 + s / 60.0;
        let h = (hour % 12) as f32 + m / 60.0;
        Self {
            hour: h / 12.0 * TAU,
            minute: m / 60.0 * TAU,
            second: s / 60.0 * TAU,
        }
    }

    /// Hand positions for the local time right now.
    pub fn now() -> Self {
        let t = Local::now();
        Self::at(t.hour(), t.minute(), t.second())
    }
}

/// The point `len` along a hand at `angle` from `(cx, cy)`.
fn tip(cx: f32, cy: f32, angle: f32, len: f32) -> (f32, f32) {
    (cx + len * angle.sin(), cy - len * angle.cos())
}

/// Stroke a single hand.
fn hand(pm: &mut Pixmap, angle: f32, len: f32, width: f32, color: Color) -> Result<()> {
    let (cx, cy) = (pm.width() as f32 / 2.0, pm.height() as f32 / 2.0);
    let (x, y) = tip(cx, cy, angle, len);
    let mut pb = PathBuilder::new();
    pb.move_to(cx, cy);
    pb.line_to(x, y);
    let path = pb.finish().ok_or_else(|| anyhow!("degenerate hand"))?;

    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    let stroke = Stroke {
        width,
        line_cap: LineCap::Round,
        ..Stroke::default()
    };
    pm.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    Ok(())
}

/// Render a clock face showing `hands`, scaled to the pixmap.
pub fn draw(pm: &mut Pixmap, hands: Hands) -> Result<()> {
    pm.fill(Color::TRANSPARENT);
    let (cx, cy) = (pm.width() as f32 / 2.0, pm.height() as f32 / 2.0);
    let r = cx.min(cy) * 0.95;

    let face = PathBuilder::from_circle(cx, cy, r).ok_or_else(|| anyhow!("canvas too small"))?;
    let mut paint = Paint::default();
    paint.anti_alias = true;
    paint.set_color_rgba8(20, 24, 32, 200);
    pm.fill_path(&face, &paint, FillRule::Winding, Transform::identity(), None);

    paint.set_color_rgba8(200, 200, 210, 255);
    let ticks = Stroke {
        width: r * 0.03,
        ..Stroke::default()
    };
    for i in 0..12 {
        let a = i as f32 / 12.0 * TAU;
        let (x0, y0) = tip(cx, cy, a, r * 0.85);
        let (x1, y1) = tip(cx, cy, a, r * 0.95);
        let mut pb = PathBuilder::new();
        pb.move_to(x0, y0);
        pb.line_to(x1, y1);
        if let Some(p) = pb.finish() {
            pm.stroke_path(&p, &paint, &ticks, Transform::identity(), None);
        }
    }

    let light = Color::from_rgba8(235, 235, 240, 255);
    hand(pm, hands.hour, r * 0.5, r * 0.07, light)?;
    hand(pm, hands.minute, r * 0.75, r * 0.05, light)?;
    hand(pm, hands.second, r * 0.85, r * 0.02, Color::from_rgba8(230, 80, 60, 255))?;
    Ok(())
}

/// Callbacks for a clock canvas: draw the current time, close on a left click.
pub fn handlers() -> Handlers<X11> {
    Handlers::new()
        .draw(|pm: &mut Pixmap, info: &CanvasInfo| {
            tracing::trace!("clock redraw on {}", info.window);
            draw(pm, Hands::now())
        })
        .on_button_pressed(|c: &Canvas<X11>, b: ButtonPress| {
            if b.button == 1 {
                tracing::info!("clock {} dismissed", c.window());
                c.dispose();
            }
            Ok(())
        })
}
