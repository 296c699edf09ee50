use anyhow::{Result, anyhow};
use easel::{
    Atelier, Canvas, CanvasInfo, CanvasOptions, Handlers, KeyPress, backend::x11::X11,
    geom::{Gravity, Horizontal, Vertical},
};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

/// Keysym for a lowercase `q`.
const KEY_Q: u32 = 0x71;
/// Keysym for Escape.
const KEY_ESCAPE: u32 = 0xff1b;

/// Tile edge length in pixels.
pub const TILE: u32 = 96;
/// Distance from the anchor edges.
pub const MARGIN: i32 = 24;

/// Default tile options. The gravity is overridden per tile.
pub fn base() -> CanvasOptions {
    CanvasOptions::new(MARGIN, MARGIN, TILE, TILE).interval(5000)
}

/// Options for the tile anchored at `gravity`.
pub fn options(base: &CanvasOptions, gravity: Gravity) -> CanvasOptions {
    base.clone().gravity(gravity)
}

/// A distinct fill colour per gravity.
pub fn color(gravity: Gravity) -> Color {
    let hue = f32::from(gravity.code() - 1) / 9.0;
    // Cheap HSV sweep at full saturation.
    let (r, g, b) = match (hue * 6.0) as u32 {
        0 => (1.0, hue * 6.0, 0.0),
        1 => (2.0 - hue * 6.0, 1.0, 0.0),
        2 => (0.0, 1.0, hue * 6.0 - 2.0),
        3 => (0.0, 4.0 - hue * 6.0, 1.0),
        4 => (hue * 6.0 - 4.0, 0.0, 1.0),
        _ => (1.0, 0.0, 6.0 - hue * 6.0),
    };
    Color::from_rgba(r, g, b, 0.8).unwrap_or(Color::WHITE)
}

/// Fill the tile and mark the corner, edge or centre it is anchored to.
pub fn draw(pm: &mut Pixmap, gravity: Gravity) -> Result<()> {
    pm.fill(color(gravity));
    let (w, h) = (pm.width() as f32, pm.height() as f32);
    let (hx, vy) = (gravity.horizontal(), gravity.vertical());
    let x = match hx {
        Horizontal::Left => w * 0.2,
        Horizontal::Center => w * 0.5,
        Horizontal::Right => w * 0.8,
    };
    let y = match vy {
        Vertical::Top => h * 0.2,
        Vertical::Middle => h * 0.5,
        Vertical::Bottom => h * 0.8,
    };
    let dot = PathBuilder::from_circle(x, y, w.min(h) * 0.1)
        .ok_or_else(|| anyhow!("tile too small"))?;
    let mut paint = Paint::default();
    paint.anti_alias = true;
    paint.set_color(Color::WHITE);
    pm.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);

    let border = Rect::from_xywh(0.0, 0.0, w, 2.0).ok_or_else(|| anyhow!("tile too small"))?;
    paint.set_color_rgba8(0, 0, 0, 160);
    pm.fill_rect(border, &paint, Transform::identity(), None);
    Ok(())
}

/// Callbacks for one tile. `q` or Escape on any tile disposes them all.
pub fn handlers(gravity: Gravity, atelier: Atelier<X11>) -> Handlers<X11> {
    Handlers::new()
        .draw(move |pm: &mut Pixmap, _: &CanvasInfo| draw(pm, gravity))
        .on_key_pressed(move |c: &Canvas<X11>, k: KeyPress| {
            if k.key == KEY_Q || k.key == KEY_ESCAPE {
                tracing::info!("closing grid from {}", c.window());
                for tile in atelier.canvases() {
                    tile.dispose();
                }
            }
            Ok(())
        })
}

/// Create and show one tile per gravity, each a copy of `base`.
pub fn build(atelier: &Atelier<X11>, base: &CanvasOptions) -> Result<Vec<Canvas<X11>>> {
    let mut tiles = vec![];
    for g in Gravity::ALL {
        let tile = atelier.create_canvas(options(base, g), handlers(g, atelier.clone()))?;
        tile.show()?;
        tiles.push(tile);
    }
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colours_are_distinct() {
        let colours: Vec<_> = Gravity::ALL.iter().map(|g| color(*g).to_color_u8()).collect();
        for (i, a) in colours.iter().enumerate() {
            for b in &colours[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn marker_follows_gravity() -> Result<()> {
        let mut pm = Pixmap::new(100, 100).ok_or_else(|| anyhow!("pixmap"))?;
        draw(&mut pm, Gravity::SouthEast)?;
        let marker = pm.pixel(80, 80).ok_or_else(|| anyhow!("pixel"))?;
        let opposite = pm.pixel(20, 20).ok_or_else(|| anyhow!("pixel"))?;
        assert_eq!(marker.alpha(), 255);
        assert_ne!(marker, opposite);
        Ok(())
    }

    #[test]
    fn tiles_sit_inside_the_margin() {
        let o = options(&base(), Gravity::South);
        assert_eq!(o.gravity, Gravity::South);
        assert_eq!((o.x, o.y), (MARGIN, MARGIN));
        assert_eq!((o.width, o.height), (TILE, TILE));
    }
}
