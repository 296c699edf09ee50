//! Gravity placement of canvas windows, end to end.

#[cfg(test)]
mod tests {
    use easel::{
        CanvasOptions, Handlers, Result, WindowType,
        backend::{
            WindowSpec,
            headless::{Headless, Op},
        },
        geom::{Expanse, Gravity, Point, Rect},
    };

    /// The creation request logged for the most recent window.
    fn last_spec(h: &Headless) -> Option<WindowSpec> {
        h.ops().into_iter().rev().find_map(|op| match op {
            Op::CreateWindow(_, spec) => Some(spec),
            _ => None,
        })
    }

    #[test]
    fn north_west_and_center() -> Result<()> {
        let h = Headless::new(Expanse::new(1920, 1080));
        let a = h.atelier();

        let nw = a.create_canvas(CanvasOptions::new(0, 0, 100, 100), Handlers::new())?;
        assert_eq!(nw.screen_position(), Point::new(0, 0));
        assert_eq!(last_spec(&h).map(|s| s.position), Some(Point::new(0, 0)));

        let center = a.create_canvas(
            CanvasOptions::new(0, 0, 100, 100).gravity(Gravity::Center),
            Handlers::new(),
        )?;
        assert_eq!(center.screen_position(), Point::new(910, 490));
        assert_eq!(last_spec(&h).map(|s| s.position), Some(Point::new(910, 490)));
        Ok(())
    }

    #[test]
    fn hints_reach_the_backend() -> Result<()> {
        let h = Headless::new(Expanse::new(1920, 1080));
        let a = h.atelier();
        let _c = a.create_canvas(
            CanvasOptions::new(5, 5, 50, 50)
                .window_type(WindowType::Dock)
                .sticky(false),
            Handlers::new(),
        )?;
        let spec = last_spec(&h).unwrap();
        assert_eq!(spec.window_type, WindowType::Dock);
        assert!(!spec.state.sticky);
        assert!(spec.state.keep_below);
        assert_eq!(spec.size, Expanse::new(50, 50));
        Ok(())
    }

    #[test]
    fn placement_on_a_monitor() -> Result<()> {
        let h = Headless::with_monitors(
            Expanse::new(3200, 1080),
            vec![Rect::new(0, 0, 1920, 1080), Rect::new(1920, 56, 1280, 1024)],
        );
        let a = h.atelier();
        let c = a.create_canvas(
            CanvasOptions::new(10, 10, 200, 100)
                .gravity(Gravity::SouthEast)
                .monitor(1),
            Handlers::new(),
        )?;
        assert_eq!(c.screen_position(), Point::new(1920 + 1070, 56 + 914));

        // Missing monitors fall back to the whole root window.
        let d = a.create_canvas(
            CanvasOptions::new(0, 0, 200, 100)
                .gravity(Gravity::SouthEast)
                .monitor(7),
            Handlers::new(),
        )?;
        assert_eq!(d.screen_position(), Point::new(3000, 980));
        Ok(())
    }

    #[test]
    fn move_keeps_gravity() -> Result<()> {
        let h = Headless::new(Expanse::new(1920, 1080));
        let a = h.atelier();
        let c = a.create_canvas(
            CanvasOptions::new(0, 0, 100, 100).gravity(Gravity::Center),
            Handlers::new(),
        )?;
        c.move_to(-10, 20)?;
        assert_eq!(c.position(), Point::new(-10, 20));
        assert_eq!(c.screen_position(), Point::new(900, 510));
        assert_eq!(c.gravity(), Gravity::Center);
        Ok(())
    }

    #[test]
    fn oversized_canvas_is_not_an_error() -> Result<()> {
        let h = Headless::new(Expanse::new(800, 600));
        let a = h.atelier();
        let c = a.create_canvas(
            CanvasOptions::new(0, 0, 1000, 700).gravity(Gravity::SouthEast),
            Handlers::new(),
        )?;
        assert_eq!(c.screen_position(), Point::new(-200, -100));
        Ok(())
    }
}
