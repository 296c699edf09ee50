//! Canvas lifecycle through the public API.

#[cfg(test)]
mod tests {
    use easel::{
        Atelier, CanvasOptions, Error, Handlers, Lifecycle, Result,
        backend::headless::{Headless, Op},
        geom::Expanse,
    };

    fn server() -> (Headless, Atelier<Headless>) {
        let h = Headless::new(Expanse::new(1920, 1080));
        let a = h.atelier();
        (h, a)
    }

    #[test]
    fn full_lifecycle() -> Result<()> {
        let (h, a) = server();
        let c = a.create_canvas(CanvasOptions::new(10, 10, 120, 80), Handlers::new())?;
        assert_eq!(c.state(), Lifecycle::Created);
        assert_eq!(c.size(), Expanse::new(120, 80));

        c.show()?;
        assert_eq!(c.state(), Lifecycle::Shown);

        c.dispose();
        assert_eq!(c.state(), Lifecycle::Disposing);

        let mut pump = a.attach().unwrap();
        pump.dispatch_pending()?;
        assert_eq!(c.state(), Lifecycle::Destroyed);
        assert!(a.is_empty());
        assert!(h.is_closed());
        Ok(())
    }

    #[test]
    fn dispose_destroys_exactly_once() -> Result<()> {
        let (h, a) = server();
        let keep = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new())?;
        let c = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new())?;
        c.show()?;
        c.dispose();
        c.dispose();
        h.click(c.window(), 1, 0, 0);
        h.expose(c.window());

        let mut pump = a.attach().unwrap();
        pump.dispatch_pending()?;
        assert_eq!(c.state(), Lifecycle::Destroyed);
        assert_eq!(h.count(|op| *op == Op::DestroyWindow(c.window())), 1);
        assert_eq!(h.count(|op| *op == Op::ReleaseSurface(c.window())), 1);
        assert_eq!(keep.state(), Lifecycle::Created);
        assert_eq!(a.len(), 1);

        // Explicit destroy after the loop already did it is a no-op.
        c.destroy()?;
        assert_eq!(h.count(|op| *op == Op::DestroyWindow(c.window())), 1);
        Ok(())
    }

    #[test]
    fn setup_failure_leaves_nothing_registered() -> Result<()> {
        let (h, a) = server();
        h.fail_next_window();
        let r = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new());
        assert!(matches!(r, Err(Error::Setup(_))));
        assert!(a.is_empty());
        assert!(!a.is_connected());

        // An existing canvas keeps the connection open through a failure.
        let c = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new())?;
        h.fail_next_surface();
        assert!(
            a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new())
                .is_err()
        );
        assert_eq!(a.len(), 1);
        assert!(a.is_connected());
        assert_eq!(c.state(), Lifecycle::Created);
        Ok(())
    }

    #[test]
    fn operations_after_destroy() -> Result<()> {
        let (_h, a) = server();
        let c = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new())?;
        c.destroy()?;
        assert!(matches!(c.show(), Err(Error::Destroyed(_))));
        assert!(matches!(c.move_to(1, 1), Err(Error::Destroyed(_))));
        c.dispose();
        assert_eq!(c.state(), Lifecycle::Destroyed);
        Ok(())
    }

    #[test]
    fn connection_failure_is_reported() {
        let a: Atelier<Headless> = Atelier::new(|| Err(Error::Connection("no display".into())));
        let r = a.create_canvas(CanvasOptions::new(0, 0, 10, 10), Handlers::new());
        assert!(matches!(r, Err(Error::Connection(_))));
        assert!(a.is_empty());
    }
}
