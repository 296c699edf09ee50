//! Routing of one event to one canvas.
//!
//! Everything here runs on the event loop thread, which is the only thread
//! that touches a canvas surface.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::{
    backend::{Backend, Surface},
    canvas::Canvas,
    core::lock,
    error::{Error, Result},
    event::{ButtonPress, Event, KeyPress},
};

/// Handle one event addressed to `canvas`.
///
/// A canvas with a pending disposal is destroyed by whatever event reaches it
/// next. A failing host callback is logged and the canvas disposed; the error
/// is not returned, so other canvases keep being serviced. Errors from the
/// connection itself are returned.
pub fn dispatch<B: Backend>(canvas: &Canvas<B>, event: Event) -> Result<()> {
    if canvas.is_disposing() {
        return canvas.destroy();
    }
    match event {
        Event::ClientMessage { data, .. } => {
            if data[0] == canvas.close_token() {
                tracing::info!("close requested for canvas {}", canvas.window());
                canvas.destroy()
            } else {
                tracing::debug!("canvas {}: ignoring client message {:#x}", canvas.window(), data[0]);
                Ok(())
            }
        }
        Event::ButtonPress {
            button, state, x, y, ..
        } => {
            button_pressed(
                canvas,
                ButtonPress {
                    button,
                    mods: state,
                    x,
                    y,
                },
            );
            Ok(())
        }
        Event::KeyPress { keycode, state, .. } => {
            let key = canvas.cell().link.lookup_key(keycode, state);
            key_pressed(canvas, KeyPress { key, mods: state });
            Ok(())
        }
        Event::Expose {
            count: 0,
            synthetic,
            ..
        } => repaint(canvas, synthetic),
        e => {
            tracing::debug!("canvas {}: dropping {}", canvas.window(), e.class());
            Ok(())
        }
    }
}

/// Run a host callback, converting both errors and panics into a callback
/// failure for `canvas`.
fn guarded<B: Backend>(
    canvas: &Canvas<B>,
    f: impl FnOnce() -> anyhow::Result<()>,
) -> Result<()> {
    let message = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => format!("{e:#}"),
        Err(p) => p
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| p.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".into()),
    };
    Err(Error::Callback {
        window: canvas.window(),
        message,
    })
}

/// Log a callback failure and move the canvas to disposal.
fn isolate<B: Backend>(canvas: &Canvas<B>, e: &Error) {
    tracing::error!("{e}; disposing canvas");
    canvas.dispose();
}

/// Put a callback back into its slot unless the slot was refilled meanwhile.
fn restore<F>(slot: &mut Option<F>, f: F) {
    if slot.is_none() {
        *slot = Some(f);
    }
}

/// Deliver a button press to the bound callback, if any. The callback is
/// taken out of its slot for the call so it may use the canvas handle freely.
fn button_pressed<B: Backend>(canvas: &Canvas<B>, press: ButtonPress) {
    let cell = canvas.cell();
    let Some(mut f) = lock(&cell.handlers).button.take() else {
        return;
    };
    let r = guarded(canvas, || f(canvas, press));
    restore(&mut lock(&cell.handlers).button, f);
    if let Err(e) = r {
        isolate(canvas, &e);
    }
}

/// Deliver a key press to the bound callback, if any.
fn key_pressed<B: Backend>(canvas: &Canvas<B>, press: KeyPress) {
    let cell = canvas.cell();
    let Some(mut f) = lock(&cell.handlers).key.take() else {
        return;
    };
    let r = guarded(canvas, || f(canvas, press));
    restore(&mut lock(&cell.handlers).key, f);
    if let Err(e) = r {
        isolate(canvas, &e);
    }
}

/// Service the last expose of a batch. A pending redraw runs the draw
/// callback into a group, which replaces the frame only if the callback
/// succeeds. A server expose with no redraw pending repaints the last frame.
fn repaint<B: Backend>(canvas: &Canvas<B>, synthetic: bool) -> Result<()> {
    let cell = canvas.cell();
    let info = canvas.info();
    let mut guard = lock(&cell.surface);
    let Some(surface) = guard.as_mut() else {
        return Ok(());
    };

    if cell.pulse.take_redraw() {
        let draw = lock(&cell.handlers).draw.take();
        if let Some(mut f) = draw {
            surface.push_group();
            let r = guarded(canvas, || f(surface.context(), &info));
            surface.pop_group(r.is_ok());
            restore(&mut lock(&cell.handlers).draw, f);
            if let Err(e) = r {
                drop(guard);
                isolate(canvas, &e);
                return Ok(());
            }
        }
    } else if synthetic {
        tracing::debug!("canvas {}: redraw already serviced", info.window);
        return Ok(());
    }
    cell.link.submit(|_| surface.paint())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        atelier::Atelier,
        backend::headless::{Headless, Op, Sketch},
        canvas::{Handlers, Lifecycle},
        event::Mods,
        geom::Expanse,
        options::CanvasOptions,
    };

    fn setup(handlers: Handlers<Headless>) -> Result<(Headless, Atelier<Headless>, Canvas<Headless>)> {
        let h = Headless::new(Expanse::new(640, 480));
        let a = h.atelier();
        let c = a.create_canvas(CanvasOptions::new(0, 0, 32, 32), handlers)?;
        Ok((h, a, c))
    }

    fn counting_draw(n: Arc<AtomicUsize>) -> Handlers<Headless> {
        Handlers::new().draw(move |ctx: &mut Sketch, info| {
            let i = n.fetch_add(1, Ordering::SeqCst);
            ctx.draw(format!("frame {i} {}x{}", info.size.w, info.size.h));
            Ok(())
        })
    }

    #[test]
    fn redraws_coalesce() -> Result<()> {
        let n = Arc::new(AtomicUsize::new(0));
        let (h, _a, c) = setup(counting_draw(n.clone()))?;
        c.cell().pulse.mark_redraw();
        c.cell().pulse.mark_redraw();
        for _ in 0..3 {
            dispatch(&c, Event::redraw(c.window()))?;
        }
        assert_eq!(n.load(Ordering::SeqCst), 1);
        assert_eq!(h.count(|op| matches!(op, Op::Paint(_))), 1);
        assert_eq!(h.frame(c.window()).unwrap().ops(), ["frame 0 32x32".to_string()]);
        Ok(())
    }

    #[test]
    fn server_expose_repaints_without_drawing() -> Result<()> {
        let n = Arc::new(AtomicUsize::new(0));
        let (h, _a, c) = setup(counting_draw(n.clone()))?;
        c.cell().pulse.mark_redraw();
        dispatch(&c, Event::redraw(c.window()))?;
        dispatch(
            &c,
            Event::Expose {
                window: c.window(),
                count: 0,
                synthetic: false,
            },
        )?;
        // Not the last of its batch.
        dispatch(
            &c,
            Event::Expose {
                window: c.window(),
                count: 2,
                synthetic: false,
            },
        )?;
        assert_eq!(n.load(Ordering::SeqCst), 1);
        assert_eq!(h.count(|op| matches!(op, Op::Paint(_))), 2);
        Ok(())
    }

    #[test]
    fn failing_draw_disposes() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let n = calls.clone();
        let (h, _a, c) = setup(Handlers::new().draw(move |ctx: &mut Sketch, _| {
            n.fetch_add(1, Ordering::SeqCst);
            ctx.draw("partial");
            anyhow::bail!("out of ink")
        }))?;
        c.cell().pulse.mark_redraw();
        dispatch(&c, Event::redraw(c.window()))?;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.state(), Lifecycle::Disposing);
        assert_eq!(h.count(|op| matches!(op, Op::Paint(_))), 0);

        // The next event destroys it without drawing again.
        c.cell().pulse.mark_redraw();
        dispatch(&c, Event::redraw(c.window()))?;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.state(), Lifecycle::Destroyed);
        Ok(())
    }

    #[test]
    fn panicking_callback_is_isolated() -> Result<()> {
        let (_h, _a, c) = setup(Handlers::new().on_button_pressed(|_, _| panic!("boom")))?;
        dispatch(&c, Event::ButtonPress {
            window: c.window(),
            button: 1,
            state: Mods::default(),
            x: 0,
            y: 0,
        })?;
        assert_eq!(c.state(), Lifecycle::Disposing);
        Ok(())
    }

    #[test]
    fn input_reaches_callbacks() -> Result<()> {
        let seen = Arc::new(Mutex::new(vec![]));
        let (s1, s2) = (seen.clone(), seen.clone());
        let (h, _a, c) = setup(
            Handlers::new()
                .on_button_pressed(move |c, b| {
                    s1.lock().unwrap().push(format!("{} b{} {},{}", c.window(), b.button, b.x, b.y));
                    Ok(())
                })
                .on_key_pressed(move |_, k| {
                    s2.lock().unwrap().push(format!("k{} {}", k.key, k.mods.shift()));
                    Ok(())
                }),
        )?;
        h.set_key(24, 'q' as u32, 'Q' as u32);
        dispatch(&c, Event::ButtonPress {
            window: c.window(),
            button: 3,
            state: Mods::default(),
            x: 5,
            y: 6,
        })?;
        dispatch(&c, Event::KeyPress {
            window: c.window(),
            keycode: 24,
            state: Mods(Mods::SHIFT),
        })?;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                format!("{} b3 5,6", c.window()),
                format!("k{} true", 'Q' as u32),
            ]
        );
        Ok(())
    }

    #[test]
    fn unbound_and_unknown_are_ignored() -> Result<()> {
        let (_h, _a, c) = setup(Handlers::new())?;
        dispatch(&c, Event::ButtonPress {
            window: c.window(),
            button: 1,
            state: Mods::default(),
            x: 0,
            y: 0,
        })?;
        dispatch(&c, Event::KeyPress {
            window: c.window(),
            keycode: 9,
            state: Mods::default(),
        })?;
        dispatch(&c, Event::Other {
            window: c.window(),
            kind: 22,
        })?;
        dispatch(&c, Event::close_request(c.window(), c.close_token() + 1))?;
        assert_eq!(c.state(), Lifecycle::Created);
        Ok(())
    }

    #[test]
    fn close_token_destroys() -> Result<()> {
        let (h, a, c) = setup(Handlers::new())?;
        dispatch(&c, Event::close_request(c.window(), c.close_token()))?;
        assert_eq!(c.state(), Lifecycle::Destroyed);
        assert!(a.is_empty());
        assert!(h.is_closed());
        assert_eq!(h.count(|op| *op == Op::DestroyWindow(c.window())), 1);
        Ok(())
    }

    #[test]
    fn input_callback_may_dispose() -> Result<()> {
        let (_h, _a, c) = setup(Handlers::new().on_button_pressed(|c, _| {
            c.dispose();
            Ok(())
        }))?;
        dispatch(&c, Event::ButtonPress {
            window: c.window(),
            button: 1,
            state: Mods::default(),
            x: 0,
            y: 0,
        })?;
        assert_eq!(c.state(), Lifecycle::Disposing);
        dispatch(&c, Event::Other {
            window: c.window(),
            kind: 0,
        })?;
        assert_eq!(c.state(), Lifecycle::Destroyed);
        Ok(())
    }
}
