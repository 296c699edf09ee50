use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    backend::Backend,
    core::link::Link,
    error::{Error, Result},
    event::{Event, WindowId},
};

/// Upper bound on a single refresh thread sleep while a loop is running.
/// Disposal, interval changes and loop attachment also wake the thread
/// directly, so this only bounds how long a stale deadline can be slept on.
pub(crate) const SLICE: Duration = Duration::from_millis(100);

/// Flags and timing shared between a canvas and its refresh thread. This is
/// everything the refresh thread can reach: it never sees the surface.
#[derive(Debug)]
pub(crate) struct Pulse {
    /// Refresh interval in milliseconds.
    interval_ms: AtomicU64,
    /// Teardown has been requested.
    disposing: AtomicBool,
    /// A repaint has been requested and not yet serviced.
    needs_redraw: AtomicBool,
    /// The refresh thread should exit.
    stop: AtomicBool,
    /// The registry's loop flag.
    loop_running: Arc<AtomicBool>,
    /// Passes made by the refresh thread.
    passes: AtomicU64,
}

impl Pulse {
    /// Construct the shared flags for a new canvas.
    pub(crate) fn new(interval_ms: u64, loop_running: Arc<AtomicBool>) -> Self {
        Self {
            interval_ms: AtomicU64::new(interval_ms),
            disposing: AtomicBool::new(false),
            needs_redraw: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            loop_running,
            passes: AtomicU64::new(0),
        }
    }

    /// The refresh interval, never shorter than a millisecond.
    pub(crate) fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed).max(1))
    }

    /// The refresh interval in milliseconds, as set.
    pub(crate) fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    /// Change the refresh interval.
    pub(crate) fn set_interval_ms(&self, ms: u64) {
        self.interval_ms.store(ms, Ordering::Relaxed);
    }

    /// Flag the canvas for teardown. Returns false if it was already flagged.
    pub(crate) fn request_dispose(&self) -> bool {
        !self.disposing.swap(true, Ordering::SeqCst)
    }

    /// Has teardown been requested?
    pub(crate) fn is_disposing(&self) -> bool {
        self.disposing.load(Ordering::SeqCst)
    }

    /// Ask for a repaint.
    pub(crate) fn mark_redraw(&self) {
        self.needs_redraw.store(true, Ordering::SeqCst);
    }

    /// Is a repaint pending?
    pub(crate) fn needs_redraw(&self) -> bool {
        self.needs_redraw.load(Ordering::SeqCst)
    }

    /// Claim a pending repaint, clearing the request.
    pub(crate) fn take_redraw(&self) -> bool {
        self.needs_redraw.swap(false, Ordering::SeqCst)
    }

    /// Is the registry's event loop running?
    fn loop_running(&self) -> bool {
        self.loop_running.load(Ordering::SeqCst)
    }

    /// How many times the refresh thread has woken and checked its flags.
    #[cfg(test)]
    pub(crate) fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }
}

/// Deadline bookkeeping for one refresh thread.
#[derive(Debug)]
struct RefreshClock {
    /// When the next repaint is due.
    next: Instant,
    /// When the last repaint was requested.
    last: Option<Instant>,
}

impl RefreshClock {
    /// A clock whose first repaint is due immediately.
    fn new(now: Instant) -> Self {
        Self {
            next: now,
            last: None,
        }
    }

    /// Has the deadline passed?
    fn is_due(&self, now: Instant) -> bool {
        self.next <= now
    }

    /// Record a repaint request and advance the deadline by one interval. If
    /// the deadline is still behind, missed ticks are dropped rather than
    /// replayed in a burst.
    fn fire(&mut self, now: Instant, interval: Duration) {
        self.last = Some(now);
        self.next += interval;
        if self.next <= now {
            self.next = now + interval;
        }
    }

    /// Pull the deadline in after the interval shrinks.
    fn retime(&mut self, interval: Duration) {
        if let Some(last) = self.last {
            self.next = self.next.min(last + interval);
        }
    }

    /// How long to sleep before the next check. `None` while no loop is
    /// running: there is nothing to do until the thread is woken.
    fn wait(&self, now: Instant, active: bool) -> Option<Duration> {
        active.then(|| self.next.saturating_duration_since(now).min(SLICE))
    }
}

/// The background refresh thread of a shown canvas.
#[derive(Debug)]
pub(crate) struct Refresher {
    /// Handle for the refresh thread.
    handle: Option<thread::JoinHandle<Result<()>>>,
    /// Flags shared with the thread.
    pulse: Arc<Pulse>,
}

impl Refresher {
    /// Start the refresh thread for a window.
    pub(crate) fn spawn<B: Backend>(
        window: WindowId,
        pulse: Arc<Pulse>,
        link: Arc<Link<B>>,
    ) -> Result<Self> {
        let p = pulse.clone();
        let handle = thread::Builder::new()
            .name(format!("easel-refresh-{window}"))
            .spawn(move || refresh_loop(window, &p, &link))
            .map_err(|e| Error::Setup(format!("refresh thread: {e}")))?;
        Ok(Self {
            handle: Some(handle),
            pulse,
        })
    }

    /// Wake the thread so it re-reads its flags.
    pub(crate) fn wake(&self) {
        if let Some(h) = self.handle.as_ref() {
            h.thread().unpark();
        }
    }

    /// Has the thread exited?
    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Stop the thread and wait for it to exit, returning its outcome.
    pub(crate) fn stop(&mut self) -> Result<()> {
        self.pulse.stop.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(h) => {
                h.thread().unpark();
                h.join()
                    .map_err(|_| Error::Backend("refresh thread panicked".into()))?
            }
            None => Ok(()),
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("refresh thread exited with error: {e}");
        }
    }
}

/// Body of the refresh thread. Sets the redraw flag and asks the server to
/// deliver a synthetic expose when the interval elapses; the draw itself
/// always happens on the event loop thread. With no loop running the thread
/// parks until it is woken.
fn refresh_loop<B: Backend>(window: WindowId, pulse: &Pulse, link: &Link<B>) -> Result<()> {
    let mut clock = RefreshClock::new(Instant::now());
    let mut interval = pulse.interval();
    loop {
        pulse.passes.fetch_add(1, Ordering::Relaxed);
        if pulse.stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        if pulse.is_disposing() {
            tracing::debug!("refresh thread for {window} observed disposal");
            return Ok(());
        }
        let current = pulse.interval();
        if current != interval {
            interval = current;
            clock.retime(interval);
        }

        let now = Instant::now();
        let active = pulse.loop_running();
        if active && clock.is_due(now) {
            pulse.mark_redraw();
            link.send(window, &Event::redraw(window))?;
            clock.fire(now, interval);
        }
        match clock.wait(Instant::now(), active) {
            Some(d) => thread::park_timeout(d),
            None => thread::park(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock() {
        let now = Instant::now();
        let ms = Duration::from_millis;
        let mut c = RefreshClock::new(now);
        assert!(c.is_due(now));
        assert_eq!(c.wait(now, true), Some(Duration::ZERO));

        c.fire(now, ms(50));
        assert!(!c.is_due(now + ms(49)));
        assert!(c.is_due(now + ms(50)));
        assert_eq!(c.wait(now + ms(10), true), Some(ms(40)));

        // Long intervals are slept in slices.
        c.fire(now + ms(50), ms(10_000));
        assert_eq!(c.wait(now + ms(50), true), Some(SLICE));

        // Shrinking the interval pulls the deadline in.
        c.retime(ms(20));
        assert!(c.is_due(now + ms(70)));
    }

    #[test]
    fn idle_clock_sleeps_until_woken() {
        let now = Instant::now();
        let c = RefreshClock::new(now);
        // Due, but with no loop there is no deadline to wake for.
        assert!(c.is_due(now));
        assert_eq!(c.wait(now, false), None);
    }

    #[test]
    fn clock_skips_missed_ticks() {
        let now = Instant::now();
        let ms = Duration::from_millis;
        let mut c = RefreshClock::new(now);
        c.fire(now + ms(500), ms(100));
        assert!(!c.is_due(now + ms(550)));
        assert!(c.is_due(now + ms(600)));
    }

    #[test]
    fn pulse_flags() {
        let p = Pulse::new(0, Arc::new(AtomicBool::new(false)));
        assert_eq!(p.interval(), Duration::from_millis(1));
        assert_eq!(p.interval_ms(), 0);
        assert!(!p.take_redraw());
        p.mark_redraw();
        p.mark_redraw();
        assert!(p.needs_redraw());
        assert!(p.take_redraw());
        assert!(!p.take_redraw());
        assert!(p.request_dispose());
        assert!(!p.request_dispose());
        assert!(p.is_disposing());
    }
}
