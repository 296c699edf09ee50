use std::sync::Mutex;

use crate::{
    backend::Backend,
    core::lock,
    error::Result,
    event::{Event, Mods, WindowId},
};

/// The one shared connection to the windowing server. Every request goes
/// through the connection lock so refresh threads and the event loop never
/// interleave protocol traffic. The blocking wait for the next event is the
/// only call made without the lock.
pub(crate) struct Link<B: Backend> {
    /// The connection.
    backend: B,
    /// Serializes requests.
    guard: Mutex<()>,
}

impl<B: Backend> Link<B> {
    /// Wrap an open connection.
    pub(crate) fn new(backend: B) -> Self {
        Self {
            backend,
            guard: Mutex::new(()),
        }
    }

    /// Run a batch of requests under the connection lock and flush them.
    pub(crate) fn submit<R>(&self, f: impl FnOnce(&B) -> Result<R>) -> Result<R> {
        let _g = lock(&self.guard);
        let r = f(&self.backend)?;
        self.backend.flush()?;
        Ok(r)
    }

    /// Submit a synthetic event and flush it immediately.
    pub(crate) fn send(&self, window: WindowId, event: &Event) -> Result<()> {
        self.submit(|b| b.send_event(window, event))
    }

    /// Block for the next event, without holding the connection lock.
    pub(crate) fn next_event(&self) -> Result<Event> {
        self.backend.next_event()
    }

    /// Take an already-queued event, if any.
    pub(crate) fn poll_event(&self) -> Result<Option<Event>> {
        let _g = lock(&self.guard);
        self.backend.poll_event()
    }

    /// Resolve a physical key under the current keyboard mapping.
    pub(crate) fn lookup_key(&self, keycode: u8, state: Mods) -> u32 {
        let _g = lock(&self.guard);
        self.backend.lookup_key(keycode, state)
    }

    /// Close the connection.
    pub(crate) fn close(&self) {
        let _g = lock(&self.guard);
        self.backend.close();
    }
}
