//! Thin wrapper over `mio::Poll`, the crate's readiness-notification
//! multiplexer. Grounded in the teacher's direct `mio` usage (`prelude.rs`
//! re-exports `Events`/`Interest`/`Poll`/`Token`) and in the original's
//! `Epoller` (register/modify/remove fd, wait with timeout, enumerate ready
//! events) — `mio` already gives a cross-platform version of that surface,
//! so this wrapper only narrows it to what the reactor needs.

use std::io;
use std::time::Duration;

use mio::{Events, Interest, Poll, Token, event::Event};

pub struct Multiplexer {
    poll: Poll,
    events: Events,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub hangup: bool,
    pub error: bool,
}

impl From<&Event> for ReadyEvent {
    fn from(e: &Event) -> Self {
        ReadyEvent {
            token: e.token(),
            readable: e.is_readable(),
            writable: e.is_writable(),
            hangup: e.is_read_closed() || e.is_write_closed(),
            error: e.is_error(),
        }
    }
}

impl Multiplexer {
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity),
        })
    }

    pub fn register(
        &self,
        source: &mut impl mio::event::Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn reregister(
        &self,
        source: &mut impl mio::event::Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister(&self, source: &mut impl mio::event::Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Blocks until at least one event is ready or `timeout` elapses.
    /// `timeout = None` blocks indefinitely (no live timers).
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<ReadyEvent>> {
        self.poll.poll(&mut self.events, timeout)?;
        Ok(self.events.iter().map(ReadyEvent::from).collect())
    }
}
