//! I/O fabric (C3): a non-blocking reactor the connection state machine
//! drives from its own `poll()` call, plus DNS resolution and a TCP/Unix
//! stream abstraction built on it.
//!
//! `mio` gives a bare readiness-notification reactor with no task
//! executor attached, which is what a connection whose control flow is
//! "construct it, then have the caller repeatedly call `poll()`" needs;
//! an async runtime would instead want to own the polling loop itself.

mod resolve;
mod stream;

pub use resolve::Resolver;
pub use stream::Stream;

use crate::error::{Error, Result};
use mio::{Events, Interest, Poll, Token};
use std::time::Duration;

/// Token reserved for the resolver's wake-up registration; the connection
/// socket always gets token 1.
pub const RESOLVER_TOKEN: Token = Token(0);
pub const STREAM_TOKEN: Token = Token(1);

/// Wraps a `mio::Poll` plus its event buffer. One `Reactor` per
/// connection: this crate does not multiplex several connections onto a
/// shared reactor, matching the "one connection, one socket" scope.
pub struct Reactor {
    poll: Poll,
    events: Events,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        let poll = Poll::new().map_err(Error::Connect)?;
        Ok(Self {
            poll,
            events: Events::with_capacity(8),
        })
    }

    pub fn registry(&self) -> &mio::Registry {
        self.poll.registry()
    }

    /// Drive one round of readiness notification. `timeout` of `Some(Duration::ZERO)`
    /// gives the non-blocking `poll()` semantics the connection API needs;
    /// `None` blocks until something is ready.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<ReadyTokens<'_>> {
        self.poll.poll(&mut self.events, timeout).map_err(Error::Connect)?;
        Ok(ReadyTokens {
            events: self.events.iter(),
        })
    }
}

pub struct ReadyTokens<'a> {
    events: mio::event::Iter<'a>,
}

impl<'a> Iterator for ReadyTokens<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.events.next().map(|e| e.token())
    }
}

/// `register`/`reregister`/`deregister` with the given interest, ignoring
/// the common "already registered" race that a retried connect can hit.
pub fn register(registry: &mio::Registry, source: &mut impl mio::event::Source, token: Token, interest: Interest) -> Result<()> {
    match registry.register(source, token, interest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            registry.reregister(source, token, interest)
        }
        Err(e) => Err(e),
    }
    .map_err(Error::Connect)
}
