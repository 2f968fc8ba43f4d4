//! DNS resolution, run on a one-shot background thread so the reactor
//! thread never blocks on `getaddrinfo`. A `mio::Waker` signals the
//! reactor when the lookup finishes.

use crate::error::{Error, Result};
use mio::{Registry, Token, Waker};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

enum LookupState {
    Pending(mpsc::Receiver<std::io::Result<Vec<SocketAddr>>>),
    Done,
}

/// Resolves `host:port` on a background thread. Call [`Resolver::start`]
/// once, then [`Resolver::poll`] after the reactor reports the waker
/// token ready (or, to check without waiting on the reactor, at any
/// time — `poll` is non-blocking either way).
pub struct Resolver {
    waker: Arc<Waker>,
    state: LookupState,
}

impl Resolver {
    /// Register a wake-up source on `registry` under `token` and spawn
    /// the lookup thread for `host:port`.
    pub fn start(registry: &Registry, token: Token, host: String, port: u16) -> Result<Self> {
        let waker = Arc::new(Waker::new(registry, token).map_err(Error::Connect)?);
        let (tx, rx) = mpsc::channel();
        let thread_waker = Arc::clone(&waker);

        thread::Builder::new()
            .name("mysql-dns-resolve".into())
            .spawn(move || {
                let result = (host.as_str(), port)
                    .to_socket_addrs()
                    .map(|addrs| addrs.collect::<Vec<_>>());
                let _ = tx.send(result);
                // Best-effort: if the reactor already shut down the waker
                // can be dropped before this fires, which is fine — the
                // connection gave up on the lookup.
                let _ = thread_waker.wake();
            })
            .map_err(|e| Error::Dns(e.to_string()))?;

        Ok(Self {
            waker,
            state: LookupState::Pending(rx),
        })
    }

    /// Non-blocking check: `Ok(None)` means the lookup hasn't finished
    /// yet, `Ok(Some(addrs))` means it resolved (possibly to zero
    /// addresses, which the caller should treat as a DNS failure).
    pub fn poll(&mut self) -> Result<Option<Vec<SocketAddr>>> {
        match &self.state {
            LookupState::Done => Ok(None),
            LookupState::Pending(rx) => match rx.try_recv() {
                Ok(Ok(addrs)) => {
                    self.state = LookupState::Done;
                    Ok(Some(addrs))
                }
                Ok(Err(e)) => {
                    self.state = LookupState::Done;
                    Err(Error::Dns(e.to_string()))
                }
                Err(mpsc::TryRecvError::Empty) => Ok(None),
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.state = LookupState::Done;
                    Err(Error::Dns("resolver thread dropped without a result".into()))
                }
            },
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        let _ = &self.waker;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Poll, Token};
    use std::time::{Duration, Instant};

    #[test]
    fn resolves_loopback_address() {
        let poll = Poll::new().unwrap();
        let mut resolver =
            Resolver::start(poll.registry(), Token(0), "localhost".to_string(), 3306).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let addrs = loop {
            if let Some(addrs) = resolver.poll().unwrap() {
                break addrs;
            }
            assert!(Instant::now() < deadline, "resolver never finished");
            thread::sleep(Duration::from_millis(5));
        };
        assert!(addrs.iter().any(|a| a.ip().is_loopback()));
    }
}
