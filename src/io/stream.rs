//! Non-blocking TCP/Unix-domain stream, dispatched the way the sync
//! connection's buffered reader enum dispatches between transports.

use crate::error::{Error, Result};
use mio::net::{TcpStream as MioTcpStream, UnixStream as MioUnixStream};
use mio::{Interest, Registry, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::Path;

pub enum Stream {
    Tcp(MioTcpStream),
    Unix(MioUnixStream),
}

impl Stream {
    /// Begin a non-blocking TCP connect. The socket is writable once the
    /// connection completes (or fails), per the usual non-blocking
    /// connect contract.
    pub fn connect_tcp(addr: SocketAddr) -> Result<Self> {
        Ok(Self::Tcp(MioTcpStream::connect(addr).map_err(Error::Connect)?))
    }

    pub fn connect_unix(path: &Path) -> Result<Self> {
        Ok(Self::Unix(
            MioUnixStream::connect(path).map_err(Error::Connect)?,
        ))
    }

    pub fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> Result<()> {
        match self {
            Stream::Tcp(s) => crate::io::register(registry, s, token, interest),
            Stream::Unix(s) => crate::io::register(registry, s, token, interest),
        }
    }

    pub fn deregister(&mut self, registry: &Registry) -> Result<()> {
        match self {
            Stream::Tcp(s) => registry.deregister(s),
            Stream::Unix(s) => registry.deregister(s),
        }
        .map_err(Error::Connect)
    }

    /// `Ok(None)` on `WouldBlock` (no data yet); `Ok(Some(0))` on a clean
    /// peer shutdown.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let result = match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
        };
        match result {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Connect(e)),
        }
    }

    /// `Ok(None)` on `WouldBlock`; caller retries once the socket is
    /// writable again.
    pub fn try_write(&mut self, buf: &[u8]) -> Result<Option<usize>> {
        let result = match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
        };
        match result {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Connect(e)),
        }
    }

    /// Resolve a pending non-blocking connect: `Ok(true)` once the peer
    /// accepted (`SO_ERROR` is zero), `Err` if it was refused or failed.
    pub fn take_connect_error(&self) -> Result<()> {
        let err = match self {
            Stream::Tcp(s) => s.take_error(),
            Stream::Unix(s) => s.take_error(),
        }
        .map_err(Error::Connect)?;
        match err {
            Some(e) => Err(Error::Connect(e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll};
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn connects_and_round_trips_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();

        let mut client = Stream::connect_tcp(addr).unwrap();
        let mut poll = Poll::new().unwrap();
        let mut events = Events::with_capacity(4);
        client
            .register(poll.registry(), Token(1), Interest::WRITABLE)
            .unwrap();

        let mut server = None;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while server.is_none() {
            if let Ok((s, _)) = listener.accept() {
                s.set_nonblocking(false).unwrap();
                server = Some(s);
                break;
            }
            poll.poll(&mut events, Some(Duration::from_millis(10))).unwrap();
            assert!(std::time::Instant::now() < deadline);
        }
        let mut server = server.unwrap();
        client.take_connect_error().unwrap();

        server.write_all(b"ping").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 4];
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let n = loop {
            if let Some(n) = client.try_read(&mut buf).unwrap() {
                break n;
            }
            assert!(std::time::Instant::now() < deadline);
        };
        assert_eq!(&buf[..n], b"ping");
    }
}
