//! Connection state machine (C5): owns the socket, the read buffer, and
//! the phase the handshake is in. `poll()` is the only externally-driven
//! advancement primitive — everything else is either setup (`create`,
//! `set_option`) or a read-only projection (`status`, `error_code`).

mod options;

pub use options::{Mode, Options, Protocol};
pub use options::Option as ConnOption;

use crate::auth::{self, ResponseOptions};
use crate::buffer::ReadBuffer;
use crate::codec;
use crate::constant::{CapabilityFlags, ServerStatusFlags};
use crate::error::{Error, ErrorCode, ErrorMessage, Result};
use crate::frame::{FramePoll, FrameReader};
use crate::io::{Reactor, Resolver, Stream, RESOLVER_TOKEN, STREAM_TOKEN};
use mio::Interest;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{instrument, trace};

pub const MAX_USER_LEN: usize = 63;
pub const MAX_SCHEMA_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotConnected,
    ParameterError,
    Connecting,
    Idle,
    ConnectFailed,
}

/// Session state filled in as the handshake packet is parsed. Stays
/// zeroed until the HANDSHAKE packet is fully read, per the invariant
/// that the scramble is only meaningful after a complete parse.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub server_version: String,
    pub thread_id: u32,
    pub scramble: [u8; auth::SCRAMBLE_LEN],
    pub capabilities: CapabilityFlags,
    pub charset: u8,
    pub status_flags: ServerStatusFlags,
}

/// Single tagged variant carrying the connection's phase-specific state,
/// replacing a separate status + next-packet-type + implicit-phase
/// encoding: the handshake parser simply cannot run outside
/// `AwaitingHandshake`.
enum Phase {
    NotConnected,
    ParameterError,
    Resolving { resolver: Resolver },
    ConnectingSocket { stream: Stream },
    AwaitingHandshake { stream: Stream, buf: ReadBuffer, frame: FrameReader },
    AwaitingResponse { stream: Stream, buf: ReadBuffer, frame: FrameReader },
    /// `buf`/`frame` are kept alive (not read again) rather than dropped:
    /// an upper layer driving query execution past the handshake needs
    /// the same buffer and sequence-tracking state this core built up.
    #[allow(dead_code)]
    Idle { stream: Stream, buf: ReadBuffer, frame: FrameReader },
    ConnectFailed,
}

pub struct Connection {
    host: String,
    port: u16,
    user: String,
    password: String,
    schema: Option<String>,
    options: Options,
    session: SessionData,
    error_code: ErrorCode,
    error_message: ErrorMessage,
    phase: Phase,
    reactor: Option<Reactor>,
    dead: bool,
}

impl Connection {
    /// Validates `user`/`schema` bounds; a violation returns a
    /// [`Status::ParameterError`] connection that is still destroyable,
    /// per the "parameter errors are non-fatal but non-usable" taxonomy.
    pub fn create(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        schema: Option<String>,
    ) -> Self {
        let user = user.into();
        let mut error_code = ErrorCode::Ok;
        let mut error_message = ErrorMessage::empty();
        let mut phase = Phase::NotConnected;

        if user.len() > MAX_USER_LEN {
            error_code = ErrorCode::UserTooLong;
            error_message.set("user name exceeds 63 bytes");
            phase = Phase::ParameterError;
        } else if schema.as_deref().map(str::len).unwrap_or(0) > MAX_SCHEMA_LEN {
            error_code = ErrorCode::SchemaTooLong;
            error_message.set("schema name exceeds 63 bytes");
            phase = Phase::ParameterError;
        }

        Self {
            host: host.into(),
            port,
            user,
            password: password.into(),
            schema,
            options: Options::default(),
            session: SessionData::default(),
            error_code,
            error_message,
            phase,
            reactor: None,
            dead: false,
        }
    }

    pub fn set_option(&mut self, option: ConnOption, value: bool) {
        self.options.set(option, value);
    }

    pub fn get_option(&self, option: ConnOption) -> bool {
        self.options.get(option)
    }

    pub fn status(&self) -> Status {
        match &self.phase {
            Phase::NotConnected => Status::NotConnected,
            Phase::ParameterError => Status::ParameterError,
            Phase::Resolving { .. }
            | Phase::ConnectingSocket { .. }
            | Phase::AwaitingHandshake { .. }
            | Phase::AwaitingResponse { .. } => Status::Connecting,
            Phase::Idle { .. } => Status::Idle,
            Phase::ConnectFailed => Status::ConnectFailed,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn error_message(&self) -> &str {
        self.error_message.as_str()
    }

    pub fn session(&self) -> &SessionData {
        &self.session
    }

    /// Initiates the connection and runs one loop iteration. A connection
    /// not in [`Status::NotConnected`] returns its current status
    /// unchanged — this includes a repeated `connect()` call and a
    /// connection still in `ParameterError`.
    #[instrument(skip_all, fields(host = %self.host, port = self.port))]
    pub fn connect(&mut self) -> Status {
        if !matches!(self.phase, Phase::NotConnected) {
            return self.status();
        }

        let reactor = match Reactor::new() {
            Ok(r) => r,
            Err(e) => {
                self.fail(e);
                return self.status();
            }
        };
        self.reactor = Some(reactor);

        let protocol = self.resolve_protocol();
        let start = match protocol {
            Protocol::Uds => self.begin_unix_connect(),
            Protocol::Tcp | Protocol::Unknown => self.begin_resolve(),
        };
        if let Err(e) = start {
            self.fail(e);
            return self.status();
        }

        self.run_once(Some(Duration::ZERO));
        self.status()
    }

    /// Advances the loop: one iteration in [`Mode::Polling`], or to
    /// quiescence (`Status::Idle`/`ConnectFailed`) in [`Mode::Blocking`].
    /// Short-circuits without running the loop once the connection has
    /// reached a terminal or not-yet-started phase.
    #[instrument(skip_all)]
    pub fn poll(&mut self) -> Status {
        if self.dead || self.is_terminal() {
            return self.status();
        }
        match self.options.mode {
            Mode::Polling => self.run_once(Some(Duration::ZERO)),
            Mode::Blocking => {
                while !self.is_terminal() {
                    self.run_once(None);
                }
            }
        }
        self.status()
    }

    /// Closes the handle (if any) and drains the loop once so the
    /// reactor can reclaim it. Explicit counterpart to the `Drop` impl,
    /// for symmetry with spec.md's `destroy(Connection)` vocabulary;
    /// both paths run the same teardown, which is a no-op the second
    /// time (`self.dead` guards it).
    #[instrument(skip_all)]
    pub fn destroy(mut self) {
        self.teardown();
    }

    /// Marks the connection dead first so any in-flight callback observed
    /// during the drain is a no-op, per the "dead before draining"
    /// resolution of destroy re-entrancy. Idempotent.
    fn teardown(&mut self) {
        if self.dead {
            return;
        }
        self.dead = true;
        if let Some(reactor) = self.reactor.as_mut() {
            match &mut self.phase {
                Phase::ConnectingSocket { stream }
                | Phase::AwaitingHandshake { stream, .. }
                | Phase::AwaitingResponse { stream, .. }
                | Phase::Idle { stream, .. } => {
                    let _ = stream.deregister(reactor.registry());
                }
                _ => {}
            }
            let _ = reactor.poll(Some(Duration::ZERO));
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            Phase::NotConnected | Phase::ParameterError | Phase::ConnectFailed | Phase::Idle { .. }
        )
    }

    fn fail(&mut self, err: Error) {
        self.error_code = err.code();
        self.error_message.set(&err.to_string());
        self.phase = Phase::ConnectFailed;
    }

    /// `Unknown` resolves at connect time: port 0 selects UDS (`host` is
    /// then read as a socket path), any other port selects TCP.
    fn resolve_protocol(&self) -> Protocol {
        match self.options.protocol {
            Protocol::Unknown => {
                if self.port == 0 {
                    Protocol::Uds
                } else {
                    Protocol::Tcp
                }
            }
            explicit => explicit,
        }
    }

    fn reactor_registry(&self) -> Result<&mio::Registry> {
        self.reactor
            .as_ref()
            .map(Reactor::registry)
            .ok_or_else(|| Error::Connect(io::Error::other("reactor not bound before connect")))
    }

    fn begin_resolve(&mut self) -> Result<()> {
        let registry = self.reactor_registry()?;
        let resolver = Resolver::start(registry, RESOLVER_TOKEN, self.host.clone(), self.port)?;
        self.phase = Phase::Resolving { resolver };
        Ok(())
    }

    fn begin_unix_connect(&mut self) -> Result<()> {
        let mut stream = Stream::connect_unix(Path::new(&self.host))?;
        let registry = self.reactor_registry()?;
        stream.register(registry, STREAM_TOKEN, Interest::WRITABLE)?;
        self.phase = Phase::ConnectingSocket { stream };
        Ok(())
    }

    fn begin_tcp_connect(&mut self, addr: SocketAddr) -> Result<Phase> {
        let mut stream = Stream::connect_tcp(addr)?;
        let registry = self.reactor_registry()?;
        stream.register(registry, STREAM_TOKEN, Interest::WRITABLE)?;
        Ok(Phase::ConnectingSocket { stream })
    }

    /// Runs one readiness-poll/advance cycle. Any failure (reactor error or
    /// a phase-advance error) is folded into the connection's error state
    /// by [`Self::fail`] rather than propagated — callers observe it via
    /// `status()`/`error_code()`, per the terminal-status contract.
    fn run_once(&mut self, timeout: Option<Duration>) {
        let reactor = match self.reactor.as_mut() {
            Some(r) => r,
            None => {
                self.fail(Error::Connect(io::Error::other("reactor not bound before connect")));
                return;
            }
        };
        let ready: Vec<mio::Token> = match reactor.poll(timeout) {
            Ok(ready) => ready.collect(),
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        if let Err(e) = self.advance(&ready) {
            self.fail(e);
        }
    }

    /// Attempts to make progress in the current phase. On success the
    /// phase either stays put (still waiting on I/O) or moves forward;
    /// on error the connection is already left in [`Phase::ConnectFailed`]
    /// by the time this returns, since the old phase's resources were
    /// already taken by value.
    fn advance(&mut self, ready: &[mio::Token]) -> Result<()> {
        let phase = std::mem::replace(&mut self.phase, Phase::ConnectFailed);
        let next = match phase {
            Phase::Resolving { mut resolver } => match resolver.poll()? {
                Some(addrs) => {
                    let addr = addrs
                        .into_iter()
                        .find(SocketAddr::is_ipv4)
                        .ok_or_else(|| Error::Dns("no IPv4 address returned".into()))?;
                    trace!(%addr, "dns resolved");
                    self.begin_tcp_connect(addr)?
                }
                None => Phase::Resolving { resolver },
            },
            // The non-blocking connect only actually resolves (success or
            // failure) once the socket's WRITABLE registration fires; if it
            // hasn't yet, `take_connect_error` would read SO_ERROR == 0 both
            // "still in progress" and "just succeeded" and could advance a
            // tick early.
            Phase::ConnectingSocket { mut stream } if ready.contains(&STREAM_TOKEN) => {
                stream.take_connect_error()?;
                let registry = self.reactor_registry()?;
                stream.register(registry, STREAM_TOKEN, Interest::READABLE)?;
                trace!("tcp connected, awaiting handshake");
                Phase::AwaitingHandshake {
                    stream,
                    buf: ReadBuffer::new(),
                    frame: FrameReader::new(),
                }
            }
            Phase::AwaitingHandshake { mut stream, mut buf, mut frame } => {
                let closed = pump_read(&mut stream, &mut buf)?;
                match frame.poll(&mut buf)? {
                    FramePoll::Pending if closed => return Err(peer_closed()),
                    FramePoll::Pending => Phase::AwaitingHandshake { stream, buf, frame },
                    FramePoll::Frame { payload, .. } => {
                        self.handle_handshake_payload(&payload, &mut stream, frame.take_write_sequence())?;
                        Phase::AwaitingResponse { stream, buf, frame }
                    }
                }
            }
            Phase::AwaitingResponse { mut stream, mut buf, mut frame } => {
                let closed = pump_read(&mut stream, &mut buf)?;
                match frame.poll(&mut buf)? {
                    FramePoll::Pending if closed => return Err(peer_closed()),
                    FramePoll::Pending => Phase::AwaitingResponse { stream, buf, frame },
                    FramePoll::Frame { payload, .. } => match payload.first() {
                        Some(0x00) => {
                            trace!("authentication accepted");
                            Phase::Idle { stream, buf, frame }
                        }
                        Some(0xFF) => return Err(auth::parse_err_packet(&payload)?),
                        _ => return Err(Error::InvalidPacket),
                    },
                }
            }
            other => other,
        };
        self.phase = next;
        Ok(())
    }

    fn handle_handshake_payload(&mut self, payload: &[u8], stream: &mut Stream, response_seq: u8) -> Result<()> {
        if auth::is_immediate_failure(payload) {
            return Err(auth::parse_err_packet(payload)?);
        }
        let hs = auth::read_handshake(payload)?;
        self.session = SessionData {
            server_version: hs.server_version,
            thread_id: hs.thread_id,
            scramble: hs.scramble,
            capabilities: hs.capabilities,
            charset: hs.charset,
            status_flags: hs.status_flags,
        };

        let mut response = Vec::new();
        auth::write_handshake_response(
            &mut response,
            self.session.capabilities,
            ResponseOptions {
                found_rows: self.options.found_rows,
                interactive: self.options.interactive,
                multi_statements: self.options.multi_statements,
                auth_plugin: self.options.auth_plugin,
            },
            &self.user,
            &self.password,
            Some(&self.session.scramble),
            self.schema.as_deref(),
        )?;
        write_frame(stream, response_seq, &response)
    }
}

impl Drop for Connection {
    /// Runs the same teardown `destroy()` does, so a `Connection` that
    /// goes out of scope without an explicit `destroy()` call still
    /// drains the reactor instead of leaking a registered socket.
    fn drop(&mut self) {
        self.teardown();
    }
}

fn peer_closed() -> Error {
    Error::Connect(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed connection"))
}

/// Pumps bytes into `buf` until the socket would block or the peer
/// closes it. Returns whether the peer closed: a clean shutdown only
/// matters to the caller if, after this, a complete frame still isn't
/// sitting in `buf` — the peer may have closed right after flushing its
/// last write, and that already-buffered frame must still be parsed.
fn pump_read(stream: &mut Stream, buf: &mut ReadBuffer) -> Result<bool> {
    loop {
        buf.reserve(4096);
        let n = {
            let region = buf.writable_region();
            stream.try_read(region)?
        };
        match n {
            None => return Ok(false),
            Some(0) => return Ok(true),
            Some(n) => buf.advance_write(n),
        }
    }
}

/// Writes one frame (`[u24 length][u8 sequence][payload]`). Per §4.3,
/// write completion is not observed by the state machine; this still has
/// to push the bytes out, so it retries briefly on `WouldBlock` rather
/// than queuing for a later `poll()` — acceptable for handshake-sized
/// payloads that comfortably fit the kernel send buffer.
fn write_frame(stream: &mut Stream, sequence_id: u8, payload: &[u8]) -> Result<()> {
    let mut out = Vec::with_capacity(4 + payload.len());
    codec::write_u24(&mut out, payload.len() as u32);
    codec::write_u8(&mut out, sequence_id);
    out.extend_from_slice(payload);

    let mut written = 0;
    let mut retries = 0;
    while written < out.len() {
        match stream.try_write(&out[written..])? {
            Some(n) => written += n,
            None => {
                retries += 1;
                if retries > 1000 {
                    return Err(Error::Connect(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "socket not writable for handshake response",
                    )));
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_accepts_boundary_user_length() {
        let conn = Connection::create("localhost", 3306, "a".repeat(63), "", None);
        assert_eq!(conn.status(), Status::NotConnected);
    }

    #[test]
    fn create_rejects_oversize_user() {
        let conn = Connection::create("localhost", 3306, "a".repeat(64), "", None);
        assert_eq!(conn.status(), Status::ParameterError);
        assert_eq!(conn.error_code(), ErrorCode::UserTooLong);
    }

    #[test]
    fn create_rejects_oversize_schema() {
        let conn = Connection::create("localhost", 3306, "root", "", Some("s".repeat(64)));
        assert_eq!(conn.status(), Status::ParameterError);
        assert_eq!(conn.error_code(), ErrorCode::SchemaTooLong);
    }

    #[test]
    fn connect_on_parameter_error_returns_unchanged() {
        let mut conn = Connection::create("localhost", 3306, "a".repeat(64), "", None);
        assert_eq!(conn.connect(), Status::ParameterError);
    }

    #[test]
    fn poll_before_connect_short_circuits() {
        let mut conn = Connection::create("localhost", 3306, "root", "", None);
        assert_eq!(conn.poll(), Status::NotConnected);
    }

    #[test]
    fn dns_failure_on_unresolvable_host_sets_dns_error() {
        let mut conn = Connection::create("this-host-should-not-resolve.invalid", 3306, "root", "", None);
        conn.set_option(ConnOption::Polling, false); // blocking: run to quiescence
        assert_eq!(conn.connect(), Status::Connecting);
        let status = conn.poll();
        assert_eq!(status, Status::ConnectFailed);
        assert_eq!(conn.error_code(), ErrorCode::DnsError);
        assert!(!conn.error_message().is_empty());
    }

    #[test]
    fn destroy_is_a_one_shot_consuming_call() {
        let conn = Connection::create("localhost", 3306, "root", "", None);
        conn.destroy();
    }
}
