//! Error model (C7): a fixed taxonomy plus a bounded message buffer that
//! lives on a [`crate::conn::Connection`], and a separate ambient [`Error`]
//! enum used internally by fallible free functions before the state machine
//! folds them into an [`ErrorCode`].

use thiserror::Error;

/// Local error code taxonomy. `Ok` is the non-error resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ErrorCode {
    #[default]
    Ok,
    UserTooLong,
    SchemaTooLong,
    DnsError,
    ConnectError,
    BadProtocol,
    NoOldAuth,
    NoScramble,
    /// Scramble computation failed for a reason other than a missing
    /// challenge (which is [`ErrorCode::NoScramble`] instead). Not
    /// produced by this implementation's scramble arithmetic, which
    /// cannot fail once a 20-byte challenge is present, but kept in the
    /// taxonomy so callers can match on it exhaustively.
    BadScramble,
    AuthFailed,
    PacketOutOfSequence,
}

/// 512-byte fixed-capacity human-readable message buffer.
///
/// A plain `String` would work just as well at runtime, but a bounded
/// buffer keeps the connection's error state a fixed size and avoids an
/// unbounded allocation driven by untrusted server input.
#[derive(Clone)]
pub struct ErrorMessage {
    buf: [u8; Self::CAPACITY],
    len: usize,
}

impl ErrorMessage {
    pub const CAPACITY: usize = 512;

    pub const fn empty() -> Self {
        Self {
            buf: [0; Self::CAPACITY],
            len: 0,
        }
    }

    /// Overwrite the buffer, truncating at a UTF-8 char boundary if the
    /// message doesn't fit.
    pub fn set(&mut self, message: &str) {
        let mut end = message.len().min(Self::CAPACITY);
        while end > 0 && !message.is_char_boundary(end) {
            end -= 1;
        }
        self.buf[..end].copy_from_slice(&message.as_bytes()[..end]);
        self.len = end;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_str(&self) -> &str {
        // Safety of this invariant is enforced by `set`, which only ever
        // copies in valid UTF-8 up to a char boundary.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for ErrorMessage {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ErrorMessage").field(&self.as_str()).finish()
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Ambient internal error type for fallible codec/auth/frame operations,
/// folded into an [`ErrorCode`] + [`ErrorMessage`] pair at the point the
/// connection state machine catches it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of packet")]
    UnexpectedEof,
    #[error("malformed packet")]
    InvalidPacket,
    #[error("bad protocol version: {0}")]
    BadProtocol(u8),
    #[error("server does not support CLIENT_PROTOCOL_41")]
    NoOldAuth,
    #[error("no scramble available from server")]
    NoScramble,
    #[error("server rejected authentication: {message} (code {code}, state {sql_state})")]
    AuthFailed {
        code: u16,
        sql_state: String,
        message: String,
    },
    #[error("DNS resolution failed: {0}")]
    Dns(String),
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("packet out of sequence: expected {expected}, got {actual}")]
    OutOfSequence { expected: u8, actual: u8 },
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::UnexpectedEof | Error::InvalidPacket => ErrorCode::BadProtocol,
            Error::BadProtocol(_) => ErrorCode::BadProtocol,
            Error::NoOldAuth => ErrorCode::NoOldAuth,
            Error::NoScramble => ErrorCode::NoScramble,
            Error::AuthFailed { .. } => ErrorCode::AuthFailed,
            Error::Dns(_) => ErrorCode::DnsError,
            Error::Connect(_) => ErrorCode::ConnectError,
            Error::OutOfSequence { .. } => ErrorCode::PacketOutOfSequence,
        }
    }
}
