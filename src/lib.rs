//! Core async handshake/authentication engine for a MySQL-compatible wire
//! protocol: DNS resolution, non-blocking connect, packet framing, and the
//! `mysql_native_password` challenge-response handshake. Query execution,
//! prepared statements, pooling, and TLS are upper-layer concerns and out
//! of scope here — see `SPEC_FULL.md`.

pub mod auth;
pub mod buffer;
pub mod codec;
pub mod conn;
pub mod constant;
pub mod error;
mod frame;
mod io;

pub use conn::{ConnOption, Connection, Mode, Protocol, Status};
pub use error::{Error, ErrorCode};
