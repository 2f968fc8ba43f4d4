//! Authentication (C6): parses the server's initial handshake packet,
//! computes the `mysql_native_password` scramble, and builds the client's
//! handshake response. Only the default challenge-response mechanism is
//! implemented; `caching_sha2_password` and auth-switch are out of scope.

use crate::buffer::DEFAULT_CAPACITY;
use crate::codec;
use crate::constant::{CapabilityFlags, ServerStatusFlags, CAPABILITIES_ALWAYS_ENABLED};
use crate::error::{Error, Result};

pub const SCRAMBLE_LEN: usize = 20;
pub const MAX_SERVER_VERSION_LEN: usize = 32;

/// Parsed server handshake (Protocol::HandshakeV10).
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub thread_id: u32,
    pub scramble: [u8; SCRAMBLE_LEN],
    pub capabilities: CapabilityFlags,
    pub charset: u8,
    pub status_flags: ServerStatusFlags,
}

/// Recognize the immediate-auth-failure marker: the HANDSHAKE step's
/// payload can be an ERR_Packet instead of a real handshake, in which
/// case the connection should be treated as failed immediately.
pub fn is_immediate_failure(payload: &[u8]) -> bool {
    payload.first() == Some(&0xFF)
}

/// Parse an ERR_Packet payload (`0xFF` + error code + `#` + 5-byte SQL
/// state + message) into [`Error::AuthFailed`].
pub fn parse_err_packet(payload: &[u8]) -> Result<Error> {
    let (header, data) = codec::read_u8(payload)?;
    if header != 0xFF {
        return Err(Error::InvalidPacket);
    }
    let (code, data) = codec::read_u16(data)?;
    let (_marker, data) = codec::read_fixed(data, 1)?; // '#'
    let (sql_state, data) = codec::read_fixed(data, 5)?;
    Ok(Error::AuthFailed {
        code,
        sql_state: String::from_utf8_lossy(sql_state).into_owned(),
        message: String::from_utf8_lossy(data).into_owned(),
    })
}

/// Parse the server's initial handshake packet.
pub fn read_handshake(payload: &[u8]) -> Result<ServerHandshake> {
    let (protocol_version, data) = codec::read_u8(payload)?;
    if protocol_version != 10 {
        return Err(Error::BadProtocol(protocol_version));
    }

    // Null-terminated server version, bounded to avoid an unbounded scan.
    let (version_bytes, data) =
        codec::read_null_terminated_bounded(data, MAX_SERVER_VERSION_LEN)?;
    let server_version = String::from_utf8_lossy(version_bytes).into_owned();

    // 4-byte thread id.
    let (thread_id, data) = codec::read_u32(data)?;

    // 8 bytes of scramble, then skip 1 filler byte.
    let (scramble_part1, data) = codec::read_fixed(data, 8)?;
    let (_filler, data) = codec::read_u8(data)?;

    // 2-byte capability bitmask (lower word only); require PROTOCOL_41.
    let (cap_lower, data) = codec::read_u16(data)?;
    let capabilities = CapabilityFlags::from_bits_truncate(cap_lower as u32);
    if !capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        return Err(Error::NoOldAuth);
    }

    // 1-byte charset.
    let (charset, data) = codec::read_u8(data)?;

    // 2-byte status flags.
    let (status_flags, data) = codec::read_u16(data)?;
    let status_flags = ServerStatusFlags::from_bits_truncate(status_flags);

    // Skip 13 filler bytes (includes the unused scramble-length field).
    let (_filler, data) = codec::read_fixed(data, 13)?;

    // 12 more scramble bytes (20 total) and a terminator.
    let (scramble_part2, data) = codec::read_fixed(data, 12)?;
    let (_terminator, _data) = codec::read_u8(data)?;
    // Trailing auth-plugin name is ignored in this version.

    let mut scramble = [0u8; SCRAMBLE_LEN];
    scramble[..8].copy_from_slice(scramble_part1);
    scramble[8..].copy_from_slice(scramble_part2);

    Ok(ServerHandshake {
        protocol_version,
        server_version,
        thread_id,
        scramble,
        capabilities,
        charset,
        status_flags,
    })
}

/// `mysql_native_password`: `SHA1(password) XOR SHA1(scramble ++ SHA1(SHA1(password)))`.
pub fn scramble_password(password: &str, scramble: &[u8; SCRAMBLE_LEN]) -> [u8; SCRAMBLE_LEN] {
    let stage1 = codec::sha1(password.as_bytes());
    let stage2 = codec::sha1(&stage1);

    let mut hasher_input = Vec::with_capacity(SCRAMBLE_LEN + stage2.len());
    hasher_input.extend_from_slice(scramble);
    hasher_input.extend_from_slice(&stage2);
    let token_hash = codec::sha1(&hasher_input);

    let mut result = [0u8; SCRAMBLE_LEN];
    for i in 0..SCRAMBLE_LEN {
        result[i] = stage1[i] ^ token_hash[i];
    }
    result
}

/// Options that influence the client capability bits sent in the
/// handshake response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseOptions {
    pub found_rows: bool,
    pub interactive: bool,
    pub multi_statements: bool,
    pub auth_plugin: bool,
}

/// Build the client's HandshakeResponse41 payload.
pub fn write_handshake_response(
    out: &mut Vec<u8>,
    server_capabilities: CapabilityFlags,
    options: ResponseOptions,
    user: &str,
    password: &str,
    scramble: Option<&[u8; SCRAMBLE_LEN]>,
    schema: Option<&str>,
) -> Result<()> {
    let mut capabilities = server_capabilities
        .intersection(CAPABILITIES_ALWAYS_ENABLED.union(CapabilityFlags::CLIENT_CONNECT_WITH_DB));
    if options.found_rows {
        capabilities |= CapabilityFlags::CLIENT_FOUND_ROWS;
    }
    if options.interactive {
        capabilities |= CapabilityFlags::CLIENT_INTERACTIVE;
    }
    if options.multi_statements {
        capabilities |= CapabilityFlags::CLIENT_MULTI_STATEMENTS;
    }
    if options.auth_plugin {
        capabilities |= CapabilityFlags::CLIENT_PLUGIN_AUTH;
    }
    if schema.is_some() {
        capabilities |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
    }

    codec::write_u32(out, capabilities.bits());
    codec::write_u32(out, DEFAULT_CAPACITY as u32);
    codec::write_u8(out, 0); // charset: server default
    out.extend_from_slice(&[0u8; 23]); // reserved

    codec::write_null_terminated(out, user);

    if password.is_empty() {
        codec::write_u8(out, 0);
    } else {
        let scramble = scramble.ok_or(Error::NoScramble)?;
        let token = scramble_password(password, scramble);
        codec::write_u8(out, SCRAMBLE_LEN as u8);
        out.extend_from_slice(&token);
    }

    if let Some(schema) = schema {
        codec::write_null_terminated(out, schema);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_handshake_payload() -> Vec<u8> {
        let mut p = Vec::new();
        p.push(0x0a); // protocol version
        p.extend_from_slice(b"5.6.0\0"); // server version
        p.extend_from_slice(&1u32.to_le_bytes()); // thread id
        p.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]); // scramble part1
        p.push(0); // filler
        p.extend_from_slice(&0xF7FFu16.to_le_bytes()); // capabilities (PROTOCOL_41 set)
        p.push(0x08); // charset
        p.extend_from_slice(&0x0200u16.to_le_bytes()); // status flags
        p.extend_from_slice(&[0u8; 13]); // filler incl. unused scramble len
        p.extend_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20]); // scramble part2
        p.push(0); // terminator
        p
    }

    #[test]
    fn parses_happy_path_handshake() {
        let hs = read_handshake(&sample_handshake_payload()).unwrap();
        assert_eq!(hs.protocol_version, 10);
        assert_eq!(hs.thread_id, 1);
        assert!(hs.server_version.starts_with("5.6.0"));
        assert_eq!(hs.scramble, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20]);
        assert!(hs.capabilities.contains(CapabilityFlags::CLIENT_PROTOCOL_41));
    }

    #[test]
    fn bad_protocol_version_rejected() {
        let mut p = sample_handshake_payload();
        p[0] = 9;
        assert!(matches!(read_handshake(&p), Err(Error::BadProtocol(9))));
    }

    #[test]
    fn missing_protocol_41_rejected() {
        let mut p = sample_handshake_payload();
        // zero out the capability word (bytes 18..20 given this layout)
        let cap_offset = 1 + 6 + 4 + 8 + 1;
        p[cap_offset] = 0;
        p[cap_offset + 1] = 0;
        assert!(matches!(read_handshake(&p), Err(Error::NoOldAuth)));
    }

    #[test]
    fn immediate_failure_marker_detected() {
        assert!(is_immediate_failure(&[0xFF, 0, 0]));
        assert!(!is_immediate_failure(&[0x0a, 0, 0]));
    }

    #[test]
    fn scramble_is_deterministic_and_matches_server_side_reference() {
        let scramble: [u8; 20] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];
        let token = scramble_password("pw", &scramble);

        // Reference computation per spec.md §8 scenario 1, independently
        // re-derived (not by calling scramble_password again).
        let stage1 = codec::sha1(b"pw");
        let stage2 = codec::sha1(&stage1);
        let mut buf = scramble.to_vec();
        buf.extend_from_slice(&stage2);
        let token_hash = codec::sha1(&buf);
        let mut expected = [0u8; 20];
        for i in 0..20 {
            expected[i] = stage1[i] ^ token_hash[i];
        }
        assert_eq!(token, expected);

        // determinism
        assert_eq!(token, scramble_password("pw", &scramble));
    }

    #[test]
    fn empty_password_writes_single_zero_byte() {
        let mut out = Vec::new();
        write_handshake_response(
            &mut out,
            CapabilityFlags::CLIENT_PROTOCOL_41,
            ResponseOptions::default(),
            "root",
            "",
            None,
            None,
        )
        .unwrap();
        // capabilities(4) + max_packet(4) + charset(1) + reserved(23) + "root\0"(5)
        let password_field_offset = 4 + 4 + 1 + 23 + 5;
        assert_eq!(out[password_field_offset], 0);
    }

    #[test]
    fn password_without_scramble_fails() {
        let mut out = Vec::new();
        let err = write_handshake_response(
            &mut out,
            CapabilityFlags::CLIENT_PROTOCOL_41,
            ResponseOptions::default(),
            "root",
            "pw",
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoScramble));
    }

    #[test]
    fn options_set_their_capability_bits_when_server_advertises_them() {
        let server_capabilities = CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_FOUND_ROWS
            | CapabilityFlags::CLIENT_INTERACTIVE
            | CapabilityFlags::CLIENT_MULTI_STATEMENTS
            | CapabilityFlags::CLIENT_PLUGIN_AUTH;
        let options = ResponseOptions {
            found_rows: true,
            interactive: true,
            multi_statements: true,
            auth_plugin: true,
        };
        let mut out = Vec::new();
        write_handshake_response(&mut out, server_capabilities, options, "root", "", None, None).unwrap();
        let sent = CapabilityFlags::from_bits_truncate(u32::from_le_bytes(out[0..4].try_into().unwrap()));
        assert!(sent.contains(CapabilityFlags::CLIENT_FOUND_ROWS));
        assert!(sent.contains(CapabilityFlags::CLIENT_INTERACTIVE));
        assert!(sent.contains(CapabilityFlags::CLIENT_MULTI_STATEMENTS));
        assert!(sent.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH));
    }

    #[test]
    fn schema_appends_null_terminated_name() {
        let mut out = Vec::new();
        write_handshake_response(
            &mut out,
            CapabilityFlags::CLIENT_PROTOCOL_41,
            ResponseOptions::default(),
            "root",
            "",
            None,
            Some("mydb"),
        )
        .unwrap();
        assert!(out.ends_with(b"mydb\0"));
    }
}
