//! Byte codec (C1): little-endian integer pack/unpack, MySQL
//! length-encoded integers/strings, and the SHA-1 primitive the
//! scramble algorithm builds on.

use crate::error::{Error, Result};
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE, U64 as U64LE};

pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    if data.is_empty() {
        return Err(Error::UnexpectedEof);
    }
    Ok((data[0], &data[1..]))
}

pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::UnexpectedEof);
    }
    let value = U16LE::ref_from_bytes(&data[..2])
        .map_err(|_| Error::InvalidPacket)?
        .get();
    Ok((value, &data[2..]))
}

pub fn read_u24(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 3 {
        return Err(Error::UnexpectedEof);
    }
    let value = u32::from_le_bytes([data[0], data[1], data[2], 0]);
    Ok((value, &data[3..]))
}

pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::UnexpectedEof);
    }
    let value = U32LE::ref_from_bytes(&data[..4])
        .map_err(|_| Error::InvalidPacket)?
        .get();
    Ok((value, &data[4..]))
}

pub fn read_u64(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.len() < 8 {
        return Err(Error::UnexpectedEof);
    }
    let value = U64LE::ref_from_bytes(&data[..8])
        .map_err(|_| Error::InvalidPacket)?
        .get();
    Ok((value, &data[8..]))
}

/// Length-encoded integer. `None` represents the 0xFB NULL marker.
pub fn read_lenenc_int(data: &[u8]) -> Result<(Option<u64>, &[u8])> {
    let (first, rest) = read_u8(data)?;
    match first {
        0xFB => Ok((None, rest)),
        0xFC => {
            let (v, rest) = read_u16(rest)?;
            Ok((Some(v as u64), rest))
        }
        0xFD => {
            let (v, rest) = read_u24(rest)?;
            Ok((Some(v as u64), rest))
        }
        0xFE => {
            let (v, rest) = read_u64(rest)?;
            Ok((Some(v), rest))
        }
        v => Ok((Some(v as u64), rest)),
    }
}

pub fn read_fixed(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::UnexpectedEof);
    }
    Ok((&data[..len], &data[len..]))
}

pub fn read_null_terminated(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match data.iter().position(|&b| b == 0) {
        Some(i) => Ok((&data[..i], &data[i + 1..])),
        None => Err(Error::UnexpectedEof),
    }
}

/// Bounded variant of [`read_null_terminated`]: fails with
/// [`Error::BadProtocol`] instead of scanning unboundedly if no
/// terminator appears within `max_len` bytes.
pub fn read_null_terminated_bounded(data: &[u8], max_len: usize) -> Result<(&[u8], &[u8])> {
    let scan = &data[..data.len().min(max_len + 1)];
    match scan.iter().position(|&b| b == 0) {
        Some(i) => Ok((&data[..i], &data[i + 1..])),
        None => Err(Error::BadProtocol(0)),
    }
}

pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u24(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_lenenc_int(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < (1 << 16) {
        out.push(0xFC);
        write_u16(out, value as u16);
    } else if value < (1 << 24) {
        out.push(0xFD);
        write_u24(out, value as u32);
    } else {
        out.push(0xFE);
        write_u64(out, value);
    }
}

pub fn write_null_terminated(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// SHA-1 digest (RFC 3174) of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u24_round_trips() {
        for n in [0u32, 1, 255, 256, 0xABCDEF, 0xFFFFFF] {
            let mut buf = Vec::new();
            write_u24(&mut buf, n);
            let (got, rest) = read_u24(&buf).unwrap();
            assert_eq!(got, n);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn u16_u32_u64_round_trip() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0xBEEF);
        assert_eq!(read_u16(&buf).unwrap().0, 0xBEEF);

        buf.clear();
        write_u32(&mut buf, 0xDEAD_BEEF);
        assert_eq!(read_u32(&buf).unwrap().0, 0xDEAD_BEEF);

        buf.clear();
        write_u64(&mut buf, 0x0123_4567_89AB_CDEF);
        assert_eq!(read_u64(&buf).unwrap().0, 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn lenenc_int_round_trips_all_widths() {
        for n in [0u64, 250, 251, 0xFFFF, 0x1_0000, 0xFF_FFFF, 0x100_0000, u64::MAX] {
            let mut buf = Vec::new();
            write_lenenc_int(&mut buf, n);
            let (got, rest) = read_lenenc_int(&buf).unwrap();
            assert_eq!(got, Some(n));
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn lenenc_int_null_marker() {
        let (v, rest) = read_lenenc_int(&[0xFB, 0xAA]).unwrap();
        assert_eq!(v, None);
        assert_eq!(rest, &[0xAA]);
    }

    #[test]
    fn null_terminated_reads_up_to_terminator() {
        let (s, rest) = read_null_terminated(b"abc\0def").unwrap();
        assert_eq!(s, b"abc");
        assert_eq!(rest, b"def");
    }

    #[test]
    fn null_terminated_missing_terminator_errors() {
        assert!(read_null_terminated(b"abc").is_err());
    }

    #[test]
    fn bounded_null_terminated_rejects_overlong_unterminated_input() {
        let data = vec![b'a'; 64];
        assert!(matches!(
            read_null_terminated_bounded(&data, 32),
            Err(Error::BadProtocol(_))
        ));
    }

    #[test]
    fn bounded_null_terminated_accepts_within_bound() {
        let mut data = vec![b'a'; 10];
        data.push(0);
        let (s, _) = read_null_terminated_bounded(&data, 32).unwrap();
        assert_eq!(s.len(), 10);
    }

    #[test]
    fn sha1_matches_known_vector() {
        // RFC 3174 test vector: SHA1("abc")
        let digest = sha1(b"abc");
        assert_eq!(
            digest,
            [
                0xA9, 0x99, 0x3E, 0x36, 0x47, 0x06, 0x81, 0x6A, 0xBA, 0x3E, 0x25, 0x71, 0x78, 0x50,
                0xC2, 0x6C, 0x9C, 0xD0, 0xD8, 0x9D,
            ]
        );
    }
}
