//! # Text Protocol Framing
//!
//! Purpose: Encode memcached text commands and classify server replies
//! without intermediate allocations beyond the payload itself.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Each reply is read top-down for one verb.
//! 2. **Buffer Reuse**: Callers own the write buffer and the line buffer.
//! 3. **Binary-Safe**: Payloads are length-framed raw bytes.
//! 4. **Typed Outcomes**: Known replies map to `MemcError` variants; anything
//!    else is a protocol violation carrying the raw line.
//!
//! ## Grammar
//!
//! ```text
//! set|add <key> <flags> <exptime> <bytes>\r\n<data>\r\n -> STORED | NOT_STORED | EXISTS
//! get <key>\r\n -> VALUE <key> <flags> <bytes>\r\n<data>\r\nEND\r\n | END\r\n
//! delete <key>\r\n -> DELETED | NOT_FOUND
//! incr|decr <key> <delta>\r\n -> <value> | NOT_FOUND | CLIENT_ERROR ... non-numeric value
//! ```

use std::io::BufRead;

use bytes::BytesMut;

use memc_common::{MemcError, MemcResult};

const CRLF: &[u8] = b"\r\n";
const NON_NUMERIC: &[u8] = b"non-numeric value";

/// memcached's hard ceiling on item size; longer `VALUE` headers are bogus.
pub(crate) const MAX_VALUE_LEN: usize = 1024 * 1024 * 1024;

/// Storage commands carrying a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreVerb {
    Set,
    Add,
}

impl StoreVerb {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            StoreVerb::Set => b"set",
            StoreVerb::Add => b"add",
        }
    }
}

/// Counter commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithVerb {
    Incr,
    Decr,
}

impl ArithVerb {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            ArithVerb::Incr => b"incr",
            ArithVerb::Decr => b"decr",
        }
    }
}

/// A value read back by `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Item {
    pub(crate) flags: u32,
    pub(crate) data: Vec<u8>,
}

/// Encodes `<verb> <key> <flags> <exptime> <bytes>\r\n<data>\r\n`.
pub(crate) fn encode_store(
    out: &mut BytesMut,
    verb: StoreVerb,
    key: &str,
    flags: u32,
    exptime: u64,
    payload: &[u8],
) {
    out.reserve(key.len() + payload.len() + 48);
    out.extend_from_slice(verb.as_bytes());
    out.extend_from_slice(b" ");
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b" ");
    push_u64(out, u64::from(flags));
    out.extend_from_slice(b" ");
    push_u64(out, exptime);
    out.extend_from_slice(b" ");
    push_u64(out, payload.len() as u64);
    out.extend_from_slice(CRLF);
    out.extend_from_slice(payload);
    out.extend_from_slice(CRLF);
}

/// Encodes `get <key>\r\n`.
pub(crate) fn encode_get(out: &mut BytesMut, key: &str) {
    encode_simple(out, b"get", key);
}

/// Encodes `delete <key>\r\n`.
pub(crate) fn encode_delete(out: &mut BytesMut, key: &str) {
    encode_simple(out, b"delete", key);
}

/// Encodes `incr|decr <key> <delta>\r\n`.
pub(crate) fn encode_arith(out: &mut BytesMut, verb: ArithVerb, key: &str, delta: u64) {
    out.extend_from_slice(verb.as_bytes());
    out.extend_from_slice(b" ");
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b" ");
    push_u64(out, delta);
    out.extend_from_slice(CRLF);
}

fn encode_simple(out: &mut BytesMut, verb: &[u8], key: &str) {
    out.extend_from_slice(verb);
    out.extend_from_slice(b" ");
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(CRLF);
}

/// Reads the reply to `set`/`add`.
pub(crate) fn read_store_reply<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    verb: StoreVerb,
) -> MemcResult<()> {
    read_line(reader, line_buf)?;
    match (line_buf.as_slice(), verb) {
        (b"STORED", _) => Ok(()),
        (b"NOT_STORED", _) => Err(MemcError::NotStored),
        (b"EXISTS", StoreVerb::Add) => Err(MemcError::Conflict),
        (other, _) => Err(MemcError::protocol(other)),
    }
}

/// Reads the reply to `get <key>`, including the trailing `END`.
pub(crate) fn read_get_reply<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    key: &str,
) -> MemcResult<Item> {
    read_line(reader, line_buf)?;
    if line_buf.as_slice() == b"END" {
        return Err(MemcError::CacheMiss);
    }

    let (flags, len) = parse_value_header(line_buf, key)?;
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf[..] != *CRLF {
        return Err(MemcError::protocol(&crlf));
    }

    read_line(reader, line_buf)?;
    if line_buf.as_slice() != b"END" {
        return Err(MemcError::protocol(line_buf));
    }
    Ok(Item { flags, data })
}

/// Reads the reply to `delete`.
pub(crate) fn read_delete_reply<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
) -> MemcResult<()> {
    read_line(reader, line_buf)?;
    match line_buf.as_slice() {
        b"DELETED" => Ok(()),
        b"NOT_FOUND" => Err(MemcError::NotFound),
        other => Err(MemcError::protocol(other)),
    }
}

/// Reads the reply to `incr`/`decr`.
pub(crate) fn read_arith_reply<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
) -> MemcResult<u64> {
    read_line(reader, line_buf)?;
    let line = line_buf.as_slice();
    if line == b"NOT_FOUND" {
        return Err(MemcError::NotFound);
    }
    if contains(line, NON_NUMERIC) {
        return Err(MemcError::NonNumeric);
    }
    // Older servers pad decremented values with trailing spaces.
    parse_u64(trim_trailing_spaces(line)).ok_or_else(|| MemcError::protocol(line))
}

fn parse_value_header(line: &[u8], key: &str) -> MemcResult<(u32, usize)> {
    let mut fields = line.split(|&b| b == b' ');
    let header = (fields.next(), fields.next(), fields.next(), fields.next(), fields.next());
    let (flags, len) = match header {
        (Some(b"VALUE"), Some(k), Some(flags), Some(len), None) if k == key.as_bytes() => {
            (parse_u64(flags), parse_u64(len))
        }
        _ => return Err(MemcError::protocol(line)),
    };
    let flags = flags.and_then(|f| u32::try_from(f).ok());
    let len = len
        .and_then(|l| usize::try_from(l).ok())
        .filter(|&l| l <= MAX_VALUE_LEN);
    match (flags, len) {
        (Some(flags), Some(len)) => Ok((flags, len)),
        _ => Err(MemcError::protocol(line)),
    }
}

/// Reads one CRLF-terminated line into `buf`, without the terminator.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> MemcResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(MemcError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }
    if !buf.ends_with(CRLF) {
        return Err(MemcError::protocol(buf));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_u64(data: &[u8]) -> Option<u64> {
    if data.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
    }
    Some(value)
}

fn trim_trailing_spaces(mut data: &[u8]) -> &[u8] {
    while let [rest @ .., b' '] = data {
        data = rest;
    }
    data
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn push_u64(out: &mut BytesMut, mut value: u64) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    buf[..len].reverse();
    out.extend_from_slice(&buf[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reply(data: &[u8]) -> (Cursor<Vec<u8>>, Vec<u8>) {
        (Cursor::new(data.to_vec()), Vec::new())
    }

    #[test]
    fn encodes_set() {
        let mut buf = BytesMut::new();
        encode_store(&mut buf, StoreVerb::Set, "key", 0, 300, b"val");
        assert_eq!(&buf[..], b"set key 0 300 3\r\nval\r\n");
    }

    #[test]
    fn encodes_add_with_flags() {
        let mut buf = BytesMut::new();
        encode_store(&mut buf, StoreVerb::Add, "k2", 42, 0, b"");
        assert_eq!(&buf[..], b"add k2 42 0 0\r\n\r\n");
    }

    #[test]
    fn encodes_simple_commands() {
        let mut buf = BytesMut::new();
        encode_get(&mut buf, "mystring");
        assert_eq!(&buf[..], b"get mystring\r\n");

        buf.clear();
        encode_delete(&mut buf, "key");
        assert_eq!(&buf[..], b"delete key\r\n");

        buf.clear();
        encode_arith(&mut buf, ArithVerb::Incr, "ctr", 2);
        assert_eq!(&buf[..], b"incr ctr 2\r\n");

        buf.clear();
        encode_arith(&mut buf, ArithVerb::Decr, "ctr", u64::MAX);
        assert_eq!(&buf[..], b"decr ctr 18446744073709551615\r\n");
    }

    #[test]
    fn classifies_store_replies() {
        let (mut r, mut line) = reply(b"STORED\r\n");
        assert!(read_store_reply(&mut r, &mut line, StoreVerb::Set).is_ok());

        let (mut r, mut line) = reply(b"NOT_STORED\r\n");
        let err = read_store_reply(&mut r, &mut line, StoreVerb::Add).unwrap_err();
        assert!(matches!(err, MemcError::NotStored));

        let (mut r, mut line) = reply(b"EXISTS\r\n");
        let err = read_store_reply(&mut r, &mut line, StoreVerb::Add).unwrap_err();
        assert!(matches!(err, MemcError::Conflict));
    }

    #[test]
    fn exists_is_unexpected_for_set() {
        let (mut r, mut line) = reply(b"EXISTS\r\n");
        match read_store_reply(&mut r, &mut line, StoreVerb::Set) {
            Err(MemcError::Protocol { reply }) => assert_eq!(reply, "EXISTS"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn server_error_is_protocol_violation() {
        let (mut r, mut line) = reply(b"SERVER_ERROR out of memory storing object\r\n");
        match read_store_reply(&mut r, &mut line, StoreVerb::Set) {
            Err(MemcError::Protocol { reply }) => {
                assert_eq!(reply, "SERVER_ERROR out of memory storing object")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn parses_get_hit() {
        let (mut r, mut line) = reply(b"VALUE k 7 5\r\nhello\r\nEND\r\n");
        let item = read_get_reply(&mut r, &mut line, "k").unwrap();
        assert_eq!(item.flags, 7);
        assert_eq!(item.data, b"hello");
    }

    #[test]
    fn get_payload_is_binary_safe() {
        let (mut r, mut line) = reply(b"VALUE k 0 4\r\n\r\n\r\n\r\nEND\r\n");
        let item = read_get_reply(&mut r, &mut line, "k").unwrap();
        assert_eq!(item.data, b"\r\n\r\n");
    }

    #[test]
    fn parses_get_miss() {
        let (mut r, mut line) = reply(b"END\r\n");
        let err = read_get_reply(&mut r, &mut line, "k").unwrap_err();
        assert!(matches!(err, MemcError::CacheMiss));
    }

    #[test]
    fn rejects_malformed_get_replies() {
        let cases: [&[u8]; 5] = [
            b"VALUE other 0 5\r\nhello\r\nEND\r\n",
            b"VALUE k 0\r\n",
            b"VALUE k zero 5\r\nhello\r\nEND\r\n",
            b"VALUE k 0 5\r\nhelloXXEND\r\n",
            b"VALUE k 0 5\r\nhello\r\nMORE\r\n",
        ];
        for case in cases {
            let (mut r, mut line) = reply(case);
            let err = read_get_reply(&mut r, &mut line, "k").unwrap_err();
            assert!(err.is_connection_fault(), "case {:?} gave {:?}", case, err);
        }
    }

    #[test]
    fn oversized_value_length_is_rejected_before_reading() {
        let huge = format!("VALUE k 0 {}\r\nhi\r\nEND\r\n", u64::MAX);
        let (mut r, mut line) = reply(huge.as_bytes());
        let err = read_get_reply(&mut r, &mut line, "k").unwrap_err();
        assert!(matches!(err, MemcError::Protocol { .. }), "got {:?}", err);

        let over_cap = format!("VALUE k 0 {}\r\nhi\r\nEND\r\n", MAX_VALUE_LEN + 1);
        let (mut r, mut line) = reply(over_cap.as_bytes());
        let err = read_get_reply(&mut r, &mut line, "k").unwrap_err();
        assert!(matches!(err, MemcError::Protocol { .. }), "got {:?}", err);
    }

    #[test]
    fn truncated_reply_is_io_error() {
        let (mut r, mut line) = reply(b"VALUE k 0 5\r\nhel");
        let err = read_get_reply(&mut r, &mut line, "k").unwrap_err();
        assert!(matches!(err, MemcError::Io(_)));

        let (mut r, mut line) = reply(b"");
        let err = read_delete_reply(&mut r, &mut line).unwrap_err();
        assert!(matches!(err, MemcError::Io(_)));
    }

    #[test]
    fn line_without_crlf_is_protocol_violation() {
        let (mut r, mut line) = reply(b"DELETED\n");
        let err = read_delete_reply(&mut r, &mut line).unwrap_err();
        assert!(matches!(err, MemcError::Protocol { .. }));
    }

    #[test]
    fn classifies_delete_replies() {
        let (mut r, mut line) = reply(b"DELETED\r\n");
        assert!(read_delete_reply(&mut r, &mut line).is_ok());

        let (mut r, mut line) = reply(b"NOT_FOUND\r\n");
        assert!(matches!(read_delete_reply(&mut r, &mut line), Err(MemcError::NotFound)));
    }

    #[test]
    fn classifies_arith_replies() {
        let (mut r, mut line) = reply(b"102\r\n");
        assert_eq!(read_arith_reply(&mut r, &mut line).unwrap(), 102);

        let (mut r, mut line) = reply(b"98  \r\n");
        assert_eq!(read_arith_reply(&mut r, &mut line).unwrap(), 98);

        let (mut r, mut line) = reply(b"NOT_FOUND\r\n");
        assert!(matches!(read_arith_reply(&mut r, &mut line), Err(MemcError::NotFound)));

        let (mut r, mut line) =
            reply(b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n");
        assert!(matches!(read_arith_reply(&mut r, &mut line), Err(MemcError::NonNumeric)));

        let (mut r, mut line) = reply(b"ERROR\r\n");
        assert!(matches!(read_arith_reply(&mut r, &mut line), Err(MemcError::Protocol { .. })));

        let (mut r, mut line) = reply(b"99999999999999999999999\r\n");
        assert!(matches!(read_arith_reply(&mut r, &mut line), Err(MemcError::Protocol { .. })));
    }
}
