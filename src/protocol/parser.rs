//! RESP Request Parser
//!
//! Clients send every command as an array of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n
//! ```
//!
//! [`RequestParser::parse`] reports one of three outcomes:
//! - `Ok(Some((args, consumed)))` - a complete request occupying `consumed` bytes
//! - `Ok(None)` - the buffer holds only a prefix of a request
//! - `Err(ParseError)` - the bytes can never become a valid request
//!
//! The connection layer uses the incremental form so requests split across
//! TCP reads are reassembled. [`decode_command`] is the single-buffer form:
//! anything that is not one complete request is "no command".

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while framing a request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The request did not start with `*`
    #[error("expected '*', got {0:#04x}")]
    NotAnArray(u8),

    /// An array element did not start with `$`
    #[error("expected '$', got {0:#04x}")]
    NotABulkString(u8),

    /// A count or length line was not a decimal integer
    #[error("invalid length: {0:?}")]
    InvalidLength(String),

    /// Bulk data was not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    #[error("request too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in one request
pub const MAX_ARGS: usize = 1024 * 1024;

/// Parser for client requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestParser;

impl RequestParser {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to parse one request from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first != prefix::ARRAY {
            return Err(ParseError::NotAnArray(first));
        }

        let Some((count, mut consumed)) = read_length(buf, 1)? else {
            return Ok(None);
        };
        if count > MAX_ARGS {
            return Err(ParseError::TooLarge {
                size: count,
                max: MAX_ARGS,
            });
        }

        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            match self.parse_bulk(buf, consumed)? {
                Some((arg, next)) => {
                    args.push(arg);
                    consumed = next;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((args, consumed)))
    }

    /// Parses `$<len>\r\n<data>\r\n` starting at `start`, returning the
    /// payload and the offset just past it.
    fn parse_bulk(&self, buf: &[u8], start: usize) -> ParseResult<Option<(Bytes, usize)>> {
        let Some(&marker) = buf.get(start) else {
            return Ok(None);
        };
        if marker != prefix::BULK_STRING {
            return Err(ParseError::NotABulkString(marker));
        }

        let Some((len, data_start)) = read_length(buf, start + 1)? else {
            return Ok(None);
        };
        if len > MAX_BULK_SIZE {
            return Err(ParseError::TooLarge {
                size: len,
                max: MAX_BULK_SIZE,
            });
        }

        let data_end = data_start + len;
        if buf.len() < data_end + 2 {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != CRLF {
            return Err(ParseError::MissingCrlf);
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((data, data_end + 2)))
    }
}

/// Reads a non-negative decimal terminated by CRLF at `start`.
/// Returns the value and the offset after the CRLF.
fn read_length(buf: &[u8], start: usize) -> ParseResult<Option<(usize, usize)>> {
    let Some(rest) = buf.get(start..) else {
        return Ok(None);
    };
    let Some(pos) = find_crlf(rest) else {
        return Ok(None);
    };

    let line = &rest[..pos];
    let value = std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(line).into_owned()))?;

    Ok(Some((value, start + pos + 2)))
}

#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes a buffer holding exactly one request into its arguments.
///
/// Returns `None` when the buffer does not begin with the array marker, when
/// any count or length fails to parse, or when the request is incomplete.
pub fn decode_command(buf: &[u8]) -> Option<Vec<Bytes>> {
    match RequestParser::new().parse(buf) {
        Ok(Some((args, _))) => Some(args),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::encode_command;

    fn args(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    #[test]
    fn test_parse_get() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let (parsed, consumed) = RequestParser::new().parse(input).unwrap().unwrap();
        assert_eq!(parsed, args(&["GET", "name"]));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_incomplete() {
        let parser = RequestParser::new();
        assert!(parser.parse(b"").unwrap().is_none());
        assert!(parser.parse(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
        assert!(parser.parse(b"*1\r\n$5\r\nhel").unwrap().is_none());
        assert!(parser.parse(b"*1").unwrap().is_none());
    }

    #[test]
    fn test_parse_leaves_pipelined_tail() {
        let input = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let (parsed, consumed) = RequestParser::new().parse(input).unwrap().unwrap();
        assert_eq!(parsed, args(&["PING"]));
        assert_eq!(consumed, input.len() / 2);
    }

    #[test]
    fn test_rejects_non_array() {
        let result = RequestParser::new().parse(b"PING\r\n");
        assert_eq!(result, Err(ParseError::NotAnArray(b'P')));
        assert_eq!(decode_command(b"+OK\r\n"), None);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(matches!(
            RequestParser::new().parse(b"*x\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
        assert!(matches!(
            RequestParser::new().parse(b"*1\r\n$-1\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
        assert_eq!(decode_command(b"*1\r\n$abc\r\nPING\r\n"), None);
    }

    #[test]
    fn test_rejects_missing_crlf() {
        let result = RequestParser::new().parse(b"*1\r\n$4\r\nPINGxx");
        assert_eq!(result, Err(ParseError::MissingCrlf));
    }

    #[test]
    fn test_binary_safe_argument() {
        let input = b"*1\r\n$5\r\nhel\x00o\r\n";
        let parsed = decode_command(input).unwrap();
        assert_eq!(parsed, vec![Bytes::from(&b"hel\x00o"[..])]);
    }

    #[test]
    fn test_empty_array_and_empty_bulk() {
        assert_eq!(decode_command(b"*0\r\n"), Some(vec![]));
        assert_eq!(decode_command(b"*1\r\n$0\r\n\r\n"), Some(vec![Bytes::new()]));
    }

    #[test]
    fn test_command_shapes_survive_encoding() {
        for command in [
            vec!["PING"],
            vec!["SET", "session", "token 123", "EX", "10"],
            vec!["GET", "session"],
            vec!["DEL", "a", "b", "c"],
        ] {
            let encoded = encode_command(&command);
            assert_eq!(decode_command(&encoded), Some(args(&command)));
        }
    }
}
