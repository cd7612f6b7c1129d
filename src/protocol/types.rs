//! RESP Reply Types
//!
//! Every reply the server sends is one of four wire shapes:
//!
//! - Status: `+OK\r\n`
//! - Error: `-ERR unknown command 'FOO'\r\n`
//! - Integer: `:1000\r\n`
//! - Bulk string: `$5\r\nhello\r\n`, or `$-1\r\n` for nil
//!
//! Requests travel the other way as an array of bulk strings
//! (`*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`); [`encode_command`] builds one.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply to a single client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status line, e.g. `OK` or `PONG`. Must not contain CRLF.
    Status(String),

    /// Error message. Encoded with an `ERR ` prefix.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe payload.
    Bulk(Bytes),

    /// The null bulk string, used for absent values.
    Nil,
}

impl Reply {
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply. The message is sent as `-ERR <message>`.
    ///
    /// # Example
    /// ```
    /// use lodekv::protocol::Reply;
    /// assert_eq!(Reply::error("syntax error").encode(), &b"-ERR syntax error\r\n"[..]);
    /// ```
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn nil() -> Self {
        Reply::Nil
    }

    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// Encodes the reply into its wire representation.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends the wire representation to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => {
                buf.put_u8(prefix::STATUS);
                put_line(buf, s);
            }
            Reply::Error(msg) => {
                buf.put_u8(prefix::ERROR);
                buf.put_slice(b"ERR ");
                put_line(buf, msg);
            }
            Reply::Integer(n) => {
                buf.put_u8(prefix::INTEGER);
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Bulk(data) => put_bulk(buf, data),
            Reply::Nil => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(b"-1");
                buf.put_slice(CRLF);
            }
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            Reply::Bulk(data) => data.len() + 16,
            Reply::Status(s) | Reply::Error(s) => s.len() + 8,
            _ => 24,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) ERR {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
        }
    }
}

/// Writes a simple-string payload and its terminator. CR and LF inside the
/// text become spaces, so the reply stays a single line.
fn put_line(buf: &mut BytesMut, text: &str) {
    buf.extend(
        text.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
    buf.put_slice(CRLF);
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(prefix::BULK_STRING);
    buf.put_slice(data.len().to_string().as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

/// Encodes a request as an array of bulk strings, the form clients send.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(prefix::ARRAY);
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(CRLF);
    for arg in args {
        put_bulk(&mut buf, arg.as_ref());
    }
    buf.freeze()
}
