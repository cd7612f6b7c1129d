//! RESP Protocol Codec
//!
//! Decodes client requests (arrays of bulk strings) and encodes the four
//! reply shapes the server sends back. The codec knows nothing about the
//! commands themselves.
//!
//! ## Example
//!
//! ```
//! use lodekv::protocol::{decode_command, Reply};
//!
//! let args = decode_command(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
//! assert_eq!(args.len(), 2);
//!
//! let bytes = Reply::bulk("Ariz").encode();
//! assert_eq!(&bytes[..], b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode_command, ParseError, ParseResult, RequestParser};
pub use types::{encode_command, Reply};
