//! Append-Only Journal (AOF)
//!
//! Every mutation is written as one text line ending in its commit time:
//!
//! ```text
//! SET user:1 Ariz 1718000000000
//! SET session "token 123" EX 60 1718000000001
//! DEL user:1 1718000000002
//! EXPIRE session 30 1718000000003
//! ```
//!
//! Tokens are separated by single spaces. A token that is empty or contains
//! anything other than printable ASCII (or a `"` / `\`) is written in double
//! quotes with `\"`, `\\`, `\n`, `\r`, `\t` and `\xHH` escapes, so any binary
//! key or value survives the round trip.
//!
//! The last token is always the commit time. If it is not a number the record
//! is still returned, with no timestamp, and recovery replays it
//! unconditionally.

use crate::persistence::PersistenceError;
use crate::storage::{Mutation, Ttl};
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

/// Errors for a journal line that cannot be turned into a record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JournalError {
    #[error("empty record")]
    Empty,

    #[error("unterminated quoted token")]
    UnterminatedQuote,

    #[error("invalid escape sequence")]
    BadEscape,

    #[error("quoted token must be followed by a space")]
    TrailingGarbage,

    #[error("unknown operation '{0}'")]
    UnknownOp(String),

    #[error("wrong number of arguments for '{0}'")]
    WrongArity(&'static str),

    #[error("invalid number: {0:?}")]
    InvalidNumber(String),
}

/// One parsed journal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub mutation: Mutation,
    /// Commit time in Unix milliseconds, or `None` if the trailing token was unreadable
    pub timestamp: Option<u64>,
}

impl JournalRecord {
    /// Serializes the record as one newline-terminated line.
    pub fn encode(mutation: &Mutation, timestamp: u64, out: &mut Vec<u8>) {
        match mutation {
            Mutation::Set { key, value, ttl } => {
                out.extend_from_slice(b"SET ");
                push_token(out, key);
                out.push(b' ');
                push_token(out, value);
                match ttl {
                    Some(Ttl::Seconds(s)) => out.extend_from_slice(format!(" EX {}", s).as_bytes()),
                    Some(Ttl::Millis(ms)) => out.extend_from_slice(format!(" PX {}", ms).as_bytes()),
                    None => {}
                }
            }
            Mutation::Del { key } => {
                out.extend_from_slice(b"DEL ");
                push_token(out, key);
            }
            Mutation::Expire { key, seconds } => {
                out.extend_from_slice(b"EXPIRE ");
                push_token(out, key);
                out.extend_from_slice(format!(" {}", seconds).as_bytes());
            }
        }
        out.extend_from_slice(format!(" {}\n", timestamp).as_bytes());
    }

    /// Parses one line (without its trailing newline).
    pub fn parse(line: &[u8]) -> Result<Self, JournalError> {
        let mut tokens = tokenize(line)?;
        if tokens.len() < 2 {
            return Err(JournalError::Empty);
        }

        let timestamp = tokens.pop().and_then(|t| parse_number::<u64>(&t).ok());
        let mutation = parse_mutation(tokens)?;
        Ok(Self {
            mutation,
            timestamp,
        })
    }
}

fn parse_mutation(tokens: Vec<Vec<u8>>) -> Result<Mutation, JournalError> {
    let mut tokens = tokens.into_iter();
    let op = tokens.next().ok_or(JournalError::Empty)?;
    let args: Vec<Vec<u8>> = tokens.collect();

    match op.to_ascii_uppercase().as_slice() {
        b"SET" => {
            let ttl = match args.len() {
                2 => None,
                4 => {
                    let amount = parse_number::<u64>(&args[3])?;
                    match args[2].to_ascii_uppercase().as_slice() {
                        b"EX" => Some(Ttl::Seconds(amount)),
                        b"PX" => Some(Ttl::Millis(amount)),
                        _ => return Err(JournalError::WrongArity("SET")),
                    }
                }
                _ => return Err(JournalError::WrongArity("SET")),
            };
            let mut args = args.into_iter();
            let (Some(key), Some(value)) = (args.next(), args.next()) else {
                return Err(JournalError::WrongArity("SET"));
            };
            Ok(Mutation::Set {
                key: Bytes::from(key),
                value: Bytes::from(value),
                ttl,
            })
        }
        b"DEL" => {
            let [key]: [Vec<u8>; 1] = args
                .try_into()
                .map_err(|_| JournalError::WrongArity("DEL"))?;
            Ok(Mutation::Del {
                key: Bytes::from(key),
            })
        }
        b"EXPIRE" => {
            let [key, seconds]: [Vec<u8>; 2] = args
                .try_into()
                .map_err(|_| JournalError::WrongArity("EXPIRE"))?;
            Ok(Mutation::Expire {
                key: Bytes::from(key),
                seconds: parse_number::<i64>(&seconds)?,
            })
        }
        _ => Err(JournalError::UnknownOp(
            String::from_utf8_lossy(&op).into_owned(),
        )),
    }
}

fn parse_number<T: std::str::FromStr>(token: &[u8]) -> Result<T, JournalError> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| JournalError::InvalidNumber(String::from_utf8_lossy(token).into_owned()))
}

#[inline]
fn is_bare(byte: u8) -> bool {
    byte.is_ascii_graphic() && byte != b'"' && byte != b'\\'
}

fn push_token(out: &mut Vec<u8>, token: &[u8]) {
    if !token.is_empty() && token.iter().all(|&b| is_bare(b)) {
        out.extend_from_slice(token);
        return;
    }

    out.push(b'"');
    for &byte in token {
        match byte {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b' ' => out.push(b' '),
            b if is_bare(b) => out.push(b),
            b => out.extend_from_slice(format!("\\x{:02x}", b).as_bytes()),
        }
    }
    out.push(b'"');
}

fn tokenize(line: &[u8]) -> Result<Vec<Vec<u8>>, JournalError> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < line.len() {
        match line[i] {
            b' ' | b'\t' | b'\r' => i += 1,
            b'"' => {
                let (token, next) = read_quoted(line, i + 1)?;
                if next < line.len() && line[next] != b' ' && line[next] != b'\r' {
                    return Err(JournalError::TrailingGarbage);
                }
                tokens.push(token);
                i = next;
            }
            _ => {
                let start = i;
                while i < line.len() && !matches!(line[i], b' ' | b'\t' | b'\r') {
                    i += 1;
                }
                tokens.push(line[start..i].to_vec());
            }
        }
    }

    Ok(tokens)
}

/// Reads a quoted token body starting just after the opening quote.
/// Returns the unescaped bytes and the offset after the closing quote.
fn read_quoted(line: &[u8], mut i: usize) -> Result<(Vec<u8>, usize), JournalError> {
    let mut token = Vec::new();
    loop {
        let Some(&byte) = line.get(i) else {
            return Err(JournalError::UnterminatedQuote);
        };
        match byte {
            b'"' => return Ok((token, i + 1)),
            b'\\' => {
                let escaped = *line.get(i + 1).ok_or(JournalError::UnterminatedQuote)?;
                match escaped {
                    b'"' => token.push(b'"'),
                    b'\\' => token.push(b'\\'),
                    b'n' => token.push(b'\n'),
                    b'r' => token.push(b'\r'),
                    b't' => token.push(b'\t'),
                    b'x' => {
                        let hex = line.get(i + 2..i + 4).ok_or(JournalError::BadEscape)?;
                        let hex = std::str::from_utf8(hex).map_err(|_| JournalError::BadEscape)?;
                        let value =
                            u8::from_str_radix(hex, 16).map_err(|_| JournalError::BadEscape)?;
                        token.push(value);
                        i += 2;
                    }
                    _ => return Err(JournalError::BadEscape),
                }
                i += 2;
            }
            other => {
                token.push(other);
                i += 1;
            }
        }
    }
}

/// Splits journal contents into non-empty lines.
pub fn lines(contents: &[u8]) -> impl Iterator<Item = &[u8]> {
    contents
        .split(|&b| b == b'\n')
        .filter(|line| !line.trim_ascii().is_empty())
}

// ============================================================================
// Commit clock
// ============================================================================

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Hands out commit times for journal records and snapshots.
///
/// A record stamped after a snapshot is always strictly newer than that
/// snapshot, even within the same millisecond or if the wall clock steps back.
#[derive(Debug, Default, Clone)]
pub struct CommitClock {
    /// Newest timestamp handed out to a record
    newest: u64,
    /// Timestamp of the latest snapshot
    horizon: u64,
}

impl CommitClock {
    /// Creates a clock that continues after previously persisted state.
    pub fn resume(horizon: u64, newest: u64) -> Self {
        Self {
            newest: newest.max(horizon),
            horizon,
        }
    }

    /// Commit time for a record written now.
    pub fn stamp(&mut self) -> u64 {
        self.stamp_at(now_millis())
    }

    fn stamp_at(&mut self, now: u64) -> u64 {
        let ts = now.max(self.horizon + 1);
        self.newest = self.newest.max(ts);
        ts
    }

    /// Timestamp for a snapshot taken now. Every record stamped afterwards
    /// compares greater.
    pub fn seal(&mut self) -> u64 {
        self.seal_at(now_millis())
    }

    fn seal_at(&mut self, now: u64) -> u64 {
        self.horizon = now.max(self.newest).max(self.horizon);
        self.horizon
    }

    pub fn horizon(&self) -> u64 {
        self.horizon
    }
}

// ============================================================================
// Writer
// ============================================================================

/// An open journal file.
///
/// The file is only ever appended to. Recovery decides which records a
/// snapshot already covers by their commit times.
#[derive(Debug)]
pub struct Journal {
    file: File,
    fsync: bool,
    /// Length of the file up to the last complete append
    len: u64,
    buf: Vec<u8>,
}

impl Journal {
    /// Opens (creating if needed) the journal at `path` for appending.
    pub fn open(path: impl AsRef<Path>, fsync: bool) -> Result<Self, PersistenceError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            fsync,
            len,
            buf: Vec::new(),
        })
    }

    /// Writes the records and flushes them to the OS (and to disk when
    /// fsync is enabled) before returning.
    ///
    /// On failure the file is cut back to its previous length, so a torn
    /// line never gets glued to the next append.
    pub fn append(&mut self, records: &[(Mutation, u64)]) -> Result<(), PersistenceError> {
        if records.is_empty() {
            return Ok(());
        }

        self.buf.clear();
        for (mutation, timestamp) in records {
            JournalRecord::encode(mutation, *timestamp, &mut self.buf);
        }

        if let Err(e) = self.write_buf() {
            self.rollback();
            return Err(e.into());
        }
        self.len += self.buf.len() as u64;
        Ok(())
    }

    fn write_buf(&mut self) -> std::io::Result<()> {
        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.fsync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Drops anything written after the last complete append.
    fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.len) {
            warn!(len = self.len, error = %e, "Failed to truncate partial journal write");
        }
    }

    /// Forces journal contents to disk.
    pub fn sync(&mut self) -> Result<(), PersistenceError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
