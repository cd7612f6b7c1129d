//! Command Handler Module
//!
//! Maps decoded requests onto [`Database`] calls and formats the replies.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - Test connection
//! - `SET key value [EX seconds | PX milliseconds]` - Set a key
//! - `GET key` - Get a key's value
//! - `DEL key [key ...]` - Delete keys
//! - `EXPIRE key seconds` - Set expiry
//! - `TTL key` - Get remaining TTL
//! - `INFO [section]` - Server information
//! - `QUIT` - Close the connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│   cmd_*()   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                   Database (store+journal)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Arity and option checks happen before the database is touched, so a
//! rejected command never mutates state.

use crate::connection::ConnectionStats;
use crate::persistence::PersistenceError;
use crate::protocol::Reply;
use crate::storage::Ttl;
use crate::Database;
use bytes::Bytes;
use std::fmt::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// What the connection should do after sending the reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Send the reply and keep serving the connection
    Continue(Reply),
    /// Send the reply and close the connection
    Close(Reply),
}

impl Outcome {
    pub fn into_reply(self) -> Reply {
        match self {
            Outcome::Continue(reply) | Outcome::Close(reply) => reply,
        }
    }
}

impl From<Reply> for Outcome {
    fn from(reply: Reply) -> Self {
        Outcome::Continue(reply)
    }
}

/// Handles Redis commands by dispatching them to the appropriate handlers.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    db: Arc<Database>,
    /// Counters of the connections served by this handler, reported by INFO
    clients: Arc<ConnectionStats>,
    /// Server start time for INFO command
    start_time: Instant,
}

impl CommandHandler {
    /// Creates a new command handler over the shared database.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            clients: Arc::new(ConnectionStats::new()),
            start_time: Instant::now(),
        }
    }

    /// The connection counters shared with every clone of this handler.
    pub fn connection_stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.clients)
    }

    /// Executes one request (command name followed by its arguments).
    pub fn execute(&self, args: Vec<Bytes>) -> Outcome {
        let Some((name, args)) = args.split_first() else {
            return Reply::error("empty command").into();
        };

        let cmd = String::from_utf8_lossy(name).to_ascii_uppercase();
        self.dispatch(&cmd, args)
    }

    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> Outcome {
        let reply = match cmd {
            "PING" => self.cmd_ping(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXPIRE" => self.cmd_expire(args),
            "TTL" => self.cmd_ttl(args),
            "INFO" => self.cmd_info(args),
            "QUIT" => {
                if !args.is_empty() {
                    return wrong_arity("quit").into();
                }
                return Outcome::Close(Reply::status("Goodbye"));
            }
            _ => Reply::error(format!("unknown command '{}'", cmd)),
        };
        reply.into()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> Reply {
        match args {
            [] => Reply::pong(),
            [message] => Reply::bulk(message.clone()),
            _ => wrong_arity("ping"),
        }
    }

    /// SET key value [EX seconds | PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> Reply {
        let [key, value, options @ ..] = args else {
            return wrong_arity("set");
        };

        let ttl = match options {
            [] => None,
            [unit, amount] => {
                let Some(amount) = parse_integer(amount).filter(|n| *n > 0) else {
                    return Reply::error("invalid expire time in 'set' command");
                };
                let amount = amount as u64;
                match unit.to_ascii_uppercase().as_slice() {
                    b"EX" => Some(Ttl::Seconds(amount)),
                    b"PX" => Some(Ttl::Millis(amount)),
                    _ => return Reply::error("syntax error"),
                }
            }
            _ => return Reply::error("syntax error"),
        };

        match self.db.set(key.clone(), value.clone(), ttl) {
            Ok(()) => Reply::ok(),
            Err(e) => journal_failure(e),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return wrong_arity("get");
        };

        match self.db.get(key) {
            Some(value) => Reply::bulk(value),
            None => Reply::nil(),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return wrong_arity("del");
        }

        match self.db.del(args) {
            Ok(removed) => Reply::integer(removed as i64),
            Err(e) => journal_failure(e),
        }
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, args: &[Bytes]) -> Reply {
        let [key, seconds] = args else {
            return wrong_arity("expire");
        };
        let Some(seconds) = parse_integer(seconds) else {
            return Reply::error("value is not an integer or out of range");
        };

        match self.db.expire(key, seconds) {
            Ok(found) => Reply::integer(found as i64),
            Err(e) => journal_failure(e),
        }
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return wrong_arity("ttl");
        };
        Reply::integer(self.db.ttl(key))
    }

    /// INFO [section]
    fn cmd_info(&self, args: &[Bytes]) -> Reply {
        let section = match args {
            [] => "all".to_string(),
            [section] => String::from_utf8_lossy(section).to_ascii_lowercase(),
            _ => return wrong_arity("info"),
        };

        let sections: &[&str] = match section.as_str() {
            "all" | "default" | "everything" => {
                &["server", "clients", "keyspace", "stats", "memory"]
            }
            "server" => &["server"],
            "clients" => &["clients"],
            "keyspace" => &["keyspace"],
            "stats" => &["stats"],
            "memory" => &["memory"],
            _ => &[],
        };

        let stats = self.db.stats();
        let mut info = String::new();
        for (i, name) in sections.iter().enumerate() {
            if i > 0 {
                info.push_str("\r\n");
            }
            // Writing to a String cannot fail
            let _ = match *name {
                "server" => write!(
                    info,
                    "# Server\r\n\
                     lodekv_version:{}\r\n\
                     uptime_in_seconds:{}\r\n\
                     persistence:{}\r\n\
                     last_snapshot_time:{}\r\n",
                    crate::VERSION,
                    self.start_time.elapsed().as_secs(),
                    if stats.persistence { "enabled" } else { "disabled" },
                    stats.last_snapshot,
                ),
                "clients" => write!(
                    info,
                    "# Clients\r\n\
                     connected_clients:{}\r\n\
                     total_connections_received:{}\r\n\
                     total_commands_processed:{}\r\n\
                     protocol_errors:{}\r\n",
                    self.clients.active_connections.load(Ordering::Relaxed),
                    self.clients.connections_accepted.load(Ordering::Relaxed),
                    self.clients.commands_processed.load(Ordering::Relaxed),
                    self.clients.protocol_errors.load(Ordering::Relaxed),
                ),
                "keyspace" => write!(
                    info,
                    "# Keyspace\r\n\
                     keys:{}\r\n\
                     maxmemory_entries:{}\r\n",
                    stats.store.keys, stats.store.max_entries,
                ),
                "stats" => write!(
                    info,
                    "# Stats\r\n\
                     evicted_keys:{}\r\n\
                     expired_keys:{}\r\n",
                    stats.store.evicted, stats.store.expired,
                ),
                _ => write!(
                    info,
                    "# Memory\r\n\
                     used_memory:{}\r\n\
                     used_memory_human:{:.2}K\r\n\
                     keys:{}\r\n\
                     maxmemory_entries:{}\r\n",
                    stats.used_memory,
                    stats.used_memory as f64 / 1024.0,
                    stats.store.keys,
                    stats.store.max_entries,
                ),
            };
        }

        Reply::bulk(info)
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn wrong_arity(cmd: &str) -> Reply {
    Reply::error(format!("wrong number of arguments for '{}' command", cmd))
}

fn parse_integer(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

fn journal_failure(e: PersistenceError) -> Reply {
    error!(error = %e, "Journal append failed");
    Reply::error("journal write failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler(max_entries: usize) -> CommandHandler {
        CommandHandler::new(Arc::new(Database::in_memory(max_entries)))
    }

    fn make_command(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn run(handler: &CommandHandler, args: &[&str]) -> Reply {
        handler.execute(make_command(args)).into_reply()
    }

    fn bulk(s: &str) -> Reply {
        Reply::bulk(Bytes::from(s.to_string()))
    }

    fn info_text(reply: Reply) -> String {
        match reply {
            Reply::Bulk(data) => String::from_utf8(data.to_vec()).unwrap(),
            other => panic!("expected bulk, got {:?}", other),
        }
    }

    #[test]
    fn test_ping() {
        let handler = create_handler(10);
        assert_eq!(run(&handler, &["PING"]), Reply::pong());
        assert_eq!(run(&handler, &["ping", "hello"]), bulk("hello"));
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler(10);
        assert_eq!(run(&handler, &["SET", "key", "value"]), Reply::ok());
        assert_eq!(run(&handler, &["GET", "key"]), bulk("value"));
        assert_eq!(run(&handler, &["get", "nonexistent"]), Reply::nil());
    }

    #[test]
    fn test_set_with_options() {
        let handler = create_handler(10);

        assert_eq!(run(&handler, &["SET", "a", "v", "EX", "100"]), Reply::ok());
        assert_eq!(run(&handler, &["TTL", "a"]), Reply::integer(100));

        assert_eq!(run(&handler, &["SET", "b", "v", "px", "1500"]), Reply::ok());
        assert_eq!(run(&handler, &["TTL", "b"]), Reply::integer(2));

        assert_eq!(
            run(&handler, &["SET", "c", "v", "EX", "0"]),
            Reply::error("invalid expire time in 'set' command")
        );
        assert_eq!(
            run(&handler, &["SET", "c", "v", "EX", "soon"]),
            Reply::error("invalid expire time in 'set' command")
        );
        assert_eq!(
            run(&handler, &["SET", "c", "v", "KEEPTTL", "1"]),
            Reply::error("syntax error")
        );
        assert_eq!(run(&handler, &["SET", "c", "v", "EX"]), Reply::error("syntax error"));
        assert_eq!(run(&handler, &["GET", "c"]), Reply::nil());
    }

    #[test]
    fn test_del() {
        let handler = create_handler(10);
        run(&handler, &["SET", "key1", "value1"]);
        run(&handler, &["SET", "key2", "value2"]);

        assert_eq!(
            run(&handler, &["DEL", "key1", "key2", "key3"]),
            Reply::integer(2)
        );
        assert_eq!(run(&handler, &["DEL", "key1"]), Reply::integer(0));
    }

    #[test]
    fn test_expire_and_ttl() {
        let handler = create_handler(10);
        run(&handler, &["SET", "key", "value"]);

        assert_eq!(run(&handler, &["TTL", "key"]), Reply::integer(-1));
        assert_eq!(run(&handler, &["TTL", "missing"]), Reply::integer(-2));

        assert_eq!(run(&handler, &["EXPIRE", "key", "60"]), Reply::integer(1));
        assert_eq!(run(&handler, &["TTL", "key"]), Reply::integer(60));
        assert_eq!(run(&handler, &["EXPIRE", "missing", "60"]), Reply::integer(0));
        assert_eq!(
            run(&handler, &["EXPIRE", "key", "later"]),
            Reply::error("value is not an integer or out of range")
        );
    }

    #[test]
    fn test_wrong_arity() {
        let handler = create_handler(10);
        for (args, name) in [
            (&["GET"][..], "get"),
            (&["GET", "a", "b"][..], "get"),
            (&["SET", "a"][..], "set"),
            (&["DEL"][..], "del"),
            (&["EXPIRE", "a"][..], "expire"),
            (&["TTL"][..], "ttl"),
            (&["PING", "a", "b"][..], "ping"),
        ] {
            assert_eq!(
                run(&handler, args),
                Reply::error(format!("wrong number of arguments for '{}' command", name))
            );
        }
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler(10);
        assert_eq!(
            run(&handler, &["FLUSHALL"]),
            Reply::error("unknown command 'FLUSHALL'")
        );
        assert_eq!(handler.execute(Vec::new()).into_reply(), Reply::error("empty command"));
    }

    #[test]
    fn test_unknown_command_name_stays_on_one_line() {
        let handler = create_handler(10);
        let encoded = handler
            .execute(vec![Bytes::from("X\r\n+OK")])
            .into_reply()
            .encode();

        assert_eq!(encoded, &b"-ERR unknown command 'X  +OK'\r\n"[..]);
        assert_eq!(encoded.windows(2).filter(|w| *w == b"\r\n").count(), 1);
    }

    #[test]
    fn test_info_clients_reports_connection_counters() {
        let handler = create_handler(10);
        let stats = handler.connection_stats();
        stats.connection_opened();
        stats.command_processed();
        stats.protocol_error();

        let clients = info_text(run(&handler, &["INFO", "clients"]));
        assert_eq!(
            clients,
            "# Clients\r\n\
             connected_clients:1\r\n\
             total_connections_received:1\r\n\
             total_commands_processed:1\r\n\
             protocol_errors:1\r\n"
        );
    }

    #[test]
    fn test_quit_closes() {
        let handler = create_handler(10);
        assert_eq!(
            handler.execute(make_command(&["QUIT"])),
            Outcome::Close(Reply::status("Goodbye"))
        );
        assert!(matches!(
            handler.execute(make_command(&["SET", "k", "v"])),
            Outcome::Continue(_)
        ));
    }

    #[test]
    fn test_lru_scenario() {
        let handler = create_handler(2);
        assert_eq!(run(&handler, &["SET", "a", "1"]), Reply::ok());
        assert_eq!(run(&handler, &["SET", "b", "2"]), Reply::ok());
        assert_eq!(run(&handler, &["GET", "a"]), bulk("1"));
        assert_eq!(run(&handler, &["SET", "c", "3"]), Reply::ok());

        assert_eq!(run(&handler, &["GET", "b"]), Reply::nil());
        assert_eq!(run(&handler, &["GET", "a"]), bulk("1"));
        assert_eq!(run(&handler, &["GET", "c"]), bulk("3"));
    }

    #[test]
    fn test_info_sections() {
        let handler = create_handler(2);
        run(&handler, &["SET", "a", "1"]);
        run(&handler, &["SET", "b", "2"]);
        run(&handler, &["SET", "c", "3"]);

        let full = info_text(run(&handler, &["INFO"]));
        assert!(full.starts_with("# Server\r\n"));
        assert!(full.contains("persistence:disabled\r\n"));
        assert!(full.contains("# Clients\r\nconnected_clients:0\r\n"));
        assert!(full.contains("# Keyspace\r\nkeys:2\r\nmaxmemory_entries:2\r\n"));
        assert!(full.contains("evicted_keys:1\r\n"));
        assert!(full.contains("expired_keys:0\r\n"));
        assert!(full.contains("# Memory\r\n"));

        let memory = info_text(run(&handler, &["INFO", "memory"]));
        assert!(memory.starts_with("# Memory\r\nused_memory:"));
        assert!(!memory.contains("# Server"));

        assert_eq!(info_text(run(&handler, &["INFO", "replication"])), "");
    }

    #[test]
    fn test_info_does_not_mutate() {
        let handler = create_handler(10);
        run(&handler, &["SET", "a", "1"]);
        let before = handler.db.stats();
        run(&handler, &["INFO"]);
        run(&handler, &["INFO", "MEMORY"]);
        assert_eq!(handler.db.stats(), before);
    }
}
