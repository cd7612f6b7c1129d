//! Server configuration
//!
//! Parsed from command-line flags. Every field has a default, so running the
//! binary with no arguments serves on 127.0.0.1:6379 with persistence files in
//! the working directory.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value:?}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of keys held before LRU eviction
    pub max_entries: usize,
    /// Period of the snapshot task
    pub snapshot_interval: Duration,
    /// Period of the expiration sweep
    pub sweep_interval: Duration,
    /// Directory holding the journal and snapshot
    pub dir: PathBuf,
    /// Journal file name inside `dir`
    pub aof_file: String,
    /// Snapshot file name inside `dir`
    pub rdb_file: String,
    /// fsync the journal after every append
    pub fsync: bool,
    /// Keep everything in memory only
    pub persistence: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            max_entries: 1000,
            snapshot_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
            dir: PathBuf::from("."),
            aof_file: "appendonly.aof".to_string(),
            rdb_file: "dump.rdb".to_string(),
            fsync: false,
            persistence: true,
        }
    }
}

/// What the binary should do after parsing its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Run(Config),
    Help,
    Version,
}

impl Config {
    /// Parses flags, excluding the program name.
    pub fn from_args<I, S>(args: I) -> Result<ConfigAction, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--host" | "-h" => config.host = value(&flag, args.next())?,
                "--port" | "-p" => config.port = parse(&flag, args.next())?,
                "--max-entries" => {
                    config.max_entries = parse(&flag, args.next())?;
                    if config.max_entries == 0 {
                        return Err(ConfigError::InvalidValue {
                            flag,
                            value: "0".to_string(),
                        });
                    }
                }
                "--snapshot-interval" => {
                    config.snapshot_interval = seconds(&flag, args.next())?;
                }
                "--sweep-interval" => config.sweep_interval = seconds(&flag, args.next())?,
                "--dir" => config.dir = PathBuf::from(value(&flag, args.next())?),
                "--aof-file" => config.aof_file = value(&flag, args.next())?,
                "--rdb-file" => config.rdb_file = value(&flag, args.next())?,
                "--fsync" => config.fsync = true,
                "--no-persistence" => config.persistence = false,
                "--help" => return Ok(ConfigAction::Help),
                "--version" | "-v" => return Ok(ConfigAction::Version),
                _ => return Err(ConfigError::UnknownArgument(flag)),
            }
        }

        Ok(ConfigAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn aof_path(&self) -> PathBuf {
        self.dir.join(&self.aof_file)
    }

    pub fn rdb_path(&self) -> PathBuf {
        self.dir.join(&self.rdb_file)
    }
}

fn value(flag: &str, next: Option<String>) -> Result<String, ConfigError> {
    next.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse<T: std::str::FromStr>(flag: &str, next: Option<String>) -> Result<T, ConfigError> {
    let raw = value(flag, next)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: raw,
    })
}

fn seconds(flag: &str, next: Option<String>) -> Result<Duration, ConfigError> {
    let secs: u64 = parse(flag, next)?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            flag: flag.to_string(),
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

pub const HELP: &str = r#"
lodekv - A bounded, persistent, Redis-compatible cache server

USAGE:
    lodekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>              Port to listen on (default: 6379)
        --max-entries <N>          Keys held before LRU eviction (default: 1000)
        --snapshot-interval <SECS> Seconds between snapshots (default: 10)
        --sweep-interval <SECS>    Seconds between expiry sweeps (default: 5)
        --dir <DIR>                Directory for persisted files (default: .)
        --aof-file <NAME>          Journal file name (default: appendonly.aof)
        --rdb-file <NAME>          Snapshot file name (default: dump.rdb)
        --fsync                    fsync the journal after every write
        --no-persistence           Keep data in memory only
    -v, --version                  Print version information
        --help                     Print this help message

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=debug) to change the log level.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> Config {
        match Config::from_args(args.iter().copied()).unwrap() {
            ConfigAction::Run(config) => config,
            other => panic!("expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = run(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.snapshot_interval, Duration::from_secs(10));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.aof_path(), PathBuf::from("./appendonly.aof"));
    }

    #[test]
    fn test_all_flags() {
        let config = run(&[
            "--host",
            "0.0.0.0",
            "-p",
            "6380",
            "--max-entries",
            "2",
            "--snapshot-interval",
            "30",
            "--sweep-interval",
            "1",
            "--dir",
            "/tmp/lode",
            "--aof-file",
            "j.aof",
            "--rdb-file",
            "s.rdb",
            "--fsync",
        ]);
        assert_eq!(config.bind_address(), "0.0.0.0:6380");
        assert_eq!(config.max_entries, 2);
        assert_eq!(config.snapshot_interval, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.rdb_path(), PathBuf::from("/tmp/lode/s.rdb"));
        assert_eq!(config.aof_path(), PathBuf::from("/tmp/lode/j.aof"));
        assert!(config.fsync);
        assert!(config.persistence);

        assert!(!run(&["--no-persistence"]).persistence);
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(Config::from_args(["--help"]), Ok(ConfigAction::Help));
        assert_eq!(Config::from_args(["-v"]), Ok(ConfigAction::Version));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Config::from_args(["--port"]),
            Err(ConfigError::MissingValue("--port".to_string()))
        );
        assert!(matches!(
            Config::from_args(["--port", "http"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::from_args(["--max-entries", "0"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::from_args(["--sweep-interval", "0"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            Config::from_args(["--bogus"]),
            Err(ConfigError::UnknownArgument("--bogus".to_string()))
        );
    }
}
