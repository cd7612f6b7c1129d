//! lodekv - A Bounded, Persistent, Redis-Compatible Cache
//!
//! Entry point for the server binary: parses flags, recovers the database,
//! starts background maintenance and serves clients until Ctrl+C.

use anyhow::Context;
use lodekv::config::{Config, ConfigAction, HELP};
use lodekv::{accept_loop, CommandHandler, Database};
use lodekv::{MaintenanceConfig, Maintainer};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn print_banner(config: &Config) {
    println!(
        r#"
lodekv v{} - Bounded, Persistent, Redis-Compatible Cache
──────────────────────────────────────────────────────────────
Server started on {}
Capacity: {} keys   Persistence: {}

Use Ctrl+C to shutdown gracefully.
"#,
        lodekv::VERSION,
        config.bind_address(),
        config.max_entries,
        if config.persistence {
            config.dir.display().to_string()
        } else {
            "disabled".to_string()
        }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(ConfigAction::Run(config)) => config,
        Ok(ConfigAction::Help) => {
            println!("{}", HELP);
            return Ok(());
        }
        Ok(ConfigAction::Version) => {
            println!("lodekv version {}", lodekv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", HELP);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if config.persistence {
        if let Err(e) = std::fs::create_dir_all(&config.dir) {
            warn!(dir = %config.dir.display(), error = %e, "Failed to create data directory");
        }
    }

    let db = Arc::new(Database::open(&config));
    info!(
        keys = db.len(),
        max_entries = config.max_entries,
        "Database ready"
    );

    let maintainer = Maintainer::start(Arc::clone(&db), MaintenanceConfig::from(&config));

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    print_banner(&config);
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, CommandHandler::new(Arc::clone(&db))) => {}
        _ = shutdown => {}
    }

    maintainer.shutdown().await;

    let final_db = Arc::clone(&db);
    match tokio::task::spawn_blocking(move || final_db.snapshot()).await {
        Ok(Ok(Some(snapshot))) => info!(keys = snapshot.keys, "Final snapshot written"),
        Ok(Ok(None)) => {}
        Ok(Err(e)) => error!(error = %e, "Final snapshot failed"),
        Err(e) => error!(error = %e, "Final snapshot task panicked"),
    }
    if let Err(e) = db.sync() {
        error!(error = %e, "Failed to sync journal");
    }

    info!("Server shutdown complete");
    Ok(())
}
