//! HurmaDB Server Binary
//!
//! Starts the HTTP front end, or the Postgres front end when the port is
//! 5432.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use hurmadb::config::POSTGRES_PORT;
use hurmadb::http::HttpServer;
use hurmadb::network::{Server, TerminationLatch};
use hurmadb::pgwire::PgFrontEnd;
use hurmadb::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

const EXIT_MISSING_PORT: u8 = 1;
const EXIT_INVALID_PORT: u8 = 2;
const EXIT_ENGINE_OPEN: u8 = 3;
const EXIT_SERVER_ERROR: u8 = 4;

/// HurmaDB Server
#[derive(Parser, Debug)]
#[command(name = "hurmadb")]
#[command(about = "Key-value store with HTTP and PostgreSQL wire front ends")]
#[command(version)]
struct Args {
    /// TCP port to listen on (5432 selects the Postgres protocol)
    port: Option<String>,

    /// Data directory
    #[arg(short, long, default_value = "./hurmadb_data")]
    data_dir: PathBuf,

    /// Listen host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hurmadb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    let Some(port) = args.port.as_deref() else {
        eprintln!("Usage: hurmadb <port> [--data-dir <DIR>] [--host <HOST>]");
        return ExitCode::from(EXIT_MISSING_PORT);
    };

    let port = match port.parse::<u16>() {
        Ok(p) if p > 0 => p,
        _ => {
            eprintln!("Invalid port number: {}", port);
            return ExitCode::from(EXIT_INVALID_PORT);
        }
    };

    tracing::info!("HurmaDB v{}", hurmadb::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(format!("{}:{}", args.host, port))
        .build();

    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            return ExitCode::from(EXIT_ENGINE_OPEN);
        }
    };

    tracing::info!("Engine initialized successfully");

    let latch = TerminationLatch::new();
    let served = if port == POSTGRES_PORT {
        Server::bind(config, PgFrontEnd::new(Arc::clone(&engine)), latch)
            .and_then(|server| server.run())
    } else {
        HttpServer::bind(config, Arc::clone(&engine), latch).and_then(|server| server.run())
    };

    // Every connection has finished, so this is normally the last handle
    let closed = match Arc::try_unwrap(engine) {
        Ok(engine) => engine.close(),
        Err(engine) => engine.flush(),
    };
    if let Err(e) = closed {
        tracing::error!("Failed to flush engine on shutdown: {}", e);
    }

    match served {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::from(EXIT_SERVER_ERROR)
        }
    }
}
