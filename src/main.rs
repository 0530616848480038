//! echomux: a TCP echo server with timestamped, counted replies
//!
//! Every message received from any client is echoed back together with
//! the server's local time and a global message counter shared by all
//! connections.
//!
//! Two connection-servicing runtimes:
//! - poll: single-threaded readiness multiplexer over poll(2)
//! - threaded: one worker thread per connection

mod config;
mod runtime;

use config::{Config, RuntimeType};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        backlog = config.backlog,
        buffer_size = config.buffer_size,
        runtime = ?config.runtime,
        "Starting echomux server"
    );

    match config.runtime {
        RuntimeType::Poll => run_poll(config),
        RuntimeType::Threaded => run_threaded(config),
    }
}

/// Run with the single-threaded poll(2) multiplexer
fn run_poll(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Using poll runtime (single-threaded multiplexer)");
    runtime::run_poll(config)?;
    Ok(())
}

/// Run with one worker thread per connection
fn run_threaded(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Using threaded runtime (one thread per connection)");
    runtime::run_threaded(config)?;
    Ok(())
}
