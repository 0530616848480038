//! Connection-servicing runtimes.
//!
//! Two implementations of the same echo contract:
//! - `poll`: single-threaded readiness multiplexer over poll(2)
//! - `threaded`: one worker thread per connection
//!
//! Shared pieces:
//! - `Listener`: dual-stack passive socket construction
//! - `Registry`: the watch set the poll loop blocks on
//! - `reply`: wire-format reply assembly

mod listener;
mod registry;
mod reply;

pub(crate) use listener::Listener;
pub(crate) use registry::Registry;
pub(crate) use reply::format_reply;

mod poll;
mod threaded;

use crate::config::Config;

/// Run the server with the single-threaded poll multiplexer.
pub fn run_poll(config: Config) -> std::io::Result<()> {
    poll::run(config)
}

/// Run the server with one worker thread per connection.
pub fn run_threaded(config: Config) -> std::io::Result<()> {
    threaded::run(config)
}
