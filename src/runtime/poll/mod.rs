//! poll(2)-based event loop implementation.
//!
//! Readiness-based model: one blocking poll over the whole watch set,
//! then dispatch of the signaled entries in registry order. A single
//! thread services every connection; the only suspension point is the
//! poll call itself.

mod event_loop;

use crate::config::Config;
use crate::runtime::Listener;
use std::io;
use tracing::info;

/// Run the server using the poll backend.
pub fn run(config: Config) -> io::Result<()> {
    let listener = Listener::bind(&config.host, config.port, config.backlog)?;
    let mut event_loop = event_loop::EventLoop::new(listener, config.buffer_size)?;
    info!(addr = %event_loop.local_addr()?, "Listening");

    event_loop.run()
}
