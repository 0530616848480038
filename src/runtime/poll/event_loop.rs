//! The single-threaded readiness loop.
//!
//! Steady state is WAITING -> DISPATCHING -> WAITING: block on the full
//! watch set, walk the signaled entries in registry order, re-enter the
//! wait. The listener entry drains pending accepts; each peer entry gets
//! exactly one bounded receive per readiness signal, so no handler step
//! can starve the other connections.
//!
//! The global message counter lives here as a plain integer: the loop is
//! the only thread that touches it, so increment-and-read needs no
//! synchronization.

use crate::runtime::{format_reply, Listener, Registry};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use tracing::{debug, error, info, warn};

/// What became of a peer after its readiness was serviced.
enum Disposition {
    KeepOpen,
    Closed,
}

/// Single-threaded poll multiplexer over one listener and its peers.
pub struct EventLoop {
    registry: Registry,
    /// Messages successfully received across all connections.
    counter: u64,
    /// One bounded receive per readiness event lands here.
    recv_buf: Vec<u8>,
}

impl EventLoop {
    /// Wrap a bound listener. The listener is switched to nonblocking so
    /// the accept drain can stop cleanly at `WouldBlock`.
    pub fn new(listener: Listener, buffer_size: usize) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            registry: Registry::new(listener),
            counter: 0,
            recv_buf: vec![0; buffer_size],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.registry.listener().local_addr()
    }

    /// Run until the readiness primitive itself fails. There is no
    /// graceful-shutdown path; per-connection failures never surface
    /// here.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.registry.clear_readiness();
            if let Err(e) = self.registry.wait() {
                error!(error = %e, "poll failed, shutting down");
                return Err(e);
            }
            self.dispatch();
        }
    }

    /// Walk the watch set in registry order and service every signaled
    /// entry. After a removal the swapped-in entry occupies the current
    /// index, so the index is re-inspected rather than advanced.
    fn dispatch(&mut self) {
        let mut index = 0;
        while index < self.registry.len() {
            if self.registry.is_ready(index) {
                if self.registry.is_listener(index) {
                    self.accept_ready();
                } else if let Disposition::Closed = self.handle_peer(index) {
                    let closed = self.registry.swap_remove(index);
                    drop(closed);
                    continue;
                }
            }
            index += 1;
        }
    }

    /// Drain the accept queue. Accept failures are transient: logged,
    /// never fatal, never affecting established connections.
    fn accept_ready(&mut self) {
        loop {
            match self.registry.listener().accept() {
                Ok((stream, peer_addr)) => {
                    info!(peer = %peer_addr, fd = stream.as_raw_fd(), "Client connected");
                    self.registry.add_peer(stream);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
    }

    /// One bounded receive on a ready peer. Data increments the counter
    /// and produces one reply; EOF or any receive error tears the
    /// connection down. Payloads larger than the buffer arrive truncated
    /// at the buffer boundary, by contract.
    fn handle_peer(&mut self, index: usize) -> Disposition {
        let fd = self.registry.fd_at(index);

        let n = match self.registry.peer_mut(index).read(&mut self.recv_buf) {
            Ok(0) => {
                debug!(fd, "Client disconnected");
                return Disposition::Closed;
            }
            Ok(n) => n,
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                // Spurious wakeup; the entry stays watched.
                return Disposition::KeepOpen;
            }
            Err(e) => {
                debug!(fd, error = %e, "Receive error");
                return Disposition::Closed;
            }
        };

        self.counter += 1;
        let reply = format_reply(&self.recv_buf[..n], self.counter);

        // Full-write or teardown: a reply must not be silently cut short.
        if let Err(e) = self.registry.peer_mut(index).write_all(reply.as_bytes()) {
            warn!(fd, error = %e, "Reply write failed");
            return Disposition::Closed;
        }

        Disposition::KeepOpen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;
    use std::thread;

    fn spawn_server(host: &str, buffer_size: usize) -> SocketAddr {
        let listener = Listener::bind(host, 0, 10).unwrap();
        let mut event_loop = EventLoop::new(listener, buffer_size).unwrap();
        let addr = event_loop.local_addr().unwrap();
        thread::spawn(move || {
            let _ = event_loop.run();
        });
        addr
    }

    /// Read one reply; replies are newline-terminated but may arrive in
    /// more than one segment.
    fn read_reply(stream: &mut TcpStream) -> String {
        let mut reply = Vec::new();
        let mut chunk = [0u8; 512];
        while !reply.contains(&b'\n') {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "server closed before full reply");
            reply.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(reply).unwrap()
    }

    fn exchange(stream: &mut TcpStream, message: &str) -> String {
        stream.write_all(message.as_bytes()).unwrap();
        read_reply(stream)
    }

    #[test]
    fn test_echo_reply_format() {
        let addr = spawn_server("127.0.0.1", 1024);
        let mut client = TcpStream::connect(addr).unwrap();

        let reply = exchange(&mut client, "hello");
        assert!(reply.starts_with("Echo: hello | Time: "), "got: {reply}");
        assert!(reply.ends_with(" | Total messages: 1\n"), "got: {reply}");
    }

    #[test]
    fn test_counter_increases_within_one_connection() {
        let addr = spawn_server("127.0.0.1", 1024);
        let mut client = TcpStream::connect(addr).unwrap();

        assert!(exchange(&mut client, "a").ends_with(" | Total messages: 1\n"));
        assert!(exchange(&mut client, "b").ends_with(" | Total messages: 2\n"));
    }

    #[test]
    fn test_counter_strictly_increases_across_clients() {
        let addr = spawn_server("127.0.0.1", 1024);
        let mut c1 = TcpStream::connect(addr).unwrap();
        let mut c2 = TcpStream::connect(addr).unwrap();
        let mut c3 = TcpStream::connect(addr).unwrap();

        // Interleave one message per client; each reply carries the next
        // counter value, never a repeat.
        assert!(exchange(&mut c1, "one").ends_with(" | Total messages: 1\n"));
        assert!(exchange(&mut c2, "two").ends_with(" | Total messages: 2\n"));
        assert!(exchange(&mut c3, "three").ends_with(" | Total messages: 3\n"));
        assert!(exchange(&mut c1, "again").ends_with(" | Total messages: 4\n"));
    }

    #[test]
    fn test_immediate_close_is_clean() {
        let addr = spawn_server("127.0.0.1", 1024);

        // Connect and close without sending a byte; the loop must tear
        // the entry down without producing a reply or counting anything.
        let silent = TcpStream::connect(addr).unwrap();
        drop(silent);

        let mut client = TcpStream::connect(addr).unwrap();
        let reply = exchange(&mut client, "still alive");
        assert!(reply.starts_with("Echo: still alive | Time: "));
        assert!(reply.ends_with(" | Total messages: 1\n"));
    }

    #[test]
    fn test_full_buffer_payload() {
        let addr = spawn_server("127.0.0.1", 1024);
        let mut client = TcpStream::connect(addr).unwrap();

        // Exactly the receive-buffer size; the echo inside the reply is
        // cut at the 400-byte bound.
        let payload = "x".repeat(1024);
        let reply = exchange(&mut client, &payload);
        assert!(reply.starts_with("Echo: xxxx"));
        assert!(reply.contains(" | Total messages: "));

        // The loop is still serving after the boundary-size message.
        let mut next = TcpStream::connect(addr).unwrap();
        let reply = exchange(&mut next, "after");
        assert!(reply.starts_with("Echo: after | Time: "));
    }

    #[test]
    fn test_dual_stack_ipv4_and_ipv6_clients() {
        let addr = spawn_server("::", 1024);
        let port = addr.port();

        let mut v4 = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let reply = exchange(&mut v4, "from v4");
        assert!(reply.starts_with("Echo: from v4 | Time: "));

        let mut v6 = TcpStream::connect(("::1", port)).unwrap();
        let reply = exchange(&mut v6, "from v6");
        assert!(reply.starts_with("Echo: from v6 | Time: "));
        assert!(reply.ends_with(" | Total messages: 2\n"));
    }
}
