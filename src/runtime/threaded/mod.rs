//! Thread-per-connection runtime.
//!
//! The simpler concurrency model the poll loop replaces: a blocking
//! accept loop hands each connection to its own detached worker thread.
//! The global counter is shared across workers, so increment-and-read
//! must be a single indivisible step; `AtomicU64::fetch_add` gives every
//! message a distinct counter value with no lock.

use crate::config::Config;
use crate::runtime::{format_reply, Listener};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

/// Run the server using the threaded backend.
pub fn run(config: Config) -> io::Result<()> {
    let listener = Listener::bind(&config.host, config.port, config.backlog)?;
    info!(addr = %listener.local_addr()?, "Listening");
    serve(listener, config.buffer_size)
}

fn serve(listener: Listener, buffer_size: usize) -> io::Result<()> {
    let counter = Arc::new(AtomicU64::new(0));

    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                info!(peer = %peer_addr, "Client connected");
                let counter = Arc::clone(&counter);
                let spawned = thread::Builder::new()
                    .name(format!("conn-{peer_addr}"))
                    .spawn(move || serve_client(stream, counter, buffer_size));
                if let Err(e) = spawned {
                    error!(peer = %peer_addr, error = %e, "Failed to spawn worker");
                }
            }
            Err(e) => {
                error!(error = %e, "Accept error");
            }
        }
    }
}

/// Service one connection until EOF or error: receive, count, reply.
fn serve_client(mut stream: TcpStream, counter: Arc<AtomicU64>, buffer_size: usize) {
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "Receive error");
                break;
            }
        };

        // fetch_add returns the previous value; +1 is this message's
        // count, observed by no other worker.
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let reply = format_reply(&buf[..n], count);

        if let Err(e) = stream.write_all(reply.as_bytes()) {
            debug!(error = %e, "Reply write failed");
            break;
        }
    }

    debug!("Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn spawn_server(buffer_size: usize) -> SocketAddr {
        let listener = Listener::bind("127.0.0.1", 0, 10).unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let _ = serve(listener, buffer_size);
        });
        addr
    }

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

    fn counter_value(reply: &str) -> u64 {
        reply
            .trim_end()
            .rsplit(' ')
            .next()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn test_echo_over_threaded_runtime() {
        let addr = spawn_server(1024);
        let mut client = TcpStream::connect(addr).unwrap();

        let reply = exchange(&mut client, "hello");
        assert!(reply.starts_with("Echo: hello | Time: "), "got: {reply}");
        assert_eq!(counter_value(&reply), 1);
    }

    #[test]
    fn test_concurrent_clients_never_share_a_count() {
        let addr = spawn_server(1024);

        let workers: Vec<_> = (0..4)
            .map(|i| {
                thread::spawn(move || {
                    let mut client = TcpStream::connect(addr).unwrap();
                    let reply = exchange(&mut client, &format!("client {i}"));
                    counter_value(&reply)
                })
            })
            .collect();

        let mut counts: Vec<u64> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![1, 2, 3, 4]);
    }
}
