//! Interactive line-oriented client for the echomux server.
//!
//! Reads lines from stdin, sends each one as a single message, and
//! prints the timestamped reply. Type `exit` to quit.

use clap::Parser;
use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "echomux-client")]
#[command(about = "Interactive client for the echomux server", long_about = None)]
struct CliArgs {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let mut stream = TcpStream::connect((args.host.as_str(), args.port))?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut chunk = [0u8; 1024];

    loop {
        print!("Enter message (type 'exit' to quit): ");
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let message = line.trim_end();
        if message == "exit" {
            break;
        }
        if message.is_empty() {
            continue;
        }

        stream.write_all(message.as_bytes())?;

        // Replies end with a newline; keep reading until it arrives.
        let mut reply = Vec::new();
        loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                println!("Server disconnected");
                return Ok(());
            }
            reply.extend_from_slice(&chunk[..n]);
            if reply.contains(&b'\n') {
                break;
            }
        }
        print!("{}", String::from_utf8_lossy(&reply));
    }

    Ok(())
}
