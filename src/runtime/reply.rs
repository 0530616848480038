//! Reply assembly for the echo wire format.
//!
//! Replies look like:
//!
//! ```text
//! Echo: <payload> | Time: <server-local-time> | Total messages: <n>\n
//! ```
//!
//! The separators and trailing newline are part of the observable
//! contract; clients read up to the newline.

use chrono::Local;

/// Upper bound on the echoed payload inside a reply. Anything longer is
/// cut at this boundary; there is no reassembly across receives.
pub const MAX_ECHO_LEN: usize = 400;

/// Build one reply for a received payload and the counter value that its
/// receipt produced. The timestamp is rendered in ctime(3) layout.
pub fn format_reply(payload: &[u8], count: u64) -> String {
    let bounded = &payload[..payload.len().min(MAX_ECHO_LEN)];
    let text = String::from_utf8_lossy(bounded);
    let timestamp = Local::now().format("%a %b %e %H:%M:%S %Y");
    format!("Echo: {text} | Time: {timestamp} | Total messages: {count}\n")
}
