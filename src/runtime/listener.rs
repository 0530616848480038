//! Dual-stack TCP listener construction.
//!
//! The listener is built through socket2 so the passive socket can be
//! configured before `bind`: dual-stack operation for IPv6 addresses and
//! `SO_REUSEADDR` so a restart does not fail on a still-draining port.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

/// A bound, listening TCP socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Open a passive socket on `host:port` with the given backlog.
    ///
    /// An IPv6 bind address is opened dual-stack, so IPv4 peers reach the
    /// same listener as IPv4-mapped addresses. Failure here is fatal for
    /// the server: it cannot fulfill its contract without a listener.
    pub fn bind(host: &str, port: u16, backlog: i32) -> io::Result<Self> {
        let ip: IpAddr = host.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid bind address '{host}': {e}"),
            )
        })?;
        let addr = SocketAddr::new(ip, port);

        let socket = Socket::new(
            match addr {
                SocketAddr::V4(_) => Domain::IPV4,
                SocketAddr::V6(_) => Domain::IPV6,
            },
            Type::STREAM,
            Some(Protocol::TCP),
        )?;

        if addr.is_ipv6() {
            socket.set_only_v6(false)?;
        }
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog)?;

        Ok(Self {
            inner: socket.into(),
        })
    }

    /// Accept one pending connection.
    ///
    /// Will not block only when called after read-readiness was observed
    /// on this descriptor, or once the listener is nonblocking.
    pub fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.inner.set_nonblocking(nonblocking)
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_stack_accepts_both_families() {
        let listener = Listener::bind("::", 0, 10).unwrap();
        let port = listener.local_addr().unwrap().port();

        let v4_client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let (_, v4_peer) = listener.accept().unwrap();
        assert_eq!(v4_client.local_addr().unwrap().port(), v4_peer.port());

        let v6_client = TcpStream::connect(("::1", port)).unwrap();
        let (_, v6_peer) = listener.accept().unwrap();
        assert_eq!(v6_client.local_addr().unwrap().port(), v6_peer.port());
    }

    #[test]
    fn test_ipv4_only_bind() {
        let listener = Listener::bind("127.0.0.1", 0, 10).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.is_ipv4());

        let _client = TcpStream::connect(addr).unwrap();
        listener.accept().unwrap();
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let err = Listener::bind("not-an-address", 0, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
