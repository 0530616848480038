//! Watch set for the poll-based event loop.
//!
//! A growable, unordered collection of watched descriptors with read
//! interest. The listener occupies index 0 for the life of the loop;
//! every other entry is a connected peer. Removal is swap-remove: the
//! last entry overwrites the hole, so callers iterating by index must
//! re-inspect the vacated index instead of advancing past it.
//!
//! Each entry owns its socket, so removing an entry closes the
//! descriptor exactly once when the returned handle is dropped.

use crate::runtime::Listener;
use std::io;
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};

/// Starting capacity of the watch set.
const INITIAL_CAPACITY: usize = 5;

/// Readiness bits that make an entry dispatchable: readable data,
/// peer hang-up, or a descriptor error (so a broken peer reaches the
/// handler and gets torn down instead of spinning the wait).
const READY_MASK: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

/// A watched socket: the listener or a connected peer.
pub enum Watched {
    Listener(Listener),
    Peer(TcpStream),
}

impl Watched {
    fn raw_fd(&self) -> RawFd {
        match self {
            Watched::Listener(listener) => listener.as_raw_fd(),
            Watched::Peer(stream) => stream.as_raw_fd(),
        }
    }
}

/// The set of descriptors the event loop blocks on.
///
/// `pfds` is the kernel-facing array handed to poll(2); `socks` holds
/// the owning handles. The two are index-aligned at all times.
pub struct Registry {
    pfds: Vec<libc::pollfd>,
    socks: Vec<Watched>,
}

impl Registry {
    /// Create a watch set with the listener pinned at index 0.
    pub fn new(listener: Listener) -> Self {
        let mut registry = Self {
            pfds: Vec::with_capacity(INITIAL_CAPACITY),
            socks: Vec::with_capacity(INITIAL_CAPACITY),
        };
        registry.push(Watched::Listener(listener));
        registry
    }

    fn push(&mut self, sock: Watched) {
        let fd = sock.raw_fd();
        debug_assert!(!self.contains_fd(fd), "descriptor registered twice");
        self.pfds.push(libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        });
        self.socks.push(sock);
    }

    /// Register a connected peer with read interest. Amortized O(1);
    /// backing storage grows by doubling.
    pub fn add_peer(&mut self, stream: TcpStream) {
        self.push(Watched::Peer(stream));
    }

    /// Remove and return the entry at `index` by overwriting it with the
    /// last entry and shrinking the length by one. O(1).
    ///
    /// The entry that moved into `index` has not been examined yet, so a
    /// caller iterating by index must look at `index` again in its next
    /// step. The listener at index 0 is never removable.
    pub fn swap_remove(&mut self, index: usize) -> Watched {
        assert!(index != 0, "listener entry is not removable");
        self.pfds.swap_remove(index);
        self.socks.swap_remove(index)
    }

    /// Number of watched descriptors, listener included.
    pub fn len(&self) -> usize {
        self.socks.len()
    }

    pub fn is_listener(&self, index: usize) -> bool {
        index == 0
    }

    /// Whether the entry at `index` was signaled by the last `wait`.
    pub fn is_ready(&self, index: usize) -> bool {
        self.pfds[index].revents & READY_MASK != 0
    }

    /// Clear observed readiness on every entry so stale signals never
    /// leak into the next `wait`.
    pub fn clear_readiness(&mut self) {
        for pfd in &mut self.pfds {
            pfd.revents = 0;
        }
    }

    /// Block indefinitely until at least one watched descriptor is
    /// ready, and record readiness on the signaled entries.
    ///
    /// Retries on EINTR; any other failure of the readiness primitive is
    /// unrecoverable for the caller.
    pub fn wait(&mut self) -> io::Result<usize> {
        loop {
            let rc = unsafe {
                libc::poll(self.pfds.as_mut_ptr(), self.pfds.len() as libc::nfds_t, -1)
            };
            if rc >= 0 {
                return Ok(rc as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    pub fn listener(&self) -> &Listener {
        match &self.socks[0] {
            Watched::Listener(listener) => listener,
            Watched::Peer(_) => unreachable!("index 0 always holds the listener"),
        }
    }

    pub fn peer_mut(&mut self, index: usize) -> &mut TcpStream {
        match &mut self.socks[index] {
            Watched::Peer(stream) => stream,
            Watched::Listener(_) => panic!("entry {index} is the listener, not a peer"),
        }
    }

    /// Raw descriptor at `index`, for logging.
    pub fn fd_at(&self, index: usize) -> RawFd {
        self.pfds[index].fd
    }

    pub fn contains_fd(&self, fd: RawFd) -> bool {
        self.pfds.iter().any(|pfd| pfd.fd == fd)
    }
}
