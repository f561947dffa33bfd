//! Readiness multiplexer over `mio::Poll`.
//!
//! Owns the watch set for the listening socket plus all live client
//! connections. Each loop iteration blocks for readiness with a bounded
//! timeout and reports which client handles are readable, in ascending
//! handle order, with the listener reported separately.
//!
//! mio delivers edge-triggered events, while broadcast wants the
//! level-triggered "currently writable" view the original select-based
//! design had. The poller bridges the two: a WRITABLE edge marks a handle
//! writable, and it stays marked until a write observes `WouldBlock` and
//! calls [`Poller::mark_unwritable`]. The next WRITABLE edge re-marks it.

use std::{collections::BTreeSet, io, time::Duration};

use mio::{
    Events, Interest, Poll, Token,
    net::{TcpListener, TcpStream},
};

use crate::registry::Handle;

/// Token reserved for the listening socket.
const LISTENER: Token = Token(0);

/// Event buffer capacity per poll call.
const EVENT_CAPACITY: usize = 1024;

/// Result of one readiness wait.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// The listening socket has at least one pending connection.
    pub accept: bool,
    /// Client handles with pending input, in ascending order.
    pub readable: Vec<Handle>,
}

/// Readiness multiplexer for the listener and all live client sockets.
pub struct Poller {
    poll: Poll,
    events: Events,
    watched: BTreeSet<Handle>,
    writable: BTreeSet<Handle>,
}

impl Poller {
    /// Create a new poller.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
            watched: BTreeSet::new(),
            writable: BTreeSet::new(),
        })
    }

    /// Register the listening socket under the reserved listener token.
    pub fn register_listener(&mut self, listener: &mut TcpListener) -> io::Result<()> {
        self.poll.registry().register(listener, LISTENER, Interest::READABLE)
    }

    /// Start watching a client socket. Takes effect before the next poll.
    pub fn watch(&mut self, stream: &mut TcpStream, handle: Handle) -> io::Result<()> {
        self.poll.registry().register(
            stream,
            Token(handle.value()),
            Interest::READABLE | Interest::WRITABLE,
        )?;
        self.watched.insert(handle);
        Ok(())
    }

    /// Stop watching a client socket. Takes effect before the next poll;
    /// events already queued for the handle are discarded.
    pub fn unwatch(&mut self, stream: &mut TcpStream, handle: Handle) -> io::Result<()> {
        self.watched.remove(&handle);
        self.writable.remove(&handle);
        self.poll.registry().deregister(stream)
    }

    /// Block for readiness with a bounded timeout.
    ///
    /// On timeout the result is simply empty and the caller re-loops; that
    /// is what keeps the server responsive without a thread per client. A
    /// failure of the wait itself is logged and reported as empty, never
    /// treated as fatal.
    pub fn poll(&mut self, timeout: Duration) -> Readiness {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Readiness::default(),
            Err(e) => {
                tracing::error!(error = %e, "readiness wait failed");
                return Readiness::default();
            },
        }

        let mut readiness = Readiness::default();
        let mut readable = BTreeSet::new();

        for event in self.events.iter() {
            if event.token() == LISTENER {
                readiness.accept = true;
                continue;
            }

            let handle = Handle::new(event.token().0);
            if !self.watched.contains(&handle) {
                // Stale event for a handle unwatched this pass.
                continue;
            }
            if event.is_writable() {
                self.writable.insert(handle);
            }
            if event.is_readable() || event.is_read_closed() {
                readable.insert(handle);
            }
        }

        readiness.readable = readable.into_iter().collect();
        readiness
    }

    /// Whether a handle is in the current writable snapshot.
    #[must_use]
    pub fn writable(&self, handle: Handle) -> bool {
        self.writable.contains(&handle)
    }

    /// Drop a handle from the writable snapshot after a write observed
    /// `WouldBlock`. The next WRITABLE edge restores it.
    pub fn mark_unwritable(&mut self, handle: Handle) {
        self.writable.remove(&handle);
    }

    /// Number of watched client handles (excludes the listener).
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Snapshot of watched client handles in ascending order.
    #[must_use]
    pub fn watched(&self) -> Vec<Handle> {
        self.watched.iter().copied().collect()
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("watched", &self.watched)
            .field("writable", &self.writable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Poll repeatedly until `condition` yields a value, with a bound so a
    /// broken test fails instead of hanging.
    fn poll_until<T>(
        poller: &mut Poller,
        mut condition: impl FnMut(&mut Poller, Readiness) -> Option<T>,
    ) -> T {
        for _ in 0..50 {
            let readiness = poller.poll(Duration::from_millis(100));
            if let Some(value) = condition(poller, readiness) {
                return value;
            }
        }
        panic!("condition not reached within poll budget");
    }

    #[test]
    fn listener_reports_pending_accept() {
        let mut poller = Poller::new().unwrap();
        let mut listener =
            TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        poller.register_listener(&mut listener).unwrap();

        let _client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        poll_until(&mut poller, |_, readiness| readiness.accept.then_some(()));
    }

    #[test]
    fn watched_stream_becomes_writable_and_readable() {
        let mut poller = Poller::new().unwrap();
        let mut listener =
            TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        poller.register_listener(&mut listener).unwrap();

        let mut client =
            std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let handle = Handle::new(1);
        let mut stream = poll_until(&mut poller, |_, readiness| {
            readiness.accept.then(|| listener.accept().unwrap().0)
        });
        poller.watch(&mut stream, handle).unwrap();
        assert_eq!(poller.watched(), vec![handle]);

        // A freshly connected socket produces a WRITABLE edge on the next
        // poll, which the snapshot caches.
        poll_until(&mut poller, |poller, _| poller.writable(handle).then_some(()));

        use std::io::Write;
        client.write_all(b"ping").unwrap();
        poll_until(&mut poller, |_, readiness| {
            readiness.readable.contains(&handle).then_some(())
        });

        poller.mark_unwritable(handle);
        assert!(!poller.writable(handle));

        poller.unwatch(&mut stream, handle).unwrap();
        assert_eq!(poller.watched_count(), 0);
    }
}
