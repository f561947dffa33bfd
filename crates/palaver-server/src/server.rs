//! Runtime: event loop, connection lifecycle, and broadcast delivery.
//!
//! One logical thread of control. Each iteration blocks once in the
//! poller's bounded wait, then processes the listener and every readable
//! client in ascending handle order. A message and a disconnect detected
//! in the same iteration are handled in that same deterministic order.
//!
//! Lifecycle per connection: accepted → registered + watched (Live) →
//! unwatched + unregistered + socket dropped (Closed). Registry
//! membership and the poller watch set change only in those two paths,
//! which keeps them in lock-step at the start of every iteration.

use std::{
    collections::HashMap,
    io::{self, Read, Write},
    net::SocketAddr,
    time::Duration,
};

use mio::net::{TcpListener, TcpStream};
use palaver_proto::{FRAME_LEN, Frame};

use crate::{
    driver::{ChatDriver, LogLevel, ServerAction, ServerEvent},
    error::ServerError,
    poller::Poller,
    registry::Handle,
};

/// Default port, kept from the original service.
pub const DEFAULT_PORT: u16 = 33333;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to, e.g. `"0.0.0.0:33333"`.
    pub bind_address: String,
    /// Bounded readiness wait per loop iteration.
    pub poll_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            poll_timeout: Duration::from_secs(2),
        }
    }
}

/// One accepted client socket plus its partial-frame read state.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    frame: [u8; FRAME_LEN],
    filled: usize,
}

/// Outcome of draining one read attempt on a connection.
enum ReadOutcome {
    /// A complete frame was assembled.
    Frame(Frame),
    /// No more input for now; the frame buffer may hold a partial frame.
    Idle,
    /// The peer closed the connection (zero-length read).
    Closed,
    /// A hard read error.
    Failed(io::Error),
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self { stream, frame: [0u8; FRAME_LEN], filled: 0 }
    }

    /// Read until one complete frame is assembled or input runs dry.
    ///
    /// TCP does not respect frame boundaries, so a frame may arrive in
    /// several reads; the partial state is kept across loop iterations.
    fn read_frame(&mut self) -> ReadOutcome {
        loop {
            match self.stream.read(&mut self.frame[self.filled..]) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(n) => {
                    self.filled += n;
                    if self.filled == FRAME_LEN {
                        self.filled = 0;
                        return ReadOutcome::Frame(Frame::from_wire(self.frame));
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::Idle,
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
    }

    /// Write the full frame, tolerating partial writes.
    ///
    /// `WouldBlock` before the first byte reports the peer as unwritable
    /// and nothing has been sent. Once a frame is partially written it is
    /// always completed: abandoning it mid-frame would desynchronize the
    /// peer's fixed-size framing.
    fn send_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let bytes = frame.as_bytes();
        let mut sent = 0;
        while sent < FRAME_LEN {
            match self.stream.write(&bytes[sent..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer stopped accepting bytes",
                    ));
                },
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && sent > 0 => {},
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// The chat server runtime.
///
/// Owns the listening socket, the live connections, the readiness
/// [`Poller`], and the [`ChatDriver`]. All state is exclusively owned by
/// the loop thread; there is nothing to lock.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    poller: Poller,
    driver: ChatDriver,
    connections: HashMap<Handle, Connection>,
    next_handle: usize,
    poll_timeout: Duration,
}

impl Server {
    /// Bind the listening socket and set up the multiplexer.
    ///
    /// # Errors
    ///
    /// `ServerError::Config` if the bind address is invalid or the socket
    /// cannot be bound; these are fatal and surfaced to the operator.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address: {e}")))?;

        let mut listener = TcpListener::bind(addr)
            .map_err(|e| ServerError::Config(format!("failed to bind {addr}: {e}")))?;

        let mut poller = Poller::new()?;
        poller.register_listener(&mut listener)?;

        Ok(Self {
            listener,
            poller,
            driver: ChatDriver::new(),
            connections: HashMap::new(),
            // Token 0 is the listener; client handles start at 1.
            next_handle: 1,
            poll_timeout: config.poll_timeout,
        })
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the event loop until the process is terminated.
    ///
    /// Termination is external (a signal); the operating system releases
    /// the listening socket on exit. In-flight frames may be lost.
    pub fn run(mut self) -> ! {
        tracing::info!("serving");
        loop {
            self.poll_once();
        }
    }

    /// Run a single multiplexer iteration: one bounded readiness wait,
    /// then the listener and every readable client in ascending order.
    pub fn poll_once(&mut self) {
        let readiness = self.poller.poll(self.poll_timeout);

        if readiness.accept {
            self.accept_pending();
        }
        for handle in readiness.readable {
            self.drain_client(handle);
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of handles registered with the driver's registry.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.driver.client_count()
    }

    /// Number of handles watched by the multiplexer.
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.poller.watched_count()
    }

    /// Accept every pending connection, registering and watching each.
    ///
    /// Accept failures are logged and never affect existing connections.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer_addr)) => {
                    let handle = Handle::new(self.next_handle);
                    self.next_handle += 1;

                    if let Err(e) = self.poller.watch(&mut stream, handle) {
                        tracing::error!(%handle, error = %e, "failed to watch new connection");
                        continue; // stream dropped, peer sees a close
                    }
                    self.connections.insert(handle, Connection::new(stream));
                    tracing::info!(%handle, %peer_addr, "accepted connection");

                    self.dispatch(ServerEvent::ConnectionAccepted { handle });
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                    break;
                },
            }
        }
    }

    /// Drain complete frames from a readable client.
    fn drain_client(&mut self, handle: Handle) {
        loop {
            // The handle may have closed earlier in this same pass; a
            // closed handle is never read again.
            let Some(conn) = self.connections.get_mut(&handle) else {
                return;
            };

            match conn.read_frame() {
                ReadOutcome::Frame(frame) => {
                    self.dispatch(ServerEvent::FrameReceived { handle, frame });
                },
                ReadOutcome::Idle => return,
                ReadOutcome::Closed => {
                    tracing::debug!(%handle, "peer closed connection");
                    self.close_connection(handle);
                    return;
                },
                ReadOutcome::Failed(e) => {
                    tracing::warn!(%handle, error = %e, "read failed, closing connection");
                    self.close_connection(handle);
                    return;
                },
            }
        }
    }

    /// Live → Closed transition: unwatch, unregister, announce, drop.
    ///
    /// Removing the connection first makes the transition idempotent-safe:
    /// a second close for the same handle is a no-op.
    fn close_connection(&mut self, handle: Handle) {
        let Some(mut conn) = self.connections.remove(&handle) else {
            return;
        };
        if let Err(e) = self.poller.unwatch(&mut conn.stream, handle) {
            tracing::warn!(%handle, error = %e, "failed to unwatch connection");
        }
        self.dispatch(ServerEvent::ConnectionClosed { handle });
        // Socket released when `conn` drops here.
    }

    /// Feed an event to the driver and execute the resulting actions.
    ///
    /// Driver errors (unknown client, duplicate registration) are logged
    /// and the event dropped; they never terminate the server.
    fn dispatch(&mut self, event: ServerEvent) {
        match self.driver.process_event(event) {
            Ok(actions) => {
                for action in actions {
                    self.execute(action);
                }
            },
            Err(e) => tracing::warn!(error = %e, "event dropped"),
        }
    }

    fn execute(&mut self, action: ServerAction) {
        match action {
            ServerAction::Broadcast { frame, exclude } => self.broadcast(&frame, exclude),
            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
            },
        }
    }

    /// Deliver a frame to every registered client except `exclude`.
    ///
    /// Delivery order is the registry snapshot's ascending handle order.
    /// A peer outside the writable snapshot is skipped for this broadcast;
    /// a per-peer write failure is logged and that peer skipped. Neither
    /// aborts delivery to other peers, and neither triggers disconnection
    /// here; dead peers are detected on their own read turn.
    fn broadcast(&mut self, frame: &Frame, exclude: Option<Handle>) {
        for handle in self.driver.handles() {
            if Some(handle) == exclude {
                continue;
            }
            if !self.poller.writable(handle) {
                tracing::debug!(%handle, "peer not writable, skipping for this broadcast");
                continue;
            }
            let Some(conn) = self.connections.get_mut(&handle) else {
                continue;
            };
            match conn.send_frame(frame) {
                Ok(()) => {},
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.poller.mark_unwritable(handle);
                    tracing::warn!(%handle, "send buffer full, skipping peer");
                },
                Err(e) => {
                    tracing::warn!(%handle, error = %e, "failed to deliver frame");
                },
            }
        }
    }
}
