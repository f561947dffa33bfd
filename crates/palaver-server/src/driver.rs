//! Sans-IO chat driver: command dispatch, lifecycle notices, broadcast
//! decisions.
//!
//! The driver owns the [`Registry`] and contains every rule about *what*
//! gets sent to *whom*; it performs no I/O. The runtime feeds it
//! [`ServerEvent`]s and executes the returned [`ServerAction`]s.
//!
//! Notification rules, preserved from the original wire behavior:
//!
//! - `"<name> connected"` goes to everyone except the new client.
//! - `"<old> changed name to <new>"` goes to everyone, including the
//!   renamed client.
//! - `"<name>: <text>"` chat goes to everyone except the sender.
//! - `"<name> has disconnected"` goes to the remaining clients.

use palaver_proto::{Command, Frame};

use crate::registry::{Handle, Registry, RegistryError};

/// Observations produced by the runtime for the driver to process.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted and is watched by the multiplexer.
    ConnectionAccepted {
        /// Handle assigned by the runtime.
        handle: Handle,
    },

    /// A complete frame was read from a connection.
    FrameReceived {
        /// Connection that sent the frame.
        handle: Handle,
        /// The received frame.
        frame: Frame,
    },

    /// A connection closed (zero-length read or hard read error) and has
    /// been removed from the multiplexer.
    ConnectionClosed {
        /// Connection that closed.
        handle: Handle,
    },
}

/// Effects for the runtime to execute.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Deliver a frame to every live client except `exclude`.
    Broadcast {
        /// Frame to deliver.
        frame: Frame,
        /// Client to skip, if any.
        exclude: Option<Handle>,
    },

    /// Emit a log record.
    Log {
        /// Severity for the runtime's logger.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels carried by [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
}

/// Pure chat logic over the client registry.
///
/// A failed event (unknown client, duplicate registration) is returned as
/// an error for the runtime to log; it never carries partial actions, and
/// it never terminates the server.
#[derive(Debug, Default)]
pub struct ChatDriver {
    registry: Registry,
}

impl ChatDriver {
    /// Create a driver with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one event and return the actions to execute.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, RegistryError> {
        match event {
            ServerEvent::ConnectionAccepted { handle } => self.handle_accepted(handle),
            ServerEvent::FrameReceived { handle, frame } => self.handle_frame(handle, &frame),
            ServerEvent::ConnectionClosed { handle } => self.handle_closed(handle),
        }
    }

    fn handle_accepted(&mut self, handle: Handle) -> Result<Vec<ServerAction>, RegistryError> {
        let name = self.registry.register(handle)?.name.clone();

        Ok(vec![
            ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("client {handle} registered as {name}"),
            },
            ServerAction::Broadcast {
                frame: Frame::encode(&format!("{name} connected")),
                exclude: Some(handle),
            },
        ])
    }

    fn handle_frame(
        &mut self,
        handle: Handle,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, RegistryError> {
        match Command::from_frame(frame) {
            Command::Rename { name } => {
                let (old, new) = self.registry.rename(handle, &name)?;
                Ok(vec![
                    ServerAction::Log {
                        level: LogLevel::Info,
                        message: format!("client {handle} changed name from {old} to {new}"),
                    },
                    // The renamed client hears about its own rename.
                    ServerAction::Broadcast {
                        frame: Frame::encode(&format!("{old} changed name to {new}")),
                        exclude: None,
                    },
                ])
            },
            Command::Chat { text } => {
                let name = &self.registry.lookup(handle)?.name;
                Ok(vec![ServerAction::Broadcast {
                    frame: Frame::encode(&format!("{name}: {text}")),
                    exclude: Some(handle),
                }])
            },
        }
    }

    fn handle_closed(&mut self, handle: Handle) -> Result<Vec<ServerAction>, RegistryError> {
        let identity = self.registry.unregister(handle)?;

        Ok(vec![
            ServerAction::Log {
                level: LogLevel::Info,
                message: format!("client {handle} ({}) disconnected", identity.name),
            },
            ServerAction::Broadcast {
                frame: Frame::encode(&format!("{} has disconnected", identity.name)),
                exclude: Some(handle),
            },
        ])
    }

    /// Snapshot of registered handles in ascending order, stable for one
    /// broadcast pass.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        self.registry.handles()
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether a handle is registered.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.registry.contains(handle)
    }
}
