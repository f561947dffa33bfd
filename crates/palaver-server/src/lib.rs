//! Palaver chat server.
//!
//! A single-threaded, readiness-driven TCP server that fans every chat
//! frame out to all other connected clients. All state lives on the loop
//! thread; there are no locks and no background tasks.
//!
//! # Architecture
//!
//! The server follows a Sans-IO split:
//!
//! 1. The runtime ([`Server`]) owns the sockets. Each loop iteration it
//!    asks the [`Poller`] which handles are readable, accepts pending
//!    connections, and drains complete frames from ready clients.
//! 2. Every observation becomes a [`ServerEvent`] fed to the
//!    [`ChatDriver`] (pure logic, owns the [`Registry`]), which returns
//!    [`ServerAction`]s.
//! 3. The runtime executes the actions: broadcasts against the poller's
//!    writable snapshot with per-peer partial-write handling, and log
//!    actions via `tracing`.
//!
//! # Components
//!
//! - [`Registry`]: handle → display-name identity mapping
//! - [`Poller`]: mio-backed readiness multiplexer with a bounded wait
//! - [`ChatDriver`]: command dispatch, lifecycle notices, broadcast
//!   decisions
//! - [`Server`]: accept/close lifecycle and broadcast delivery

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod poller;
mod registry;
mod server;

pub use driver::{ChatDriver, LogLevel, ServerAction, ServerEvent};
pub use error::ServerError;
pub use poller::{Poller, Readiness};
pub use registry::{Handle, Identity, Registry, RegistryError};
pub use server::{DEFAULT_PORT, Server, ServerConfig};
