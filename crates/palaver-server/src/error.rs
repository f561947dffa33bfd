//! Server error types.
//!
//! Only two failure classes reach a caller: configuration errors at
//! startup (bad bind address, port in use) and transport errors while
//! setting up the multiplexer. Everything that happens after the loop is
//! running (transient accept/read/write failures, unknown clients,
//! malformed frames) is logged at the call site and recovered locally;
//! one bad peer never affects any other peer or the server process.

use thiserror::Error;

use crate::registry::RegistryError;

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration or inability to bind/listen. Fatal: fix the
    /// configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while setting up transport or the multiplexer.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Registry bookkeeping error escaped the event loop.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}
