//! Wire types for the palaver chat protocol.
//!
//! The protocol has exactly one unit of transfer: a zero-padded frame of
//! [`FRAME_LEN`] bytes carried over a TCP stream. There is no length prefix
//! and no delimiter; the fixed size *is* the framing. Two payload shapes
//! share the frame and are distinguished once, at decode time:
//!
//! - Chat text: a zero-terminated string, rest of the frame zero-filled.
//! - Rename command: the literal [`RENAME_PREFIX`] followed by a single
//!   separator byte and the new display name.
//!
//! This crate is pure data handling. It performs no I/O and raises no
//! errors: oversized text and malformed names are silently truncated,
//! matching the wire behavior existing clients depend on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod frame;

pub use command::Command;
pub use frame::{FRAME_LEN, Frame, MAX_NAME_LEN, RENAME_PREFIX};
