//! Tagged decode of a frame's payload.
//!
//! The wire distinguishes renames from chat text only by prefix sniffing.
//! That decision is made exactly once, here, and the rest of the system
//! works with the tagged variant instead of re-testing the prefix.

use crate::frame::{Frame, MAX_NAME_LEN, RENAME_PREFIX, truncate_at_boundary};

/// An inbound frame, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A rename command: set the sender's display name.
    Rename {
        /// The requested name, already truncated to [`MAX_NAME_LEN`] bytes.
        name: String,
    },

    /// Plain chat text to fan out to the other clients.
    Chat {
        /// The decoded message text.
        text: String,
    },
}

impl Command {
    /// Classify a frame.
    ///
    /// A frame is a rename when its payload starts with [`RENAME_PREFIX`]
    /// followed by at least one byte; that byte is the separator and is
    /// skipped without being inspected. Everything after it is the new
    /// name, silently truncated to [`MAX_NAME_LEN`] bytes. A bare prefix
    /// with no separator is ordinary chat text.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Self {
        let payload = frame.payload();
        let prefix = RENAME_PREFIX.as_bytes();

        if payload.len() > prefix.len() && payload.starts_with(prefix) {
            let name_bytes = &payload[prefix.len() + 1..];
            let name = String::from_utf8_lossy(name_bytes);
            let name = truncate_at_boundary(&name, MAX_NAME_LEN).to_owned();
            Self::Rename { name }
        } else {
            Self::Chat { text: frame.decode().into_owned() }
        }
    }
}
