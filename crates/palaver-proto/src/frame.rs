//! The fixed-size message frame.

use std::{borrow::Cow, fmt};

/// Size of every frame on the wire, in bytes.
///
/// Messages longer than `FRAME_LEN - 1` visible bytes are truncated by
/// construction; the final byte is always a zero terminator.
pub const FRAME_LEN: usize = 1024;

/// Maximum usable length of a client display name, in bytes.
pub const MAX_NAME_LEN: usize = 8;

/// Literal prefix that marks a frame as a rename command.
///
/// On the wire: `"!USERINFO"` + one separator byte + the new name.
pub const RENAME_PREFIX: &str = "!USERINFO";

/// A single protocol frame: exactly [`FRAME_LEN`] bytes, zero-padded.
///
/// Frames are ephemeral. They are constructed per read or write and never
/// persisted; the codec itself cannot fail.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Encode `text` into a frame.
    ///
    /// Copies up to `FRAME_LEN - 1` bytes of `text` (truncating at a UTF-8
    /// character boundary) and zero-fills the remainder. Truncation is
    /// silent; this is the protocol's only length control.
    #[must_use]
    pub fn encode(text: &str) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        let text = truncate_at_boundary(text, FRAME_LEN - 1);
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        Self { bytes }
    }

    /// Reassemble a frame from bytes received off the wire.
    #[must_use]
    pub fn from_wire(bytes: [u8; FRAME_LEN]) -> Self {
        Self { bytes }
    }

    /// The contained text: bytes up to the first zero byte, or all
    /// `FRAME_LEN` bytes if none. Invalid UTF-8 is replaced lossily.
    #[must_use]
    pub fn decode(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.payload())
    }

    /// Raw payload bytes up to the first zero byte.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(FRAME_LEN);
        &self.bytes[..end]
    }

    /// The full `FRAME_LEN`-byte wire representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("text", &self.decode()).finish()
    }
}

/// Longest prefix of `text` that fits in `max` bytes without splitting a
/// UTF-8 character.
pub(crate) fn truncate_at_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
