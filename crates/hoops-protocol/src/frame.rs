//! Canonicalization of inbound frames.
//!
//! Every data frame a client sends is reduced to a UTF-8 string before it is
//! logged or relayed. The conversion never fails: text passes through, binary
//! frames are decoded as UTF-8 when valid and hex-encoded otherwise.

use std::fmt::Write as _;

use thiserror::Error;
use tracing::debug;

/// Prefix marking a hex-encoded binary payload.
pub const HEX_PREFIX: &str = "0x";

/// An inbound data frame, borrowed from the transport message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFrame<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

impl RawFrame<'_> {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Malformed inbound frame.
///
/// Only used inside the framer; callers always get a best-effort string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("Binary frame is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
}

/// Decodes a binary payload as UTF-8.
pub fn decode_utf8(bytes: &[u8]) -> Result<&str, FramingError> {
    std::str::from_utf8(bytes).map_err(|e| FramingError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })
}

/// Converts an inbound frame into its canonical string form.
pub fn canonicalize(frame: RawFrame<'_>) -> String {
    match frame {
        RawFrame::Text(text) => text.to_string(),
        RawFrame::Binary(bytes) => match decode_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(e) => {
                debug!(error = %e, size = bytes.len(), "Falling back to hex for binary frame");
                to_hex(bytes)
            }
        },
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(HEX_PREFIX.len() + bytes.len() * 2);
    out.push_str(HEX_PREFIX);
    for byte in bytes {
        // Writing into a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}
