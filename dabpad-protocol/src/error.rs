//! Error types for the PAD framing engine.

use thiserror::Error;

/// Errors produced while building PAD structures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PadError {
    /// PAD length outside the values the packetizer can serve.
    #[error("invalid PAD length {0}: allowed are 6 (short X-PAD) and 8 to 196 (variable size X-PAD)")]
    InvalidPadLen(usize),

    /// Character set id not defined by TS 101 756.
    #[error("unsupported charset id {0}")]
    UnsupportedCharset(u8),
}
