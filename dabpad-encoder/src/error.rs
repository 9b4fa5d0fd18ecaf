//! Error types for the encoder daemon.

use thiserror::Error;

/// Errors that end an encode attempt or the daemon itself.
#[derive(Error, Debug)]
pub enum EncoderError {
    /// Transport or filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// PAD framing rejected a parameter (fatal: the peer dictates padlen).
    #[error(transparent)]
    Pad(#[from] dabpad_protocol::PadError),

    /// The imaging library could not process a slide.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A slide stayed above the size limit at the lowest allowed quality.
    #[error("slide too large after compression: {png_size} bytes (PNG), {jpeg_size} bytes (JPEG), limit {max_size}")]
    SlideTooLarge {
        png_size: usize,
        jpeg_size: usize,
        max_size: usize,
    },

    /// A slide file with no content cannot be carried.
    #[error("slide file is empty")]
    EmptySlide,
}
