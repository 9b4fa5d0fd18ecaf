//! Slide image preparation.
//!
//! Slides must fit the Slideshow profile: at most 320x240 pixels and, for
//! the Simple Profile, at most 51200 bytes. Suitable JPEG/PNG input passes
//! through untouched to avoid recompression loss; everything else is
//! resized with a Lanczos filter and re-encoded as whichever of PNG or JPEG
//! comes out smaller within the size limit.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use log::{info, warn};

use crate::error::EncoderError;

/// Maximum slide dimensions from the Slideshow profile.
const MAX_WIDTH: u32 = 320;
const MAX_HEIGHT: u32 = 240;

/// Lowest JPEG quality the compressor may fall back to.
const MIN_QUALITY: u8 = 40;

/// A slide ready for MOT carriage.
pub struct EncodedSlide {
    pub bytes: Vec<u8>,
    /// Content subtype: JFIF when true, PNG otherwise.
    pub jfif_not_png: bool,
}

/// Prepare the image file at `path` for transmission.
pub fn prepare_slide(path: &Path, fidx: u32, max_size: usize) -> Result<EncodedSlide, EncoderError> {
    let raw = std::fs::read(path)?;

    let format = image::guess_format(&raw)?;
    let img = image::load_from_memory_with_format(&raw, format)?;
    let (width, height) = (img.width(), img.height());

    info!(
        "image: '{}' (id={}). Original size: {} x {} ({:?})",
        path.display(),
        fidx,
        width,
        height,
        format
    );

    // Pass suitable input through as is: device support for progressive
    // JPEG is optional, so those always get recompressed.
    let progressive = format == ImageFormat::Jpeg && is_progressive_jpeg(&raw);
    if matches!(format, ImageFormat::Jpeg | ImageFormat::Png)
        && width <= MAX_WIDTH
        && height <= MAX_HEIGHT
        && !progressive
        && raw.len() <= max_size
    {
        info!(
            "image: '{}' (id={}). No resize needed: {} bytes",
            path.display(),
            fidx,
            raw.len()
        );
        warn_on_smaller_image(width, height, path);
        return Ok(EncodedSlide {
            bytes: raw,
            jfif_not_png: format == ImageFormat::Jpeg,
        });
    }

    resize_and_compress(img, path, max_size)
}

/// Scale the image down to fit 320x240 if needed and compress it under
/// `max_size`, preferring whichever of PNG and JPEG comes out smaller.
fn resize_and_compress(
    img: DynamicImage,
    path: &Path,
    max_size: usize,
) -> Result<EncodedSlide, EncoderError> {
    let img = if img.width() > MAX_WIDTH || img.height() > MAX_HEIGHT {
        img.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3)
    } else {
        img
    };
    let (width, height) = (img.width(), img.height());

    // try PNG at maximum compression
    let mut png = Vec::new();
    img.write_with_encoder(PngEncoder::new_with_quality(
        Cursor::new(&mut png),
        CompressionType::Best,
        PngFilterType::Adaptive,
    ))?;

    // try JPEG, lowering the quality until the slide fits
    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    let mut quality = 100u8;
    loop {
        quality -= 5;
        jpeg.clear();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), quality);
        rgb.write_with_encoder(encoder)?;
        if jpeg.len() <= max_size || quality <= MIN_QUALITY {
            break;
        }
    }

    if png.len() > max_size && jpeg.len() > max_size {
        return Err(EncoderError::SlideTooLarge {
            png_size: png.len(),
            jpeg_size: jpeg.len(),
            max_size,
        });
    }

    // choose the smaller one (at least one fits)
    let jfif_not_png = jpeg.len() < png.len();
    if jfif_not_png {
        info!(
            "resized image to {} x {}. Size after compression {} bytes (JPEG, q={}; PNG was {} bytes)",
            width, height, jpeg.len(), quality, png.len()
        );
    } else {
        info!(
            "resized image to {} x {}. Size after compression {} bytes (PNG; JPEG was {} bytes)",
            width, height, png.len(), jpeg.len()
        );
    }

    warn_on_smaller_image(width, height, path);

    Ok(EncodedSlide {
        bytes: if jfif_not_png { jpeg } else { png },
        jfif_not_png,
    })
}

fn warn_on_smaller_image(width: u32, height: u32, path: &Path) {
    if height < MAX_HEIGHT || width < MAX_WIDTH {
        warn!(
            "image '{}' smaller than recommended size ({} x {} < 320 x 240 px)",
            path.display(),
            width,
            height
        );
    }
}

/// Whether a JPEG stream uses progressive coding (an SOF2 frame marker).
pub fn is_progressive_jpeg(data: &[u8]) -> bool {
    let mut i = 2; // skip SOI
    while i + 3 < data.len() {
        if data[i] != 0xFF {
            return false;
        }
        let marker = data[i + 1];
        match marker {
            // progressive DCT frame
            0xC2 => return true,
            // baseline and other frame types
            0xC0 | 0xC1 | 0xC3 => return false,
            // start of scan: no frame header seen before payload
            0xDA => return false,
            // markers without a length field
            0xD8 | 0x01 | 0xD0..=0xD7 => {
                i += 2;
            }
            _ => {
                let len = ((data[i + 2] as usize) << 8) | data[i + 3] as usize;
                i += 2 + len;
            }
        }
    }
    false
}
