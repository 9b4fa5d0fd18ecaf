//! MOT Slideshow encoding: turns a slide file into queued Data Groups.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use dabpad_protocol::mot::{MotHeader, MotSegmenter};
use dabpad_protocol::types::DabCharset;
use dabpad_protocol::PadPacketizer;

use crate::error::EncoderError;
use crate::imaging::{self, EncodedSlide};
use crate::slides::SLS_PARAMS_SUFFIX;

/// Filename suffixes that force raw transmission of a single slide.
const RAW_MODE_SUFFIXES: [&str; 2] = ["_padencrawmode.jpg", "_padencrawmode.png"];

/// Encodes slides into MOT Data Groups and queues them for transmission.
#[derive(Default)]
pub struct SlsEncoder {
    segmenter: MotSegmenter,
}

impl SlsEncoder {
    pub fn new() -> Self {
        Self {
            segmenter: MotSegmenter::new(),
        }
    }

    /// Encode one slide and append its Data Groups to the packetizer queue.
    pub fn encode_slide(
        &mut self,
        packetizer: &mut PadPacketizer,
        path: &Path,
        fidx: u32,
        raw_slides: bool,
        max_slide_size: usize,
        dump_path: Option<&Path>,
    ) -> Result<(), EncoderError> {
        let slide = if raw_slides || has_raw_mode_suffix(path) {
            read_raw_slide(path, fidx, max_slide_size)?
        } else {
            imaging::prepare_slide(path, fidx, max_slide_size)?
        };

        if slide.bytes.is_empty() {
            return Err(EncoderError::EmptySlide);
        }

        if let Some(dump) = dump_path {
            if let Err(e) = fs::write(dump, &slide.bytes) {
                warn!("writing current slide dump '{}' failed: {}", dump.display(), e);
            }
        }

        let params_path = sidecar_params_path(path);
        let header = self.create_mot_header(slide.bytes.len(), fidx, slide.jfif_not_png, &params_path);

        let dgs = self
            .segmenter
            .pack_object(&header, &slide.bytes, fidx as u16);
        packetizer.add_dgs(dgs, false);

        Ok(())
    }

    fn create_mot_header(
        &self,
        blob_size: usize,
        fidx: u32,
        jfif_not_png: bool,
        params_path: &Path,
    ) -> Vec<u8> {
        // content type image, subtype JFIF / PNG
        let mut header = MotHeader::new(blob_size, 0x02, if jfif_not_png { 0x001 } else { 0x003 });

        // TriggerTime: NOW
        header.add_extension(0x05, &[0x00; 4]);

        // ContentName: charset nibble + "NNNN.jpg" / "NNNN.png"
        let content_name = format!("{:04}.{}", fidx, if jfif_not_png { "jpg" } else { "png" });
        let mut name_field = Vec::with_capacity(1 + content_name.len());
        name_field.push((DabCharset::CompleteEbuLatin as u8) << 4);
        name_field.extend_from_slice(content_name.as_bytes());
        header.add_extension(0x0C, &name_field);

        // optional extensions from the sidecar file
        if let Ok(params) = fs::read_to_string(params_path) {
            apply_params(&mut header, &params);
        }

        info!("writing image as '{}'", content_name);

        header.into_data()
    }
}

/// Path of the `.sls_params` sidecar belonging to a slide.
fn sidecar_params_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(SLS_PARAMS_SUFFIX);
    PathBuf::from(os)
}

fn has_raw_mode_suffix(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    RAW_MODE_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Read a slide as-is, inferring the signalled format from the extension.
fn read_raw_slide(path: &Path, fidx: u32, max_slide_size: usize) -> Result<EncodedSlide, EncoderError> {
    let bytes = fs::read(path)?;

    info!(
        "image: '{}' (id={}). Raw file: {} bytes",
        path.display(),
        fidx,
        bytes.len()
    );

    if bytes.len() > max_slide_size {
        warn!("blob in raw slide '{}' too large", path.display());
    }

    // Historical default: unknown extensions are signalled as JPEG. Wrong
    // for actual PNG data, but kept for compatibility with older receivers
    // fed by this encoder.
    let jfif_not_png = !path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("png"))
        .unwrap_or(false);

    Ok(EncodedSlide {
        bytes,
        jfif_not_png,
    })
}

/// Apply MOT parameter extensions from sidecar file content.
fn apply_params(header: &mut MotHeader, content: &str) {
    for line in content.lines() {
        // ignore empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!("SLS parameter line '{}' without separator - ignored", line);
            continue;
        };

        match key {
            "CategoryID/SlideID" => {
                let parts: Vec<&str> = value.split(' ').collect();
                if parts.len() != 2 {
                    warn!(
                        "SLS parameter CategoryID/SlideID value '{}' does not have two parts - ignored",
                        value
                    );
                    continue;
                }
                let (Some(category), Some(slide)) =
                    (parse_param_id("CategoryID", parts[0]), parse_param_id("SlideID", parts[1]))
                else {
                    continue;
                };
                header.add_extension(0x25, &[category, slide]);
            }
            "CategoryTitle" => {
                if check_param_len(key, value.len(), 128) {
                    header.add_extension(0x26, value.as_bytes());
                }
            }
            "ClickThroughURL" => {
                if check_param_len(key, value.len(), 512) {
                    header.add_extension(0x27, value.as_bytes());
                }
            }
            "AlternativeLocationURL" => {
                if check_param_len(key, value.len(), 512) {
                    header.add_extension(0x28, value.as_bytes());
                }
            }
            _ => {
                warn!("SLS parameter '{}' unknown - ignored", key);
            }
        }
    }
}

fn parse_param_id(key: &str, value: &str) -> Option<u8> {
    match value.parse::<i32>() {
        Ok(v) if (0x00..=0xFF).contains(&v) => Some(v as u8),
        Ok(v) => {
            warn!("SLS parameter '{}' {} out of range - ignored", key, v);
            None
        }
        Err(_) => {
            warn!("SLS parameter '{}' value '{}' invalid - ignored", key, value);
            None
        }
    }
}

fn check_param_len(key: &str, len: usize, len_max: usize) -> bool {
    if len <= len_max {
        return true;
    }
    warn!(
        "SLS parameter '{}' exceeds its maximum length ({} > {}) - ignored",
        key, len, len_max
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_mode_suffix_detection() {
        assert!(has_raw_mode_suffix(Path::new("/x/cover_PadEncRawMode.jpg")));
        assert!(has_raw_mode_suffix(Path::new("/x/COVER_PADENCRAWMODE.PNG")));
        assert!(!has_raw_mode_suffix(Path::new("/x/cover.jpg")));
        assert!(!has_raw_mode_suffix(Path::new("/x/rawmode.jpg")));
    }

    #[test]
    fn test_sidecar_params_path() {
        assert_eq!(
            sidecar_params_path(Path::new("/slides/cover.jpg")),
            PathBuf::from("/slides/cover.jpg.sls_params")
        );
    }

    #[test]
    fn test_apply_params_extensions() {
        let mut header = MotHeader::new(100, 0x02, 0x001);
        apply_params(
            &mut header,
            "# comment\n\
             CategoryID/SlideID=3 7\n\
             CategoryTitle=News\n",
        );
        let data = header.into_data();

        // first extension after the 7 byte core: CategoryID/SlideID
        assert_eq!(data[7], (0b11 << 6) | 0x25);
        assert_eq!(data[8], 2);
        assert_eq!(&data[9..11], &[3, 7]);
        // then CategoryTitle, a 4 byte field: fixed size pli
        assert_eq!(data[11], (0b10 << 6) | 0x26);
        assert_eq!(&data[12..16], b"News");
    }

    #[test]
    fn test_apply_params_rejects_malformed() {
        let mut header = MotHeader::new(100, 0x02, 0x001);
        apply_params(
            &mut header,
            "CategoryID/SlideID=300 7\n\
             CategoryID/SlideID=1\n\
             Bogus\n\
             Unknown=1\n",
        );
        // nothing was appended
        assert_eq!(header.into_data().len(), 7);
    }

    #[test]
    fn test_overlong_param_ignored() {
        let mut header = MotHeader::new(100, 0x02, 0x001);
        let long_title = format!("CategoryTitle={}\n", "x".repeat(129));
        apply_params(&mut header, &long_title);
        assert_eq!(header.into_data().len(), 7);
    }
}
