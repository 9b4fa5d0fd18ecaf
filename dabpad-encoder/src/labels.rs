//! Dynamic Label file parsing.
//!
//! A label file holds the text to transmit, optionally preceded or followed
//! by a parameters block carrying DL Plus settings:
//!
//! ```text
//! ##### parameters { #####
//! DL_PLUS=1
//! DL_PLUS_TAG=1 0 11
//! ##### parameters } #####
//! Now playing...
//! ```

use std::fs;
use std::io;
use std::path::Path;

use log::warn;

use dabpad_protocol::charset::to_ebu_latin;
use dabpad_protocol::dls::{DlPlusTag, DlState, MAXDLS};
use dabpad_protocol::types::DabCharset;

const DL_PARAMS_OPEN: &[u8] = b"##### parameters { #####";
const DL_PARAMS_CLOSE: &[u8] = b"##### parameters } #####";

/// Suffix of the sidecar file requesting a switch to its label file.
pub const REQUEST_REREAD_SUFFIX: &str = ".REQUEST_DLS_REREAD";

/// How the label input is to be interpreted.
#[derive(Debug, Clone, Copy)]
pub struct DlParams {
    pub charset: DabCharset,
    pub raw_dls: bool,
    pub remove_dls: bool,
}

impl Default for DlParams {
    fn default() -> Self {
        Self {
            charset: DabCharset::Utf8,
            raw_dls: false,
            remove_dls: false,
        }
    }
}

/// Read and parse one label file.
pub fn parse_label_file(path: &Path, params: &DlParams) -> io::Result<DlState> {
    let content = fs::read(path)?;
    Ok(parse_label(&content, params))
}

/// Parse label content: text lines plus an optional parameters block.
pub fn parse_label(content: &[u8], params: &DlParams) -> DlState {
    let mut state = DlState::default();
    let mut text_lines: Vec<Vec<u8>> = Vec::new();

    let mut lines = content.split(|&b| b == b'\n');
    // a trailing newline yields one empty tail entry, dropped by the
    // is_empty check below
    while let Some(line) = lines.next() {
        if line.is_empty() {
            continue;
        }
        if line == DL_PARAMS_OPEN {
            parse_params_block(&mut lines, &mut state);
        } else if !params.raw_dls && params.charset == DabCharset::Utf8 {
            text_lines.push(to_ebu_latin(&String::from_utf8_lossy(line)));
        } else {
            text_lines.push(line.to_vec());
        }
    }

    let mut text = Vec::new();
    for (i, mut line) in text_lines.into_iter().enumerate() {
        if i != 0 {
            if params.charset == DabCharset::Ucs2Be {
                text.push(0x00);
            }
            text.push(b'\n');
        }

        // UCS-2 BE: if read from file, the first byte of the \0\n pair
        // remains at the line end; drop it
        if params.charset == DabCharset::Ucs2Be && line.len() % 2 != 0 {
            line.truncate(line.len() - 1);
        }

        text.extend_from_slice(&line);
    }

    if text.len() > MAXDLS {
        warn!(
            "oversized DLS text ({} bytes) had to be shortened",
            text.len()
        );
        text.truncate(MAXDLS);
    }

    state.text = text;
    state
}

fn parse_params_block<'a, I>(lines: &mut I, state: &mut DlState)
where
    I: Iterator<Item = &'a [u8]>,
{
    for line in lines {
        if line == DL_PARAMS_CLOSE {
            return;
        }

        // ignore empty lines and comments
        if line.is_empty() || line[0] == b'#' {
            continue;
        }

        let line = String::from_utf8_lossy(line);
        let Some((key, value)) = line.split_once('=') else {
            warn!("DL parameter line '{}' without separator - ignored", line);
            continue;
        };

        match key {
            "DL_PLUS" => {
                parse_param_bool(key, value, &mut state.dl_plus_enabled);
            }
            "DL_PLUS_ITEM_TOGGLE" => {
                parse_param_bool(key, value, &mut state.dl_plus_item_toggle);
            }
            "DL_PLUS_ITEM_RUNNING" => {
                parse_param_bool(key, value, &mut state.dl_plus_item_running);
            }
            "DL_PLUS_TAG" => {
                if state.dl_plus_tags.len() == 4 {
                    warn!("DL Plus tag ignored, as already four tags present");
                    continue;
                }

                let parts: Vec<&str> = value.split(' ').collect();
                if parts.len() != 3 {
                    warn!(
                        "DL Plus tag value '{}' does not have three parts - ignored",
                        value
                    );
                    continue;
                }

                let mut tag = DlPlusTag::default();
                if parse_param_tag_value("content_type", parts[0], &mut tag.content_type)
                    & parse_param_tag_value("start_marker", parts[1], &mut tag.start_marker)
                    & parse_param_tag_value("length_marker", parts[2], &mut tag.length_marker)
                {
                    state.dl_plus_tags.push(tag);
                }
            }
            _ => {
                warn!("DL parameter '{}' unknown - ignored", key);
            }
        }
    }

    warn!("no param closing tag, so the DLS text will be empty");
}

fn parse_param_bool(key: &str, value: &str, target: &mut bool) -> bool {
    match value {
        "0" => {
            *target = false;
            true
        }
        "1" => {
            *target = true;
            true
        }
        _ => {
            warn!(
                "DL parameter '{}' has unsupported value '{}' - ignored",
                key, value
            );
            false
        }
    }
}

fn parse_param_tag_value(key: &str, value: &str, target: &mut u8) -> bool {
    match value.parse::<i32>() {
        Ok(v) if (0x00..=0x7F).contains(&v) => {
            *target = v as u8;
            true
        }
        Ok(v) => {
            warn!("DL Plus tag parameter '{}' {} out of range - ignored", key, v);
            false
        }
        Err(_) => {
            warn!(
                "DL Plus tag parameter '{}' value '{}' invalid - ignored",
                key, value
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_params() -> DlParams {
        DlParams::default()
    }

    #[test]
    fn test_plain_text_label() {
        let state = parse_label(b"Now playing\n", &utf8_params());
        assert_eq!(state.text, b"Now playing");
        assert!(!state.dl_plus_enabled);
        assert!(state.dl_plus_tags.is_empty());
    }

    #[test]
    fn test_multiple_lines_joined_with_newline() {
        let state = parse_label(b"Artist\nTitle\n", &utf8_params());
        assert_eq!(state.text, b"Artist\nTitle");
    }

    #[test]
    fn test_empty_lines_skipped() {
        let state = parse_label(b"\nArtist\n\n\nTitle\n", &utf8_params());
        assert_eq!(state.text, b"Artist\nTitle");
    }

    #[test]
    fn test_params_block() {
        let content = b"##### parameters { #####\n\
            DL_PLUS=1\n\
            # a comment\n\
            DL_PLUS_ITEM_TOGGLE=1\n\
            DL_PLUS_ITEM_RUNNING=0\n\
            DL_PLUS_TAG=1 0 11\n\
            DL_PLUS_TAG=4 13 20\n\
            ##### parameters } #####\n\
            Artist - Title\n";
        let state = parse_label(content, &utf8_params());

        assert!(state.dl_plus_enabled);
        assert!(state.dl_plus_item_toggle);
        assert!(!state.dl_plus_item_running);
        assert_eq!(
            state.dl_plus_tags,
            vec![DlPlusTag::new(1, 0, 11), DlPlusTag::new(4, 13, 20)]
        );
        assert_eq!(state.text, b"Artist - Title");
    }

    #[test]
    fn test_malformed_params_ignored() {
        let content = b"##### parameters { #####\n\
            DL_PLUS=yes\n\
            DL_PLUS_TAG=1 2\n\
            DL_PLUS_TAG=1 2 300\n\
            NO_SEPARATOR\n\
            UNKNOWN_KEY=1\n\
            ##### parameters } #####\n\
            text\n";
        let state = parse_label(content, &utf8_params());

        assert!(!state.dl_plus_enabled);
        assert!(state.dl_plus_tags.is_empty());
        assert_eq!(state.text, b"text");
    }

    #[test]
    fn test_at_most_four_tags() {
        let content = b"##### parameters { #####\n\
            DL_PLUS=1\n\
            DL_PLUS_TAG=1 0 1\n\
            DL_PLUS_TAG=2 0 1\n\
            DL_PLUS_TAG=3 0 1\n\
            DL_PLUS_TAG=4 0 1\n\
            DL_PLUS_TAG=5 0 1\n\
            ##### parameters } #####\n";
        let state = parse_label(content, &utf8_params());
        assert_eq!(state.dl_plus_tags.len(), 4);
        assert_eq!(state.dl_plus_tags[3].content_type, 4);
    }

    #[test]
    fn test_missing_close_consumes_rest() {
        let content = b"##### parameters { #####\nDL_PLUS=1\nleftover text\n";
        let state = parse_label(content, &utf8_params());
        assert!(state.dl_plus_enabled);
        // everything after the open marker belongs to the block
        assert!(state.text.is_empty());
    }

    #[test]
    fn test_utf8_transcoded_to_ebu_latin() {
        let state = parse_label("Caf\u{e9}\n".as_bytes(), &utf8_params());
        assert_eq!(state.text, vec![b'C', b'a', b'f', 0x82]);
    }

    #[test]
    fn test_raw_dls_keeps_bytes() {
        let params = DlParams {
            raw_dls: true,
            ..Default::default()
        };
        let state = parse_label("Caf\u{e9}\n".as_bytes(), &params);
        assert_eq!(state.text, "Caf\u{e9}".as_bytes());
    }

    #[test]
    fn test_oversized_label_truncated() {
        let long = vec![b'a'; 200];
        let mut content = long.clone();
        content.push(b'\n');
        let state = parse_label(&content, &utf8_params());
        assert_eq!(state.text.len(), MAXDLS);
    }

    #[test]
    fn test_ucs2_join_and_odd_line_trim() {
        let params = DlParams {
            charset: DabCharset::Ucs2Be,
            raw_dls: true,
            ..Default::default()
        };
        // two UCS-2 BE lines, the first with a stray leftover byte
        let content = b"\x00A\x00B\x00\n\x00C\n";
        let state = parse_label(content, &params);
        assert_eq!(state.text, b"\x00A\x00B\x00\n\x00C");
    }
}
