//! Dynamic Label Segment encoding.
//!
//! A label update is emitted as a burst of Data Groups: one per 16-character
//! text segment, optionally followed by a DL Plus command carrying up to
//! four content tags. The encoder tracks the previously transmitted state
//! and flips the toggle bit exactly when the state changes, so receivers
//! know whether to replace their display.

use crate::datagroup::DataGroup;
use crate::types::DabCharset;

/// Application type of the first DLS Data Group in a frame.
pub const APPTYPE_DLS_START: u8 = 2;
/// Application type of a continued DLS Data Group.
pub const APPTYPE_DLS_CONT: u8 = 3;

/// Maximum dynamic label length in bytes.
pub const MAXDLS: usize = 128;
/// Segment prefix length.
const DLS_SEG_LEN_PREFIX: usize = 2;
/// Maximum characters per segment.
const DLS_SEG_LEN_CHAR_MAX: usize = 16;

/// DL command: clear the label from the receiver's display.
const DLS_CMD_REMOVE_LABEL: u8 = 0b0001;
/// DL command: DL Plus tags follow.
const DLS_CMD_DL_PLUS: u8 = 0b0010;
/// DL Plus command id for the tags command.
const DL_PLUS_CMD_TAGS: u8 = 0b0000;

/// A DL Plus content tag: content type plus start/length markers into the
/// label text. All three values are 7 bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DlPlusTag {
    pub content_type: u8,
    pub start_marker: u8,
    pub length_marker: u8,
}

impl DlPlusTag {
    pub fn new(content_type: u8, start_marker: u8, length_marker: u8) -> Self {
        Self {
            content_type,
            start_marker,
            length_marker,
        }
    }
}

/// The complete state of one dynamic label.
#[derive(Debug, Clone, Default)]
pub struct DlState {
    /// Label text, already in its transmission character set (<= 128 bytes).
    pub text: Vec<u8>,
    pub dl_plus_enabled: bool,
    pub dl_plus_item_toggle: bool,
    pub dl_plus_item_running: bool,
    /// Up to four tags.
    pub dl_plus_tags: Vec<DlPlusTag>,
}

impl PartialEq for DlState {
    fn eq(&self, other: &Self) -> bool {
        if self.text != other.text {
            return false;
        }
        if self.dl_plus_enabled != other.dl_plus_enabled {
            return false;
        }
        // item bits and tags only matter while DL Plus is on
        if self.dl_plus_enabled {
            if self.dl_plus_item_toggle != other.dl_plus_item_toggle {
                return false;
            }
            if self.dl_plus_item_running != other.dl_plus_item_running {
                return false;
            }
            if self.dl_plus_tags != other.dl_plus_tags {
                return false;
            }
        }
        true
    }
}

impl Eq for DlState {}

/// Segments labels into Data Groups and tracks the toggle bit.
pub struct DlsEncoder {
    dls_toggle: bool,
    dl_state_prev: DlState,
}

impl Default for DlsEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DlsEncoder {
    pub fn new() -> Self {
        Self {
            dls_toggle: false,
            dl_state_prev: DlState::default(),
        }
    }

    /// Encode one label update into a burst of Data Groups, in the order
    /// they must enter the PAD queue.
    ///
    /// `charset` is the value signalled in the first segment's prefix. With
    /// `remove_dls`, a Remove Label command leads the burst whenever the
    /// state changed, instructing receivers to clear their cache first.
    pub fn encode(
        &mut self,
        state: &DlState,
        charset: DabCharset,
        remove_dls: bool,
    ) -> Vec<DataGroup> {
        let mut state = state.clone();

        // DL Plus without tags still needs the required DUMMY tag
        if state.dl_plus_enabled && state.dl_plus_tags.is_empty() {
            state.dl_plus_tags.push(DlPlusTag::default());
        }

        let state_is_new = state != self.dl_state_prev;

        let mut burst = Vec::new();
        if state_is_new {
            // the removal command still carries the previous toggle
            if remove_dls {
                burst.push(self.command_dg(DLS_CMD_REMOVE_LABEL));
            }

            self.dls_toggle = !self.dls_toggle;
            self.dl_state_prev = state.clone();
        }

        let seg_count = Self::seg_count(state.text.len());
        for seg_index in 0..seg_count {
            burst.push(self.segment_dg(&state.text, charset as u8, seg_index));
        }

        if state.dl_plus_enabled {
            burst.push(self.dl_plus_dg(&state));
        }

        burst
    }

    fn seg_count(text_len: usize) -> usize {
        text_len / DLS_SEG_LEN_CHAR_MAX + usize::from(text_len % DLS_SEG_LEN_CHAR_MAX != 0)
    }

    fn segment_dg(&self, text: &[u8], charset: u8, seg_index: usize) -> DataGroup {
        let first_seg = seg_index == 0;
        let last_seg = seg_index == Self::seg_count(text.len()) - 1;

        let seg_text_offset = seg_index * DLS_SEG_LEN_CHAR_MAX;
        let seg_text = &text[seg_text_offset..(seg_text_offset + DLS_SEG_LEN_CHAR_MAX).min(text.len())];

        let mut dg = DataGroup::new(
            DLS_SEG_LEN_PREFIX + seg_text.len(),
            APPTYPE_DLS_START,
            APPTYPE_DLS_CONT,
        );

        // prefix: toggle? + first seg? + last seg? + (seg len - 1)
        dg.data[0] = (u8::from(self.dls_toggle) << 7)
            | (u8::from(first_seg) << 6)
            | (u8::from(last_seg) << 5)
            | (seg_text.len() - 1) as u8;

        // prefix: charset / seg index
        dg.data[1] = (if first_seg { charset } else { seg_index as u8 }) << 4;

        // character field
        dg.data[DLS_SEG_LEN_PREFIX..].copy_from_slice(seg_text);

        dg.append_crc();
        dg
    }

    fn command_dg(&self, command: u8) -> DataGroup {
        let mut dg = DataGroup::new(2, APPTYPE_DLS_START, APPTYPE_DLS_CONT);

        // prefix: toggle? + first seg + last seg + command flag + command
        dg.data[0] = (u8::from(self.dls_toggle) << 7) | (1 << 6) | (1 << 5) | (1 << 4) | command;
        // prefix: reserved
        dg.data[1] = 0;

        dg.append_crc();
        dg
    }

    fn dl_plus_dg(&self, state: &DlState) -> DataGroup {
        let tags_len = state.dl_plus_tags.len();
        let cmd_field_len = 1 + 3 * tags_len;

        let mut dg = DataGroup::new(2 + cmd_field_len, APPTYPE_DLS_START, APPTYPE_DLS_CONT);

        // prefix: toggle? + first seg + last seg + command flag + command
        dg.data[0] =
            (u8::from(self.dls_toggle) << 7) | (1 << 6) | (1 << 5) | (1 << 4) | DLS_CMD_DL_PLUS;

        // prefix: link bit + command field length - 1
        dg.data[1] = (u8::from(self.dls_toggle) << 7) | (cmd_field_len - 1) as u8;

        // tags command: CId + item toggle + item running + number of tags - 1
        dg.data[2] = (DL_PLUS_CMD_TAGS << 4)
            | (u8::from(state.dl_plus_item_toggle) << 3)
            | (u8::from(state.dl_plus_item_running) << 2)
            | (tags_len - 1) as u8;

        for (i, tag) in state.dl_plus_tags.iter().enumerate() {
            dg.data[3 + 3 * i] = tag.content_type & 0x7F;
            dg.data[4 + 3 * i] = tag.start_marker & 0x7F;
            dg.data[5 + 3 * i] = tag.length_marker & 0x7F;
        }

        dg.append_crc();
        dg
    }
}
