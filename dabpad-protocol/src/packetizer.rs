//! The X-PAD packetizer: packs queued Data Groups into PAD frames.
//!
//! Each frame carries up to four data sub-fields, described by a Contents
//! Indicator list. A Data Group larger than one frame continues across the
//! following frames; when the continuation conditions hold, the CI list is
//! omitted entirely and the full X-PAD carries payload.

use std::collections::VecDeque;

use crate::datagroup::DataGroup;
use crate::error::PadError;

/// Legal data sub-field lengths for variable size X-PAD.
pub const SUBFIELD_LENS: [usize; 8] = [4, 6, 8, 12, 16, 24, 32, 48];

/// F-PAD length in bytes.
const FPAD_LEN: usize = 2;

/// Short X-PAD: F-PAD + 1x CI + 1x 3 bytes data sub-field.
pub const SHORT_PAD: usize = 6;
/// Smallest variable size X-PAD: F-PAD + 1x CI + end marker + 1x 4 bytes data sub-field.
pub const VARSIZE_PAD_MIN: usize = 8;
/// Largest variable size X-PAD: F-PAD + 4x CI + 4x 48 bytes data sub-field.
pub const VARSIZE_PAD_MAX: usize = 196;

/// Application type of the Data Group Length Indicator.
pub const APPTYPE_DGLI: u8 = 1;

/// Packs a queue of Data Groups into fixed-size PAD frames.
pub struct PadPacketizer {
    xpad_size_max: usize,
    short_xpad: bool,
    max_cis: usize,

    queue: VecDeque<DataGroup>,

    // per-frame accumulators, reset by the flush path
    xpad_size: usize,
    subfields: [u8; 4 * 48],
    subfields_size: usize,
    ci_type: [u8; 4],
    ci_len_index: [usize; 4],
    used_cis: usize,

    // carried across frames; a frame without X-PAD invalidates the type
    last_ci_type: Option<u8>,
    last_ci_size: usize,
}

impl PadPacketizer {
    /// Create a packetizer for the given PAD length.
    pub fn new(pad_size: usize) -> Result<Self, PadError> {
        if !Self::check_pad_len(pad_size) {
            return Err(PadError::InvalidPadLen(pad_size));
        }
        let short_xpad = pad_size == SHORT_PAD;
        Ok(Self {
            xpad_size_max: pad_size - FPAD_LEN,
            short_xpad,
            max_cis: if short_xpad { 1 } else { 4 },
            queue: VecDeque::new(),
            xpad_size: 0,
            subfields: [0u8; 4 * 48],
            subfields_size: 0,
            ci_type: [0u8; 4],
            ci_len_index: [0usize; 4],
            used_cis: 0,
            last_ci_type: None,
            last_ci_size: 0,
        })
    }

    /// Whether `len` is a PAD length the packetizer can serve.
    pub fn check_pad_len(len: usize) -> bool {
        len == SHORT_PAD || (VARSIZE_PAD_MIN..=VARSIZE_PAD_MAX).contains(&len)
    }

    /// Queue a Data Group; `prepend` inserts it ahead of all pending groups.
    pub fn add_dg(&mut self, dg: DataGroup, prepend: bool) {
        if prepend {
            self.queue.push_front(dg);
        } else {
            self.queue.push_back(dg);
        }
    }

    /// Queue a batch of Data Groups, preserving their order.
    pub fn add_dgs(&mut self, dgs: Vec<DataGroup>, prepend: bool) {
        if prepend {
            for dg in dgs.into_iter().rev() {
                self.queue.push_front(dg);
            }
        } else {
            self.queue.extend(dgs);
        }
    }

    /// Whether any Data Group is still pending.
    pub fn queue_filled(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Whether a pending Data Group has the given start application type.
    /// The scheduler uses this to avoid enqueueing overlapping inserts.
    pub fn queue_contains(&self, apptype_start: u8) -> bool {
        self.queue.iter().any(|dg| dg.apptype_start == apptype_start)
    }

    /// Produce the next PAD frame.
    ///
    /// With `output_xpad` false an empty, F-PAD-only frame is emitted (used
    /// by the X-PAD-every-N gating); otherwise the Data Group queue is
    /// drained into the frame. The returned buffer is `padlen + 1` bytes;
    /// the extra trailing byte reports the used PAD length and is not
    /// transmitted.
    pub fn next_frame(&mut self, output_xpad: bool) -> Vec<u8> {
        if output_xpad {
            self.fill_pad()
        } else {
            self.flush_pad()
        }
    }

    fn fill_pad(&mut self) -> Vec<u8> {
        let mut flushable = false;
        while !flushable {
            let Some(mut dg) = self.queue.pop_front() else {
                break;
            };

            // repeatedly append the group until it is spent or the frame is full
            while !flushable && dg.available() > 0 {
                flushable = self.append_dg(&mut dg);
            }

            if dg.available() > 0 {
                self.queue.push_front(dg);
            }
        }

        // (possibly empty) PAD
        self.flush_pad()
    }

    /// Additional bytes the next CI costs (end marker added/replaced for
    /// variable size X-PAD).
    fn add_ci_needed_bytes(&self) -> usize {
        if !self.short_xpad && self.used_cis == 0 {
            2
        } else if !self.short_xpad && self.used_cis == self.max_cis - 1 {
            0
        } else {
            1
        }
    }

    fn add_ci(&mut self, apptype: u8, len_index: usize) {
        self.ci_type[self.used_cis] = apptype;
        self.ci_len_index[self.used_cis] = len_index;

        self.xpad_size += self.add_ci_needed_bytes();
        self.used_cis += 1;
    }

    /// Index of the optimal sub-field size (variable size X-PAD only):
    /// the smallest sub-field able to hold all available bytes, clamped to
    /// what still fits the frame, stepping one size down if that would waste
    /// at least a minimum sub-field's worth of padding.
    fn optimal_subfield_len_index(&self, available_bytes: usize) -> usize {
        let mut len_index = 0;

        while len_index + 1 < SUBFIELD_LENS.len() && SUBFIELD_LENS[len_index] < available_bytes {
            len_index += 1;
        }
        while len_index >= 1
            && SUBFIELD_LENS[len_index] + self.add_ci_needed_bytes()
                > self.xpad_size_max - self.xpad_size
        {
            len_index -= 1;
        }
        if len_index >= 1 && SUBFIELD_LENS[len_index] >= available_bytes + SUBFIELD_LENS[0] {
            len_index -= 1;
        }

        len_index
    }

    fn write_dg_to_subfield(&mut self, dg: &mut DataGroup, len: usize) -> u8 {
        let window = &mut self.subfields[self.subfields_size..self.subfields_size + len];
        let (apptype, cont) = dg.write(window);
        self.last_ci_type = cont;
        self.subfields_size += len;
        self.xpad_size += len;
        apptype
    }

    /// Append (part of) a Data Group to the current frame.
    /// Returns true once the frame must be flushed.
    fn append_dg(&mut self, dg: &mut DataGroup) -> bool {
        /* Omit the CI list when all hold:
         * 1.   no pending data sub-fields
         * 2.   last CI type valid
         * 3.   last CI type matching the group's continuation type
         * 4a.  short X-PAD; OR
         * 4ba. the last X-PAD was at least as big as the payload available
         *      with all CIs used AND
         * 4bb. the group can refill that size (again minus the CI bytes)
         */
        if self.used_cis == 0
            && self.last_ci_type == Some(dg.apptype_cont)
            && (self.short_xpad
                || (self.last_ci_size >= self.xpad_size_max - self.max_cis
                    && dg.available() + self.max_cis >= self.last_ci_size))
        {
            self.append_dg_without_ci(dg);
            return true;
        }

        self.append_dg_with_ci(dg);

        // if no further sub-field could be added, the PAD must be flushed
        self.used_cis == self.max_cis
            || SUBFIELD_LENS[0] + self.add_ci_needed_bytes() > self.xpad_size_max - self.xpad_size
    }

    fn append_dg_with_ci(&mut self, dg: &mut DataGroup) {
        let len_index = if self.short_xpad {
            0
        } else {
            self.optimal_subfield_len_index(dg.available())
        };
        let len_size = if self.short_xpad {
            3
        } else {
            SUBFIELD_LENS[len_index]
        };

        let apptype = self.write_dg_to_subfield(dg, len_size);
        self.add_ci(apptype, len_index);
    }

    fn append_dg_without_ci(&mut self, dg: &mut DataGroup) {
        let len = self.last_ci_size;
        self.write_dg_to_subfield(dg, len);
    }

    fn reset_pad(&mut self) {
        self.xpad_size = 0;
        self.subfields_size = 0;
        self.used_cis = 0;
    }

    /// Serialise the accumulated sub-fields into a PAD buffer and reset the
    /// per-frame state. After this, `last_ci_type`/`last_ci_size` describe
    /// the frame just emitted.
    fn flush_pad(&mut self) -> Vec<u8> {
        let mut pad = vec![0u8; self.xpad_size_max + FPAD_LEN + 1];
        let mut pad_offset = self.xpad_size_max;

        if self.subfields_size > 0 {
            if self.used_cis > 0 {
                // X-PAD: CIs
                for i in 0..self.used_cis {
                    pad_offset -= 1;
                    let len_bits = if self.short_xpad {
                        0
                    } else {
                        self.ci_len_index[i] as u8
                    };
                    pad[pad_offset] = (len_bits << 5) | self.ci_type[i];
                }

                // X-PAD: end marker (if needed)
                if self.used_cis < self.max_cis {
                    pad_offset -= 1;
                    pad[pad_offset] = 0x00;
                }
            }

            // X-PAD: data sub-fields, reversed on the fly
            for off in 0..self.subfields_size {
                pad_offset -= 1;
                pad[pad_offset] = self.subfields[off];
            }
        } else {
            // no X-PAD in this frame; a continuation may not follow it
            self.last_ci_type = None;
        }

        // F-PAD
        pad[self.xpad_size_max] = if self.subfields_size > 0 {
            if self.short_xpad {
                0x10
            } else {
                0x20
            }
        } else {
            0x00
        };
        pad[self.xpad_size_max + 1] = if self.subfields_size > 0 && self.used_cis > 0 {
            0x02
        } else {
            0x00
        };

        // used PAD length, reported to the caller only
        pad[self.xpad_size_max + FPAD_LEN] = (self.xpad_size + FPAD_LEN) as u8;

        self.last_ci_size = self.xpad_size;
        self.reset_pad();
        pad
    }

    /// Build the 2-byte Data Group Length Indicator preceding an MSC Data
    /// Group, so receivers can parse without scanning.
    pub fn create_dgli(len: usize) -> DataGroup {
        let mut dg = DataGroup::new(2, APPTYPE_DGLI, APPTYPE_DGLI);
        dg.data[0] = ((len & 0x3F00) >> 8) as u8;
        dg.data[1] = (len & 0x00FF) as u8;
        dg.append_crc();
        dg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;

    fn frame_padlen(pad: &[u8]) -> usize {
        pad.len() - 1
    }

    /// Reassemble the sub-field bytes a variable size X-PAD frame carries,
    /// in transmission order.
    fn extract_subfields(pad: &[u8], padlen: usize) -> Vec<u8> {
        let xpad_size_max = padlen - 2;
        if pad[xpad_size_max] == 0x00 {
            return Vec::new();
        }

        let used = pad[padlen] as usize - 2;
        let ci_present = pad[xpad_size_max + 1] & 0x02 != 0;

        let mut offset = xpad_size_max;
        let mut data_len = used;
        if ci_present {
            let mut lens = 0;
            let mut cis = 0;
            loop {
                offset -= 1;
                let ci = pad[offset];
                if ci & 0x1F == 0 {
                    // end marker
                    break;
                }
                lens += SUBFIELD_LENS[(ci >> 5) as usize];
                cis += 1;
                if cis == 4 {
                    break;
                }
            }
            data_len = lens;
        }

        // sub-fields are stored reversed below the CI list
        let mut bytes: Vec<u8> = pad[offset - data_len..offset].to_vec();
        bytes.reverse();
        bytes
    }

    #[test]
    fn test_pad_len_check() {
        assert!(PadPacketizer::check_pad_len(6));
        assert!(PadPacketizer::check_pad_len(8));
        assert!(PadPacketizer::check_pad_len(58));
        assert!(PadPacketizer::check_pad_len(196));
        assert!(!PadPacketizer::check_pad_len(7));
        assert!(!PadPacketizer::check_pad_len(197));
        assert!(!PadPacketizer::check_pad_len(0));
        assert!(PadPacketizer::new(7).is_err());
    }

    #[test]
    fn test_empty_queue_yields_fpad_only_frame() {
        let mut p = PadPacketizer::new(58).unwrap();
        let pad = p.next_frame(true);

        assert_eq!(frame_padlen(&pad), 58);
        // all content zero, F-PAD indicates "no X-PAD"
        assert!(pad[..56].iter().all(|&b| b == 0));
        assert_eq!(pad[56], 0x00);
        assert_eq!(pad[57], 0x00);
        // used length: F-PAD only
        assert_eq!(pad[58], 0x02);
    }

    #[test]
    fn test_gated_frame_is_empty_even_with_pending_data() {
        let mut p = PadPacketizer::new(58).unwrap();
        p.add_dg(DataGroup::from_payload(vec![0xAB; 10], 2, 3), false);

        let pad = p.next_frame(false);
        assert_eq!(pad[56], 0x00);
        assert_eq!(pad[58], 0x02);
        // the group is still queued
        assert!(p.queue_contains(2));
    }

    #[test]
    fn test_single_small_dg_frame_layout() {
        // 9 payload bytes -> sub-field length 12 (smallest >= 9, waste 3 < 4)
        let mut p = PadPacketizer::new(58).unwrap();
        let payload: Vec<u8> = (1..=9).collect();
        p.add_dg(DataGroup::from_payload(payload.clone(), 2, 3), false);

        let pad = p.next_frame(true);

        // F-PAD: variable size X-PAD with CI list
        assert_eq!(pad[56], 0x20);
        assert_eq!(pad[57], 0x02);
        // used length: 12 byte sub-field + CI byte + end marker + F-PAD
        assert_eq!(pad[58], 12 + 2 + 2);

        // CI byte directly precedes the F-PAD: len index 3, app type 2
        assert_eq!(pad[55], (3 << 5) | 2);
        // end marker next (only one of four CIs used)
        assert_eq!(pad[54], 0x00);
        // sub-field bytes reversed: first payload byte closest to the CI list
        assert_eq!(pad[53], 1);
        assert_eq!(pad[45], 9);
        // zero padding inside the sub-field past the payload
        assert_eq!(pad[44], 0);
        assert_eq!(pad[42], 0);
    }

    #[test]
    fn test_dg_split_across_frames_reassembles() {
        let mut p = PadPacketizer::new(24).unwrap();
        let payload: Vec<u8> = (0..100u8).collect();
        p.add_dg(DataGroup::from_payload(payload.clone(), 12, 13), false);

        let mut collected = Vec::new();
        for _ in 0..16 {
            if !p.queue_filled() && collected.len() >= payload.len() {
                break;
            }
            let pad = p.next_frame(true);
            collected.extend(extract_subfields(&pad, 24));
        }

        // modulo zero padding after the last byte, the stream is bit-identical
        assert!(collected.len() >= payload.len());
        assert_eq!(&collected[..payload.len()], &payload[..]);
        assert!(collected[payload.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_ci_omission_on_short_xpad_continuation() {
        let mut p = PadPacketizer::new(6).unwrap();
        p.add_dg(DataGroup::from_payload(vec![0x55; 20], 2, 3), false);

        let first = p.next_frame(true);
        // short X-PAD with CI: one CI byte + 3 data bytes
        assert_eq!(first[4], 0x10);
        assert_eq!(first[5], 0x02);
        assert_eq!(first[6], 4 + 2);
        // CI byte: no length bits on short X-PAD
        assert_eq!(first[3], 2);

        let second = p.next_frame(true);
        // continuation without CI list: all 4 X-PAD bytes carry data
        assert_eq!(second[4], 0x10);
        assert_eq!(second[5], 0x00);
        assert_eq!(second[6], 4 + 2);
        assert_eq!(&second[0..4], &[0x55; 4]);
    }

    #[test]
    fn test_ci_omission_requires_matching_cont_type() {
        let mut p = PadPacketizer::new(6).unwrap();
        p.add_dg(DataGroup::from_payload(vec![0x11; 3], 2, 3), false);
        p.add_dg(DataGroup::from_payload(vec![0x22; 3], 12, 13), false);

        let _first = p.next_frame(true);
        let second = p.next_frame(true);
        // second frame starts an unrelated group: CI list is present again
        assert_eq!(second[5], 0x02);
        assert_eq!(second[3], 12);
    }

    #[test]
    fn test_no_ci_omission_after_empty_frame() {
        let mut p = PadPacketizer::new(6).unwrap();
        p.add_dg(DataGroup::from_payload(vec![0x33; 9], 2, 3), false);

        let _first = p.next_frame(true);
        // an X-PAD-less frame invalidates the continuation
        let empty = p.next_frame(false);
        assert_eq!(empty[4], 0x00);

        let third = p.next_frame(true);
        assert_eq!(third[5], 0x02, "CI list must reappear after an empty frame");
    }

    #[test]
    fn test_varsize_ci_omission_when_prior_frame_full() {
        // padlen 20: xpad_size_max 18; a large group fills 16 data bytes +
        // CI + end marker in frame 1, frame 2 may omit the CI list and
        // carry 18 data bytes.
        let mut p = PadPacketizer::new(20).unwrap();
        p.add_dg(DataGroup::from_payload(vec![0x77; 60], 12, 13), false);

        let first = p.next_frame(true);
        assert_eq!(first[18], 0x20);
        assert_eq!(first[19], 0x02);
        assert_eq!(first[20], 16 + 2 + 2);

        let second = p.next_frame(true);
        assert_eq!(second[18], 0x20);
        assert_eq!(second[19], 0x00, "continuation frame must omit the CI list");
        assert_eq!(second[20], 18 + 2);
        assert_eq!(&second[0..18], &[0x77; 18]);
    }

    #[test]
    fn test_subfield_covers_available_or_biggest_fitting() {
        let mut p = PadPacketizer::new(58).unwrap();
        // choose: smallest len >= avail
        assert_eq!(SUBFIELD_LENS[p.optimal_subfield_len_index(4)], 4);
        assert_eq!(SUBFIELD_LENS[p.optimal_subfield_len_index(5)], 6);
        assert_eq!(SUBFIELD_LENS[p.optimal_subfield_len_index(48)], 48);
        // bigger than the table: largest
        assert_eq!(SUBFIELD_LENS[p.optimal_subfield_len_index(1000)], 48);
        // waste >= 4 steps one size down: 9 -> 12 (waste 3), 8 -> 8
        assert_eq!(SUBFIELD_LENS[p.optimal_subfield_len_index(9)], 12);
        assert_eq!(SUBFIELD_LENS[p.optimal_subfield_len_index(7)], 8);
        // 17 would fit 24 but wastes 7 >= 4: use 16
        assert_eq!(SUBFIELD_LENS[p.optimal_subfield_len_index(17)], 16);

        // with the frame nearly full, clamp to the remaining capacity
        p.xpad_size = p.xpad_size_max - 8;
        assert!(SUBFIELD_LENS[p.optimal_subfield_len_index(48)] <= 8);
    }

    #[test]
    fn test_dgli_encoding() {
        let dg = PadPacketizer::create_dgli(2500);
        assert_eq!(dg.apptype_start, APPTYPE_DGLI);
        assert_eq!(dg.apptype_cont, APPTYPE_DGLI);
        assert_eq!(dg.data.len(), 4);
        assert_eq!(dg.data[0], 0x09);
        assert_eq!(dg.data[1], 0xC4);
        let crc = crc16(&dg.data[..2]);
        assert_eq!(dg.data[2], (crc >> 8) as u8);
        assert_eq!(dg.data[3], (crc & 0xFF) as u8);
    }

    #[test]
    fn test_four_cis_then_flush() {
        let mut p = PadPacketizer::new(196).unwrap();
        for _ in 0..6 {
            p.add_dg(DataGroup::from_payload(vec![0x44; 4], 2, 3), false);
        }

        let pad = p.next_frame(true);
        // four 4-byte sub-fields and four CIs fill the CI table
        assert_eq!(pad[195], 4 * 4 + 4 + 2);
        // no end marker when all CIs are used: CI bytes sit at the tail
        let xpad_size_max = 194;
        for i in 0..4 {
            assert_eq!(pad[xpad_size_max - 1 - i], 2, "CI {} apptype", i);
        }
        // remaining two groups wait for the next frame
        assert!(p.queue_contains(2));
    }
}
