//! Data Groups: the unit of payload handed to the PAD packetizer.

use crate::crc::crc16;

/// A byte buffer with an application type pair and a write cursor.
///
/// A Data Group is created by one of the encoders (DLS or MOT), queued on
/// the packetizer and consumed across one or more PAD frames. Once the
/// cursor reaches the end of the buffer the group is spent and dropped.
#[derive(Debug, Clone)]
pub struct DataGroup {
    pub data: Vec<u8>,
    /// Application type recorded when this group starts in a frame.
    pub apptype_start: u8,
    /// Application type recorded when this group continues across frames.
    pub apptype_cont: u8,
    written: usize,
}

impl DataGroup {
    /// Create a zero-initialised Data Group of `len` bytes.
    pub fn new(len: usize, apptype_start: u8, apptype_cont: u8) -> Self {
        Self {
            data: vec![0u8; len],
            apptype_start,
            apptype_cont,
            written: 0,
        }
    }

    /// Wrap an already built payload.
    pub fn from_payload(data: Vec<u8>, apptype_start: u8, apptype_cont: u8) -> Self {
        Self {
            data,
            apptype_start,
            apptype_cont,
            written: 0,
        }
    }

    /// Append the CRC-16 of the current buffer, big-endian.
    pub fn append_crc(&mut self) {
        let crc = crc16(&self.data);
        self.data.push((crc >> 8) as u8);
        self.data.push((crc & 0xFF) as u8);
    }

    /// Bytes not yet written to a PAD frame.
    pub fn available(&self) -> usize {
        self.data.len() - self.written
    }

    /// Copy the next chunk of this group into `dst`, zero-padding past the
    /// end of the payload.
    ///
    /// Returns the application type to record in the CI for this sub-field,
    /// and the continuation type the packetizer must remember: `None` once
    /// the group is spent, so an unrelated group of the same type is never
    /// mistaken for a continuation.
    pub fn write(&mut self, dst: &mut [u8]) -> (u8, Option<u8>) {
        let written_now = dst.len().min(self.available());

        dst[..written_now].copy_from_slice(&self.data[self.written..self.written + written_now]);
        // fill up remaining bytes with zero padding
        dst[written_now..].fill(0x00);

        let apptype = if self.written > 0 {
            self.apptype_cont
        } else {
            self.apptype_start
        };

        self.written += written_now;

        let cont = if self.available() > 0 {
            Some(self.apptype_cont)
        } else {
            None
        };
        (apptype, cont)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;

    #[test]
    fn test_append_crc_matches_payload() {
        let mut dg = DataGroup::from_payload(vec![0xDE, 0xAD, 0xBE, 0xEF], 2, 3);
        dg.append_crc();
        assert_eq!(dg.data.len(), 6);
        let crc = crc16(&dg.data[..4]);
        assert_eq!(dg.data[4], (crc >> 8) as u8);
        assert_eq!(dg.data[5], (crc & 0xFF) as u8);
    }

    #[test]
    fn test_write_progress_and_apptype() {
        let mut dg = DataGroup::from_payload(vec![1, 2, 3, 4, 5], 12, 13);
        let mut buf = [0u8; 3];

        let (apptype, cont) = dg.write(&mut buf);
        assert_eq!(apptype, 12);
        assert_eq!(cont, Some(13));
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(dg.available(), 2);

        let (apptype, cont) = dg.write(&mut buf);
        assert_eq!(apptype, 13);
        // spent: no continuation may be claimed by the next frame
        assert_eq!(cont, None);
        assert_eq!(buf, [4, 5, 0]);
        assert_eq!(dg.available(), 0);
    }

    #[test]
    fn test_write_zero_pads_past_end() {
        let mut dg = DataGroup::from_payload(vec![0xAA], 2, 3);
        let mut buf = [0xFFu8; 4];
        let (apptype, cont) = dg.write(&mut buf);
        assert_eq!(apptype, 2);
        assert_eq!(cont, None);
        assert_eq!(buf, [0xAA, 0x00, 0x00, 0x00]);
    }
}
