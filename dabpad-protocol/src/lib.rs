//! PAD framing engine for DAB/DAB+ broadcasting.
//!
//! This crate implements the in-memory half of a Programme-Associated Data
//! (PAD) encoder: it turns Dynamic Label texts and MOT Slideshow objects
//! into Data Groups and packs those into fixed-size PAD frames that a
//! companion audio encoder multiplexes with the audio bitstream.
//!
//! # PAD frame format
//!
//! A PAD frame of `padlen` bytes is filled from its tail towards its head:
//!
//! ```text
//! +---------------+------------+-----------+------------------+-------+
//! | zero padding  | sub-fields | end mark  | CI list (1..=4)  | F-PAD |
//! |               | (reversed) | 0x00 opt. |                  | 2 B   |
//! +---------------+------------+-----------+------------------+-------+
//!                  <-------------- X-PAD ------------------->
//! ```
//!
//! The frame buffer returned by [`PadPacketizer::next_frame`] carries one
//! extra trailing byte reporting the used PAD length (`x-pad size + 2`);
//! that byte stays local to the encoder and is never sent on the wire.
//!
//! # Example
//!
//! ```rust
//! use dabpad_protocol::{DlState, DlsEncoder, DabCharset, PadPacketizer};
//!
//! let mut packetizer = PadPacketizer::new(58).unwrap();
//! let mut dls = DlsEncoder::new();
//!
//! let state = DlState {
//!     text: b"Hello".to_vec(),
//!     ..Default::default()
//! };
//! let dgs = dls.encode(&state, DabCharset::CompleteEbuLatin, false);
//! packetizer.add_dgs(dgs, true);
//!
//! let frame = packetizer.next_frame(true);
//! assert_eq!(frame.len(), 58 + 1);
//! ```

pub mod charset;
pub mod crc;
pub mod datagroup;
pub mod dls;
pub mod error;
pub mod mot;
pub mod packetizer;
pub mod types;

pub use charset::to_ebu_latin;
pub use crc::crc16;
pub use datagroup::DataGroup;
pub use dls::{DlPlusTag, DlState, DlsEncoder, APPTYPE_DLS_CONT, APPTYPE_DLS_START};
pub use error::PadError;
pub use mot::{
    MotHeader, MotSegmenter, APPTYPE_MOT_CONT, APPTYPE_MOT_START, MAXSEGLEN, MAXSLIDEID,
    MAXSLIDESIZE_SIMPLE,
};
pub use packetizer::{PadPacketizer, APPTYPE_DGLI, SHORT_PAD, VARSIZE_PAD_MAX, VARSIZE_PAD_MIN};
pub use types::{DabCharset, MESSAGE_PAD_DATA, MESSAGE_REQUEST};
