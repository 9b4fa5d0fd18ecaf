//! Shared type definitions for the PAD encoder.

use crate::error::PadError;

/// Message type byte for a PAD request (peer -> encoder).
/// The second byte of the message carries the desired PAD length.
pub const MESSAGE_REQUEST: u8 = 0x01;

/// Message type byte for PAD data (encoder -> peer).
/// Followed by `padlen` bytes of PAD frame content.
pub const MESSAGE_PAD_DATA: u8 = 0x02;

/// Character set identifiers from ETSI TS 101 756.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DabCharset {
    /// Complete EBU Latin based repertoire.
    CompleteEbuLatin = 0,
    /// EBU Latin based common core, Cyrillic, Greek.
    EbuLatinCyGr = 1,
    /// EBU Latin based core, Arabic, Hebrew, Cyrillic and Greek.
    EbuLatinArHeCyGr = 2,
    /// ISO Latin Alphabet No 2.
    IsoLatinAlphabet2 = 3,
    /// ISO/IEC 10646 using UCS-2 transformation format, big endian.
    Ucs2Be = 6,
    /// ISO/IEC 10646 using UTF-8.
    Utf8 = 15,
}

impl TryFrom<u8> for DabCharset {
    type Error = PadError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DabCharset::CompleteEbuLatin),
            1 => Ok(DabCharset::EbuLatinCyGr),
            2 => Ok(DabCharset::EbuLatinArHeCyGr),
            3 => Ok(DabCharset::IsoLatinAlphabet2),
            6 => Ok(DabCharset::Ucs2Be),
            15 => Ok(DabCharset::Utf8),
            other => Err(PadError::UnsupportedCharset(other)),
        }
    }
}

impl DabCharset {
    /// Human readable name, for startup banners and diagnostics.
    pub fn display_name(self) -> &'static str {
        match self {
            DabCharset::CompleteEbuLatin => "Complete EBU Latin",
            DabCharset::EbuLatinCyGr => "EBU Latin core, Cyrillic, Greek",
            DabCharset::EbuLatinArHeCyGr => "EBU Latin core, Arabic, Hebrew, Cyrillic, Greek",
            DabCharset::IsoLatinAlphabet2 => "ISO Latin Alphabet 2",
            DabCharset::Ucs2Be => "UCS-2 BE",
            DabCharset::Utf8 => "UTF-8",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_roundtrip() {
        for id in [0u8, 1, 2, 3, 6, 15] {
            let cs = DabCharset::try_from(id).unwrap();
            assert_eq!(cs as u8, id);
        }
    }

    #[test]
    fn test_charset_invalid() {
        assert!(DabCharset::try_from(4).is_err());
        assert!(DabCharset::try_from(16).is_err());
    }
}
