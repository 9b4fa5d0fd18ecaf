//! UTF-8 to EBU Latin conversion for Dynamic Label text.
//!
//! The "complete EBU Latin based repertoire" (ETSI TS 101 756, annex C) is
//! an 8-bit code page; the table below lists the Unicode equivalent of every
//! code point from 0x20 upwards. A reverse index is built once so label
//! lines can be converted in O(1) per character.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// The first 32 code points are control characters and not part of the table.
const CHARSET_TABLE_OFFSET: usize = 32;

/// Unicode equivalents of EBU Latin code points 0x20..=0xFE.
#[rustfmt::skip]
static EBU_LATIN_TABLE: [&str; 223] = [
    " ", "!", "\"","#", "¤", "%", "&", "'", "(", ")", "*", "+", ",", "-", ".", "/",
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", ":", ";", "<", "=", ">", "?",
    "@", "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O",
    "P", "Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z", "[", "\\","]", "—", "_",
    "‖", "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o",
    "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "{", "|", "}", "⎺", " ",
    "á", "à", "é", "è", "í", "ì", "ó", "ò", "ú", "ù", "Ñ", "Ç", "Ş", "ß", "¡", "Ĳ",
    "â", "ä", "ê", "ë", "î", "ï", "ô", "ö", "û", "ü", "ñ", "ç", "ş", "ǧ", "ı", "ĳ",
    "ª", "α", "©", "‰", "Ǧ", "ě", "ň", "ő", "π", "€", "£", "$", "←", "↑", "→", "↓",
    "º", "¹", "²", "³", "±", "İ", "ń", "ű", "μ", "¿", "÷", "°", "¼", "½", "¾", "§",
    "Á", "À", "Ê", "È", "Í", "Ì", "Ó", "Ò", "Ú", "Ù", "Ř", "Č", "Š", "Ž", "Ð", "Ŀ",
    "Â", "Ä", "Ê", "Ë", "Î", "Ï", "Ô", "Ö", "Û", "Ü", "ř", "č", "š", "ž", "đ", "ŀ",
    "Ã", "Å", "Æ", "Œ", "ŷ", "Ý", "Õ", "Ø", "Þ", "Ŋ", "Ŕ", "Ć", "Ś", "Ź", "∓", "ð",
    "ã", "å", "æ", "œ", "ŵ", "ý", "õ", "ø", "þ", "ŋ", "ŕ", "ć", "ś", "ź", "ł",
];

/// Reverse index: Unicode code point -> EBU Latin byte.
///
/// A few glyphs appear twice in the table; the first (lowest) code point
/// wins, matching the forward scan receivers perform.
static CODE_POINT_INDEX: Lazy<HashMap<char, u8>> = Lazy::new(|| {
    let mut index = HashMap::with_capacity(EBU_LATIN_TABLE.len());
    for (i, entry) in EBU_LATIN_TABLE.iter().enumerate() {
        let c = entry.chars().next().expect("table entries are single chars");
        index
            .entry(c)
            .or_insert((i + CHARSET_TABLE_OFFSET) as u8);
    }
    index
});

/// Convert a UTF-8 text line into EBU Latin bytes.
///
/// Code points without an EBU Latin equivalent become a space.
pub fn to_ebu_latin(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| CODE_POINT_INDEX.get(&c).copied().unwrap_or(b' '))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_maps_to_itself() {
        assert_eq!(to_ebu_latin("Hello, World!"), b"Hello, World!".to_vec());
    }

    #[test]
    fn test_accented_characters() {
        // 0x80 = a-acute, 0x82 = e-acute
        assert_eq!(to_ebu_latin("áé"), vec![0x80, 0x82]);
        // 0xD1 = A-diaeresis, 0x96 = o-circumflex
        assert_eq!(to_ebu_latin("Äô"), vec![0xD1, 0x96]);
    }

    #[test]
    fn test_currency_symbols() {
        assert_eq!(to_ebu_latin("€"), vec![0xA9]);
        assert_eq!(to_ebu_latin("£"), vec![0xAA]);
    }

    #[test]
    fn test_unmapped_becomes_space() {
        assert_eq!(to_ebu_latin("漢字"), vec![b' ', b' ']);
    }

    #[test]
    fn test_duplicate_glyphs_take_first_code_point() {
        // space appears at 0x20 and 0x7F, E-circumflex at 0xC2 and 0xD2
        assert_eq!(to_ebu_latin(" "), vec![0x20]);
        assert_eq!(to_ebu_latin("Ê"), vec![0xC2]);
    }
}
