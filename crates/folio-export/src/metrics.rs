//! Glyph widths for the standard Helvetica faces and WinAnsi encoding.
//!
//! The header text uses the PDF base-14 fonts, so no font program is
//! embedded; centering still needs advance widths, taken from the
//! Adobe AFM files (units of 1/1000 em).

use folio_pipeline::FontWeight;

/// Helvetica advance widths for printable ASCII (32..=126).
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

/// Helvetica-Bold advance widths for printable ASCII (32..=126).
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // '0'..'?'
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 'P'..'_'
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // '`'..'o'
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 'p'..'~'
];

/// Width used for Latin-1 letters outside the ASCII table.
const FALLBACK_WIDTH: u16 = 556;

/// Map a character to its WinAnsi byte, or `None` if unencodable.
#[must_use]
pub fn win_ansi(c: char) -> Option<u8> {
    let code = u32::from(c);
    match c {
        ' '..='~' | '\u{a0}'..='\u{ff}' => u8::try_from(code).ok(),
        '€' => Some(0x80),
        '‚' => Some(0x82),
        '„' => Some(0x84),
        '…' => Some(0x85),
        '‘' => Some(0x91),
        '’' => Some(0x92),
        '“' => Some(0x93),
        '”' => Some(0x94),
        '•' => Some(0x95),
        '–' => Some(0x96),
        '—' => Some(0x97),
        _ => None,
    }
}

/// Encode `text` as WinAnsi bytes, replacing unencodable characters
/// with `?` and control characters with spaces.
#[must_use]
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            if c.is_control() {
                b' '
            } else {
                win_ansi(c).unwrap_or(b'?')
            }
        })
        .collect()
}

/// Advance width of one WinAnsi byte in 1/1000 em.
#[must_use]
pub fn glyph_width(byte: u8, weight: FontWeight) -> u16 {
    let table = match weight {
        FontWeight::Regular => &HELVETICA,
        FontWeight::Bold => &HELVETICA_BOLD,
    };
    match byte {
        32..=126 => table[usize::from(byte - 32)],
        0x85 | 0x97 => 1000,
        0x91 | 0x92 | 0x82 => match weight {
            FontWeight::Regular => 222,
            FontWeight::Bold => 278,
        },
        0x93 | 0x94 | 0x84 => match weight {
            FontWeight::Regular => 333,
            FontWeight::Bold => 500,
        },
        0x95 => 350,
        _ => FALLBACK_WIDTH,
    }
}

/// Width of WinAnsi-encoded `bytes` at `size_pt`, in points.
#[must_use]
pub fn text_width(bytes: &[u8], weight: FontWeight, size_pt: f64) -> f64 {
    let units: u32 = bytes.iter().map(|&b| u32::from(glyph_width(b, weight))).sum();
    f64::from(units) * size_pt / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_widths_match_afm() {
        assert_eq!(glyph_width(b' ', FontWeight::Regular), 278);
        assert_eq!(glyph_width(b'W', FontWeight::Regular), 944);
        assert_eq!(glyph_width(b'i', FontWeight::Regular), 222);
        assert_eq!(glyph_width(b'i', FontWeight::Bold), 278);
        assert_eq!(glyph_width(b'~', FontWeight::Bold), 584);
    }

    #[test]
    fn bold_text_is_wider() {
        let bytes = encode_win_ansi("Delivery Report");
        assert!(
            text_width(&bytes, FontWeight::Bold, 12.0) > text_width(&bytes, FontWeight::Regular, 12.0)
        );
    }

    #[test]
    fn width_scales_with_size() {
        let bytes = encode_win_ansi("0000");
        assert!((text_width(&bytes, FontWeight::Regular, 10.0) - 22.24).abs() < 1e-9);
    }

    #[test]
    fn latin1_and_punctuation_are_encoded() {
        assert_eq!(encode_win_ansi("Café"), b"Caf\xe9");
        assert_eq!(encode_win_ansi("a–b"), b"a\x96b");
        assert_eq!(encode_win_ansi("→\t"), b"? ");
    }
}
