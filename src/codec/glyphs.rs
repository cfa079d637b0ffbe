//! Alternate-alphabet glyphs that map one-to-one onto Latin characters.

use serde::Serialize;

/// Script a glyph belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Alphabet {
    Wynnic,
    Gavellian,
}

const WYNNIC_PUNCTUATION: [char; 7] = [' ', '.', ',', '!', '?', ':', ';'];

/// Returns the alphabet and Latin equivalent of `c`, if it is an alternate glyph.
///
/// Covers the parenthesized (`⒜`-`⒵`) and circled (`ⓐ`-`ⓩ`) letter blocks,
/// plus the private-use ranges the game fonts draw as Wynnic and Gavellian.
pub fn transliterate(c: char) -> Option<(Alphabet, char)> {
    let code = u32::from(c);
    let (alphabet, latin) = match code {
        0x249C..=0x24B5 => (Alphabet::Wynnic, offset_char('a', code - 0x249C)),
        0x24D0..=0x24E9 => (Alphabet::Gavellian, offset_char('a', code - 0x24D0)),
        0xE000..=0xE019 => (Alphabet::Wynnic, offset_char('A', code - 0xE000)),
        0xE01A..=0xE023 => (Alphabet::Wynnic, offset_char('0', code - 0xE01A)),
        0xE024..=0xE02A => (
            Alphabet::Wynnic,
            WYNNIC_PUNCTUATION[(code - 0xE024) as usize],
        ),
        0xE100..=0xE119 => (Alphabet::Gavellian, offset_char('A', code - 0xE100)),
        0xE11A..=0xE123 => (Alphabet::Gavellian, offset_char('0', code - 0xE11A)),
        _ => return None,
    };
    Some((alphabet, latin))
}

fn offset_char(base: char, offset: u32) -> char {
    char::from_u32(u32::from(base) + offset).unwrap_or(base)
}

/// Returns `true` if the text contains any alternate-alphabet glyph.
pub fn contains_glyphs(text: &str) -> bool {
    text.chars().any(|c| transliterate(c).is_some())
}
