//! Reversible extraction of non-translatable tokens.
//!
//! [`encode`] turns a fragment into clean text plus a [`MarkerTable`];
//! [`decode`] puts the markers back into whatever the provider returned.
//!
//! Restoration is best-effort. A provider is free to reorder, merge or drop
//! words, so substitutions are matched by the first textual occurrence of
//! their token rather than by offset, and formatting codes are re-applied
//! with a colour-preserving strategy instead of at their original positions.
//! Anything that could not be put back is reported in [`Decoded`] instead of
//! being silently discarded.

mod formatting;
mod glyphs;
mod symbols;

use regex::Regex;
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::LazyLock;

pub use formatting::{
    FormatKind, SECTION_SIGN, convert_ampersand_codes, strip_formatting, unescape_unicode,
};
pub use glyphs::Alphabet;
pub use symbols::{SymbolClass, SymbolMode};

// unwrap is safe: pattern is a compile-time constant
#[allow(clippy::unwrap_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[S\d+\]").unwrap());

/// Token class of a [`Marker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "detail")]
pub enum MarkerKind {
    Formatting(FormatKind),
    Symbol(SymbolClass),
    Glyph(Alphabet),
}

/// One non-translatable token found in the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    /// The original characters.
    pub symbol: String,
    /// Character offset of the first character in the original text.
    pub start: usize,
    /// Character offset one past the last character in the original text.
    pub end: usize,
    pub kind: MarkerKind,
    /// What stands in for the marker in the clean text. Empty for formatting codes.
    pub substitution: String,
    /// Character offset of the substitution in the clean text.
    pub clean_offset: usize,
    /// Whether decode puts `symbol` back in place of `substitution`.
    pub restore: bool,
}

impl Marker {
    pub const fn format_kind(&self) -> Option<FormatKind> {
        match self.kind {
            MarkerKind::Formatting(kind) => Some(kind),
            MarkerKind::Symbol(_) | MarkerKind::Glyph(_) => None,
        }
    }
}

/// Result of [`encode`], scoped to a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerTable {
    pub original_text: String,
    pub clean_text: String,
    /// Sorted by `start`.
    pub markers: Vec<Marker>,
}

impl MarkerTable {
    pub const fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Whether the clean text contains anything worth sending to a provider.
    pub fn has_translatable_text(&self) -> bool {
        let mut stripped = self.clean_text.clone();
        for marker in self.markers.iter().filter(|m| m.restore) {
            stripped = stripped.replacen(marker.substitution.as_str(), "", 1);
        }
        stripped.chars().any(char::is_alphabetic)
    }
}

/// Result of [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    /// Placeholder tokens still present in `text`.
    pub leftover: Vec<String>,
    /// Substitutions the translation no longer contained; their symbols are lost.
    pub missing: Vec<String>,
}

impl Decoded {
    fn clean(text: String) -> Self {
        Self {
            text,
            leftover: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// `true` when every marker found its way back.
    pub fn is_complete(&self) -> bool {
        self.leftover.is_empty() && self.missing.is_empty()
    }
}

/// Returns `true` if [`encode`] would find any marker in `text`.
pub fn needs_special_processing(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == SECTION_SIGN
            && chars
                .peek()
                .is_some_and(|&next| FormatKind::from_code(next).is_some())
        {
            return true;
        }
        if symbols::lookup(c).is_some() || glyphs::transliterate(c).is_some() {
            return true;
        }
    }
    false
}

/// Splits `text` into clean text and the markers removed from it.
pub fn encode(text: &str, mode: SymbolMode) -> MarkerTable {
    let chars: Vec<char> = text.chars().collect();
    let mut clean = String::with_capacity(text.len());
    let mut clean_len = 0usize;
    let mut markers = Vec::new();
    let mut placeholder_index = 0usize;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if c == SECTION_SIGN
            && let Some(kind) = chars.get(i + 1).copied().and_then(FormatKind::from_code)
        {
            markers.push(Marker {
                symbol: chars[i..i + 2].iter().collect(),
                start: i,
                end: i + 2,
                kind: MarkerKind::Formatting(kind),
                substitution: String::new(),
                clean_offset: clean_len,
                restore: true,
            });
            i += 2;
            continue;
        }

        if let Some(symbol) = symbols::lookup(c) {
            let preserved = symbol.is_preserved(mode);
            let substitution = match symbol.class {
                SymbolClass::Currency => format!(" {} ", symbol.name),
                SymbolClass::Core | SymbolClass::Extended if preserved => {
                    placeholder_index += 1;
                    format!("[S{placeholder_index}]")
                }
                SymbolClass::Core | SymbolClass::Extended => symbol.name.to_string(),
            };
            markers.push(Marker {
                symbol: c.to_string(),
                start: i,
                end: i + 1,
                kind: MarkerKind::Symbol(symbol.class),
                substitution: substitution.clone(),
                clean_offset: clean_len,
                restore: preserved,
            });
            clean_len += substitution.chars().count();
            clean.push_str(&substitution);
            i += 1;
            continue;
        }

        if let Some((alphabet, _)) = glyphs::transliterate(c) {
            let start = i;
            let mut latin = String::new();
            while let Some((next_alphabet, letter)) =
                chars.get(i).copied().and_then(glyphs::transliterate)
            {
                if next_alphabet != alphabet {
                    break;
                }
                latin.push(letter);
                i += 1;
            }
            markers.push(Marker {
                symbol: chars[start..i].iter().collect(),
                start,
                end: i,
                kind: MarkerKind::Glyph(alphabet),
                substitution: latin.clone(),
                clean_offset: clean_len,
                restore: true,
            });
            clean_len += latin.chars().count();
            clean.push_str(&latin);
            continue;
        }

        clean.push(c);
        clean_len += 1;
        i += 1;
    }

    MarkerTable {
        original_text: text.to_string(),
        clean_text: clean,
        markers,
    }
}

/// Puts the markers of `table` back into `translated`.
pub fn decode(translated: &str, table: &MarkerTable) -> Decoded {
    if table.markers.is_empty() {
        return Decoded::clean(translated.to_string());
    }
    if translated == table.clean_text {
        return Decoded::clean(table.original_text.clone());
    }

    let mut substitutions: Vec<&Marker> = table
        .markers
        .iter()
        .filter(|m| m.restore && !m.substitution.is_empty())
        .collect();
    // Stable: equal lengths keep table order.
    substitutions.sort_by_key(|m| Reverse(m.substitution.chars().count()));

    let mut text = translated.to_string();
    let mut missing = Vec::new();
    for marker in substitutions {
        match find_token(&text, &marker.substitution) {
            Some((start, len)) => text.replace_range(start..start + len, &marker.symbol),
            None => missing.push(marker.substitution.trim().to_string()),
        }
    }

    let leftover = PLACEHOLDER
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect();

    let original_len = table.original_text.chars().count();
    Decoded {
        text: formatting::restore_formatting(&text, &table.markers, original_len),
        leftover,
        missing,
    }
}

/// Byte range of the first occurrence of `token`.
///
/// Bare-word tokens prefer a match that does not sit inside a longer word
/// and only fall back to a raw substring match when there is none. Padded
/// tokens fall back to their trimmed form, since providers tend to collapse
/// whitespace.
fn find_token(haystack: &str, token: &str) -> Option<(usize, usize)> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return haystack.find(token).map(|start| (start, token.len()));
    }

    if trimmed == token && token.chars().all(char::is_alphanumeric) {
        return find_word(haystack, token)
            .or_else(|| haystack.find(token))
            .map(|start| (start, token.len()));
    }

    if let Some(start) = haystack.find(token) {
        return Some((start, token.len()));
    }
    if trimmed == token {
        return None;
    }
    find_word(haystack, trimmed).map(|start| (start, trimmed.len()))
}

/// Start of the first occurrence of `word` not adjacent to ASCII letters or digits.
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack
        .match_indices(word)
        .find(|&(start, _)| {
            let before = haystack[..start].chars().next_back();
            let after = haystack[start + word.len()..].chars().next();
            !before.is_some_and(|c| c.is_ascii_alphanumeric())
                && !after.is_some_and(|c| c.is_ascii_alphanumeric())
        })
        .map(|(start, _)| start)
}
