//! Inline formatting codes (`§` followed by one code character).

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::Marker;

/// Prefix of every inline formatting code.
pub const SECTION_SIGN: char = '§';

// unwrap is safe: patterns are compile-time constants
#[allow(clippy::unwrap_used)]
static AMPERSAND_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&([0-9a-fk-or])").unwrap());

#[allow(clippy::unwrap_used)]
static UNICODE_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").unwrap());

/// What a formatting code does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// `0`-`9`, `a`-`f`
    Color,
    /// `k`-`o`: obfuscated, bold, strikethrough, underline, italic.
    Style,
    /// `r`
    Reset,
}

impl FormatKind {
    /// Classifies the character following a `§`.
    pub const fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_lowercase() {
            '0'..='9' | 'a'..='f' => Some(Self::Color),
            'k'..='o' => Some(Self::Style),
            'r' => Some(Self::Reset),
            _ => None,
        }
    }
}

/// Rewrites `&c`-style codes into `§c` codes.
pub fn convert_ampersand_codes(text: &str) -> String {
    AMPERSAND_CODE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{SECTION_SIGN}{}", &caps[1])
        })
        .into_owned()
}

/// Replaces literal `\uXXXX` escapes with the characters they name.
pub fn unescape_unicode(text: &str) -> String {
    UNICODE_ESCAPE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Removes every formatting code from `text`.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == SECTION_SIGN
            && chars
                .peek()
                .is_some_and(|&next| FormatKind::from_code(next).is_some())
        {
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

/// Re-applies formatting to a translated string.
///
/// Translation reorders words, so codes cannot go back to their offsets.
/// The leading run of codes is restored in front (with the text's first
/// colour placed ahead of it when the run has none), and a trailing reset
/// is kept when the original ended with one.
pub fn restore_formatting(translated: &str, markers: &[Marker], original_len: usize) -> String {
    let codes: Vec<(&Marker, FormatKind)> = markers
        .iter()
        .filter_map(|m| m.format_kind().map(|kind| (m, kind)))
        .collect();

    if codes.is_empty() {
        return translated.to_string();
    }

    let leading: Vec<&(&Marker, FormatKind)> = codes
        .iter()
        .take_while(|(m, _)| m.clean_offset == 0)
        .collect();
    let leading_has_color = leading.iter().any(|(_, kind)| *kind == FormatKind::Color);

    let mut out = String::with_capacity(translated.len() + 8);
    if !leading_has_color
        && let Some((main_color, _)) = codes.iter().find(|(_, kind)| *kind == FormatKind::Color)
    {
        out.push_str(&main_color.symbol);
    }
    for (marker, _) in &leading {
        out.push_str(&marker.symbol);
    }
    out.push_str(translated);

    if let Some((last, FormatKind::Reset)) = codes.last()
        && last.end == original_len
        && !out.ends_with(last.symbol.as_str())
    {
        out.push_str(&last.symbol);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_kind_classification() {
        assert_eq!(FormatKind::from_code('c'), Some(FormatKind::Color));
        assert_eq!(FormatKind::from_code('C'), Some(FormatKind::Color));
        assert_eq!(FormatKind::from_code('7'), Some(FormatKind::Color));
        assert_eq!(FormatKind::from_code('l'), Some(FormatKind::Style));
        assert_eq!(FormatKind::from_code('r'), Some(FormatKind::Reset));
        assert_eq!(FormatKind::from_code('z'), None);
        assert_eq!(FormatKind::from_code('g'), None);
    }

    #[test]
    fn test_convert_ampersand_codes() {
        assert_eq!(convert_ampersand_codes("&cRed &lBold"), "§cRed §lBold");
        assert_eq!(convert_ampersand_codes("Tom & Jerry"), "Tom & Jerry");
    }

    #[test]
    fn test_unescape_unicode() {
        assert_eq!(unescape_unicode(r"\u00a7cRed"), "§cRed");
        assert_eq!(unescape_unicode(r"plain"), "plain");
        assert_eq!(unescape_unicode(r"\uD800 lone"), r"\uD800 lone");
    }

    #[test]
    fn test_strip_formatting() {
        assert_eq!(strip_formatting("§cRed §lBold§r"), "Red Bold");
        assert_eq!(strip_formatting("50§ off"), "50§ off");
    }
}
