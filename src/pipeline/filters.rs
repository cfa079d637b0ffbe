use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::warn;

use crate::config::FilterConfig;
use crate::language::Script;

// unwrap is safe: pattern is a compile-time constant
#[allow(clippy::unwrap_used)]
static NON_LINGUISTIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d\s\p{P}\p{S}]+$").unwrap());

/// Why a text was not sent for translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Blank,
    /// Only digits, punctuation and symbols.
    NonLinguistic,
    /// Already contains characters of the target script.
    AlreadyTarget,
    SkipWord,
    SkipPattern,
}

/// Compiled form of the `[filters]` section.
#[derive(Debug)]
pub struct TextFilter {
    skip_words: HashSet<String>,
    patterns: Vec<Regex>,
}

impl TextFilter {
    /// Compiles `config`. Invalid patterns are logged and ignored.
    pub fn new(config: &FilterConfig) -> Self {
        let patterns = config
            .skip_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Ignoring invalid skip pattern");
                    None
                }
            })
            .collect();

        Self {
            skip_words: config
                .skip_words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .collect(),
            patterns,
        }
    }

    /// Returns why `text` should be left untranslated, if it should.
    pub fn skip_reason(&self, text: &str, target_language: &str) -> Option<SkipReason> {
        let text = text.trim();
        if text.is_empty() {
            return Some(SkipReason::Blank);
        }
        if NON_LINGUISTIC.is_match(text) {
            return Some(SkipReason::NonLinguistic);
        }
        if Script::for_language(target_language).is_some_and(|script| script.appears_in(text)) {
            return Some(SkipReason::AlreadyTarget);
        }
        if self.skip_words.contains(&text.to_lowercase()) {
            return Some(SkipReason::SkipWord);
        }
        if self.patterns.iter().any(|re| re.is_match(text)) {
            return Some(SkipReason::SkipPattern);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> TextFilter {
        TextFilter::new(&FilterConfig {
            skip_words: vec!["Wynncraft".to_string()],
            ..FilterConfig::default()
        })
    }

    #[test]
    fn test_blank_and_non_linguistic() {
        let filter = filter();
        assert_eq!(filter.skip_reason("   ", "ja"), Some(SkipReason::Blank));
        assert_eq!(
            filter.skip_reason("1,234 / 5,000", "ja"),
            Some(SkipReason::NonLinguistic)
        );
        assert_eq!(
            filter.skip_reason("-> +5%", "ja"),
            Some(SkipReason::NonLinguistic)
        );
    }

    #[test]
    fn test_already_in_target_script() {
        let filter = filter();
        assert_eq!(
            filter.skip_reason("光之劍", "zh-TW"),
            Some(SkipReason::AlreadyTarget)
        );
        assert_eq!(filter.skip_reason("Sword of Light", "zh-TW"), None);
        // Latin targets have no script heuristic.
        assert_eq!(filter.skip_reason("Schwert", "de"), None);
    }

    #[test]
    fn test_skip_words_ignore_case() {
        assert_eq!(
            filter().skip_reason("wynncraft", "ja"),
            Some(SkipReason::SkipWord)
        );
    }

    #[test]
    fn test_default_patterns() {
        let filter = filter();
        assert_eq!(
            filter.skip_reason("minecraft:diamond_sword", "ja"),
            Some(SkipReason::SkipPattern)
        );
        assert_eq!(
            filter.skip_reason("[Guild]", "ja"),
            Some(SkipReason::SkipPattern)
        );
        assert_eq!(
            filter.skip_reason("<Steve>", "ja"),
            Some(SkipReason::SkipPattern)
        );
        assert_eq!(filter.skip_reason("Click: to open", "ja"), None);
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        let filter = TextFilter::new(&FilterConfig {
            skip_words: Vec::new(),
            skip_patterns: vec!["(unclosed".to_string(), "^ok$".to_string()],
        });
        assert_eq!(filter.skip_reason("ok", "ja"), Some(SkipReason::SkipPattern));
        assert_eq!(filter.skip_reason("(unclosed", "ja"), None);
    }
}
