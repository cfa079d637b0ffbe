//! Domain symbol alphabet and the modes that decide what happens to each symbol.

use serde::{Deserialize, Serialize};

/// How domain symbols are treated while encoding.
///
/// Passed into every [`encode`](super::encode) call so that concurrent
/// requests never observe each other's choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolMode {
    /// Every symbol is replaced by a placeholder and restored afterwards.
    PreserveAll,
    /// Core stat glyphs are preserved; extended glyphs are sent as words.
    #[default]
    PreserveCore,
    /// Every symbol is sent as a word and left for the provider to translate.
    TranslateAll,
}

/// Which table a symbol came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolClass {
    /// Currency glyphs with a canonical short token. Always preserved.
    Currency,
    Core,
    Extended,
}

/// Currency glyphs and the readable token they travel as.
const CURRENCY: &[(char, &str)] = &[('½', "EB"), ('¼', "EL"), ('²', "E")];

const CORE: &[(char, &str)] = &[
    ('⚔', "sword"),
    ('❤', "health"),
    ('✦', "mana"),
    ('⬡', "defense"),
    ('✤', "agility"),
    ('❋', "intelligence"),
];

const EXTENDED: &[(char, &str)] = &[
    ('⛏', "pickaxe"),
    ('🏹', "bow"),
    ('🛡', "shield"),
    ('🪓', "axe"),
    ('🔱', "trident"),
    ('🔮', "mage"),
    ('💀', "assassin"),
    ('🌿', "shaman"),
    ('💙', "mana"),
    ('⚡', "thunder"),
    ('🔥', "fire"),
    ('💧', "water"),
    ('🌍', "earth"),
    ('💨', "air"),
    ('✧', "star"),
    ('◆', "diamond"),
    ('◇', "hollow diamond"),
    ('●', "dot"),
    ('○', "circle"),
    ('■', "square"),
    ('⭐', "star"),
    ('☠', "skull"),
    ('❄', "ice"),
];

/// A recognized domain symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainSymbol {
    pub glyph: char,
    pub class: SymbolClass,
    /// Currency token or English word for the symbol.
    pub name: &'static str,
}

impl DomainSymbol {
    /// Whether the symbol must survive the round trip under `mode`.
    pub const fn is_preserved(&self, mode: SymbolMode) -> bool {
        match (self.class, mode) {
            (SymbolClass::Currency, _)
            | (SymbolClass::Core, SymbolMode::PreserveAll | SymbolMode::PreserveCore)
            | (SymbolClass::Extended, SymbolMode::PreserveAll) => true,
            (SymbolClass::Core, SymbolMode::TranslateAll)
            | (SymbolClass::Extended, SymbolMode::PreserveCore | SymbolMode::TranslateAll) => false,
        }
    }
}

/// Looks `c` up in the symbol tables.
pub fn lookup(c: char) -> Option<DomainSymbol> {
    [
        (CURRENCY, SymbolClass::Currency),
        (CORE, SymbolClass::Core),
        (EXTENDED, SymbolClass::Extended),
    ]
    .into_iter()
    .find_map(|(table, class)| {
        table
            .iter()
            .find(|(glyph, _)| *glyph == c)
            .map(|&(glyph, name)| DomainSymbol { glyph, class, name })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_classes() {
        assert_eq!(lookup('½').map(|s| s.class), Some(SymbolClass::Currency));
        assert_eq!(lookup('⚔').map(|s| s.class), Some(SymbolClass::Core));
        assert_eq!(lookup('⛏').map(|s| s.class), Some(SymbolClass::Extended));
        assert!(lookup('a').is_none());
        assert!(lookup('é').is_none());
    }

    #[test]
    fn test_preservation_by_mode() {
        let core = lookup('❤').unwrap();
        let extended = lookup('🔥').unwrap();
        let currency = lookup('¼').unwrap();

        assert!(core.is_preserved(SymbolMode::PreserveCore));
        assert!(!extended.is_preserved(SymbolMode::PreserveCore));
        assert!(extended.is_preserved(SymbolMode::PreserveAll));
        assert!(!core.is_preserved(SymbolMode::TranslateAll));
        assert!(currency.is_preserved(SymbolMode::TranslateAll));
    }

    #[test]
    fn test_mode_from_config_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: SymbolMode,
        }
        let parsed: Wrapper = toml::from_str("mode = \"translate_all\"").unwrap();
        assert_eq!(parsed.mode, SymbolMode::TranslateAll);
    }
}
