use crate::codec::strip_formatting;
use crate::config::DisplayConfig;

/// Composes the line shown to the user for a translated fragment.
///
/// `translated` already has its markers restored. The original is appended
/// without formatting codes so its colours cannot bleed into what follows.
pub fn format_translation(translated: &str, original: &str, display: &DisplayConfig) -> String {
    let mut out = String::with_capacity(translated.len() + display.prefix.len() + original.len() + 3);
    if display.show_status {
        out.push_str(&display.prefix);
    }
    out.push_str(translated);
    if display.show_original {
        out.push_str(" (");
        out.push_str(strip_formatting(original).trim());
        out.push(')');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(show_original: bool, show_status: bool) -> DisplayConfig {
        DisplayConfig {
            show_original,
            show_status,
            prefix: "[譯] ".to_string(),
        }
    }

    #[test]
    fn test_plain() {
        assert_eq!(
            format_translation("光之劍", "Sword of Light", &display(false, false)),
            "光之劍"
        );
    }

    #[test]
    fn test_with_original() {
        assert_eq!(
            format_translation("§c光之劍", "§cSword of Light", &display(true, false)),
            "§c光之劍 (Sword of Light)"
        );
    }

    #[test]
    fn test_with_status_and_original() {
        assert_eq!(
            format_translation("光之劍", "Sword of Light", &display(true, true)),
            "[譯] 光之劍 (Sword of Light)"
        );
    }
}
