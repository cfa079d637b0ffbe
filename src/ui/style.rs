//! Colors for terminal output, via owo-colors.

use owo_colors::OwoColorize;
use std::fmt::Display;

/// Semantic styles used by the subcommands.
pub struct Style;

impl Style {
    /// Section titles such as "Cache" or "Providers".
    pub fn header<T: Display>(text: T) -> String {
        format!("{}", text.bold())
    }

    /// Keys in a key/value listing.
    pub fn label<T: Display>(text: T) -> String {
        format!("{}", text.dimmed())
    }

    pub fn value<T: Display>(text: T) -> String {
        format!("{}", text.cyan())
    }

    pub fn secondary<T: Display>(text: T) -> String {
        format!("{}", text.dimmed())
    }

    pub fn success<T: Display>(text: T) -> String {
        format!("{}", text.green())
    }

    pub fn error<T: Display>(text: T) -> String {
        format!("{}", text.red().bold())
    }

    pub fn warning<T: Display>(text: T) -> String {
        format!("{}", text.yellow())
    }

    /// Language codes.
    pub fn code<T: Display>(text: T) -> String {
        format!("{}", text.yellow())
    }

    pub fn hint<T: Display>(text: T) -> String {
        format!("{}", text.dimmed().italic())
    }

    /// Marks the provider selected in the config file.
    pub fn selected_marker() -> String {
        format!("{}", "(selected)".dimmed())
    }

    /// Green "ready" or yellow "not configured".
    pub fn availability(available: bool) -> String {
        if available {
            Self::success("ready")
        } else {
            Self::warning("not configured")
        }
    }

    /// A 0.0..=1.0 ratio as a percentage with one decimal.
    pub fn percent(ratio: f64) -> String {
        Self::value(format!("{:.1}%", ratio * 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_to_one_decimal() {
        assert!(Style::percent(0.8123).contains("81.2%"));
        assert!(Style::percent(0.0).contains("0.0%"));
    }

    #[test]
    fn test_availability_labels() {
        assert!(Style::availability(true).contains("ready"));
        assert!(Style::availability(false).contains("not configured"));
    }
}
