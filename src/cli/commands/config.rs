//! Config file display and creation.

use anyhow::{Context, Result};

use crate::config::{ConfigManager, Settings};
use crate::ui::Style;

/// Prints the settings in effect: the file merged over defaults.
pub fn show() -> Result<()> {
    let manager = ConfigManager::new()?;
    let settings = manager.load_or_default()?;

    let source = if manager.exists() {
        manager.config_path().display().to_string()
    } else {
        "built-in defaults".to_string()
    };
    println!("{}", Style::hint(format!("# from {source}")));
    print!("{}", render(&settings)?);
    Ok(())
}

pub fn init() -> Result<()> {
    let manager = ConfigManager::new()?;
    let path = manager.config_path().display();

    if manager.init()? {
        println!("{}", Style::success(format!("Created {path}")));
    } else {
        println!("{}", Style::warning(format!("{path} already exists, leaving it unchanged")));
    }
    println!("{}", Style::hint("Run 'tlp config show' to see the effective settings"));
    Ok(())
}

pub fn print_path() -> Result<()> {
    println!("{}", ConfigManager::new()?.config_path().display());
    Ok(())
}

fn render(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to serialize config")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_every_section() {
        let rendered = render(&Settings::default()).unwrap();
        for section in [
            "[translation]",
            "[cache]",
            "[rate_limit]",
            "[throttle]",
            "[workers]",
            "[display]",
            "[codec]",
            "[filters]",
        ] {
            assert!(rendered.contains(section), "missing {section}");
        }
    }

    #[test]
    fn test_render_parses_back() {
        let rendered = render(&Settings::default()).unwrap();
        let parsed: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, Settings::default());
    }
}
