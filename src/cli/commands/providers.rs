//! Provider listing command handler.

use anyhow::Result;

use crate::config::ConfigManager;
use crate::provider::ProviderRegistry;
use crate::ui::Style;

/// Prints every registered provider and whether it can be used as configured.
///
/// A provider that cannot even be constructed (for example, an invalid
/// timeout) is listed with the construction error.
pub fn print_providers() -> Result<()> {
    let manager = ConfigManager::new()?;
    let settings = manager.load_or_default()?;
    let registry = ProviderRegistry::default();
    let selected = settings.translation.provider.as_str();

    println!("{}", Style::header("Providers"));
    for name in registry.names() {
        let marker = if name == selected {
            format!(" {}", Style::selected_marker())
        } else {
            String::new()
        };
        let config = settings.provider(name);

        let status = match registry.create(name, &config) {
            Ok(provider) => Style::availability(provider.is_available()),
            Err(e) => Style::error(e),
        };
        println!("  {}{marker}  {status}", Style::value(format!("{name:<8}")));

        if let Some(endpoint) = &config.endpoint {
            println!("    {} {}", Style::label("endpoint:"), Style::secondary(endpoint));
        }
        if let Some(model) = &config.model {
            println!("    {} {}", Style::label("model:"), Style::secondary(model));
        }
    }

    Ok(())
}
