use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Settings;
use crate::language::validate_language;
use crate::paths;

/// Overrides from the command line, applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Target language code override.
    pub to: Option<String>,
    /// Provider name override.
    pub provider: Option<String>,
    /// Disable the durable cache for this run.
    pub no_cache: bool,
    /// Force `show_original` on.
    pub show_original: bool,
}

/// Merges CLI overrides into `settings`.
///
/// # Errors
///
/// Returns an error if the resulting target language is not supported, or
/// if the selected provider needs an API key that is not available.
pub fn resolve_settings(options: &ResolveOptions, settings: &Settings) -> Result<Settings> {
    let mut resolved = settings.clone();

    if let Some(to) = &options.to {
        resolved.translation.target_language.clone_from(to);
    }
    if let Some(provider) = &options.provider {
        resolved.translation.provider.clone_from(provider);
    }
    if options.no_cache {
        resolved.cache.persist = false;
    }
    if options.show_original {
        resolved.display.show_original = true;
    }

    validate_language(&resolved.translation.target_language)?;

    let provider_name = &resolved.translation.provider;
    if provider_name.trim().is_empty() {
        bail!(
            "Missing required configuration: 'provider'\n\n\
             Please provide it via:\n  \
             - CLI option: tlp --provider <name>\n  \
             - Config file: [translation] provider = \"google\""
        );
    }

    if let Some(provider) = resolved.providers.get(provider_name)
        && provider.requires_api_key()
        && provider.get_api_key().is_none()
    {
        let env_var = provider.api_key_env.as_deref().unwrap_or("API_KEY");
        bail!(
            "Provider '{provider_name}' requires an API key\n\n\
             Set the {env_var} environment variable:\n  \
             export {env_var}=\"your-api-key\"\n\n\
             Or set api_key under [providers.{provider_name}] in config.toml"
        );
    }

    Ok(resolved)
}

/// Manages loading and saving the configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a config manager for `$XDG_CONFIG_HOME/tlp/config.toml`,
    /// or `~/.config/tlp/config.toml` if `XDG_CONFIG_HOME` is not set.
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: paths::config_dir()?.join("config.toml"),
        })
    }

    /// Creates a config manager for an explicit file.
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn load(&self) -> Result<Settings> {
        let contents = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        toml::from_str(&contents).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })
    }

    /// Loads the file, using defaults when it does not exist.
    ///
    /// A file that exists but cannot be parsed is still an error.
    pub fn load_or_default(&self) -> Result<Settings> {
        if self.exists() {
            self.load()
        } else {
            Ok(Settings::default())
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let contents = toml::to_string_pretty(settings).context("Failed to serialize config")?;
        crate::fs::atomic_write(&self.config_path, &contents).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })
    }

    /// Writes a default config file unless one already exists.
    ///
    /// Returns `true` if a file was created.
    pub fn init(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }
        self.save(&Settings::default())?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use serial_test::serial;
    use tempfile::TempDir;

    fn create_test_manager(temp_dir: &TempDir) -> ConfigManager {
        ConfigManager::with_path(temp_dir.path().join("config.toml"))
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir);

        let mut settings = Settings::default();
        settings.translation.target_language = "ja".to_string();
        settings.translation.provider = "openai".to_string();
        settings.providers.insert(
            "openai".to_string(),
            ProviderConfig {
                endpoint: Some("http://localhost:11434".to_string()),
                model: Some("gemma3:12b".to_string()),
                ..ProviderConfig::default()
            },
        );

        manager.save(&settings).unwrap();
        assert_eq!(manager.load().unwrap(), settings);
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir);

        assert!(manager.load().is_err());
        assert_eq!(manager.load_or_default().unwrap(), Settings::default());
    }

    #[test]
    fn test_load_or_default_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir);
        fs::write(manager.config_path(), "[cache\nttl_days = ").unwrap();

        let err = manager.load_or_default().unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_init_does_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir);

        assert!(manager.init().unwrap());
        fs::write(manager.config_path(), "[display]\nshow_status = true\n").unwrap();
        assert!(!manager.init().unwrap());
        assert!(manager.load().unwrap().display.show_status);
    }

    #[test]
    fn test_resolve_cli_overrides_file() {
        let options = ResolveOptions {
            to: Some("ja".to_string()),
            provider: Some("mock".to_string()),
            no_cache: true,
            show_original: true,
        };

        let resolved = resolve_settings(&options, &Settings::default()).unwrap();

        assert_eq!(resolved.translation.target_language, "ja");
        assert_eq!(resolved.translation.provider, "mock");
        assert!(!resolved.cache.persist);
        assert!(resolved.display.show_original);
    }

    #[test]
    fn test_resolve_falls_back_to_file() {
        let mut settings = Settings::default();
        settings.translation.target_language = "ko".to_string();

        let resolved = resolve_settings(&ResolveOptions::default(), &settings).unwrap();

        assert_eq!(resolved.translation.target_language, "ko");
        assert_eq!(resolved.translation.provider, "google");
        assert!(resolved.cache.persist);
    }

    #[test]
    fn test_resolve_rejects_unknown_language() {
        let options = ResolveOptions {
            to: Some("klingon".to_string()),
            ..ResolveOptions::default()
        };
        let err = resolve_settings(&options, &Settings::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid language code"));
    }

    #[test]
    #[serial]
    fn test_resolve_api_key_required_but_missing() {
        unsafe { std::env::remove_var("TLP_TEST_NONEXISTENT_API_KEY") };

        let mut settings = Settings::default();
        settings.translation.provider = "openai".to_string();
        settings.providers.insert(
            "openai".to_string(),
            ProviderConfig {
                api_key_env: Some("TLP_TEST_NONEXISTENT_API_KEY".to_string()),
                ..ProviderConfig::default()
            },
        );

        let err = resolve_settings(&ResolveOptions::default(), &settings).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    #[serial]
    fn test_provider_api_key_prefers_env() {
        // SAFETY: serialized with the other env-var tests
        unsafe { std::env::set_var("TLP_TEST_API_KEY", "from-env") };

        let provider = ProviderConfig {
            api_key: Some("from-file".to_string()),
            api_key_env: Some("TLP_TEST_API_KEY".to_string()),
            ..ProviderConfig::default()
        };
        assert_eq!(provider.get_api_key(), Some("from-env".to_string()));

        unsafe { std::env::remove_var("TLP_TEST_API_KEY") };
        assert_eq!(provider.get_api_key(), Some("from-file".to_string()));
    }
}
