use anyhow::{Result, bail};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::SqliteStore;
use crate::config::{ConfigManager, ResolveOptions, Settings, SharedConfig, resolve_settings};
use crate::input::InputReader;
use crate::paths;
use crate::pipeline::TranslationService;
use crate::ui::Spinner;

/// Lines handed to the pipeline at once. Output is flushed after each chunk.
const CHUNK_SIZE: usize = 32;

pub struct TranslateOptions {
    pub file: Option<String>,
    pub to: Option<String>,
    pub provider: Option<String>,
    pub no_cache: bool,
    pub show_original: bool,
}

pub async fn run_translate(options: TranslateOptions) -> Result<()> {
    let settings = load_resolved_settings(&options)?;

    let lines = InputReader::read_lines(options.file.as_deref())?;
    if lines.iter().all(|line| line.trim().is_empty()) {
        bail!("Input is empty");
    }

    let service = build_service(settings)?;
    let result = translate_lines(&service, &lines).await;
    service.shutdown().await;

    let stats = service.stats();
    info!(
        lines = lines.len(),
        cache_hits = stats.pipeline.cache_hits,
        translated = stats.pipeline.translated,
        fallbacks = stats.pipeline.fallbacks,
        "Translation finished"
    );

    result
}

fn load_resolved_settings(options: &TranslateOptions) -> Result<Settings> {
    let manager = ConfigManager::new()?;
    let file_settings = manager.load_or_default()?;

    resolve_settings(
        &ResolveOptions {
            to: options.to.clone(),
            provider: options.provider.clone(),
            no_cache: options.no_cache,
            show_original: options.show_original,
        },
        &file_settings,
    )
}

fn build_service(settings: Settings) -> Result<TranslationService> {
    let persist = settings.cache.persist;
    let mut builder = TranslationService::builder(Arc::new(SharedConfig::new(settings)));
    if persist {
        match paths::cache_db_path().and_then(|path| SqliteStore::open(path)) {
            Ok(store) => builder = builder.store(Box::new(store)),
            Err(e) => warn!(
                error = format!("{e:#}"),
                "Persistent cache unavailable, using a memory-only cache"
            ),
        }
    }
    builder.build()
}

async fn translate_lines(service: &TranslationService, lines: &[String]) -> Result<()> {
    let spinner = Spinner::new("Translating", lines.len());

    for chunk in lines.chunks(CHUNK_SIZE) {
        let translated = service.translate_batch(chunk).await;
        spinner.suspend(|| -> io::Result<()> {
            let mut stdout = io::stdout().lock();
            for line in &translated {
                writeln!(stdout, "{line}")?;
            }
            stdout.flush()
        })?;
        spinner.advance(chunk.len());
    }

    spinner.stop();
    Ok(())
}
