use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use tl_pipeline::cli::commands::{cache, config, providers, translate};
use tl_pipeline::cli::{Args, CacheCommand, Command, ConfigCommand};
use tl_pipeline::language::print_languages;
use tl_pipeline::logging;
use tl_pipeline::ui::Style;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", Style::error("Error:"));
            exit_code(exitcode::SOFTWARE)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Command::Languages) => print_languages(),
        Some(Command::Providers) => providers::print_providers()?,
        Some(Command::Cache { command }) => match command {
            CacheCommand::Stats => cache::print_stats()?,
            CacheCommand::Clear => cache::clear()?,
            CacheCommand::Path => cache::print_path()?,
        },
        Some(Command::Config { command }) => match command {
            ConfigCommand::Show => config::show()?,
            ConfigCommand::Init => config::init()?,
            ConfigCommand::Path => config::print_path()?,
        },
        None => {
            let options = translate::TranslateOptions {
                file: args.file,
                to: args.to,
                provider: args.provider,
                no_cache: args.no_cache,
                show_original: args.show_original,
            };
            translate::run_translate(options).await?;
        }
    }

    Ok(())
}

fn exit_code(code: exitcode::ExitCode) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
