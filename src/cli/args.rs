use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tlp")]
#[command(about = "Translate game text line by line through a cached, rate-limited pipeline")]
#[command(version)]
pub struct Args {
    /// File to translate, one text per line (reads from stdin if not provided)
    pub file: Option<String>,

    /// Target language code (e.g., ja, ko, zh-TW)
    #[arg(short = 't', long = "to")]
    pub to: Option<String>,

    /// Provider name (google, openai, gemini, mock)
    #[arg(short = 'p', long)]
    pub provider: Option<String>,

    /// Keep the cache in memory only for this run
    #[arg(short = 'n', long)]
    pub no_cache: bool,

    /// Append the original text after each translation
    #[arg(long)]
    pub show_original: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List supported language codes
    Languages,
    /// List translation providers and whether they are ready to use
    Providers,
    /// Inspect or clear the persistent translation cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show entry counts per language
    Stats,
    /// Delete every cached translation
    Clear,
    /// Print the cache database path
    Path,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Write a default config file if none exists
    Init,
    /// Print the config file path
    Path,
}
