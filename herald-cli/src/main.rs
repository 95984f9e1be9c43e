use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use herald::{
    AudioCache, Herald, HeraldError, HeraldSettings, Notification, ObservatoryProvider, RatePreset,
    VoiceCatalog, VoiceSelection,
};
use thiserror::Error;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Speak notifications through a remote text-to-speech service
#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Speak notifications through a remote text-to-speech service", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_verbosity: u8,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Speak a notification and wait for playback to finish
    Speak {
        /// Notification title
        #[arg(long)]
        title: String,

        /// Notification detail
        #[arg(long, default_value = "")]
        detail: String,

        /// Voice display name or raw provider voice name
        #[arg(long)]
        voice: Option<String>,

        /// Speaking style (e.g. "cheerful")
        #[arg(long)]
        style: Option<String>,

        /// Rate preset: slowest, slower, default, faster, fastest
        #[arg(long, value_parser = parse_rate)]
        rate: Option<RatePreset>,
    },

    /// List the voices Herald can use
    Voices {
        /// Fetch the current list from the Observatory service
        #[arg(long)]
        refresh: bool,
    },

    /// Request a new Observatory user id and store it in settings
    Register,

    /// Inspect or repair the audio cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show entry count, size and budget
    Stats,
    /// Reconcile the index with the files on disk and save it
    Rebuild,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Herald(#[from] HeraldError),

    #[error("no settings path given and the platform has no config directory")]
    NoSettingsPath,

    #[error("failed to save the cache index in {dir}")]
    CommitFailed { dir: PathBuf },
}

fn parse_rate(name: &str) -> Result<RatePreset, String> {
    RatePreset::from_name(name).ok_or_else(|| {
        format!("unknown rate '{name}' (expected slowest, slower, default, faster or fastest)")
    })
}

fn init_tracing(verbose: u8) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,herald=info".to_string(),
            2 => "info,herald=debug".to_string(),
            _ => "debug,herald=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(verbose >= 3)
                .with_line_number(verbose >= 3)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

fn settings_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    explicit
        .or_else(HeraldSettings::default_path)
        .ok_or(CliError::NoSettingsPath)
}

fn open_cache(settings: &HeraldSettings) -> Result<AudioCache, CliError> {
    let dir = settings
        .resolved_cache_dir()
        .ok_or_else(|| HeraldError::Settings {
            path: PathBuf::new(),
            message: "no cache directory is configured and the platform has none".to_string(),
        })?;
    Ok(AudioCache::open(dir, settings.effective_cache_size_mb()).map_err(HeraldError::from)?)
}

/// Display names (`"British - Sonia"`) missing from the catalog need the
/// provider's voice list; raw voice names resolve without it.
fn needs_voice_list(catalog: &VoiceCatalog, voice: &str) -> bool {
    catalog.get(voice).is_none() && voice.contains(" - ")
}

async fn speak(
    settings: HeraldSettings,
    notification: Notification,
    voice: Option<String>,
    style: Option<String>,
    rate: Option<RatePreset>,
) -> Result<(), CliError> {
    let rate = rate.unwrap_or(settings.rate);
    let voice = voice.unwrap_or_else(|| settings.selected_voice.clone());
    let mut herald = Herald::from_settings(settings)?;
    if needs_voice_list(herald.catalog(), &voice) {
        tracing::debug!(voice = %voice, "Voice not in catalog; fetching the voice list");
        herald.refresh_voices().await?;
    }

    let mut selection: VoiceSelection = herald.catalog().resolve(&voice, rate)?;
    if let Some(style) = style {
        selection = selection.with_style(style);
    }
    tracing::debug!(voice = %selection.voice, "Speaking notification");

    herald.speak(notification, selection);
    herald.drained().await;

    let cache = herald.cache();
    if !cache.commit().await {
        return Err(CliError::CommitFailed {
            dir: cache.dir().to_path_buf(),
        });
    }
    Ok(())
}

async fn voices(settings: HeraldSettings, refresh: bool) -> Result<(), CliError> {
    let mut herald = Herald::from_settings(settings)?;
    if refresh {
        herald.refresh_voices().await?;
    }

    for (name, option) in herald.catalog().iter() {
        let marker = if name == herald.settings().selected_voice { "*" } else { " " };
        println!("{marker} {name:<40} {}", option.voice);
    }
    Ok(())
}

async fn register(mut settings: HeraldSettings, path: &std::path::Path) -> Result<(), CliError> {
    let observatory = ObservatoryProvider::new(&settings.observatory_endpoint, None)
        .map_err(HeraldError::from)?;
    let user_id = observatory.new_user_id().await.map_err(HeraldError::from)?;

    settings.user_id = Some(user_id.clone());
    settings.save(path)?;
    println!("Registered user id {user_id}");
    println!("Saved to {}", path.display());
    Ok(())
}

fn cache_stats(settings: &HeraldSettings) -> Result<(), CliError> {
    let cache = open_cache(settings)?;
    let stats = cache.stats();
    println!("Directory: {}", cache.dir().display());
    println!("Entries:   {}", stats.entries);
    println!(
        "Size:      {:.2} MB of {:.2} MB",
        megabytes(stats.indexed_bytes),
        megabytes(stats.max_bytes)
    );
    Ok(())
}

async fn cache_rebuild(settings: &HeraldSettings) -> Result<(), CliError> {
    let cache = open_cache(settings)?;
    if !cache.commit().await {
        return Err(CliError::CommitFailed {
            dir: cache.dir().to_path_buf(),
        });
    }
    println!("Indexed {} entries in {}", cache.len(), cache.dir().display());
    Ok(())
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = settings_path(cli.settings)?;
    let settings = HeraldSettings::load(&path)?;
    tracing::debug!(path = %path.display(), api = ?settings.api, "Loaded settings");

    match cli.command {
        Commands::Speak {
            title,
            detail,
            voice,
            style,
            rate,
        } => speak(settings, Notification::new(title, detail), voice, style, rate).await,
        Commands::Voices { refresh } => voices(settings, refresh).await,
        Commands::Register => register(settings, &path).await,
        Commands::Cache { command } => match command {
            CacheCommands::Stats => cache_stats(&settings),
            CacheCommands::Rebuild => cache_rebuild(&settings).await,
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_verbosity);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_accepts_any_case() {
        assert_eq!(parse_rate("Fastest"), Ok(RatePreset::Fastest));
        assert_eq!(parse_rate("slower"), Ok(RatePreset::Slower));
    }

    #[test]
    fn test_parse_rate_rejects_unknown() {
        let err = parse_rate("ludicrous").unwrap_err();
        assert!(err.contains("ludicrous"));
    }

    #[test]
    fn test_cli_parses_speak() {
        let cli = Cli::try_parse_from([
            "herald", "-vv", "speak", "--title", "Jump", "--detail", "Into hyperspace", "--rate",
            "faster",
        ])
        .unwrap();

        assert_eq!(cli.log_verbosity, 2);
        match cli.command {
            Commands::Speak {
                title, detail, rate, ..
            } => {
                assert_eq!(title, "Jump");
                assert_eq!(detail, "Into hyperspace");
                assert_eq!(rate, Some(RatePreset::Faster));
            }
            _ => panic!("expected speak"),
        }
    }

    #[test]
    fn test_cli_requires_title() {
        assert!(Cli::try_parse_from(["herald", "speak"]).is_err());
    }

    #[test]
    fn test_megabytes() {
        assert_eq!(megabytes(1024 * 1024), 1.0);
    }

    #[test]
    fn test_needs_voice_list_only_for_unknown_display_names() {
        let catalog = VoiceCatalog::builtin();
        assert!(needs_voice_list(&catalog, "British - Sonia - cheerful"));
        assert!(!needs_voice_list(&catalog, "American - Christopher"));
        assert!(!needs_voice_list(&catalog, "en-GB-SoniaNeural"));
    }
}
