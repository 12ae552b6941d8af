//! # Sequencer Configuration Validator
//!
//! Command-line tool for validating sequencer configuration files across
//! environments, and for checking session documents before they reach a pod.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sequencer_core::config::{ConfigManager, SequencerConfig};
use sequencer_core::timeline::{extract_session, normalize, RawSequence};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate sequencer configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development", env = "SEQUENCER_ENV")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the merged configuration for the environment
    Validate,

    /// Print the effective configuration as JSON
    Show,

    /// List environments with an override file
    Environments,

    /// Normalize a session and print the resulting timeline
    Timeline {
        /// JSON file holding a session, or a shadow document with `--shadow`
        file: PathBuf,

        /// Treat the file as a device shadow document
        #[arg(long)]
        shadow: bool,

        /// Playback speed (defaults to the configured speed)
        #[arg(long)]
        speed: Option<f64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Timeline {
            file,
            shadow,
            speed,
        }) => show_timeline(&cli, file, *shadow, *speed),
    };

    match result {
        Ok(()) => {
            info!("Configuration validator finished");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<SequencerConfig> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for '{}'", cli.environment))?;
    Ok(manager.config().clone())
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating Sequencer Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let config = load(cli)?;
    println!("✅ Configuration loaded and validated");

    println!("🎬 Sequencer");
    println!("   ✅ Speed: {}", config.sequencer.speed);
    println!("   ✅ Idle poll: {}s", config.sequencer.idle_poll_seconds);
    match config.sequencer.default_preload_seconds {
        Some(seconds) => println!("   ✅ Default preload: {seconds}s"),
        None => println!("   ℹ️  Default preload disabled"),
    }

    println!("⏰ Deadline timer");
    println!(
        "   ✅ Converges within {}ms at factor {}",
        config.timer.convergence_threshold_ms, config.timer.convergence_factor
    );

    println!("🔌 Shadow client");
    println!("   ✅ Thing: {}", config.shadow.thing_name);
    if config.shadow.client_id.trim().is_empty() {
        println!("   ℹ️  Client id generated at startup");
    } else {
        println!("   ✅ Client id: {}", config.shadow.client_id);
    }

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn show(cli: &Cli) -> anyhow::Result<()> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)?;
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

fn list_environments(cli: &Cli) -> anyhow::Result<()> {
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("config"));

    println!("📋 Available Environments:");
    for environment in ConfigManager::available_environments(&config_dir)? {
        println!("  • {environment}");
    }
    Ok(())
}

fn show_timeline(cli: &Cli, file: &Path, shadow: bool, speed: Option<f64>) -> anyhow::Result<()> {
    let speed = match speed {
        Some(speed) => speed,
        None => load(cli)?.sequencer.speed,
    };
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let document: serde_json::Value = serde_json::from_str(&contents)?;

    let session: RawSequence = if shadow {
        match extract_session(&document)? {
            Some(session) => session,
            None => bail!("shadow document has no desired session"),
        }
    } else {
        serde_json::from_value(document).context("parsing session")?
    };

    let timeline = normalize(&session, speed)?;
    println!(
        "🎞️  Timeline at {speed}x: {} - {}",
        timeline.starts_at.to_rfc3339(),
        timeline.ends_at.to_rfc3339()
    );
    for part in &timeline.parts {
        println!(
            "  {:>8}ms +{:>8}ms  {}",
            part.offset_ms, part.duration_ms, part.part_type
        );
    }
    for diagnostic in &timeline.diagnostics {
        println!("  ⚠️  {diagnostic:?}");
    }
    Ok(())
}
