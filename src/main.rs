//! Subverses command line entry point

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subverses::cli::{Args, Commands};
use subverses::config::Config;
use subverses::source::{LocalSource, VideoIdentity};
use subverses::store::SegmentState;
use subverses::workflow::{TranscriptOrigin, Workflow};

const DEFAULT_CONFIG_FILE: &str = "subverses.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    match &args.command {
        Commands::Process(process) => process.apply(&mut config),
        Commands::Status { data_dir: Some(dir), .. } => config.pipeline.data_dir = dir.clone(),
        Commands::Status { .. } => {}
    }
    apply_environment(&mut config);

    let _guard = setup_logging(args.verbose, &config.pipeline.data_dir)?;
    info!("Starting subverses");

    match args.command {
        Commands::Process(process) => {
            config.validate()?;
            if config.transcription.api_key.is_none() {
                warn!("OPENAI_API_KEY is not set; remote requests will be rejected");
            }

            let identity = VideoIdentity::parse(&process.youtube_url)?;
            let source = LocalSource::new(process.audio.clone())
                .with_manual_transcript(process.manual_transcript.clone())
                .with_video(process.video.clone());
            let workflow = Workflow::new(config)?;

            let report = tokio::select! {
                report = workflow.run(&source, &identity) => report?,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted; completed segments and chunks are kept for the next run");
                    anyhow::bail!("interrupted");
                }
            };

            match report.origin {
                TranscriptOrigin::ExistingOutput => {
                    println!("Subtitle file already exists: {}", report.output_path.display())
                }
                TranscriptOrigin::Manual => println!(
                    "Wrote {} cue(s) from the manual transcript to {}",
                    report.cue_count,
                    report.output_path.display()
                ),
                TranscriptOrigin::Audio { segments } => println!(
                    "Wrote {} cue(s) transcribed from {} segment(s) to {}",
                    report.cue_count,
                    segments,
                    report.output_path.display()
                ),
            }
            if let Some(rendered) = report.rendered_path {
                println!("Rendered video: {}", rendered.display());
            }
        }
        Commands::Status { youtube_url, .. } => {
            let identity = VideoIdentity::parse(&youtube_url)?;
            let workflow = Workflow::new(config)?;
            print_status(&identity, &workflow.status(&identity)?);
        }
    }

    Ok(())
}

/// `--config`, then `./subverses.toml`, then defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };
    Ok(config)
}

fn apply_environment(config: &mut Config) {
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        config.transcription.api_key = Some(key.clone());
        config.translation.api_key = Some(key);
    }
    if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
        config.transcription.base_url = url.clone();
        config.translation.base_url = url;
    }
    if let Ok(org) = std::env::var("OPENAI_ORGANIZATION") {
        config.transcription.organization = Some(org.clone());
        config.translation.organization = Some(org);
    }
}

fn print_status(identity: &VideoIdentity, states: &[SegmentState]) {
    if states.is_empty() {
        println!("No transcription state for {}", identity.video_id);
        return;
    }

    println!("\nSegments of {}:", identity.video_id);
    println!("{:<8} {:<12} {:<8} {:<25} {}", "Index", "Status", "Retries", "Updated", "Last error");
    println!("{}", "-".repeat(80));
    for state in states {
        println!(
            "{:<8} {:<12} {:<8} {:<25} {}",
            state.segment_index,
            format!("{:?}", state.status),
            state.retry_count,
            state.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            state.last_error.as_deref().unwrap_or("")
        );
    }
}

fn setup_logging(verbose: bool, data_dir: &Path) -> Result<WorkerGuard> {
    let log_dir: PathBuf = data_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "subverses.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer().with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("subverses.log").display()
    );

    Ok(guard)
}
