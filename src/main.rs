use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use oya_speak::api::LessonItem;
use oya_speak::audio::device::mime_type_for_path;
use oya_speak::practice::Transcriber;
use oya_speak::{
    ApiClient, AttemptOrchestrator, AudioCapture, AudioSource, Clip, Config, DeviceFactory,
    Language, PracticeError, PracticeItem, ProviderClient, RawCapture, WaveformNormalizer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "oya-speak")]
#[command(about = "Record, normalize and score spoken language practice")]
#[command(version)]
struct Cli {
    /// Config file, extension optional
    #[arg(long, global = true, default_value = "config/oya-speak")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an audio file to 16 kHz 16-bit WAV
    Normalize { input: PathBuf, output: PathBuf },
    /// Record a clip from the microphone (or replay a file as one)
    Record {
        #[arg(long)]
        output: PathBuf,
        /// Replay this file instead of opening the microphone
        #[arg(long)]
        from_file: Option<PathBuf>,
        /// Override the configured recording limit
        #[arg(long)]
        max_duration: Option<u64>,
    },
    /// Transcribe, score and save an attempt for a lesson item
    Practice {
        input: PathBuf,
        #[arg(long)]
        item: i64,
        #[arg(long)]
        language: Language,
        /// Skip fetching the item's text from the backend
        #[arg(long)]
        target_text: Option<String>,
    },
    /// List available lessons
    Lessons {
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Oya Speak v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", cfg.api.base_url);

    match cli.command {
        Commands::Normalize { input, output } => normalize(&input, &output),
        Commands::Record {
            output,
            from_file,
            max_duration,
        } => record(&cfg, &output, from_file, max_duration).await,
        Commands::Practice {
            input,
            item,
            language,
            target_text,
        } => practice(&cfg, &input, item, language, target_text).await,
        Commands::Lessons { language, level } => lessons(&cfg, language, level).await,
    }
}

fn read_clip(input: &Path) -> Result<Clip> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let raw = RawCapture {
        bytes,
        mime_type: mime_type_for_path(input).to_string(),
    };
    Ok(WaveformNormalizer::default().normalize(raw))
}

fn write_clip(clip: &Clip, output: &Path) -> Result<()> {
    let bytes = clip.encoded_bytes().context("Failed to encode clip")?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    match clip.duration_seconds() {
        Some(duration) => info!(
            "Wrote {} ({:.2}s, {} bytes)",
            output.display(),
            duration,
            bytes.len()
        ),
        None => warn!(
            "Wrote {} unnormalized ({}, {} bytes)",
            output.display(),
            clip.content_type(),
            bytes.len()
        ),
    }
    Ok(())
}

fn normalize(input: &Path, output: &Path) -> Result<()> {
    let clip = read_clip(input)?;
    write_clip(&clip, output)
}

async fn record(
    cfg: &Config,
    output: &Path,
    from_file: Option<PathBuf>,
    max_duration: Option<u64>,
) -> Result<()> {
    let replay = from_file.is_some();
    let source = match from_file {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };

    let mut capture_config = cfg.capture_config();
    if let Some(secs) = max_duration {
        capture_config.max_duration_secs = secs;
    }

    let device = DeviceFactory::create(source)?;
    let normalizer = Arc::new(WaveformNormalizer::default());
    let (capture, mut clips) = AudioCapture::new(device, normalizer, capture_config);

    let session_id = capture.start().await?;
    info!("Recording session {}", session_id);

    if replay {
        capture.stop().await?;
    } else {
        println!(
            "Recording... press Ctrl+C to stop (limit {}s)",
            capture.max_duration_secs()
        );
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping at {}s", capture.elapsed_seconds());
                capture.stop().await?;
            }
            Some(done) = clips.recv() => {
                info!("Recording limit reached");
                return write_clip(&done.clip, output);
            }
        }
    }

    let done = tokio::time::timeout(Duration::from_secs(5), clips.recv())
        .await
        .context("Timed out waiting for the finished clip")?
        .context("Capture ended without a clip")?;
    write_clip(&done.clip, output)
}

async fn practice(
    cfg: &Config,
    input: &Path,
    item_id: i64,
    language: Language,
    target_text: Option<String>,
) -> Result<()> {
    let client = Arc::new(ApiClient::new(cfg.api_context(), cfg.api_timeouts())?);

    let item = match target_text {
        Some(text) => PracticeItem::new(item_id, text),
        None => {
            let item: LessonItem = client
                .lesson_item(item_id)
                .await
                .with_context(|| format!("Failed to fetch lesson item {}", item_id))?;
            PracticeItem::from(&item)
        }
    };

    let transcriber: Arc<dyn Transcriber> = match (&cfg.speech.provider_url, &cfg.speech.api_key)
    {
        (Some(url), Some(key)) if !key.is_empty() => {
            info!("Transcribing directly with the speech provider");
            Arc::new(ProviderClient::new(url.clone(), key.clone(), cfg.api_timeouts().transcribe)?)
        }
        _ => client.clone(),
    };

    let clip = read_clip(input)?;
    let orchestrator = AttemptOrchestrator::new(transcriber, client, cfg.practice_config());

    let outcome = match orchestrator.submit(&clip, &item, language).await {
        Ok(outcome) => outcome,
        Err(PracticeError::Persist { source, outcome }) => {
            warn!("Attempt not saved: {}", source);
            *outcome
        }
        Err(e) if e.is_capture_failure() => bail!("Could not record you: {}", e),
        Err(e) => bail!("Recorded you but could not process it: {}", e),
    };

    println!("Target:     {}", item.target_text);
    println!("Heard:      {}", outcome.transcript);
    println!("Score:      {:.0}", outcome.score);
    for word in &outcome.word_scores {
        println!("  {:<16} {:>5.1}  {:?}", word.word, word.score, word.feedback);
    }
    for suggestion in &outcome.suggestions {
        println!("Suggestion: {}", suggestion);
    }
    if let Some(saved) = &outcome.saved {
        println!("XP: {}  Streak: {}", saved.xp, saved.streak);
    }
    Ok(())
}

async fn lessons(cfg: &Config, language: Option<String>, level: Option<String>) -> Result<()> {
    let client = ApiClient::new(cfg.api_context(), cfg.api_timeouts())?;
    let lessons = client
        .lessons(language.as_deref(), level.as_deref())
        .await
        .context("Failed to list lessons")?;

    if lessons.is_empty() {
        println!("No lessons found");
    }
    for lesson in lessons {
        println!(
            "{:>4}  {:<32} {:<10} {}",
            lesson.id,
            lesson.title,
            lesson.language,
            lesson.level.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
