//! notes-summarizer-rs: notes summarization service with an extractive
//! fallback, text-to-speech, PDF export and a history ledger.

mod api;
mod config;
mod error;
mod export;
mod extractor;
mod history;
mod speech;
mod summarizer;
mod users;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::PrimaryBackend;
use crate::speech::{HostedSpeech, SpeechSynthesizer, VoiceGenerator};
use crate::summarizer::primary::{self, PrimaryModelState};

#[derive(Parser, Debug)]
#[command(name = "notes-summarizer-rs", about = "Notes summarization service")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Skip the hosted model and summarize with LexRank only
    #[arg(long)]
    no_primary: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Keep HTTP client internals quiet unless asked
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("notes-summarizer-rs starting");

    let mut config = config::Config::load(args.config.as_deref());
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_primary {
        config.summarizer.backend = PrimaryBackend::None;
    }
    info!("Config loaded: {:?}", config.summarizer.backend);

    // Decided once; never retried while the process runs
    let primary_state: PrimaryModelState = primary::load_primary(&config.summarizer).await;
    info!("Primary model: {}", primary_state.describe());
    let summarizer = summarizer::Summarizer::new(primary_state, &config.summarizer);

    let db_path = config.storage.db_path.clone();
    let (ledger, users) = tokio::task::spawn_blocking(move || {
        let ledger = history::HistoryLedger::open(&db_path)?;
        let users = users::UserStore::open(&db_path)?;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>((ledger, users))
    })
    .await?
    .map_err(|e| e as Box<dyn std::error::Error>)?;
    info!("History database: {}", config.storage.db_path.display());

    std::fs::create_dir_all(&config.server.upload_dir)?;

    let voice = if config.tts.enabled {
        match HostedSpeech::new(&config.tts) {
            Ok(speech) => {
                std::fs::create_dir_all(&config.server.audio_dir)?;
                let synthesizer: Box<dyn SpeechSynthesizer> = Box::new(speech);
                info!(
                    "Text-to-speech via {} (voice: {}, speed: {})",
                    config.tts.host, config.tts.voice, config.tts.speed
                );
                Some(Arc::new(VoiceGenerator::new(
                    synthesizer,
                    &config.server.audio_dir,
                    config.tts.min_chars,
                )))
            }
            Err(e) => {
                warn!("Failed to set up TTS: {e}");
                info!("TTS disabled, continuing without voice output");
                None
            }
        }
    } else {
        None
    };

    let state = api::AppState {
        summarizer: Arc::new(summarizer),
        ledger: Arc::new(ledger),
        users: Arc::new(users),
        voice,
        upload_dir: config.server.upload_dir.clone(),
    };

    let app = api::router(state, config.server.max_upload_mb * 1024 * 1024);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    api::serve(app, &addr).await?;

    Ok(())
}
