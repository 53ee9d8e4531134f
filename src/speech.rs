//! Text-to-speech via a hosted, OpenAI-compatible speech endpoint
//! (e.g. a Kokoro server). Generated audio is written to the audio
//! directory under a random file name.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TTSConfig;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Text too short")]
    TooShort,
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("failed to save audio: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into MP3 bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

pub struct HostedSpeech {
    url: String,
    model: String,
    voice: String,
    speed: f32,
    timeout: Duration,
    client: Client,
}

impl HostedSpeech {
    pub fn new(config: &TTSConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .build()
            .map_err(|e| SpeechError::Synthesis(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            url: format!("{}/v1/audio/speech", config.host.trim_end_matches('/')),
            model: config.model.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
            timeout: Duration::from_secs(config.timeout_secs),
            client,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HostedSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "speed": self.speed,
            "response_format": "mp3",
        });

        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SpeechError::Synthesis(format!(
                "speech endpoint returned status {}",
                resp.status()
            )));
        }

        let audio = resp
            .bytes()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        if audio.is_empty() {
            return Err(SpeechError::Synthesis("empty audio response".into()));
        }
        Ok(audio.to_vec())
    }
}

/// A generated audio file, relative to the audio directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAudio {
    pub file_name: String,
    pub path: PathBuf,
}

/// Validates input, synthesizes, and stores audio files.
pub struct VoiceGenerator<S> {
    synthesizer: S,
    audio_dir: PathBuf,
    min_chars: usize,
}

impl<S: SpeechSynthesizer> VoiceGenerator<S> {
    pub fn new(synthesizer: S, audio_dir: &Path, min_chars: usize) -> Self {
        Self {
            synthesizer,
            audio_dir: audio_dir.to_path_buf(),
            min_chars,
        }
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub async fn generate(&self, text: &str) -> Result<GeneratedAudio, SpeechError> {
        let text = text.trim();
        if text.chars().count() < self.min_chars {
            return Err(SpeechError::TooShort);
        }

        let t_start = Instant::now();
        let audio = self.synthesizer.synthesize(text).await?;

        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let file_name = format!("{}.mp3", uuid::Uuid::new_v4());
        let path = self.audio_dir.join(&file_name);
        if let Err(e) = tokio::fs::write(&path, &audio).await {
            warn!("Failed to write audio {}: {e}", path.display());
            return Err(e.into());
        }

        info!(
            "Generated {file_name} ({} bytes, {} chars) in {:.0}ms",
            audio.len(),
            text.chars().count(),
            t_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(GeneratedAudio { file_name, path })
    }
}

#[async_trait]
impl SpeechSynthesizer for Box<dyn SpeechSynthesizer> {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        (**self).synthesize(text).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Returns fixed bytes, or fails when `bytes` is empty.
    pub(crate) struct FakeSpeech {
        pub bytes: Vec<u8>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
            if self.bytes.is_empty() {
                Err(SpeechError::Synthesis("synthesizer offline".into()))
            } else {
                Ok(self.bytes.clone())
            }
        }
    }

    #[tokio::test]
    async fn writes_audio_under_random_name() {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("static").join("audio");
        let generator = VoiceGenerator::new(FakeSpeech { bytes: b"ID3fake".to_vec() }, &audio_dir, 5);

        let a = generator.generate("Read this aloud please").await.unwrap();
        let b = generator.generate("Read this aloud please").await.unwrap();

        assert!(a.file_name.ends_with(".mp3"));
        assert_ne!(a.file_name, b.file_name);
        assert_eq!(std::fs::read(&a.path).unwrap(), b"ID3fake");
        assert_eq!(a.path.parent().unwrap(), audio_dir);
    }

    #[tokio::test]
    async fn short_text_is_rejected_before_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let generator = VoiceGenerator::new(FakeSpeech { bytes: Vec::new() }, dir.path(), 5);
        assert!(matches!(generator.generate("  hi  ").await, Err(SpeechError::TooShort)));
    }

    #[tokio::test]
    async fn synthesis_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let generator = VoiceGenerator::new(FakeSpeech { bytes: Vec::new() }, dir.path(), 5);
        assert!(matches!(
            generator.generate("long enough text").await,
            Err(SpeechError::Synthesis(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn hosted_speech_targets_openai_compatible_route() {
        let config = TTSConfig {
            host: "http://localhost:8880/".into(),
            ..TTSConfig::default()
        };
        let speech = HostedSpeech::new(&config).unwrap();
        assert_eq!(speech.url, "http://localhost:8880/v1/audio/speech");
        assert_eq!(speech.voice, "af_heart");
    }
}
