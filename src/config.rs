//! Configuration management for notes-summarizer-rs.
//!
//! Loads config from a YAML file in standard locations. Every section has
//! defaults, so a partial (or missing) file is fine.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            audio_dir: PathBuf::from("static/audio"),
            max_upload_mb: 16,
        }
    }
}

/// Which hosted abstractive model (if any) backs the primary strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryBackend {
    None,
    Huggingface,
    Ollama,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub backend: PrimaryBackend,
    pub host: String,
    pub model: String,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
    pub probe_on_start: bool,
    pub max_input_chars: usize,
    pub summary_sentences: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            backend: PrimaryBackend::Huggingface,
            host: "https://api-inference.huggingface.co".into(),
            model: "facebook/bart-large-cnn".into(),
            api_token: None,
            timeout_secs: 60,
            probe_on_start: false,
            max_input_chars: 3000,
            summary_sentences: 5,
        }
    }
}

impl SummarizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TTSConfig {
    pub enabled: bool,
    pub host: String,
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub timeout_secs: u64,
    pub min_chars: usize,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "http://localhost:8880".into(),
            model: "kokoro".into(),
            voice: "af_heart".into(),
            speed: 1.0,
            timeout_secs: 60,
            min_chars: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("history.db"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub summarizer: SummarizerConfig,
    pub tts: TTSConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

impl Config {
    /// Resolve and load the config file, falling back to defaults.
    ///
    /// An explicit `path` wins; otherwise the first existing file among
    /// ./config.yaml, ~/.config/notes-summarizer/config.yaml and
    /// /etc/notes-summarizer/config.yaml is used.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(config_path) = path.map(PathBuf::from).or_else(Self::discover) else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match Self::from_file(&config_path) {
            Ok(config) => {
                info!("Loaded config from {}", config_path.display());
                config
            }
            Err(e) => {
                warn!("{e}, using defaults");
                Self::default()
            }
        }
    }

    fn discover() -> Option<PathBuf> {
        [
            std::env::current_dir().ok().map(|d| d.join("config.yaml")),
            dirs::home_dir().map(|h| h.join(".config/notes-summarizer/config.yaml")),
            Some(PathBuf::from("/etc/notes-summarizer/config.yaml")),
        ]
        .into_iter()
        .flatten()
        .find(|p| p.exists())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_summarizer_contract() {
        let config = Config::default();
        assert_eq!(config.summarizer.max_input_chars, 3000);
        assert_eq!(config.summarizer.summary_sentences, 5);
        assert_eq!(config.tts.min_chars, 5);
        assert_eq!(config.storage.db_path, PathBuf::from("history.db"));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "summarizer:\n  backend: ollama\n  model: llama3.2:3b\nserver:\n  port: 8080\n";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.summarizer.backend, PrimaryBackend::Ollama);
        assert_eq!(config.summarizer.model, "llama3.2:3b");
        assert_eq!(config.summarizer.timeout_secs, 60);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.tts.enabled);
    }

    #[test]
    fn backend_none_parses() {
        let config = Config::parse("summarizer:\n  backend: none\n").unwrap();
        assert_eq!(config.summarizer.backend, PrimaryBackend::None);
    }

    #[test]
    fn from_file_reports_path_on_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  port: not-a-number\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));

        // The loader recovers with defaults.
        assert_eq!(Config::load(Some(&path)).server.port, 5000);
    }

    #[test]
    fn from_file_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "tts:\n  enabled: false\n").unwrap();
        assert!(!Config::from_file(&path).unwrap().tts.enabled);
    }

    #[test]
    fn missing_explicit_path_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.yaml")));
        assert_eq!(config.server.port, 5000);
    }
}
