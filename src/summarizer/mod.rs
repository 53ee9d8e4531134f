//! Text summarization with a hosted abstractive model and an extractive
//! LexRank fallback.
//!
//! Components:
//! - `primary`: hosted model clients and the startup-time model handle
//! - `lexrank`: deterministic extractive fallback

pub mod lexrank;
pub mod primary;

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SummarizerConfig;
use primary::{GenerationParams, PrimaryModelState, PrimaryResult};

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("no text to summarize")]
    EmptyInput,
    #[error("extractive summarizer produced no sentences")]
    NoSentences,
    #[error("extractive summarizer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a summary came from the fallback instead of the primary model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No primary model was loaded at startup.
    NotConfigured(String),
    Unavailable,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Primary,
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

pub struct Summarizer {
    primary: PrimaryModelState,
    params: GenerationParams,
    deadline: Duration,
    max_input_chars: usize,
    summary_sentences: usize,
}

impl Summarizer {
    pub fn new(primary: PrimaryModelState, config: &SummarizerConfig) -> Self {
        Self {
            primary,
            params: GenerationParams::default(),
            deadline: config.timeout(),
            max_input_chars: config.max_input_chars,
            summary_sentences: config.summary_sentences,
        }
    }

    pub fn primary_state(&self) -> &PrimaryModelState {
        &self.primary
    }

    /// Trim and cap input length (in characters).
    pub fn prepare<'a>(&self, text: &'a str) -> &'a str {
        let text = text.trim();
        match text.char_indices().nth(self.max_input_chars) {
            Some((cut, _)) => &text[..cut],
            None => text,
        }
    }

    /// Summarize `text`, preferring the primary model and falling back to
    /// LexRank exactly once if it is missing or fails.
    pub async fn summarize(&self, text: &str) -> Result<Summary, SummarizeError> {
        let input = self.prepare(text);
        if input.is_empty() {
            return Err(SummarizeError::EmptyInput);
        }

        let reason = match &self.primary {
            PrimaryModelState::Unavailable { reason } => FallbackReason::NotConfigured(reason.clone()),
            PrimaryModelState::Ready(model) => {
                let t_start = Instant::now();
                let outcome = tokio::time::timeout(
                    self.deadline,
                    model.generate(input, &self.params, self.deadline),
                )
                .await
                .unwrap_or_else(|_| {
                    PrimaryResult::Failed(format!("timed out after {:?}", self.deadline))
                });

                match outcome {
                    PrimaryResult::Ok(summary) => {
                        info!(
                            "Summarized {} chars → {} chars with {} ({:.0}ms)",
                            input.chars().count(),
                            summary.chars().count(),
                            model.name(),
                            t_start.elapsed().as_secs_f64() * 1000.0
                        );
                        return Ok(Summary {
                            text: summary,
                            source: SummarySource::Primary,
                        });
                    }
                    PrimaryResult::Unavailable => {
                        warn!("{} unavailable, using LexRank fallback", model.name());
                        FallbackReason::Unavailable
                    }
                    PrimaryResult::Failed(e) => {
                        warn!("{} failed ({e}), using LexRank fallback", model.name());
                        FallbackReason::Failed(e)
                    }
                }
            }
        };

        let owned = input.to_string();
        let count = self.summary_sentences;
        let text = tokio::task::spawn_blocking(move || extractive(&owned, count)).await??;
        debug!("LexRank summary: {} chars", text.len());
        Ok(Summary {
            text,
            source: SummarySource::Fallback(reason),
        })
    }
}

/// Top `count` LexRank sentences joined by single spaces. CPU-bound; async
/// callers run it on the blocking pool.
pub fn extractive(text: &str, count: usize) -> Result<String, SummarizeError> {
    let sentences = lexrank::summarize(text, count);
    if sentences.is_empty() {
        return Err(SummarizeError::NoSentences);
    }
    Ok(sentences.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use primary::PrimaryModel;

    const NOTES: &str = "The French Revolution began in 1789. \
        Economic hardship and debt weakened the French monarchy. \
        The Estates-General was called to address the debt crisis. \
        The Third Estate formed the National Assembly. \
        Parisians stormed the Bastille in July 1789. \
        The monarchy was abolished in 1792. \
        The revolution spread ideas of liberty and equality across Europe. \
        Napoleon rose to power after the revolution.";

    struct StubModel {
        result: PrimaryResult,
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    impl StubModel {
        fn returning(result: PrimaryResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PrimaryModel for StubModel {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(
            &self,
            text: &str,
            _params: &GenerationParams,
            _deadline: Duration,
        ) -> PrimaryResult {
            self.seen.lock().unwrap().push(text.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }
    }

    fn config() -> SummarizerConfig {
        SummarizerConfig {
            timeout_secs: 1,
            ..SummarizerConfig::default()
        }
    }

    fn without_primary() -> Summarizer {
        Summarizer::new(PrimaryModelState::unavailable("disabled in test"), &config())
    }

    fn with_primary(model: Arc<StubModel>) -> Summarizer {
        Summarizer::new(PrimaryModelState::Ready(model), &config())
    }

    #[tokio::test]
    async fn fallback_output_is_extractive_and_bounded() {
        let summary = without_primary().summarize(NOTES).await.unwrap();
        assert!(!summary.text.is_empty());
        assert!(matches!(
            summary.source,
            SummarySource::Fallback(FallbackReason::NotConfigured(_))
        ));

        let sentences = lexrank::split_sentences(&summary.text);
        assert!(sentences.len() <= 5);
        for sentence in sentences {
            assert!(NOTES.contains(sentence), "not from source: {sentence}");
        }
    }

    #[tokio::test]
    async fn fallback_is_deterministic() {
        let summarizer = without_primary();
        let a = summarizer.summarize(NOTES).await.unwrap();
        let b = summarizer.summarize(NOTES).await.unwrap();
        assert_eq!(a.text, b.text);
    }

    #[tokio::test]
    async fn primary_success_is_returned() {
        let model = StubModel::returning(PrimaryResult::Ok("Abstractive summary.".into()));
        let summary = with_primary(model).summarize(NOTES).await.unwrap();
        assert_eq!(summary.text, "Abstractive summary.");
        assert_eq!(summary.source, SummarySource::Primary);
    }

    #[tokio::test]
    async fn failing_primary_matches_absent_primary() {
        let model = StubModel::returning(PrimaryResult::Failed("model exploded".into()));
        let failing = with_primary(model.clone()).summarize(NOTES).await.unwrap();
        let absent = without_primary().summarize(NOTES).await.unwrap();

        assert_eq!(failing.text, absent.text);
        assert_eq!(
            failing.source,
            SummarySource::Fallback(FallbackReason::Failed("model exploded".into()))
        );
        // No retries.
        assert_eq!(model.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_primary_falls_back() {
        let model = StubModel::returning(PrimaryResult::Unavailable);
        let summary = with_primary(model).summarize(NOTES).await.unwrap();
        assert_eq!(summary.source, SummarySource::Fallback(FallbackReason::Unavailable));
        assert_eq!(summary.text, without_primary().summarize(NOTES).await.unwrap().text);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_primary_times_out_into_fallback() {
        let model = Arc::new(StubModel {
            result: PrimaryResult::Ok("too late".into()),
            delay: Duration::from_secs(30),
            seen: Mutex::new(Vec::new()),
        });
        let summary = with_primary(model).summarize(NOTES).await.unwrap();
        assert_ne!(summary.text, "too late");
        assert!(matches!(
            summary.source,
            SummarySource::Fallback(FallbackReason::Failed(ref e)) if e.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn input_is_trimmed_and_capped_before_primary() {
        let model = StubModel::returning(PrimaryResult::Ok("ok".into()));
        let summarizer = with_primary(model.clone());
        let long = format!("  {}  ", "ü".repeat(5000));
        summarizer.summarize(&long).await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].chars().count(), 3000);
        assert!(seen[0].chars().all(|c| c == 'ü'));
    }

    #[tokio::test]
    async fn whitespace_only_input_is_rejected() {
        let result = without_primary().summarize(" \n\t ").await;
        assert!(matches!(result, Err(SummarizeError::EmptyInput)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fallback_runs_off_the_runtime_thread() {
        let runtime_thread = std::thread::current().id();
        let fallback_thread = tokio::task::spawn_blocking(|| std::thread::current().id())
            .await
            .unwrap();
        assert_ne!(runtime_thread, fallback_thread);

        let summary = without_primary().summarize(NOTES).await.unwrap();
        assert_eq!(summary.text, extractive(NOTES, 5).unwrap());
    }

    #[test]
    fn extractive_rejects_text_without_sentences() {
        assert!(matches!(extractive(" \n ", 5), Err(SummarizeError::NoSentences)));
    }

    #[test]
    fn prepare_leaves_short_text_alone() {
        let summarizer = without_primary();
        assert_eq!(summarizer.prepare("  short text \n"), "short text");
    }
}
