use async_trait::async_trait;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use crate::client::RemotePitchEvaluator;
use crate::config::PitchEvaluatorConfig;
use crate::execution::errors::SettlementError;

const INNOVATION_KEYWORDS: [&str; 10] = [
    "innovative",
    "revolutionary",
    "unique",
    "breakthrough",
    "novel",
    "ai",
    "blockchain",
    "defi",
    "scalable",
    "disruptive",
];

pub fn clamp_score(score: Decimal) -> Decimal {
    score.max(Decimal::ZERO).min(dec!(100))
}

/// Text-quality scorer for bid pitches, 0..=100.
#[async_trait]
pub trait PitchEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(&self, pitch: &str) -> Result<Decimal, SettlementError>;
}

// ==================================================
// DETERMINISTIC LOCAL EVALUATOR
// ==================================================

/// Length and keyword heuristic. Identical text always yields the identical score.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPitchEvaluator;

impl KeywordPitchEvaluator {
    pub fn score(pitch: &str) -> Decimal {
        let chars = Decimal::from(pitch.chars().count() as u64);
        let base = (chars / dec!(10) + dec!(30)).min(dec!(85));

        let lower = pitch.to_lowercase();
        let hits = INNOVATION_KEYWORDS
            .iter()
            .filter(|kw| lower.contains(*kw))
            .count();
        let bonus = Decimal::from(hits as u64 * 5);

        clamp_score(base + bonus)
    }
}

#[async_trait]
impl PitchEvaluator for KeywordPitchEvaluator {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn evaluate(&self, pitch: &str) -> Result<Decimal, SettlementError> {
        Ok(Self::score(pitch))
    }
}

// ==================================================
// PRIMARY WITH MANDATORY FALLBACK
// ==================================================

/// Wraps a remote evaluator; timeouts and errors degrade to the keyword score.
pub struct FallbackPitchEvaluator<P> {
    primary: P,
    timeout: Duration,
}

impl<P: PitchEvaluator> FallbackPitchEvaluator<P> {
    pub fn new(primary: P, timeout: Duration) -> Self {
        Self { primary, timeout }
    }
}

#[async_trait]
impl<P: PitchEvaluator> PitchEvaluator for FallbackPitchEvaluator<P> {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn evaluate(&self, pitch: &str) -> Result<Decimal, SettlementError> {
        let outcome = match tokio::time::timeout(self.timeout, self.primary.evaluate(pitch)).await {
            Ok(result) => result,
            Err(_) => Err(SettlementError::ScoringUnavailable(format!(
                "{} timed out after {:?}",
                self.primary.name(),
                self.timeout
            ))),
        };

        match outcome {
            Ok(score) => Ok(clamp_score(score)),
            Err(e) => {
                warn!("⚠️ {} — using keyword fallback", e);
                Ok(KeywordPitchEvaluator::score(pitch))
            }
        }
    }
}

/// Picks the evaluator once, by credential availability.
pub fn build_pitch_evaluator(cfg: &PitchEvaluatorConfig) -> Arc<dyn PitchEvaluator> {
    let Some(api_key) = cfg.usable_api_key() else {
        warn!("No usable pitch evaluator key, pitch scoring uses the keyword fallback");
        return Arc::new(KeywordPitchEvaluator);
    };

    match RemotePitchEvaluator::new(&cfg.endpoint, &cfg.model, api_key, cfg.timeout_ms) {
        Ok(remote) => {
            info!("🧠 Remote pitch evaluator: {} ({})", cfg.endpoint, cfg.model);
            Arc::new(FallbackPitchEvaluator::new(
                remote,
                Duration::from_millis(cfg.timeout_ms),
            ))
        }
        Err(e) => {
            warn!("Remote pitch evaluator disabled: {}", e);
            debug!("falling back to keyword evaluator");
            Arc::new(KeywordPitchEvaluator)
        }
    }
}
