use ethers::types::Address;
use futures_util::future::join_all;
use log::info;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{ScoringConfig, ScoringWeights};
use crate::domain::{Bid, Country, ScoredBid};
use crate::execution::errors::SettlementError;

pub mod pitch;

pub use pitch::{
    build_pitch_evaluator, clamp_score, FallbackPitchEvaluator, KeywordPitchEvaluator,
    PitchEvaluator,
};

#[derive(Clone)]
pub struct ScoringEngine {
    weights: ScoringWeights,
    geo_scores: BTreeMap<String, Decimal>,
    default_geo_score: Decimal,
    absolute_price_ceiling: Decimal,
    pitch: Arc<dyn PitchEvaluator>,
}

impl ScoringEngine {
    pub fn new(cfg: &ScoringConfig, pitch: Arc<dyn PitchEvaluator>) -> Self {
        let weights = cfg.weights.weights();

        info!("🎯 Scoring Engine Initialized:");
        info!(
            "   Weights: price {} / geo {} / pitch {}",
            weights.price, weights.geo, weights.pitch
        );
        info!("   Geo table: {} countries, default {}", cfg.geo_scores.len(), cfg.default_geo_score);
        info!("   Pitch evaluator: {}", pitch.name());

        Self {
            weights,
            geo_scores: cfg
                .geo_scores
                .iter()
                .map(|(c, s)| (c.to_ascii_uppercase(), clamp_score(Decimal::from(*s))))
                .collect(),
            default_geo_score: clamp_score(Decimal::from(cfg.default_geo_score)),
            absolute_price_ceiling: cfg.absolute_price_ceiling,
            pitch,
        }
    }

    pub fn pitch_evaluator(&self) -> &str {
        self.pitch.name()
    }

    /// Phase one of scoring: every price must be seen before any bid is scored.
    pub fn max_observed_price(bids: &[Bid]) -> Decimal {
        bids.iter()
            .map(|b| b.price)
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn price_score(&self, price: Decimal, max_observed: Decimal) -> Option<Decimal> {
        let ratio = if max_observed > Decimal::ZERO {
            price.checked_div(max_observed)?
        } else if self.absolute_price_ceiling > Decimal::ZERO {
            price.checked_div(self.absolute_price_ceiling)?
        } else {
            price
        };
        Some(clamp_score(ratio.checked_mul(dec!(100))?))
    }

    pub fn geo_score(&self, country: &Country) -> Decimal {
        country
            .code()
            .and_then(|c| self.geo_scores.get(c))
            .copied()
            .unwrap_or(self.default_geo_score)
    }

    pub fn combine(&self, price: Decimal, geo: Decimal, pitch: Decimal) -> Decimal {
        self.weights.price * price + self.weights.geo * geo + self.weights.pitch * pitch
    }

    pub async fn score(&self, bid: Bid, max_observed: Decimal) -> Result<ScoredBid, SettlementError> {
        let price_score =
            self.price_score(bid.price, max_observed)
                .ok_or_else(|| SettlementError::Scoring {
                    bidder: bid.bidder,
                    reason: format!("price {} overflows against max {}", bid.price, max_observed),
                })?;
        let geo_score = self.geo_score(&bid.country);
        let pitch_score = clamp_score(self.pitch.evaluate(&bid.pitch).await.map_err(|e| {
            SettlementError::Scoring {
                bidder: bid.bidder,
                reason: e.to_string(),
            }
        })?);

        let total_score = self.combine(price_score, geo_score, pitch_score);

        Ok(ScoredBid {
            bid,
            price_score,
            geo_score,
            pitch_score,
            total_score,
        })
    }

    /// Two-pass scoring of one sale: max price first, then all bids concurrently.
    /// Failed bids are returned separately, in input order.
    pub async fn score_all(
        &self,
        bids: Vec<Bid>,
    ) -> (Vec<ScoredBid>, Vec<(Address, SettlementError)>) {
        let max_observed = Self::max_observed_price(&bids);

        let results = join_all(bids.into_iter().map(|b| self.score(b, max_observed))).await;

        let mut scored = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for r in results {
            match r {
                Ok(s) => scored.push(s),
                Err(e) => {
                    let bidder = match &e {
                        SettlementError::Scoring { bidder, .. } => *bidder,
                        _ => Address::zero(),
                    };
                    failed.push((bidder, e));
                }
            }
        }
        (scored, failed)
    }
}
