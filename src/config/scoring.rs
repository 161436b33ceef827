use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/* =======================
WEIGHT PROFILES
======================= */

/// Only one economic profile is recognized; weights are not tunable per sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightProfile {
    #[default]
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringWeights {
    pub price: Decimal,
    pub geo: Decimal,
    pub pitch: Decimal,
}

impl WeightProfile {
    pub fn weights(&self) -> ScoringWeights {
        match self {
            WeightProfile::Standard => ScoringWeights {
                price: dec!(0.6),
                geo: dec!(0.2),
                pitch: dec!(0.2),
            },
        }
    }
}

/* =======================
SCORING CONFIG
======================= */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: WeightProfile,

    /// ISO country code -> 0..=100
    pub geo_scores: BTreeMap<String, u8>,
    pub default_geo_score: u8,

    /// USDC price that maps to a price score of 100 when no relative maximum exists.
    pub absolute_price_ceiling: Decimal,

    pub max_pitch_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let geo_scores = [
            ("US", 90),
            ("CA", 85),
            ("GB", 85),
            ("DE", 80),
            ("JP", 80),
            ("FR", 75),
            ("AU", 75),
            ("SG", 80),
            ("CH", 85),
            ("NL", 80),
        ]
        .into_iter()
        .map(|(c, s)| (c.to_string(), s))
        .collect();

        Self {
            weights: WeightProfile::Standard,
            geo_scores,
            default_geo_score: 50,
            absolute_price_ceiling: Decimal::ONE,
            max_pitch_chars: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_weights_sum_to_one() {
        let w = WeightProfile::Standard.weights();
        assert_eq!(w.price + w.geo + w.pitch, Decimal::ONE);
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let parsed: Result<WeightProfile, _> = serde_json::from_str("\"aggressive\"");
        assert!(parsed.is_err());
    }
}
