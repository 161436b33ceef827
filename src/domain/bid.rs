use ethers::types::{Address, Bytes, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==================================================
// RAW BID (as delivered by the chain scanner)
// ==================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBid {
    #[serde(rename = "saleId")]
    pub sale_id: u64,
    pub bidder: Address,
    #[serde(rename = "encryptedPayload")]
    pub payload: Bytes,
    /// USDC budget ceiling, 6 decimals.
    #[serde(rename = "maxSpend")]
    pub max_spend_raw: U256,
}

// ==================================================
// COUNTRY
// ==================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    Code(String),
    Unknown,
}

impl Country {
    pub fn parse(raw: &str) -> Self {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Country::Code(code)
        } else {
            Country::Unknown
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Country::Code(c) => Some(c),
            Country::Unknown => None,
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Country::Code(c) => f.write_str(c),
            Country::Unknown => f.write_str("??"),
        }
    }
}

// ==================================================
// DECRYPTED BID
// ==================================================

/// A decrypted bid. Only ever exists inside one settlement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub bidder: Address,
    /// USDC per whole token.
    pub price: Decimal,
    /// Whole tokens requested.
    pub quantity: u64,
    pub pitch: String,
    pub country: Country,
    /// USDC budget ceiling.
    pub max_spend: Decimal,
}

impl Bid {
    /// Tokens this bidder can pay for at their own price.
    pub fn max_affordable(&self) -> u64 {
        if self.price <= Decimal::ZERO {
            return 0;
        }
        match self.max_spend.checked_div(self.price) {
            Some(q) => rust_decimal::prelude::ToPrimitive::to_u64(&q.floor()).unwrap_or(u64::MAX),
            None => u64::MAX,
        }
    }
}

// ==================================================
// SCORED BID
// ==================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredBid {
    pub bid: Bid,
    pub price_score: Decimal,
    pub geo_score: Decimal,
    pub pitch_score: Decimal,
    pub total_score: Decimal,
}
