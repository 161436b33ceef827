use ethers::types::Address;
use serde::{Deserialize, Serialize};

pub mod bid;
pub mod settlement;
pub mod time;

pub use bid::{Bid, Country, RawBid, ScoredBid};
pub use settlement::{SettlementOutcome, SettlementResult, SignedSettlement};

// ==================================================
// SALE
// ==================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    #[serde(rename = "saleId")]
    pub sale_id: u64,
    pub issuer: Address,
    /// Whole tokens on offer.
    pub supply: u64,
    /// Unix seconds.
    pub deadline: u64,
}

impl Sale {
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.deadline <= now
    }
}

// ==================================================
// SALE LIFECYCLE
// ==================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SaleState {
    Open,
    Expired,
    Settled { settled_at: i64 },
}

impl SaleState {
    pub fn is_settled(&self) -> bool {
        matches!(self, SaleState::Settled { .. })
    }
}
