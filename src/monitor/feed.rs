use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::BidSource;
use crate::domain::{RawBid, Sale};
use crate::execution::errors::SettlementError;
use crate::logging::{emit, log_exclusion, AuditEvent};

/* =======================
FIXTURE WIRE FORMAT
======================= */

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub sales: Vec<Sale>,
    #[serde(default)]
    pub bids: Vec<FixtureBid>,
}

/// One sealed bid as the chain scanner hands it over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBid {
    #[serde(rename = "saleId")]
    pub sale_id: u64,
    pub bidder: Address,
    #[serde(rename = "encryptedPayload")]
    pub payload: Bytes,
    /// Decimal string of 6-decimal USDC units.
    #[serde(rename = "maxSpend")]
    pub max_spend: String,
}

impl FixtureBid {
    pub fn to_raw(&self) -> Result<RawBid, SettlementError> {
        let max_spend_raw = U256::from_dec_str(self.max_spend.trim()).map_err(|e| {
            SettlementError::Config(format!(
                "maxSpend {:?} for {:?}: {}",
                self.max_spend, self.bidder, e
            ))
        })?;
        Ok(RawBid {
            sale_id: self.sale_id,
            bidder: self.bidder,
            payload: self.payload.clone(),
            max_spend_raw,
        })
    }
}

/* =======================
FILE SOURCE
======================= */

/// Re-reads its file on every call so a running monitor sees appended bids.
pub struct FixtureBidSource {
    path: PathBuf,
}

impl FixtureBidSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Fixture, SettlementError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SettlementError::Config(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| SettlementError::Config(format!("{}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl BidSource for FixtureBidSource {
    async fn sales(&self) -> Result<Vec<Sale>, SettlementError> {
        Ok(self.load().await?.sales)
    }

    /// Entries that cannot be converted are dropped one by one; the sale goes on.
    async fn bids_for(&self, sale_id: u64) -> Result<Vec<RawBid>, SettlementError> {
        let fixture = self.load().await?;
        let mut bids = Vec::new();
        for entry in fixture.bids.iter().filter(|b| b.sale_id == sale_id) {
            match entry.to_raw() {
                Ok(raw) => bids.push(raw),
                Err(e) => {
                    let reason = e.to_string();
                    log_exclusion(sale_id, entry.bidder, &reason);
                    emit(&AuditEvent::excluded(sale_id, entry.bidder, reason));
                }
            }
        }
        Ok(bids)
    }
}
