use ethers::types::Address;
use log::{error, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{Bid, ScoredBid, SettlementResult, SignedSettlement};

pub const AUDIT_TARGET: &str = "audit";

/// Structured records for the audit trail. Pitch text is never included.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    BidDecoded {
        sale_id: u64,
        bidder: Address,
        price: Decimal,
        quantity: u64,
        max_spend: Decimal,
        country: String,
        pitch_len: usize,
    },
    BidExcluded {
        sale_id: u64,
        bidder: Address,
        reason: String,
    },
    BidScored {
        sale_id: u64,
        bidder: Address,
        price_score: Decimal,
        geo_score: Decimal,
        pitch_score: Decimal,
        total_score: Decimal,
    },
    AllocationDecided {
        sale_id: u64,
        clearing_price: Decimal,
        winners: Vec<Address>,
        allocations: BTreeMap<Address, u64>,
        total_bid_quantity: u128,
    },
    SettlementSigned {
        sale_id: u64,
        signer: Address,
        signature: String,
        timestamp: i64,
    },
    SettlementReused {
        sale_id: u64,
        signature: String,
    },
}

impl AuditEvent {
    pub fn decoded(sale_id: u64, bid: &Bid) -> Self {
        AuditEvent::BidDecoded {
            sale_id,
            bidder: bid.bidder,
            price: bid.price,
            quantity: bid.quantity,
            max_spend: bid.max_spend,
            country: bid.country.to_string(),
            pitch_len: bid.pitch.chars().count(),
        }
    }

    pub fn excluded(sale_id: u64, bidder: Address, reason: impl ToString) -> Self {
        AuditEvent::BidExcluded {
            sale_id,
            bidder,
            reason: reason.to_string(),
        }
    }

    pub fn scored(sale_id: u64, sb: &ScoredBid) -> Self {
        AuditEvent::BidScored {
            sale_id,
            bidder: sb.bid.bidder,
            price_score: sb.price_score,
            geo_score: sb.geo_score,
            pitch_score: sb.pitch_score,
            total_score: sb.total_score,
        }
    }

    pub fn allocated(result: &SettlementResult) -> Self {
        AuditEvent::AllocationDecided {
            sale_id: result.sale_id,
            clearing_price: result.clearing_price,
            winners: result.winners.clone(),
            allocations: result.allocations.clone(),
            total_bid_quantity: result.total_bid_quantity,
        }
    }

    pub fn signed(s: &SignedSettlement) -> Self {
        AuditEvent::SettlementSigned {
            sale_id: s.sale_id(),
            signer: s.signer,
            signature: s.signature_hex(),
            timestamp: s.timestamp,
        }
    }

    pub fn reused(s: &SignedSettlement) -> Self {
        AuditEvent::SettlementReused {
            sale_id: s.sale_id(),
            signature: s.signature_hex(),
        }
    }
}

pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(line) => info!(target: AUDIT_TARGET, "{}", line),
        Err(e) => error!("audit event could not be serialized: {}", e),
    }
}

pub fn log_exclusion(sale_id: u64, bidder: Address, reason: &str) {
    warn!("🚫 Sale {} — bid from {:?} excluded: {}", sale_id, bidder, reason);
}

pub fn log_failure(sale_id: u64, reason: &str) {
    error!("❌ Sale {} not settled: {}", sale_id, reason);
}

pub fn log_success(msg: &str) {
    info!("✅ {}", msg);
}
