use ethers::types::{Address, Signature};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::execution::encoding::settlement_digest;

/// Allocation decision for one sale, before signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub sale_id: u64,
    /// USDC per token, volume weighted over winners.
    pub clearing_price: Decimal,
    /// Score-descending order; part of the signed encoding.
    pub winners: Vec<Address>,
    pub allocations: BTreeMap<Address, u64>,
    pub bid_amounts: BTreeMap<Address, u64>,
    /// Sum of every requested quantity; wider than a single bid so it cannot overflow.
    pub total_bid_quantity: u128,
}

impl SettlementResult {
    pub fn empty(sale_id: u64) -> Self {
        Self {
            sale_id,
            clearing_price: Decimal::ZERO,
            winners: Vec::new(),
            allocations: BTreeMap::new(),
            bid_amounts: BTreeMap::new(),
            total_bid_quantity: 0,
        }
    }

    pub fn total_allocated(&self) -> u64 {
        self.allocations.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedSettlement {
    pub result: SettlementResult,
    pub signature: Signature,
    pub signer: Address,
    pub authorizing_contract: Address,
    /// Unix seconds at signing.
    pub timestamp: i64,
}

impl SignedSettlement {
    pub fn sale_id(&self) -> u64 {
        self.result.sale_id
    }

    pub fn signature_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signature.to_vec()))
    }

    /// Recomputes the signed digest and checks it recovers to `signer`.
    pub fn verify(&self) -> bool {
        self.verify_against(self.authorizing_contract, self.signer)
    }

    /// Same check against an externally known contract and agent address.
    pub fn verify_against(&self, contract: Address, signer: Address) -> bool {
        let digest = settlement_digest(contract, &self.result);
        self.signature.verify(digest, signer).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Settled(SignedSettlement),
    AlreadySettled(SignedSettlement),
}

impl SettlementOutcome {
    pub fn signed(&self) -> &SignedSettlement {
        match self {
            SettlementOutcome::Settled(s) | SettlementOutcome::AlreadySettled(s) => s,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, SettlementOutcome::Settled(_))
    }

    pub fn log_line(&self) -> String {
        let s = self.signed();
        format!(
            "sale {} {} signature {}",
            s.sale_id(),
            if self.is_fresh() { "settled" } else { "reused" },
            s.signature_hex()
        )
    }
}
