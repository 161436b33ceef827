use ethers::types::Address;
use thiserror::Error;

/// Why a single bid payload could not be turned into a [`Bid`](crate::domain::Bid).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not abi(uint256,uint256,string,string): {0}")]
    Malformed(String),

    #[error("price must be positive")]
    ZeroPrice,

    #[error("quantity must be at least one whole token")]
    ZeroQuantity,

    #[error("{field} does not fit the fixed-point range")]
    OutOfRange { field: &'static str },

    #[error("pitch has {len} characters, limit is {max}")]
    PitchTooLong { len: usize, max: usize },

    #[error("duplicate bid from {0:?}")]
    DuplicateBidder(Address),
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("bid from {bidder:?} rejected: {source}")]
    Decode {
        bidder: Address,
        #[source]
        source: DecodeError,
    },

    #[error("pitch evaluator unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("scoring failed for {bidder:?}: {reason}")]
    Scoring { bidder: Address, reason: String },

    #[error("allocation invariant violated: {0}")]
    AllocationInvariantViolation(String),

    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("sale {0} is not registered")]
    UnknownSale(u64),

    #[error("sale {sale_id} is still open until {deadline}")]
    SaleNotExpired { sale_id: u64, deadline: u64 },

    #[error("sale {0} registered twice with different metadata")]
    ConflictingSale(u64),

    #[error("settlement store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SettlementError {
    /// Failures that must never be retried with the same inputs.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SettlementError::AllocationInvariantViolation(_))
    }

    /// Failures a scheduler may retry on its next sweep.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::SigningFailure(_)
                | SettlementError::Store(_)
                | SettlementError::SaleNotExpired { .. }
        )
    }
}
