//! Greedy score-priority allocation of a fixed token supply.

use ethers::types::Address;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

use crate::domain::{ScoredBid, SettlementResult};
use crate::execution::errors::SettlementError;

/// Highest score first; equal scores fall back to the lower bidder address.
pub fn rank(bids: &mut [ScoredBid]) {
    bids.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| a.bid.bidder.cmp(&b.bid.bidder))
    });
}

/// Allocates `supply` tokens across `bids`. Either returns a complete,
/// invariant-checked result or an error; nothing partial escapes.
pub fn allocate(
    sale_id: u64,
    mut bids: Vec<ScoredBid>,
    supply: u64,
) -> Result<SettlementResult, SettlementError> {
    let mut result = SettlementResult::empty(sale_id);
    rank(&mut bids);

    for sb in &bids {
        result.bid_amounts.insert(sb.bid.bidder, sb.bid.quantity);
        result.total_bid_quantity += u128::from(sb.bid.quantity);
    }

    let mut remaining = supply;
    let mut total_value = Decimal::ZERO;

    for sb in &bids {
        if remaining == 0 {
            break;
        }
        let bid = &sb.bid;
        let allocation = bid.quantity.min(bid.max_affordable()).min(remaining);
        if allocation == 0 {
            continue;
        }

        let value = Decimal::from(allocation)
            .checked_mul(bid.price)
            .and_then(|v| total_value.checked_add(v))
            .ok_or_else(|| {
                SettlementError::AllocationInvariantViolation(format!(
                    "settlement value overflows at {:?}",
                    bid.bidder
                ))
            })?;

        total_value = value;
        remaining -= allocation;
        result.winners.push(bid.bidder);
        result.allocations.insert(bid.bidder, allocation);
    }

    let allocated = supply - remaining;
    if allocated > 0 {
        result.clearing_price = total_value
            .checked_div(Decimal::from(allocated))
            .ok_or_else(|| {
                SettlementError::AllocationInvariantViolation("clearing price undefined".into())
            })?;
    }

    check_invariants(&result, &bids, supply)?;
    Ok(result)
}

/// Post-conditions every signed result must satisfy.
pub fn check_invariants(
    result: &SettlementResult,
    bids: &[ScoredBid],
    supply: u64,
) -> Result<(), SettlementError> {
    let violation = |msg: String| Err(SettlementError::AllocationInvariantViolation(msg));

    let allocated = result
        .allocations
        .values()
        .try_fold(0u64, |acc, v| acc.checked_add(*v));
    match allocated {
        Some(total) if total <= supply => {}
        Some(total) => return violation(format!("allocated {} exceeds supply {}", total, supply)),
        None => return violation("allocated total overflows".into()),
    }

    let winners: BTreeSet<Address> = result.winners.iter().copied().collect();
    if winners.len() != result.winners.len() {
        return violation("duplicate winner".into());
    }
    if !winners.iter().eq(result.allocations.keys()) {
        return violation("winners and allocations disagree".into());
    }

    for (bidder, amount) in &result.allocations {
        if *amount == 0 {
            return violation(format!("zero allocation for {:?}", bidder));
        }
        let bid = match bids.iter().find(|b| b.bid.bidder == *bidder) {
            Some(b) => &b.bid,
            None => return violation(format!("allocation for unknown bidder {:?}", bidder)),
        };
        if *amount > bid.quantity.min(bid.max_affordable()) {
            return violation(format!("{:?} allocated beyond demand or budget", bidder));
        }
    }

    if result.clearing_price < Decimal::ZERO {
        return violation("negative clearing price".into());
    }

    Ok(())
}
