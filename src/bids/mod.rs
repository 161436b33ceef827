//! Bid normalization: decrypted ABI payload plus on-chain metadata -> [`Bid`].
//!
//! Payload layout is `abi.encode(uint256 priceUsdcWei, uint256 quantityTokenWei, string pitch, string country)`.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::domain::{Bid, Country, RawBid};
use crate::execution::errors::DecodeError;

pub const USDC_DECIMALS: u32 = 6;
pub const TOKEN_DECIMALS: u32 = 18;

// ==================================================
// FIXED-POINT HELPERS
// ==================================================

/// 6-decimal USDC units -> Decimal, or None when outside the i64 mantissa.
pub fn usdc_to_decimal(raw: U256) -> Option<Decimal> {
    if raw > U256::from(i64::MAX as u64) {
        return None;
    }
    Some(Decimal::new(raw.as_u64() as i64, USDC_DECIMALS))
}

/// Decimal USDC -> 6-decimal units, truncating sub-micro precision.
pub fn decimal_to_usdc(value: Decimal) -> U256 {
    let scaled = (value * Decimal::from(10u64.pow(USDC_DECIMALS))).trunc();
    scaled
        .to_u128()
        .map(U256::from)
        .unwrap_or_else(U256::zero)
}

/// 18-decimal token units -> whole tokens (floored).
pub fn tokens_from_wei(raw: U256) -> Option<u64> {
    let whole = raw / U256::exp10(TOKEN_DECIMALS as usize);
    if whole > U256::from(u64::MAX) {
        return None;
    }
    Some(whole.as_u64())
}

pub fn tokens_to_wei(tokens: u64) -> U256 {
    U256::from(tokens) * U256::exp10(TOKEN_DECIMALS as usize)
}

// ==================================================
// PAYLOAD CODEC
// ==================================================

pub fn encode_payload(price_raw: U256, quantity_raw: U256, pitch: &str, country: &str) -> Vec<u8> {
    abi::encode(&[
        Token::Uint(price_raw),
        Token::Uint(quantity_raw),
        Token::String(pitch.to_string()),
        Token::String(country.to_string()),
    ])
}

fn decode_payload(payload: &[u8]) -> Result<(U256, U256, String, String), DecodeError> {
    let tokens = abi::decode(
        &[
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::String,
            ParamType::String,
        ],
        payload,
    )
    .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    match <[Token; 4]>::try_from(tokens) {
        Ok([Token::Uint(price), Token::Uint(quantity), Token::String(pitch), Token::String(country)]) => {
            Ok((price, quantity, pitch, country))
        }
        _ => Err(DecodeError::Malformed("unexpected token layout".into())),
    }
}

// ==================================================
// NORMALIZER
// ==================================================

#[derive(Debug, Clone)]
pub struct Normalizer {
    max_pitch_chars: usize,
}

impl Normalizer {
    pub fn new(max_pitch_chars: usize) -> Self {
        Self { max_pitch_chars }
    }

    /// Pure transformation; never invents values for a payload it cannot read.
    pub fn normalize(
        &self,
        payload: &[u8],
        bidder: Address,
        max_spend_raw: U256,
    ) -> Result<Bid, DecodeError> {
        let (price_raw, quantity_raw, pitch, country) = decode_payload(payload)?;

        if price_raw.is_zero() {
            return Err(DecodeError::ZeroPrice);
        }
        let price = usdc_to_decimal(price_raw).ok_or(DecodeError::OutOfRange { field: "price" })?;

        let quantity =
            tokens_from_wei(quantity_raw).ok_or(DecodeError::OutOfRange { field: "quantity" })?;
        if quantity == 0 {
            return Err(DecodeError::ZeroQuantity);
        }

        let max_spend = usdc_to_decimal(max_spend_raw)
            .ok_or(DecodeError::OutOfRange { field: "maxSpend" })?;

        let len = pitch.chars().count();
        if len > self.max_pitch_chars {
            return Err(DecodeError::PitchTooLong {
                len,
                max: self.max_pitch_chars,
            });
        }

        Ok(Bid {
            bidder,
            price,
            quantity,
            pitch,
            country: Country::parse(&country),
            max_spend,
        })
    }

    /// Normalizes every raw bid of one sale. Failures are returned beside the
    /// survivors so the caller can log and exclude them; the first bid from a
    /// bidder wins and later ones are rejected as duplicates.
    pub fn normalize_all(&self, raw: &[RawBid]) -> (Vec<Bid>, Vec<(Address, DecodeError)>) {
        let mut seen = HashSet::new();
        let mut bids = Vec::with_capacity(raw.len());
        let mut rejected = Vec::new();

        for r in raw {
            if !seen.insert(r.bidder) {
                rejected.push((r.bidder, DecodeError::DuplicateBidder(r.bidder)));
                continue;
            }
            match self.normalize(&r.payload, r.bidder, r.max_spend_raw) {
                Ok(bid) => bids.push(bid),
                Err(e) => rejected.push((r.bidder, e)),
            }
        }

        (bids, rejected)
    }
}
