//! Canonical settlement encoding and the digest the agent signs.

use ethers::abi::{self, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

use crate::bids::decimal_to_usdc;
use crate::domain::{SettlementResult, SignedSettlement};
use crate::execution::errors::SettlementError;
use crate::wallet::KeyProvider;

/// `abi.encode(uint256 clearingPriceUsdcWei, address[] winners)`, winners in allocation order.
pub fn canonical_encoding(result: &SettlementResult) -> Vec<u8> {
    abi::encode(&[
        Token::Uint(decimal_to_usdc(result.clearing_price)),
        Token::Array(result.winners.iter().copied().map(Token::Address).collect()),
    ])
}

/// `keccak256(abi.encode(address contract, uint256 saleId, bytes canonical))`.
pub fn settlement_digest(contract: Address, result: &SettlementResult) -> H256 {
    let message = abi::encode(&[
        Token::Address(contract),
        Token::Uint(U256::from(result.sale_id)),
        Token::Bytes(canonical_encoding(result)),
    ]);
    H256::from(keccak256(message))
}

/// Signs `result` for `contract`. The key never sees anything but the digest.
pub fn sign_settlement(
    contract: Address,
    result: SettlementResult,
    key: &dyn KeyProvider,
    timestamp: i64,
) -> Result<SignedSettlement, SettlementError> {
    let digest = settlement_digest(contract, &result);
    let signature = key.sign(digest)?;
    Ok(SignedSettlement {
        result,
        signature,
        signer: key.address(),
        authorizing_contract: contract,
        timestamp,
    })
}
