use ethers::core::rand::thread_rng;
use ethers::prelude::*;
use ethers::types::{Address, Signature, H256};
use ethers::utils::to_checksum;
use log::info;
use std::path::Path;

use crate::execution::errors::SettlementError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    Local,
    Enclave,
}

/// The only view the engine gets of the agent key: an address and a hash signer.
pub trait KeyProvider: Send + Sync {
    fn kind(&self) -> KeyOrigin;

    fn address(&self) -> Address;

    fn sign(&self, hash: H256) -> Result<Signature, SettlementError>;
}

// ==================================================
// LOCAL (DEVELOPMENT) KEY
// ==================================================

#[derive(Debug, Clone)]
pub struct LocalKeyProvider {
    wallet: LocalWallet,
}

impl LocalKeyProvider {
    pub fn from_private_key(private_key: &str) -> Result<Self, SettlementError> {
        let wallet: LocalWallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|e: WalletError| SettlementError::Config(format!("private key: {}", e)))?;
        Ok(Self { wallet })
    }

    pub fn generate() -> Self {
        Self {
            wallet: LocalWallet::new(&mut thread_rng()),
        }
    }
}

impl KeyProvider for LocalKeyProvider {
    fn kind(&self) -> KeyOrigin {
        KeyOrigin::Local
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn sign(&self, hash: H256) -> Result<Signature, SettlementError> {
        self.wallet
            .sign_hash(hash)
            .map_err(|e| SettlementError::SigningFailure(e.to_string()))
    }
}

/// Writes the checksummed agent address for deployment scripts.
pub fn export_public_key(provider: &dyn KeyProvider, path: &Path) -> Result<(), SettlementError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SettlementError::Config(format!("{}: {}", parent.display(), e)))?;
    }
    let address = to_checksum(&provider.address(), None);
    std::fs::write(path, &address)
        .map_err(|e| SettlementError::Config(format!("{}: {}", path.display(), e)))?;
    info!("🔑 Public key exported to {}", path.display());
    Ok(())
}
