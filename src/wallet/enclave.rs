use ethers::core::rand::thread_rng;
use ethers::prelude::*;
use ethers::types::{Address, Signature, H256};
use log::info;
use std::path::{Path, PathBuf};

use super::signer::{KeyOrigin, KeyProvider};
use crate::execution::errors::SettlementError;

pub const TEE_MODE_ENV: &str = "TEE_MODE";

/// Markers of a confidential-compute runtime on the host.
#[derive(Debug, Clone)]
pub struct EnclaveEnvironment {
    root: PathBuf,
    tee_mode: Option<String>,
}

impl EnclaveEnvironment {
    pub fn from_host() -> Self {
        Self {
            root: PathBuf::from("/"),
            tee_mode: std::env::var(TEE_MODE_ENV).ok(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>, tee_mode: Option<&str>) -> Self {
        Self {
            root: root.into(),
            tee_mode: tee_mode.map(str::to_string),
        }
    }

    pub fn is_available(&self) -> bool {
        self.root.join("dev/attestation").exists()
            || self.tee_mode.as_deref() == Some("production")
            || self.root.join("opt/oasis").is_dir()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Key generated inside the trust boundary; only the address ever leaves it.
pub struct EnclaveKeyProvider {
    wallet: LocalWallet,
}

impl EnclaveKeyProvider {
    pub fn generate(env: &EnclaveEnvironment) -> Result<Self, SettlementError> {
        if !env.is_available() {
            return Err(SettlementError::Config(format!(
                "no confidential-compute runtime detected under {}",
                env.root().display()
            )));
        }
        let wallet = LocalWallet::new(&mut thread_rng());
        info!("🔐 Enclave key generated: {:?}", wallet.address());
        Ok(Self { wallet })
    }
}

impl KeyProvider for EnclaveKeyProvider {
    fn kind(&self) -> KeyOrigin {
        KeyOrigin::Enclave
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
