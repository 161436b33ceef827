pub mod enclave;
pub mod signer;

use log::{info, warn};
use std::sync::Arc;

use crate::config::{KeyConfig, KeyProviderKind, AGENT_PRIVATE_KEY_ENV};
use crate::execution::errors::SettlementError;

pub use enclave::{EnclaveEnvironment, EnclaveKeyProvider};
pub use signer::{export_public_key, KeyOrigin, KeyProvider, LocalKeyProvider};

fn local_provider(private_key: Option<&str>) -> Result<LocalKeyProvider, SettlementError> {
    match private_key {
        Some(k) => LocalKeyProvider::from_private_key(k),
        None => {
            warn!("⚠️ No {} set, generating an ephemeral development key", AGENT_PRIVATE_KEY_ENV);
            Ok(LocalKeyProvider::generate())
        }
    }
}

/// Builds the agent key provider once at startup.
pub fn build_key_provider(
    cfg: &KeyConfig,
    env: &EnclaveEnvironment,
    private_key: Option<&str>,
) -> Result<Arc<dyn KeyProvider>, SettlementError> {
    let provider: Arc<dyn KeyProvider> = match cfg.provider {
        KeyProviderKind::Enclave => Arc::new(EnclaveKeyProvider::generate(env)?),
        KeyProviderKind::Local => Arc::new(local_provider(private_key)?),
        KeyProviderKind::Auto if env.is_available() => Arc::new(EnclaveKeyProvider::generate(env)?),
        KeyProviderKind::Auto => {
            warn!("Confidential-compute runtime not detected, using local key");
            Arc::new(local_provider(private_key)?)
        }
    };

    info!(
        "🔑 Agent key ready: {:?} ({:?})",
        provider.address(),
        provider.kind()
    );

    if let Some(path) = &cfg.public_key_export {
        export_public_key(provider.as_ref(), path)?;
    }

    Ok(provider)
}
