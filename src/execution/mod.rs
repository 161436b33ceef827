pub mod allocation;
pub mod encoding;
pub mod errors;

use chrono::Utc;
use ethers::types::Address;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bids::Normalizer;
use crate::domain::{RawBid, SaleState, SettlementOutcome, SettlementResult};
use crate::logging::{emit, log_exclusion, log_failure, log_success, AuditEvent};
use crate::registry::SaleRegistry;
use crate::scoring::ScoringEngine;
use crate::store::SettlementStore;
use crate::wallet::KeyProvider;

pub use allocation::allocate;
pub use encoding::{canonical_encoding, settlement_digest, sign_settlement};
pub use errors::{DecodeError, SettlementError};

// ==================================================
// SETTLEMENT ENGINE
// ==================================================

pub struct SettlementEngine {
    normalizer: Normalizer,
    scoring: ScoringEngine,
    key: Arc<dyn KeyProvider>,
    store: SettlementStore,
    registry: SaleRegistry,
    contract: Address,

    sale_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl SettlementEngine {
    pub fn new(
        normalizer: Normalizer,
        scoring: ScoringEngine,
        key: Arc<dyn KeyProvider>,
        store: SettlementStore,
        registry: SaleRegistry,
        contract: Address,
    ) -> Self {
        info!("⚖️ Settlement engine ready");
        info!("   Agent:    {:?}", key.address());
        info!("   Contract: {:?}", contract);
        Self {
            normalizer,
            scoring,
            key,
            store,
            registry,
            contract,
            sale_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn agent_address(&self) -> Address {
        self.key.address()
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn store(&self) -> &SettlementStore {
        &self.store
    }

    pub fn registry(&self) -> &SaleRegistry {
        &self.registry
    }

    async fn sale_lock(&self, sale_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.sale_locks.lock().await;
        locks.entry(sale_id).or_default().clone()
    }

    /// Settles one expired sale. A sale that already has a stored settlement
    /// always gets that settlement back, unchanged and unsigned again.
    pub async fn settle(
        &self,
        sale_id: u64,
        raw_bids: &[RawBid],
    ) -> Result<SettlementOutcome, SettlementError> {
        let lock = self.sale_lock(sale_id).await;
        let _guard = lock.lock().await;

        let outcome = self.settle_locked(sale_id, raw_bids).await;
        if outcome.is_ok() {
            // Later calls are answered from the store.
            self.sale_locks.lock().await.remove(&sale_id);
        }
        outcome
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.sale_locks.lock().await.len()
    }

    async fn settle_locked(
        &self,
        sale_id: u64,
        raw_bids: &[RawBid],
    ) -> Result<SettlementOutcome, SettlementError> {
        if let Some(existing) = self.store.get(sale_id).await {
            info!("♻️ Sale {} already settled, returning stored settlement", sale_id);
            if self.registry.state(sale_id).await.is_some() {
                self.registry.mark_settled(sale_id, existing.timestamp).await?;
            }
            emit(&AuditEvent::reused(&existing));
            return Ok(SettlementOutcome::AlreadySettled(existing));
        }

        let sale = self
            .registry
            .sale(sale_id)
            .await
            .ok_or(SettlementError::UnknownSale(sale_id))?;
        if let Some(SaleState::Open) = self.registry.state(sale_id).await {
            return Err(SettlementError::SaleNotExpired {
                sale_id,
                deadline: sale.deadline,
            });
        }

        let result = self.run_pipeline(sale_id, sale.supply, raw_bids).await;
        let result = match result {
            Ok(r) => r,
            Err(e) => {
                log_failure(sale_id, &e.to_string());
                return Err(e);
            }
        };

        let signed = sign_settlement(self.contract, result, self.key.as_ref(), Utc::now().timestamp())
            .map_err(|e| {
                log_failure(sale_id, &e.to_string());
                e
            })?;

        if let Some(existing) = self.store.put(signed.clone()).await? {
            warn!("Sale {} was settled concurrently, discarding new signature", sale_id);
            emit(&AuditEvent::reused(&existing));
            return Ok(SettlementOutcome::AlreadySettled(existing));
        }
        self.registry.mark_settled(sale_id, signed.timestamp).await?;

        emit(&AuditEvent::signed(&signed));
        log_success(&format!(
            "Sale {} settled: {} winners, {} tokens at {}",
            sale_id,
            signed.result.winners.len(),
            signed.result.total_allocated(),
            signed.result.clearing_price
        ));
        Ok(SettlementOutcome::Settled(signed))
    }

    /// Decode -> score -> allocate. Per-bid failures exclude the bid only.
    async fn run_pipeline(
        &self,
        sale_id: u64,
        supply: u64,
        raw_bids: &[RawBid],
    ) -> Result<SettlementResult, SettlementError> {
        let (matching, foreign): (Vec<RawBid>, Vec<RawBid>) =
            raw_bids.iter().cloned().partition(|r| r.sale_id == sale_id);
        for r in &foreign {
            self.exclude(sale_id, r.bidder, &format!("bid belongs to sale {}", r.sale_id));
        }

        // Phase 1: every bid decoded before any is scored.
        let (bids, rejected) = self.normalizer.normalize_all(&matching);
        for (bidder, err) in rejected {
            let err = SettlementError::Decode { bidder, source: err };
            self.exclude(sale_id, bidder, &err.to_string());
        }
        for bid in &bids {
            emit(&AuditEvent::decoded(sale_id, bid));
        }
        info!("📥 Sale {}: {} of {} bids decoded", sale_id, bids.len(), raw_bids.len());

        // Phase 2: scoring against the max price seen in phase 1.
        let (scored, failed) = self.scoring.score_all(bids).await;
        for (bidder, err) in failed {
            self.exclude(sale_id, bidder, &err.to_string());
        }
        for sb in &scored {
            emit(&AuditEvent::scored(sale_id, sb));
        }
        if scored.is_empty() {
            warn!("⚠️ Sale {} has no valid bids, settling empty", sale_id);
        }

        let result = allocate(sale_id, scored, supply)?;
        emit(&AuditEvent::allocated(&result));
        Ok(result)
    }

    fn exclude(&self, sale_id: u64, bidder: Address, reason: &str) {
        log_exclusion(sale_id, bidder, reason);
        emit(&AuditEvent::excluded(sale_id, bidder, reason));
    }
}

/// Settles several sales concurrently; each keeps its own outcome.
pub async fn settle_many(
    engine: &SettlementEngine,
    work: Vec<(u64, Vec<RawBid>)>,
) -> Vec<(u64, Result<SettlementOutcome, SettlementError>)> {
    let futures = work.into_iter().map(|(id, bids)| async move {
        let outcome = engine.settle(id, &bids).await;
        (id, outcome)
    });
    futures_util::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::domain::Sale;
    use crate::scoring::KeywordPitchEvaluator;
    use crate::wallet::{KeyOrigin, LocalKeyProvider};
    use ethers::types::{Signature, H256};

    /// Key that is present but refuses to sign, like a sealed enclave.
    struct RefusingKey;

    impl KeyProvider for RefusingKey {
        fn kind(&self) -> KeyOrigin {
            KeyOrigin::Enclave
        }

        fn address(&self) -> Address {
            Address::repeat_byte(0xde)
        }

        fn sign(&self, _hash: H256) -> Result<Signature, SettlementError> {
            Err(SettlementError::SigningFailure("enclave unavailable".into()))
        }
    }

    fn engine_with(
        key: Arc<dyn KeyProvider>,
        store: SettlementStore,
        registry: SaleRegistry,
    ) -> SettlementEngine {
        let cfg = ScoringConfig::default();
        SettlementEngine::new(
            Normalizer::new(cfg.max_pitch_chars),
            ScoringEngine::new(&cfg, Arc::new(KeywordPitchEvaluator)),
            key,
            store,
            registry,
            Address::repeat_byte(0xc0),
        )
    }

    fn engine(registry: SaleRegistry) -> SettlementEngine {
        engine_with(
            Arc::new(LocalKeyProvider::generate()),
            SettlementStore::in_memory(),
            registry,
        )
    }

    async fn expired(id: u64) -> SaleRegistry {
        let registry = SaleRegistry::new();
        registry.register(sale(id, 0)).await.unwrap();
        registry.expire_due(1).await;
        registry
    }

    fn sale(id: u64, deadline: u64) -> Sale {
        Sale {
            sale_id: id,
            issuer: Address::repeat_byte(0x11),
            supply: 100,
            deadline,
        }
    }

    #[tokio::test]
    async fn unknown_sale_is_rejected() {
        let err = engine(SaleRegistry::new()).settle(1, &[]).await.unwrap_err();
        assert!(matches!(err, SettlementError::UnknownSale(1)));
    }

    #[tokio::test]
    async fn open_sale_is_rejected() {
        let registry = SaleRegistry::new();
        registry.register(sale(1, u64::MAX)).await.unwrap();

        let err = engine(registry).settle(1, &[]).await.unwrap_err();
        assert!(matches!(err, SettlementError::SaleNotExpired { sale_id: 1, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn expired_sale_without_bids_settles_empty() {
        let registry = SaleRegistry::new();
        registry.register(sale(1, 0)).await.unwrap();
        registry.expire_due(1).await;

        let e = engine(registry.clone());
        let outcome = e.settle(1, &[]).await.unwrap();

        assert!(outcome.is_fresh());
        assert!(outcome.signed().result.winners.is_empty());
        assert!(outcome.signed().verify());
        assert!(registry.state(1).await.map(|s| s.is_settled()).unwrap_or(false));
        assert!(outcome.log_line().contains("settled"));
    }

    #[tokio::test]
    async fn signing_failure_leaves_sale_retryable() {
        let store = SettlementStore::in_memory();
        let registry = expired(3).await;

        let refusing = engine_with(Arc::new(RefusingKey), store.clone(), registry.clone());
        let err = refusing.settle(3, &[]).await.unwrap_err();
        assert!(matches!(err, SettlementError::SigningFailure(_)));
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
        assert!(store.get(3).await.is_none());
        assert_eq!(registry.state(3).await, Some(SaleState::Expired));
        assert_eq!(registry.pending().await, vec![3]);

        let working = engine_with(
            Arc::new(LocalKeyProvider::generate()),
            store.clone(),
            registry.clone(),
        );
        let outcome = working.settle(3, &[]).await.unwrap();
        assert!(outcome.is_fresh());
        assert!(outcome.signed().verify());
        assert_eq!(store.get(3).await.as_ref(), Some(outcome.signed()));
        assert!(registry.state(3).await.map(|s| s.is_settled()).unwrap_or(false));
    }

    #[tokio::test]
    async fn lock_is_released_once_settled() {
        let e = engine(expired(5).await);
        assert!(e.settle(5, &[]).await.is_ok());
        assert_eq!(e.tracked_locks().await, 0);

        let again = e.settle(5, &[]).await.unwrap();
        assert!(!again.is_fresh());
        assert_eq!(e.tracked_locks().await, 0);
    }

    #[tokio::test]
    async fn failed_attempt_keeps_its_lock() {
        let registry = SaleRegistry::new();
        registry.register(sale(6, u64::MAX)).await.unwrap();
        let e = engine(registry);

        assert!(e.settle(6, &[]).await.is_err());
        assert_eq!(e.tracked_locks().await, 1);
    }
}
