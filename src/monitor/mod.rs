use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::domain::time::unix_now;
use crate::domain::{RawBid, Sale, SettlementOutcome};
use crate::execution::errors::SettlementError;
use crate::execution::{settle_many, SettlementEngine};
use crate::logging::log_failure;

pub mod feed;

pub use feed::{Fixture, FixtureBid, FixtureBidSource};

/// Where sales and their sealed bids come from.
#[async_trait]
pub trait BidSource: Send + Sync {
    async fn sales(&self) -> Result<Vec<Sale>, SettlementError>;

    async fn bids_for(&self, sale_id: u64) -> Result<Vec<RawBid>, SettlementError>;
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub outcomes: Vec<SettlementOutcome>,
    pub failures: Vec<(u64, SettlementError)>,
}

impl SweepReport {
    pub fn settled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fresh()).count()
    }
}

pub struct SaleMonitor {
    source: Arc<dyn BidSource>,
    engine: Arc<SettlementEngine>,
    check_interval: Duration,
}

impl SaleMonitor {
    pub fn new(source: Arc<dyn BidSource>, engine: Arc<SettlementEngine>, check_interval_ms: u64) -> Self {
        Self {
            source,
            engine,
            check_interval: Duration::from_millis(check_interval_ms),
        }
    }

    /// One pass: register new sales, expire due ones, settle everything pending.
    /// A failing sale is reported, never allowed to block the others.
    pub async fn sweep(&self, now: u64) -> Result<SweepReport, SettlementError> {
        let registry = self.engine.registry();
        let mut report = SweepReport::default();

        for sale in self.source.sales().await? {
            let sale_id = sale.sale_id;
            if let Err(e) = registry.register(sale).await {
                warn!("⚠️ Sale {} ignored: {}", sale_id, e);
            }
        }
        registry.expire_due(now).await;

        let mut work = Vec::new();
        for sale_id in registry.pending().await {
            match self.source.bids_for(sale_id).await {
                Ok(bids) => work.push((sale_id, bids)),
                Err(e) => {
                    log_failure(sale_id, &e.to_string());
                    report.failures.push((sale_id, e));
                }
            }
        }
        if work.is_empty() {
            return Ok(report);
        }

        info!("🔎 Settling {} pending sales", work.len());
        for (sale_id, outcome) in settle_many(&self.engine, work).await {
            match outcome {
                Ok(o) => report.outcomes.push(o),
                Err(e) => report.failures.push((sale_id, e)),
            }
        }
        Ok(report)
    }

    /// Sweeps until the task is cancelled.
    pub async fn run<F>(&self, on_outcome: F)
    where
        F: Fn(&SettlementOutcome) + Send + Sync,
    {
        info!("🎬 Sale monitor starting (every {:?})...", self.check_interval);

        loop {
            match self.sweep(unix_now()).await {
                Ok(report) => {
                    report.outcomes.iter().for_each(&on_outcome);
                    for (sale_id, e) in &report.failures {
                        if e.is_fatal() {
                            warn!("🛑 Sale {} needs manual review: {}", sale_id, e);
                        }
                    }
                }
                Err(e) => warn!("📡 Bid source error: {}", e),
            }

            sleep(self.check_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bids::{encode_payload, tokens_to_wei, Normalizer};
    use crate::config::ScoringConfig;
    use crate::registry::SaleRegistry;
    use crate::scoring::{KeywordPitchEvaluator, ScoringEngine};
    use crate::store::SettlementStore;
    use crate::wallet::LocalKeyProvider;
    use ethers::types::{Address, U256};

    struct StaticSource {
        sales: Vec<Sale>,
        bids: Vec<RawBid>,
    }

    #[async_trait]
    impl BidSource for StaticSource {
        async fn sales(&self) -> Result<Vec<Sale>, SettlementError> {
            Ok(self.sales.clone())
        }

        async fn bids_for(&self, sale_id: u64) -> Result<Vec<RawBid>, SettlementError> {
            if sale_id == 13 {
                return Err(SettlementError::Config("feed unavailable".into()));
            }
            Ok(self.bids.iter().filter(|b| b.sale_id == sale_id).cloned().collect())
        }
    }

    fn engine() -> Arc<SettlementEngine> {
        let cfg = ScoringConfig::default();
        Arc::new(SettlementEngine::new(
            Normalizer::new(cfg.max_pitch_chars),
            ScoringEngine::new(&cfg, Arc::new(KeywordPitchEvaluator)),
            Arc::new(LocalKeyProvider::generate()),
            SettlementStore::in_memory(),
            SaleRegistry::new(),
            Address::repeat_byte(0xc0),
        ))
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
    async fn sweep_settles_only_expired_sales() {
        let bid = RawBid {
            sale_id: 1,
            bidder: Address::repeat_byte(0xa),
            payload: encode_payload(U256::from(1_000_000u64), tokens_to_wei(10), "", "US").into(),
            max_spend_raw: U256::from(100_000_000u64),
        };
        let source = Arc::new(StaticSource {
            sales: vec![sale(1, 100), sale(2, 500), sale(13, 100)],
            bids: vec![bid],
        });
        let engine = engine();
        let monitor = SaleMonitor::new(source, engine.clone(), 10);

        let report = monitor.sweep(200).await.unwrap();
        assert_eq!(report.settled(), 1);
        assert_eq!(report.outcomes[0].signed().result.allocations.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 13);
        assert!(engine.store().get(2).await.is_none());

        // Nothing new on the second pass; sale 13 is still pending and still failing.
        let again = monitor.sweep(200).await.unwrap();
        assert_eq!(again.settled(), 0);
        assert_eq!(again.failures.len(), 1);
    }
}
