use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::time::{deadline_display, time_remaining, unix_now};
use crate::domain::{Sale, SaleState};
use crate::execution::errors::SettlementError;

#[derive(Debug, Clone)]
struct Entry {
    sale: Sale,
    state: SaleState,
}

/// Lifecycle of every known sale: Open -> Expired -> Settled.
#[derive(Clone, Default)]
pub struct SaleRegistry {
    inner: Arc<RwLock<BTreeMap<u64, Entry>>>,
}

impl SaleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-registering identical metadata is a no-op; different metadata is rejected.
    /// A sale with nothing to sell is never tracked.
    pub async fn register(&self, sale: Sale) -> Result<(), SettlementError> {
        if sale.supply == 0 {
            return Err(SettlementError::Config(format!(
                "sale {} has zero supply",
                sale.sale_id
            )));
        }
        let mut map = self.inner.write().await;
        if let Some(entry) = map.get(&sale.sale_id) {
            if entry.sale == sale {
                return Ok(());
            }
            return Err(SettlementError::ConflictingSale(sale.sale_id));
        }

        info!(
            "📋 Sale {} registered: supply {} closes {} ({})",
            sale.sale_id,
            sale.supply,
            deadline_display(sale.deadline),
            time_remaining(sale.deadline, unix_now())
        );
        map.insert(
            sale.sale_id,
            Entry {
                sale,
                state: SaleState::Open,
            },
        );
        Ok(())
    }

    /// Moves every open sale whose deadline has passed to Expired.
    pub async fn expire_due(&self, now: u64) -> Vec<u64> {
        let mut map = self.inner.write().await;
        let mut expired = Vec::new();
        for (id, entry) in map.iter_mut() {
            if entry.state == SaleState::Open && entry.sale.is_expired_at(now) {
                entry.state = SaleState::Expired;
                expired.push(*id);
            }
        }
        if !expired.is_empty() {
            info!("⏰ Sales expired: {:?}", expired);
        }
        expired
    }

    pub async fn state(&self, sale_id: u64) -> Option<SaleState> {
        self.inner.read().await.get(&sale_id).map(|e| e.state)
    }

    pub async fn sale(&self, sale_id: u64) -> Option<Sale> {
        self.inner.read().await.get(&sale_id).map(|e| e.sale.clone())
    }

    pub async fn mark_settled(&self, sale_id: u64, settled_at: i64) -> Result<(), SettlementError> {
        let mut map = self.inner.write().await;
        let entry = map
            .get_mut(&sale_id)
            .ok_or(SettlementError::UnknownSale(sale_id))?;
        if !entry.state.is_settled() {
            entry.state = SaleState::Settled { settled_at };
        }
        Ok(())
    }

    /// Expired sales still waiting for a settlement, ascending.
    pub async fn pending(&self) -> Vec<u64> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.state == SaleState::Expired)
            .map(|(id, _)| *id)
            .collect()
    }
}
