use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::SignedSettlement;
use crate::execution::errors::SettlementError;

/// Signed settlements keyed by sale id. Entries are never replaced once written.
#[derive(Clone)]
pub struct SettlementStore {
    inner: Arc<RwLock<HashMap<u64, SignedSettlement>>>,
    path: Option<PathBuf>,
}

impl SettlementStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            path: None,
        }
    }

    /// Loads `path` when it exists; every later insert rewrites it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SettlementError> {
        let path = path.into();
        let mut map = HashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let entries: Vec<SignedSettlement> = serde_json::from_str(&content)
                    .map_err(|e| SettlementError::Store(format!("{}: {}", path.display(), e)))?;
                for s in entries {
                    map.insert(s.sale_id(), s);
                }
                info!("📂 Loaded {} settlements from {}", map.len(), path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📂 No settlement file at {}, starting empty", path.display());
            }
            Err(e) => return Err(SettlementError::Store(format!("{}: {}", path.display(), e))),
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(map)),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self, sale_id: u64) -> Option<SignedSettlement> {
        self.inner.read().await.get(&sale_id).cloned()
    }

    /// Inserts `signed` unless the sale already has a settlement, in which case
    /// the stored one is returned and nothing changes.
    pub async fn put(
        &self,
        signed: SignedSettlement,
    ) -> Result<Option<SignedSettlement>, SettlementError> {
        let mut map = self.inner.write().await;
        let sale_id = signed.sale_id();

        if let Some(existing) = map.get(&sale_id) {
            warn!("Sale {} already has a stored settlement, keeping it", sale_id);
            return Ok(Some(existing.clone()));
        }

        map.insert(sale_id, signed);
        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &map).await {
                map.remove(&sale_id);
                return Err(e);
            }
        }
        Ok(None)
    }

    /// All settlements in ascending sale id order.
    pub async fn list(&self) -> Vec<SignedSettlement> {
        let map = self.inner.read().await;
        let mut all: Vec<_> = map.values().cloned().collect();
        all.sort_by_key(|s| s.sale_id());
        all
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

async fn persist(path: &Path, map: &HashMap<u64, SignedSettlement>) -> Result<(), SettlementError> {
    let store_err = |e: std::io::Error| SettlementError::Store(format!("{}: {}", path.display(), e));

    let mut entries: Vec<&SignedSettlement> = map.values().collect();
    entries.sort_by_key(|s| s.sale_id());
    let content = serde_json::to_vec_pretty(&entries)
        .map_err(|e| SettlementError::Store(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(store_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await.map_err(store_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(store_err)?;
    Ok(())
}
