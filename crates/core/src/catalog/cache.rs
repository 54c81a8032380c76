use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CatalogError, CatalogLoader};
use crate::domain::catalog::{LevelId, Service, Tier, TierId};

type ServiceKey = (Option<TierId>, Option<LevelId>);

/// Memoises a loader's answers per query. Failures are not cached.
pub struct CachedCatalog<L> {
    inner: L,
    tiers: RwLock<Option<Vec<Tier>>>,
    services: RwLock<HashMap<ServiceKey, Vec<Service>>>,
}

impl<L> CachedCatalog<L>
where
    L: CatalogLoader,
{
    pub fn new(inner: L) -> Self {
        Self { inner, tiers: RwLock::new(None), services: RwLock::new(HashMap::new()) }
    }

    pub async fn invalidate(&self) {
        *self.tiers.write().await = None;
        self.services.write().await.clear();
    }
}

#[async_trait]
impl<L> CatalogLoader for CachedCatalog<L>
where
    L: CatalogLoader,
{
    async fn list_tiers(&self) -> Result<Vec<Tier>, CatalogError> {
        if let Some(tiers) = self.tiers.read().await.as_ref() {
            return Ok(tiers.clone());
        }

        let tiers = self.inner.list_tiers().await?;
        *self.tiers.write().await = Some(tiers.clone());
        Ok(tiers)
    }

    async fn list_services(
        &self,
        tier_id: Option<&TierId>,
        level_id: Option<&LevelId>,
    ) -> Result<Vec<Service>, CatalogError> {
        let key = (tier_id.cloned(), level_id.cloned());
        if let Some(services) = self.services.read().await.get(&key) {
            return Ok(services.clone());
        }

        let services = self.inner.list_services(tier_id, level_id).await?;
        self.services.write().await.insert(key, services.clone());
        Ok(services)
    }
}
