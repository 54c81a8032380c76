//! Read-only access to the tier, level and optional-service catalog.

pub mod cache;
pub mod fixtures;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::catalog::{Level, LevelId, Service, ServiceId, Tier, TierId};

pub use cache::CachedCatalog;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog source unavailable: {0}")]
    Unavailable(String),
    #[error("catalog data is malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait CatalogLoader: Send + Sync {
    /// Every tier with its nested levels.
    async fn list_tiers(&self) -> Result<Vec<Tier>, CatalogError>;

    /// Optional services, scoped to what the given tier/level may add.
    /// `None` for both returns the whole list.
    async fn list_services(
        &self,
        tier_id: Option<&TierId>,
        level_id: Option<&LevelId>,
    ) -> Result<Vec<Service>, CatalogError>;
}

/// Lookup table over one loaded snapshot of the catalog.
#[derive(Clone, Debug, Default)]
pub struct CatalogIndex {
    tiers: Vec<Tier>,
    services: Vec<Service>,
}

impl CatalogIndex {
    pub fn new(tiers: Vec<Tier>, services: Vec<Service>) -> Self {
        Self { tiers, services }
    }

    pub fn tier(&self, id: &TierId) -> Option<&Tier> {
        self.tiers.iter().find(|tier| &tier.id == id && !tier.is_placeholder())
    }

    pub fn level(&self, tier_id: &TierId, level_id: &LevelId) -> Option<&Level> {
        self.tier(tier_id).and_then(|tier| tier.level(level_id))
    }

    pub fn service(&self, id: &ServiceId) -> Option<&Service> {
        self.services.iter().find(|service| &service.id == id && !service.is_placeholder())
    }
}

/// Catalog held in memory. Services without an availability entry are
/// offered on every tier.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    tiers: Vec<Tier>,
    services: Vec<Service>,
    availability: BTreeMap<ServiceId, BTreeSet<TierId>>,
}

impl StaticCatalog {
    pub fn new(tiers: Vec<Tier>, services: Vec<Service>) -> Self {
        Self { tiers, services, availability: BTreeMap::new() }
    }

    /// The catalog the agency ships with by default.
    pub fn agency_default() -> Self {
        let mut catalog = Self::new(fixtures::default_tiers(), fixtures::default_services());
        for (service_id, tiers) in fixtures::default_availability() {
            catalog = catalog.with_availability(service_id, tiers);
        }
        catalog
    }

    pub fn with_availability(
        mut self,
        service_id: ServiceId,
        tiers: impl IntoIterator<Item = TierId>,
    ) -> Self {
        self.availability.entry(service_id).or_default().extend(tiers);
        self
    }

    fn offered_on(&self, service: &Service, tier_id: &TierId) -> bool {
        self.availability.get(&service.id).map_or(true, |tiers| tiers.contains(tier_id))
    }
}

#[async_trait]
impl CatalogLoader for StaticCatalog {
    async fn list_tiers(&self) -> Result<Vec<Tier>, CatalogError> {
        Ok(self.tiers.clone())
    }

    async fn list_services(
        &self,
        tier_id: Option<&TierId>,
        _level_id: Option<&LevelId>,
    ) -> Result<Vec<Service>, CatalogError> {
        Ok(match tier_id {
            Some(tier_id) => self
                .services
                .iter()
                .filter(|service| self.offered_on(service, tier_id))
                .cloned()
                .collect(),
            None => self.services.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogIndex, CatalogLoader, StaticCatalog};
    use crate::domain::catalog::{LevelId, ServiceId, TierId};

    #[tokio::test]
    async fn scoped_listing_respects_availability() {
        let catalog = StaticCatalog::agency_default();
        let starter = TierId("starter".to_string());
        let ecommerce = TierId("ecommerce".to_string());

        let starter_services =
            catalog.list_services(Some(&starter), None).await.expect("starter services");
        let ecommerce_services =
            catalog.list_services(Some(&ecommerce), None).await.expect("ecommerce services");
        let all = catalog.list_services(None, None).await.expect("all services");

        let product_import = ServiceId("product-import".to_string());
        assert!(!starter_services.iter().any(|service| service.id == product_import));
        assert!(ecommerce_services.iter().any(|service| service.id == product_import));
        assert!(all.len() >= ecommerce_services.len());
    }

    #[tokio::test]
    async fn index_resolves_levels_through_their_tier() {
        let catalog = StaticCatalog::agency_default();
        let index = CatalogIndex::new(
            catalog.list_tiers().await.expect("tiers"),
            catalog.list_services(None, None).await.expect("services"),
        );

        let pro = TierId("pro".to_string());
        assert!(index.level(&pro, &LevelId("pro-premium".to_string())).is_some());
        assert!(index.level(&pro, &LevelId("starter-base".to_string())).is_none());
        assert!(index.service(&ServiceId("missing".to_string())).is_none());
    }
}
