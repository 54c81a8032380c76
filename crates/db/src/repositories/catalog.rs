use async_trait::async_trait;
use pricewise_core::catalog::{CatalogError, CatalogLoader};
use pricewise_core::domain::catalog::{Level, LevelId, Service, ServiceId, Tier, TierId};

use super::{column, decode_json, parse_decimal, RepositoryError};
use crate::DbPool;

/// Reads tiers, levels and optional services from the catalog tables.
#[derive(Clone)]
pub struct SqlCatalogLoader {
    pool: DbPool,
}

impl SqlCatalogLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_tiers(&self) -> Result<Vec<Tier>, RepositoryError> {
        let tier_rows = sqlx::query(
            "SELECT id, name, description FROM tier ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;
        let level_rows = sqlx::query(
            "SELECT id, tier_id, name, price, features_json
             FROM tier_level ORDER BY tier_id, sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tiers = tier_rows.iter().map(row_to_tier).collect::<Result<Vec<_>, _>>()?;
        for row in &level_rows {
            let level = row_to_level(row)?;
            if let Some(tier) = tiers.iter_mut().find(|tier| tier.id == level.tier_id) {
                tier.levels.push(level);
            }
        }
        Ok(tiers)
    }

    async fn load_services(
        &self,
        tier_id: Option<&TierId>,
        level_id: Option<&LevelId>,
    ) -> Result<Vec<Service>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.category, s.description, s.price
             FROM service s
             WHERE ?1 IS NULL
                OR NOT EXISTS (SELECT 1 FROM service_availability a WHERE a.service_id = s.id)
                OR EXISTS (
                    SELECT 1 FROM service_availability a
                    WHERE a.service_id = s.id
                      AND a.tier_id = ?1
                      AND (a.level_id IS NULL OR ?2 IS NULL OR a.level_id = ?2)
                )
             ORDER BY s.sort_order, s.id",
        )
        .bind(tier_id.map(|id| id.0.as_str()))
        .bind(level_id.map(|id| id.0.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_service).collect()
    }
}

fn row_to_tier(row: &sqlx::sqlite::SqliteRow) -> Result<Tier, RepositoryError> {
    Ok(Tier {
        id: TierId(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        levels: Vec::new(),
    })
}

fn row_to_level(row: &sqlx::sqlite::SqliteRow) -> Result<Level, RepositoryError> {
    let price: String = column(row, "price")?;
    let features: String = column(row, "features_json")?;
    Ok(Level {
        id: LevelId(column(row, "id")?),
        tier_id: TierId(column(row, "tier_id")?),
        name: column(row, "name")?,
        price: parse_decimal("tier_level.price", &price)?,
        features: decode_json("tier_level.features_json", &features)?,
    })
}

fn row_to_service(row: &sqlx::sqlite::SqliteRow) -> Result<Service, RepositoryError> {
    let price: String = column(row, "price")?;
    Ok(Service {
        id: ServiceId(column(row, "id")?),
        name: column(row, "name")?,
        category: column(row, "category")?,
        description: column(row, "description")?,
        price: parse_decimal("service.price", &price)?,
    })
}

#[async_trait]
impl CatalogLoader for SqlCatalogLoader {
    async fn list_tiers(&self) -> Result<Vec<Tier>, CatalogError> {
        Ok(self.load_tiers().await?)
    }

    async fn list_services(
        &self,
        tier_id: Option<&TierId>,
        level_id: Option<&LevelId>,
    ) -> Result<Vec<Service>, CatalogError> {
        Ok(self.load_services(tier_id, level_id).await?)
    }
}
