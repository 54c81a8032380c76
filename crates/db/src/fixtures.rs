use serde::Serialize;

use pricewise_core::catalog::fixtures::{default_availability, default_services, default_tiers};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSeedResult {
    pub tiers: usize,
    pub levels: usize,
    pub services: usize,
    pub availability_rules: usize,
}

/// Loads the agency's default catalog: Starter, Pro and Ecommerce, each
/// with Base, Standard and Premium levels, plus the categorised optional
/// services. Re-running updates rows in place.
pub async fn seed_default_catalog(pool: &DbPool) -> Result<CatalogSeedResult, RepositoryError> {
    let mut tx = pool.begin().await?;
    let mut result = CatalogSeedResult::default();

    for (tier_order, tier) in default_tiers().into_iter().enumerate() {
        sqlx::query(
            "INSERT INTO tier (id, name, description, sort_order) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 sort_order = excluded.sort_order",
        )
        .bind(&tier.id.0)
        .bind(&tier.name)
        .bind(&tier.description)
        .bind(tier_order as i64)
        .execute(&mut *tx)
        .await?;
        result.tiers += 1;

        for (level_order, level) in tier.levels.iter().enumerate() {
            let features = serde_json::to_string(&level.features)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            sqlx::query(
                "INSERT INTO tier_level (id, tier_id, name, price, features_json, sort_order)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     tier_id = excluded.tier_id,
                     name = excluded.name,
                     price = excluded.price,
                     features_json = excluded.features_json,
                     sort_order = excluded.sort_order",
            )
            .bind(&level.id.0)
            .bind(&level.tier_id.0)
            .bind(&level.name)
            .bind(level.price.to_string())
            .bind(features)
            .bind(level_order as i64)
            .execute(&mut *tx)
            .await?;
            result.levels += 1;
        }
    }

    for (order, service) in default_services().into_iter().enumerate() {
        sqlx::query(
            "INSERT INTO service (id, name, category, description, price, sort_order)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 description = excluded.description,
                 price = excluded.price,
                 sort_order = excluded.sort_order",
        )
        .bind(&service.id.0)
        .bind(&service.name)
        .bind(&service.category)
        .bind(&service.description)
        .bind(service.price.to_string())
        .bind(order as i64)
        .execute(&mut *tx)
        .await?;
        result.services += 1;
    }

    for (service_id, tiers) in default_availability() {
        sqlx::query("DELETE FROM service_availability WHERE service_id = ?")
            .bind(&service_id.0)
            .execute(&mut *tx)
            .await?;
        for tier_id in tiers {
            sqlx::query(
                "INSERT INTO service_availability (service_id, tier_id, level_id)
                 VALUES (?, ?, NULL)",
            )
            .bind(&service_id.0)
            .bind(&tier_id.0)
            .execute(&mut *tx)
            .await?;
            result.availability_rules += 1;
        }
    }

    tx.commit().await?;
    Ok(result)
}
