use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use pricewise_core::domain::catalog::{LevelId, ServiceId, TierId};
use pricewise_core::domain::quote::{
    ContactPreferences, Draft, DraftId, MeetingRequest, QuoteId, QuoteRequest, QuoteStatus,
    Selection, UserId,
};
use pricewise_core::domain::step::Step;
use pricewise_core::gateway::{
    ActiveQuoteCheck, DeleteOutcome, GatewayError, PersistenceGateway, SaveDraftRequest,
    SubmitQuoteRequest,
};

use super::{column, decode_json, encode_json, parse_decimal, parse_timestamp, RepositoryError};
use crate::DbPool;

const BLOCKING_STATUSES: &str = "('submitted', 'under_review', 'accepted')";
const CLOSED_STATUSES: &str = "('rejected', 'expired')";

const SELECT_COLUMNS: &str = "SELECT id, status, tier_id, level_id, service_ids_json, contact_json,
        meeting_json, current_step, total_price, created_at, updated_at, submitted_at
     FROM quote_request";

/// Drafts and submitted quotes of one visitor, stored in `quote_request`.
#[derive(Clone)]
pub struct SqlPersistenceGateway {
    pool: DbPool,
    user_id: UserId,
}

impl SqlPersistenceGateway {
    pub fn new(pool: DbPool, user_id: UserId) -> Self {
        Self { pool, user_id }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Every record of the visitor, oldest first.
    pub async fn records(&self) -> Result<Vec<QuoteRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? ORDER BY created_at, id"
        ))
        .bind(&self.user_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_request).collect()
    }

    /// Moves a stored quote through its review lifecycle.
    pub async fn set_status(
        &self,
        quote_id: &QuoteId,
        status: QuoteStatus,
    ) -> Result<(), RepositoryError> {
        let mut record = self
            .find(quote_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("no quote request `{}`", quote_id.0)))?;
        record
            .transition_to(status)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "UPDATE quote_request SET status = ?, updated_at = ?, submitted_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(status.as_str())
        .bind(record.updated_at.to_rfc3339())
        .bind(record.submitted_at.map(|at| at.to_rfc3339()))
        .bind(&quote_id.0)
        .bind(&self.user_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, quote_id: &QuoteId) -> Result<Option<QuoteRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ? AND user_id = ?"))
            .bind(&quote_id.0)
            .bind(&self.user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_request).transpose()
    }

    async fn find_draft(&self) -> Result<Option<QuoteRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? AND status = 'draft' LIMIT 1"
        ))
        .bind(&self.user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_request).transpose()
    }

    async fn find_latest(&self, statuses: &str) -> Result<Option<QuoteRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? AND status IN {statuses}
             ORDER BY updated_at DESC, id DESC LIMIT 1"
        ))
        .bind(&self.user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_request).transpose()
    }

    async fn ensure_not_blocked(&self) -> Result<(), RepositoryError> {
        match self.find_latest(BLOCKING_STATUSES).await? {
            Some(blocking) => Err(RepositoryError::Blocked { status: blocking.status }),
            None => Ok(()),
        }
    }

    async fn upsert_draft(&self, request: SaveDraftRequest) -> Result<DraftId, RepositoryError> {
        self.ensure_not_blocked().await?;

        let now = Utc::now().to_rfc3339();
        let service_ids = encode_json("service_ids_json", &request.selection.service_ids)?;
        let contact = request
            .contact
            .as_ref()
            .map(|contact| encode_json("contact_json", contact))
            .transpose()?;
        let tier_id = request.selection.tier_id.as_ref().map(|id| id.0.clone());
        let level_id = request.selection.level_id.as_ref().map(|id| id.0.clone());

        // The visitor has one draft; whatever id the caller holds, that row is updated.
        let id: String = sqlx::query_scalar(
            "INSERT INTO quote_request (id, user_id, status, tier_id, level_id, service_ids_json,
                                        contact_json, current_step, total_price, created_at,
                                        updated_at)
             VALUES (?, ?, 'draft', ?, ?, ?, ?, ?, '0', ?, ?)
             ON CONFLICT(user_id) WHERE status = 'draft' DO UPDATE SET
                 tier_id = excluded.tier_id,
                 level_id = excluded.level_id,
                 service_ids_json = excluded.service_ids_json,
                 contact_json = COALESCE(excluded.contact_json, quote_request.contact_json),
                 current_step = excluded.current_step,
                 updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(format!("QR-{}", Uuid::new_v4().simple()))
        .bind(&self.user_id.0)
        .bind(tier_id)
        .bind(level_id)
        .bind(service_ids)
        .bind(contact)
        .bind(request.current_step.as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        Ok(DraftId(id))
    }

    async fn active_quote_check(&self) -> Result<ActiveQuoteCheck, RepositoryError> {
        if let Some(active) = self.find_latest(BLOCKING_STATUSES).await? {
            if let Some(quote) = active.as_active_quote() {
                return Ok(ActiveQuoteCheck::Active(quote));
            }
        }
        if let Some(closed) = self.find_latest(CLOSED_STATUSES).await? {
            if let Some(quote) = closed.as_active_quote() {
                return Ok(ActiveQuoteCheck::CanCreateNew(quote));
            }
        }
        Ok(match self.find_draft().await?.as_ref().and_then(QuoteRequest::as_draft) {
            Some(draft) => {
                let current_step = draft.last_step;
                ActiveQuoteCheck::Draft { draft, current_step }
            }
            None => ActiveQuoteCheck::None,
        })
    }

    /// Level price plus the selected services' prices from the catalog
    /// tables, or `None` when any referenced id is missing there.
    async fn catalog_total(&self, selection: &Selection) -> Result<Option<Decimal>, RepositoryError> {
        let Some(level_id) = selection.level_id.as_ref() else {
            return Ok(None);
        };
        let level_price: Option<String> =
            sqlx::query_scalar("SELECT price FROM tier_level WHERE id = ?")
                .bind(&level_id.0)
                .fetch_optional(&self.pool)
                .await?;
        let Some(level_price) = level_price else {
            return Ok(None);
        };

        let mut total = parse_decimal("tier_level.price", &level_price)?;
        for service_id in &selection.service_ids {
            let price: Option<String> = sqlx::query_scalar("SELECT price FROM service WHERE id = ?")
                .bind(&service_id.0)
                .fetch_optional(&self.pool)
                .await?;
            match price {
                Some(price) => total += parse_decimal("service.price", &price)?,
                None => return Ok(None),
            }
        }
        Ok(Some(total))
    }

    async fn submit(&self, request: SubmitQuoteRequest) -> Result<QuoteId, RepositoryError> {
        self.ensure_not_blocked().await?;

        let quote_id = QuoteId::from(&request.draft_id);
        let mut record = self
            .find(&quote_id)
            .await?
            .filter(|record| record.status == QuoteStatus::Draft)
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("no draft `{}` to submit", request.draft_id.0))
            })?;
        record
            .transition_to(QuoteStatus::Submitted)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        let total_price = match self.catalog_total(&record.selection).await? {
            Some(total) => total,
            None => {
                warn!(
                    event_name = "db.quote_request.catalog_total_unavailable",
                    quote_id = %quote_id.0,
                    "selection references ids missing from the catalog, keeping the quoted total"
                );
                request.quoted_total
            }
        };
        let meeting = request
            .meeting
            .as_ref()
            .map(|meeting| encode_json("meeting_json", meeting))
            .transpose()?;

        sqlx::query(
            "UPDATE quote_request
             SET status = 'submitted', meeting_json = ?, total_price = ?, current_step = ?,
                 updated_at = ?, submitted_at = ?
             WHERE id = ? AND user_id = ? AND status = 'draft'",
        )
        .bind(meeting)
        .bind(total_price.to_string())
        .bind(Step::Success.as_str())
        .bind(record.updated_at.to_rfc3339())
        .bind(record.submitted_at.map(|at| at.to_rfc3339()))
        .bind(&quote_id.0)
        .bind(&self.user_id.0)
        .execute(&self.pool)
        .await?;
        Ok(quote_id)
    }

    async fn delete(&self, quote_id: Option<&QuoteId>) -> Result<u64, RepositoryError> {
        let result = match quote_id {
            Some(quote_id) => {
                sqlx::query("DELETE FROM quote_request WHERE id = ? AND user_id = ?")
                    .bind(&quote_id.0)
                    .bind(&self.user_id.0)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM quote_request WHERE user_id = ? AND status = 'draft'")
                    .bind(&self.user_id.0)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn store_progress(&self, quote_id: &QuoteId, step: Step) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE quote_request SET current_step = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(step.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&quote_id.0)
        .bind(&self.user_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("no quote request `{}`", quote_id.0)));
        }
        Ok(())
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<QuoteRequest, RepositoryError> {
    let status: String = column(row, "status")?;
    let service_ids: String = column(row, "service_ids_json")?;
    let contact: Option<String> = column(row, "contact_json")?;
    let meeting: Option<String> = column(row, "meeting_json")?;
    let current_step: Option<String> = column(row, "current_step")?;
    let total_price: String = column(row, "total_price")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let submitted_at: Option<String> = column(row, "submitted_at")?;

    Ok(QuoteRequest {
        id: column(row, "id")?,
        status: QuoteStatus::from_str(&status)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        selection: Selection {
            tier_id: column::<Option<String>>(row, "tier_id")?.map(TierId),
            level_id: column::<Option<String>>(row, "level_id")?.map(LevelId),
            service_ids: decode_json::<Vec<String>>("service_ids_json", &service_ids)?
                .into_iter()
                .map(ServiceId)
                .collect(),
        },
        contact: contact
            .map(|value| decode_json::<ContactPreferences>("contact_json", &value))
            .transpose()?,
        meeting: meeting
            .map(|value| decode_json::<MeetingRequest>("meeting_json", &value))
            .transpose()?,
        current_step: current_step
            .map(|value| {
                Step::from_str(&value).map_err(|error| RepositoryError::Decode(error.to_string()))
            })
            .transpose()?,
        total_price: parse_decimal("total_price", &total_price)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        submitted_at: submitted_at
            .map(|value| parse_timestamp("submitted_at", &value))
            .transpose()?,
    })
}

#[async_trait]
impl PersistenceGateway for SqlPersistenceGateway {
    async fn save_draft(&self, request: SaveDraftRequest) -> Result<DraftId, GatewayError> {
        Ok(self.upsert_draft(request).await?)
    }

    async fn load_draft(&self) -> Result<Option<Draft>, GatewayError> {
        Ok(self.find_draft().await?.as_ref().and_then(QuoteRequest::as_draft))
    }

    async fn check_active_quote(&self) -> Result<ActiveQuoteCheck, GatewayError> {
        Ok(self.active_quote_check().await?)
    }

    async fn submit_quote(&self, request: SubmitQuoteRequest) -> Result<QuoteId, GatewayError> {
        Ok(self.submit(request).await?)
    }

    async fn delete_quote(
        &self,
        quote_id: Option<&QuoteId>,
    ) -> Result<DeleteOutcome, GatewayError> {
        let deleted_count = self.delete(quote_id).await?;
        Ok(DeleteOutcome { deleted_count })
    }

    async fn update_progress(&self, quote_id: &QuoteId, step: Step) -> Result<(), GatewayError> {
        Ok(self.store_progress(quote_id, step).await?)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use pricewise_core::domain::catalog::{LevelId, ServiceId, TierId};
    use pricewise_core::domain::quote::{ContactPreferences, QuoteStatus, Selection, UserId};
    use pricewise_core::domain::step::Step;
    use pricewise_core::gateway::{
        ActiveQuoteCheck, GatewayError, PersistenceGateway, SaveDraftRequest, SubmitQuoteRequest,
    };

    use super::SqlPersistenceGateway;
    use crate::{connect_in_memory, migrations, seed_default_catalog, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_in_memory().await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        seed_default_catalog(&pool).await.expect("seed catalog");
        pool
    }

    fn gateway(pool: &DbPool, user: &str) -> SqlPersistenceGateway {
        SqlPersistenceGateway::new(pool.clone(), UserId(user.to_string()))
    }

    fn request(tier: &str, level: Option<&str>, services: &[&str], step: Step) -> SaveDraftRequest {
        SaveDraftRequest {
            selection: Selection {
                tier_id: Some(TierId(tier.to_string())),
                level_id: level.map(|level| LevelId(level.to_string())),
                service_ids: services.iter().map(|id| ServiceId(id.to_string())).collect(),
            },
            current_step: step,
            ..SaveDraftRequest::default()
        }
    }

    #[tokio::test]
    async fn saves_update_one_draft_per_user() {
        let pool = setup_pool().await;
        let visitor = gateway(&pool, "visitor-1");
        let other = gateway(&pool, "visitor-2");

        let first =
            visitor.save_draft(request("pro", None, &[], Step::Customize)).await.expect("save");
        let mut second_request = request("pro", Some("pro-base"), &["seo-setup"], Step::Optional);
        second_request.contact = Some(ContactPreferences {
            email: Some("ada@example.com".to_string()),
            ..ContactPreferences::default()
        });
        let second = visitor.save_draft(second_request).await.expect("update");
        let third = visitor
            .save_draft(request("pro", Some("pro-base"), &[], Step::Optional))
            .await
            .expect("update");
        other.save_draft(request("starter", None, &[], Step::Customize)).await.expect("other user");

        assert_eq!(first, second);
        assert_eq!(second, third);
        let draft = visitor.load_draft().await.expect("load").expect("draft");
        assert_eq!(draft.id, first);
        assert_eq!(draft.selection.level_id, Some(LevelId("pro-base".to_string())));
        assert!(draft.selection.service_ids.is_empty());
        assert_eq!(draft.last_step, Some(Step::Optional));
        assert_eq!(
            draft.contact.and_then(|contact| contact.email),
            Some("ada@example.com".to_string())
        );
        assert_eq!(visitor.records().await.expect("records").len(), 1);
    }

    #[tokio::test]
    async fn submit_prices_from_the_catalog_and_blocks_new_drafts() {
        let pool = setup_pool().await;
        let visitor = gateway(&pool, "visitor-1");
        let draft_id = visitor
            .save_draft(request(
                "pro",
                Some("pro-standard"),
                &["seo-setup", "copywriting"],
                Step::Quote,
            ))
            .await
            .expect("save");

        let quote_id = visitor
            .submit_quote(SubmitQuoteRequest {
                draft_id,
                meeting: None,
                quoted_total: Decimal::from(1),
            })
            .await
            .expect("submit");

        let active = match visitor.check_active_quote().await.expect("check") {
            ActiveQuoteCheck::Active(active) => active,
            other => panic!("expected an active quote, got {other:?}"),
        };
        assert_eq!(active.id, quote_id);
        assert_eq!(active.status, QuoteStatus::Submitted);
        assert_eq!(active.total_price, Decimal::from(3_600 + 450 + 600));
        assert!(active.submitted_at.is_some());

        let blocked = visitor
            .save_draft(request("starter", None, &[], Step::Customize))
            .await
            .expect_err("blocked");
        assert_eq!(blocked, GatewayError::Blocked { status: QuoteStatus::Submitted });
    }

    #[tokio::test]
    async fn closed_quotes_allow_a_new_draft() {
        let pool = setup_pool().await;
        let visitor = gateway(&pool, "visitor-1");
        let draft_id = visitor
            .save_draft(request("starter", Some("starter-base"), &[], Step::Quote))
            .await
            .expect("save");
        let quote_id = visitor
            .submit_quote(SubmitQuoteRequest {
                draft_id,
                meeting: None,
                quoted_total: Decimal::ZERO,
            })
            .await
            .expect("submit");

        visitor.set_status(&quote_id, QuoteStatus::Expired).await.expect("expire");

        assert!(matches!(
            visitor.check_active_quote().await.expect("check"),
            ActiveQuoteCheck::CanCreateNew(ref quote) if quote.status == QuoteStatus::Expired
        ));
        visitor.save_draft(request("pro", None, &[], Step::Customize)).await.expect("new draft");
        assert!(matches!(
            visitor.check_active_quote().await.expect("check"),
            ActiveQuoteCheck::CanCreateNew(_)
        ));
    }

    #[tokio::test]
    async fn deleting_without_an_id_removes_only_the_draft() {
        let pool = setup_pool().await;
        let visitor = gateway(&pool, "visitor-1");
        let other = gateway(&pool, "visitor-2");
        visitor.save_draft(request("pro", None, &[], Step::Customize)).await.expect("save");
        other.save_draft(request("pro", None, &[], Step::Customize)).await.expect("save");

        let first = visitor.delete_quote(None).await.expect("delete");
        let second = visitor.delete_quote(None).await.expect("delete again");

        assert_eq!(first.deleted_count, 1);
        assert_eq!(second.deleted_count, 0);
        assert!(visitor.load_draft().await.expect("load").is_none());
        assert!(other.load_draft().await.expect("load").is_some());
    }

    #[tokio::test]
    async fn progress_updates_the_stored_step() {
        let pool = setup_pool().await;
        let visitor = gateway(&pool, "visitor-1");
        let draft_id =
            visitor.save_draft(request("pro", None, &[], Step::Customize)).await.expect("save");
        let quote_id = pricewise_core::domain::quote::QuoteId::from(&draft_id);

        visitor.update_progress(&quote_id, Step::Optional).await.expect("progress");

        let draft = visitor.load_draft().await.expect("load").expect("draft");
        assert_eq!(draft.last_step, Some(Step::Optional));

        let foreign = gateway(&pool, "visitor-2");
        assert!(matches!(
            foreign.update_progress(&quote_id, Step::Quote).await,
            Err(GatewayError::Rejected(_))
        ));
    }
}
