use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{
    ActiveQuoteCheck, DeleteOutcome, GatewayError, PersistenceGateway, SaveDraftRequest,
    SubmitQuoteRequest,
};
use crate::domain::quote::{Draft, DraftId, QuoteId, QuoteRequest, QuoteStatus};
use crate::domain::step::Step;
use crate::errors::DomainError;

/// Single-visitor store used by tests and the smoke run. Failures can be
/// injected to exercise the wizard's error paths.
#[derive(Default)]
pub struct InMemoryPersistenceGateway {
    records: RwLock<Vec<QuoteRequest>>,
    next_id: AtomicU64,
    save_latency: Option<Duration>,
    failing_saves: AtomicU32,
    failing_submits: AtomicBool,
    failing_deletes: AtomicBool,
    zero_delete_reports: AtomicU32,
    save_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    progress_calls: AtomicUsize,
}

impl InMemoryPersistenceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: QuoteRequest) -> Self {
        self.records.get_mut().push(record);
        self
    }

    pub fn with_save_latency(mut self, latency: Duration) -> Self {
        self.save_latency = Some(latency);
        self
    }

    pub fn fail_next_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub fn fail_submits(&self, failing: bool) {
        self.failing_submits.store(failing, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    /// The next `count` deletes report zero rows without deleting anything.
    pub fn report_zero_deletes(&self, count: u32) {
        self.zero_delete_reports.store(count, Ordering::SeqCst);
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn progress_calls(&self) -> usize {
        self.progress_calls.load(Ordering::SeqCst)
    }

    pub async fn records(&self) -> Vec<QuoteRequest> {
        self.records.read().await.clone()
    }

    /// Moves a stored quote through its review lifecycle.
    pub async fn set_status(&self, id: &QuoteId, status: QuoteStatus) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records.iter_mut().find(|record| record.id == id.0).ok_or_else(|| {
            DomainError::InvariantViolation(format!("no quote request `{}`", id.0))
        })?;
        record.transition_to(status)
    }

    fn take_injected(counter: &AtomicU32) -> bool {
        counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryPersistenceGateway {
    async fn save_draft(&self, request: SaveDraftRequest) -> Result<DraftId, GatewayError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.save_latency {
            tokio::time::sleep(latency).await;
        }
        if Self::take_injected(&self.failing_saves) {
            return Err(GatewayError::Unavailable("injected save failure".to_string()));
        }

        let mut records = self.records.write().await;
        if let Some(blocking) = records.iter().find(|record| record.status.blocks_new_draft()) {
            return Err(GatewayError::Blocked { status: blocking.status });
        }

        let now = Utc::now();
        if let Some(draft) = records.iter_mut().find(|record| record.status == QuoteStatus::Draft) {
            draft.selection = request.selection;
            if request.contact.is_some() {
                draft.contact = request.contact;
            }
            draft.current_step = Some(request.current_step);
            draft.updated_at = now;
            return Ok(DraftId(draft.id.clone()));
        }

        let id = format!("QR-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        records.push(QuoteRequest {
            id: id.clone(),
            status: QuoteStatus::Draft,
            selection: request.selection,
            contact: request.contact,
            meeting: None,
            current_step: Some(request.current_step),
            total_price: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            submitted_at: None,
        });
        Ok(DraftId(id))
    }

    async fn load_draft(&self) -> Result<Option<Draft>, GatewayError> {
        Ok(self.records.read().await.iter().find_map(QuoteRequest::as_draft))
    }

    async fn check_active_quote(&self) -> Result<ActiveQuoteCheck, GatewayError> {
        let records = self.records.read().await;

        if let Some(active) = records
            .iter()
            .rev()
            .filter(|record| record.status.blocks_new_draft())
            .find_map(QuoteRequest::as_active_quote)
        {
            return Ok(ActiveQuoteCheck::Active(active));
        }

        if let Some(closed) = records
            .iter()
            .filter(|record| record.status.is_closed())
            .max_by_key(|record| record.updated_at)
            .and_then(QuoteRequest::as_active_quote)
        {
            return Ok(ActiveQuoteCheck::CanCreateNew(closed));
        }

        Ok(match records.iter().find_map(QuoteRequest::as_draft) {
            Some(draft) => {
                let current_step = draft.last_step;
                ActiveQuoteCheck::Draft { draft, current_step }
            }
            None => ActiveQuoteCheck::None,
        })
    }

    async fn submit_quote(&self, request: SubmitQuoteRequest) -> Result<QuoteId, GatewayError> {
        if self.failing_submits.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("injected submit failure".to_string()));
        }

        let mut records = self.records.write().await;
        if let Some(blocking) = records.iter().find(|record| record.status.blocks_new_draft()) {
            return Err(GatewayError::Blocked { status: blocking.status });
        }

        let draft = records
            .iter_mut()
            .find(|record| record.id == request.draft_id.0 && record.status == QuoteStatus::Draft)
            .ok_or_else(|| {
                GatewayError::Rejected(format!("no draft `{}` to submit", request.draft_id.0))
            })?;
        draft
            .transition_to(QuoteStatus::Submitted)
            .map_err(|error| GatewayError::Rejected(error.to_string()))?;
        draft.meeting = request.meeting;
        draft.total_price = request.quoted_total;
        draft.current_step = Some(Step::Success);

        Ok(QuoteId(draft.id.clone()))
    }

    async fn delete_quote(
        &self,
        quote_id: Option<&QuoteId>,
    ) -> Result<DeleteOutcome, GatewayError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("injected delete failure".to_string()));
        }
        if Self::take_injected(&self.zero_delete_reports) {
            return Ok(DeleteOutcome { deleted_count: 0 });
        }

        let mut records = self.records.write().await;
        let before = records.len();
        match quote_id {
            Some(id) => records.retain(|record| record.id != id.0),
            None => records.retain(|record| record.status != QuoteStatus::Draft),
        }
        Ok(DeleteOutcome { deleted_count: (before - records.len()) as u64 })
    }

    async fn update_progress(&self, quote_id: &QuoteId, step: Step) -> Result<(), GatewayError> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|record| record.id == quote_id.0)
            .ok_or_else(|| GatewayError::Rejected(format!("no quote request `{}`", quote_id.0)))?;
        record.current_step = Some(step);
        record.updated_at = Utc::now();
        Ok(())
    }
}
