//! Ports to the backing store that keeps drafts and submitted quotes.
//!
//! Every call is asynchronous and fallible, and nothing here promises the
//! store is free of races: two saves for the same visitor may land in any
//! order. Saves always carry the full cumulative selection so concurrent
//! completions converge.

pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quote::{
    ActiveQuote, ContactPreferences, Draft, DraftId, MeetingRequest, QuoteId, QuoteStatus,
    Selection,
};
use crate::domain::step::Step;

pub use memory::InMemoryPersistenceGateway;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("an open quote ({}) blocks a new draft", status.as_str())]
    Blocked { status: QuoteStatus },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDraftRequest {
    pub draft_id: Option<DraftId>,
    pub selection: Selection,
    pub contact: Option<ContactPreferences>,
    pub current_step: Step,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitQuoteRequest {
    pub draft_id: DraftId,
    pub meeting: Option<MeetingRequest>,
    pub quoted_total: Decimal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}

/// What the store knows about the visitor at load time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActiveQuoteCheck {
    None,
    /// A submitted, under-review or accepted quote.
    Active(ActiveQuote),
    /// The latest quote was rejected or expired; a new draft may begin.
    CanCreateNew(ActiveQuote),
    Draft { draft: Draft, current_step: Option<Step> },
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Creates or updates the visitor's single draft.
    async fn save_draft(&self, request: SaveDraftRequest) -> Result<DraftId, GatewayError>;

    async fn load_draft(&self) -> Result<Option<Draft>, GatewayError>;

    async fn check_active_quote(&self) -> Result<ActiveQuoteCheck, GatewayError>;

    /// Converts a draft into a submitted quote.
    async fn submit_quote(&self, request: SubmitQuoteRequest) -> Result<QuoteId, GatewayError>;

    /// Deletes the given record, or the visitor's draft when `quote_id` is `None`.
    async fn delete_quote(&self, quote_id: Option<&QuoteId>)
        -> Result<DeleteOutcome, GatewayError>;

    async fn update_progress(&self, quote_id: &QuoteId, step: Step) -> Result<(), GatewayError>;
}
