//! The pricing configurator wizard: step state machine, draft recovery and
//! debounced auto-save.

pub mod autosave;
pub mod controller;
pub mod guards;
pub mod recovery;
pub mod states;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::analytics::{AnalyticsSink, TracingAnalyticsSink};
use crate::catalog::{CatalogError, CatalogLoader};
use crate::domain::catalog::TierId;
use crate::domain::step::Step;
use crate::errors::{ApplicationError, DomainError};
use crate::gateway::{GatewayError, PersistenceGateway};

pub use autosave::{AutosaveScheduler, SaveHandle, SaveStatus};
pub use controller::WizardController;
pub use guards::{ReconcileGuard, RecoveryGuard};
pub use recovery::{fetch_recovery, RecoveredSession, RecoverySource, RecoveryTicket};
pub use states::{
    BackChoice, FailedAction, Notice, RecoveryApplied, RefusalReason, Transition, WizardFailure,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("quote submission failed: {reason}")]
    SubmitFailed { reason: String },
    #[error("draft discard failed: {reason}")]
    DiscardFailed { reason: String },
    #[error("quote deletion failed: {reason}")]
    DeleteFailed { reason: String },
    #[error("cannot submit from the {step} step")]
    NotOnQuoteStep { step: Step },
    #[error("a tier and a level must be selected before submitting")]
    IncompleteSelection,
    #[error("no submitted quote is active")]
    MissingQuote,
    #[error("tier `{}` is not in the catalog", tier.0)]
    UnknownTier { tier: TierId },
    #[error("no `{level}` level is offered for tier `{}`", tier.0)]
    UnknownLevel { tier: TierId, level: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<WizardError> for ApplicationError {
    fn from(value: WizardError) -> Self {
        match value {
            WizardError::Domain(error) => Self::Domain(error),
            WizardError::Catalog(error) => Self::Integration(error.to_string()),
            WizardError::SubmitFailed { .. }
            | WizardError::DiscardFailed { .. }
            | WizardError::DeleteFailed { .. }
            | WizardError::Gateway(_) => Self::Persistence(value.to_string()),
            other => Self::Domain(DomainError::InvariantViolation(other.to_string())),
        }
    }
}

/// Timing knobs, normally derived from `AppConfig::wizard_settings`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WizardSettings {
    pub autosave_debounce: Duration,
    pub discard_suppression: Duration,
    /// Retry a discard once when the store reports nothing was deleted.
    pub discard_retry: bool,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            autosave_debounce: Duration::from_millis(1_000),
            discard_suppression: Duration::from_millis(3_000),
            discard_retry: true,
        }
    }
}

/// The collaborators the wizard talks to.
#[derive(Clone)]
pub struct WizardPorts {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub catalog: Arc<dyn CatalogLoader>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

impl WizardPorts {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, catalog: Arc<dyn CatalogLoader>) -> Self {
        Self { gateway, catalog, analytics: Arc::new(TracingAnalyticsSink) }
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }
}
