//! Rebuilds a configuration from whatever the store holds for the visitor.
//!
//! Fetching only touches the ports so it can run while the visitor keeps
//! interacting; the controller decides afterwards whether the result still
//! applies (see `WizardController::apply_recovery`).

use tracing::{debug, warn};

use super::states::Notice;
use super::WizardError;
use crate::catalog::CatalogLoader;
use crate::domain::catalog::{Level, Service, Tier};
use crate::domain::configuration::Configuration;
use crate::domain::quote::{ActiveQuote, Draft, Selection};
use crate::domain::step::Step;
use crate::gateway::{ActiveQuoteCheck, PersistenceGateway};

/// Issued by `begin_recovery`; ties a fetched result to the attempt and the
/// interaction epoch it started from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryTicket {
    pub(crate) attempt: u64,
    pub(crate) epoch: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecoverySource {
    Nothing,
    ActiveQuote { quote: ActiveQuote, configuration: Configuration },
    Draft { draft: Draft, configuration: Configuration },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecoveredSession {
    pub source: RecoverySource,
    pub notice: Option<Notice>,
}

impl RecoveredSession {
    fn nothing(notice: Option<Notice>) -> Self {
        Self { source: RecoverySource::Nothing, notice }
    }
}

/// Queries the store and resolves stored ids against the catalog.
pub async fn fetch_recovery(
    gateway: &dyn PersistenceGateway,
    catalog: &dyn CatalogLoader,
) -> Result<RecoveredSession, WizardError> {
    match gateway.check_active_quote().await? {
        ActiveQuoteCheck::None => Ok(RecoveredSession::nothing(None)),
        ActiveQuoteCheck::Active(quote) => {
            let configuration = resolve_configuration(catalog, &quote.selection, Step::Success).await;
            Ok(RecoveredSession {
                source: RecoverySource::ActiveQuote { quote, configuration },
                notice: None,
            })
        }
        ActiveQuoteCheck::CanCreateNew(closed) => {
            let notice = Some(Notice::PreviousQuoteClosed {
                quote_id: closed.id.clone(),
                status: closed.status,
            });
            match gateway.load_draft().await? {
                Some(draft) => {
                    let last_step = draft.last_step;
                    recover_draft(catalog, draft, last_step, notice).await
                }
                None => Ok(RecoveredSession::nothing(notice)),
            }
        }
        ActiveQuoteCheck::Draft { draft, current_step } => {
            let last_step = current_step.or(draft.last_step);
            recover_draft(catalog, draft, last_step, None).await
        }
    }
}

async fn recover_draft(
    catalog: &dyn CatalogLoader,
    draft: Draft,
    last_step: Option<Step>,
    notice: Option<Notice>,
) -> Result<RecoveredSession, WizardError> {
    let step = derive_step(&draft.selection, last_step);
    let configuration = resolve_configuration(catalog, &draft.selection, step).await;
    Ok(RecoveredSession { source: RecoverySource::Draft { draft, configuration }, notice })
}

/// Step a restored draft resumes on. A stored step wins over what the
/// populated fields imply, but never passes the first step whose choice is
/// missing; drafts never resume past `Quote`.
pub fn derive_step(selection: &Selection, stored: Option<Step>) -> Step {
    let ceiling = if selection.level_id.is_some() {
        Step::Quote
    } else if selection.tier_id.is_some() {
        Step::Customize
    } else {
        Step::Browse
    };
    if let Some(step) = stored {
        return step.min(ceiling);
    }
    if !selection.service_ids.is_empty() {
        Step::Quote
    } else if selection.level_id.is_some() {
        Step::Optional
    } else if selection.tier_id.is_some() {
        Step::Customize
    } else {
        Step::Browse
    }
}

/// Resolves ids into catalog objects. Anything the catalog cannot match,
/// including a catalog that fails to load, becomes an id-only placeholder.
pub async fn resolve_configuration(
    catalog: &dyn CatalogLoader,
    selection: &Selection,
    step: Step,
) -> Configuration {
    let tiers = if selection.tier_id.is_some() {
        match catalog.list_tiers().await {
            Ok(tiers) => tiers,
            Err(error) => {
                warn!(
                    event_name = "wizard.recovery.catalog_unavailable",
                    error = %error,
                    "tier catalog unavailable, restoring placeholders"
                );
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let tier = selection.tier_id.as_ref().map(|tier_id| {
        tiers
            .iter()
            .find(|tier| &tier.id == tier_id)
            .cloned()
            .unwrap_or_else(|| Tier::placeholder(tier_id.clone()))
    });

    let level = match (&tier, &selection.level_id) {
        (Some(tier), Some(level_id)) => Some(
            tier.level(level_id)
                .cloned()
                .unwrap_or_else(|| Level::placeholder(tier.id.clone(), level_id.clone())),
        ),
        _ => None,
    };

    let services = if selection.service_ids.is_empty() {
        Vec::new()
    } else {
        let available = catalog
            .list_services(selection.tier_id.as_ref(), selection.level_id.as_ref())
            .await
            .unwrap_or_else(|error| {
                warn!(
                    event_name = "wizard.recovery.catalog_unavailable",
                    error = %error,
                    "service catalog unavailable, restoring placeholders"
                );
                Vec::new()
            });
        selection
            .service_ids
            .iter()
            .map(|id| {
                available
                    .iter()
                    .find(|service| &service.id == id)
                    .cloned()
                    .unwrap_or_else(|| Service::placeholder(id.clone()))
            })
            .collect()
    };

    let configuration = Configuration::restore(tier, level, services, step);
    if configuration.has_placeholders() {
        debug!(
            event_name = "wizard.recovery.placeholders",
            step = step.as_str(),
            "restored selection kept unresolved references as placeholders"
        );
    }
    configuration
}
