use std::sync::Arc;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::autosave::AutosaveScheduler;
use super::guards::{ReconcileGuard, RecoveryGuard};
use super::recovery::{fetch_recovery, RecoveredSession, RecoverySource, RecoveryTicket};
use super::states::{
    BackChoice, FailedAction, Notice, RecoveryApplied, RefusalReason, Transition, WizardFailure,
};
use super::{WizardError, WizardPorts, WizardSettings};
use crate::analytics::{AnalyticsEvent, AnalyticsEventKind};
use crate::catalog::CatalogIndex;
use crate::domain::catalog::{Level, LevelId, Service, Tier};
use crate::domain::configuration::Configuration;
use crate::domain::quote::{
    ActiveQuote, ContactPreferences, DraftId, MeetingRequest, QuoteId, QuoteStatus,
};
use crate::domain::step::Step;
use crate::gateway::{GatewayError, SubmitQuoteRequest};
use crate::recommend::RecommendationResult;

/// Owns the visitor's configuration and every transition applied to it.
///
/// Methods take `&mut self`, so the controller is driven by one task at a
/// time. Gateway calls are the only suspension points; debounced saves and
/// progress reports run as detached tasks that never touch the
/// configuration.
pub struct WizardController {
    ports: WizardPorts,
    settings: WizardSettings,
    configuration: Configuration,
    autosave: AutosaveScheduler,
    contact: Option<ContactPreferences>,
    meeting: Option<MeetingRequest>,
    active_quote: Option<ActiveQuote>,
    last_departed: Option<Step>,
    pending_retreat: Option<Step>,
    recovery: RecoveryGuard,
    reconcile: ReconcileGuard,
    attempts: u64,
    /// Bumped on every visitor mutation; a recovery ticket from an older
    /// epoch must not overwrite newer choices.
    epoch: u64,
    notice: Option<Notice>,
    failure: Option<WizardFailure>,
}

impl WizardController {
    pub fn new(ports: WizardPorts, settings: WizardSettings) -> Self {
        let autosave = AutosaveScheduler::new(
            settings.autosave_debounce,
            Arc::clone(&ports.gateway),
            Arc::clone(&ports.analytics),
        );
        Self {
            ports,
            settings,
            configuration: Configuration::new(),
            autosave,
            contact: None,
            meeting: None,
            active_quote: None,
            last_departed: None,
            pending_retreat: None,
            recovery: RecoveryGuard::Idle,
            reconcile: ReconcileGuard::NotNeeded,
            attempts: 0,
            epoch: 0,
            notice: None,
            failure: None,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn current_step(&self) -> Step {
        self.configuration.current_step()
    }

    pub fn settings(&self) -> &WizardSettings {
        &self.settings
    }

    pub fn draft_id(&self) -> Option<DraftId> {
        self.autosave.draft_id()
    }

    pub fn active_quote(&self) -> Option<&ActiveQuote> {
        self.active_quote.as_ref()
    }

    pub fn contact(&self) -> Option<&ContactPreferences> {
        self.contact.as_ref()
    }

    pub fn meeting(&self) -> Option<&MeetingRequest> {
        self.meeting.as_ref()
    }

    pub fn failure(&self) -> Option<&WizardFailure> {
        self.failure.as_ref()
    }

    pub fn clear_failure(&mut self) {
        self.failure = None;
    }

    /// The informational notice, handed out once.
    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Step the visitor is being asked to confirm a retreat to.
    pub fn pending_confirmation(&self) -> Option<Step> {
        self.pending_retreat
    }

    pub fn recovery_guard(&self) -> RecoveryGuard {
        self.recovery
    }

    pub fn reconcile_guard(&self) -> ReconcileGuard {
        self.reconcile
    }

    pub fn autosave(&self) -> &AutosaveScheduler {
        &self.autosave
    }

    /// Waits until every armed auto-save has finished.
    pub async fn settle_autosave(&self) {
        self.autosave.settle().await;
    }

    /// Whether the forward control should be offered: only after the
    /// visitor came back from a later step, and never on Optional or Quote.
    pub fn can_advance(&self) -> bool {
        let current = self.current_step();
        match current {
            Step::Optional | Step::Quote => false,
            _ => self.last_departed.is_some_and(|departed| departed > current),
        }
    }

    /// Runs a full recovery: begin, fetch through the ports, apply.
    pub async fn initialize(&mut self) -> Result<RecoveryApplied, WizardError> {
        let Some(ticket) = self.begin_recovery() else {
            return Ok(RecoveryApplied::Ignored);
        };

        let fetched =
            fetch_recovery(self.ports.gateway.as_ref(), self.ports.catalog.as_ref()).await;
        match fetched {
            Ok(session) => Ok(self.apply_recovery(ticket, session)),
            Err(error) => {
                self.abandon_recovery(ticket);
                warn!(
                    event_name = "wizard.recovery.failed",
                    error = %error,
                    "could not check for an existing draft or quote"
                );
                Err(error)
            }
        }
    }

    /// Starts a recovery attempt unless one is pending or a discard's
    /// suppression window is still open.
    pub fn begin_recovery(&mut self) -> Option<RecoveryTicket> {
        if !self.recovery.may_begin(Instant::now()) {
            debug!(
                event_name = "wizard.recovery.skipped",
                guard = ?self.recovery,
                "recovery not started"
            );
            return None;
        }

        self.attempts += 1;
        self.recovery = RecoveryGuard::RestorePending { attempt: self.attempts };
        Some(RecoveryTicket { attempt: self.attempts, epoch: self.epoch })
    }

    pub fn abandon_recovery(&mut self, ticket: RecoveryTicket) {
        if self.recovery.accepts(ticket.attempt) {
            self.recovery = RecoveryGuard::Idle;
        }
    }

    pub fn apply_recovery(
        &mut self,
        ticket: RecoveryTicket,
        session: RecoveredSession,
    ) -> RecoveryApplied {
        if !self.recovery.accepts(ticket.attempt) {
            info!(
                event_name = "wizard.recovery.ignored",
                attempt = ticket.attempt,
                guard = ?self.recovery,
                "recovery result arrived after the guard moved on"
            );
            return RecoveryApplied::Ignored;
        }
        self.recovery = RecoveryGuard::Settled;

        if let Some(notice) = session.notice {
            self.notice = Some(notice);
        }

        match session.source {
            RecoverySource::Nothing => {
                debug!(event_name = "wizard.recovery.nothing", "no draft or active quote found");
                RecoveryApplied::NothingFound
            }
            RecoverySource::Draft { draft, .. } if ticket.epoch != self.epoch => {
                if self.autosave.draft_id().is_none() {
                    self.autosave.adopt_draft_id(draft.id.clone());
                }
                info!(
                    event_name = "wizard.recovery.superseded",
                    draft_id = %draft.id.0,
                    "visitor changed the selection first, keeping only the draft id"
                );
                RecoveryApplied::DraftIdAdopted
            }
            RecoverySource::Draft { draft, configuration } => {
                let step = configuration.current_step();
                self.configuration = configuration;
                self.contact = draft.contact.clone();
                self.meeting = None;
                self.active_quote = None;
                self.last_departed = None;
                self.pending_retreat = None;
                self.autosave.adopt_draft_id(draft.id.clone());
                self.autosave.mark_saved_prefix(&self.configuration.selection(), step);

                let placeholders = self.configuration.has_placeholders();
                self.reconcile = ReconcileGuard::after_restore(placeholders);
                info!(
                    event_name = "wizard.recovery.applied",
                    source = "draft",
                    draft_id = %draft.id.0,
                    step = step.as_str(),
                    placeholders,
                    "draft restored"
                );
                self.track(AnalyticsEvent::new(AnalyticsEventKind::StepViewed, step)
                    .with_metadata("source", "draft"));
                RecoveryApplied::Draft { step, placeholders }
            }
            // A submitted quote wins even over newer local choices: the store
            // refuses new drafts while it is active.
            RecoverySource::ActiveQuote { quote, configuration } => {
                self.autosave.reset();
                self.configuration = configuration;
                self.contact = quote.contact.clone();
                self.meeting = quote.meeting.clone();
                self.last_departed = None;
                self.pending_retreat = None;
                self.reconcile =
                    ReconcileGuard::after_restore(self.configuration.has_placeholders());

                let quote_id = quote.id.clone();
                info!(
                    event_name = "wizard.recovery.applied",
                    source = "active_quote",
                    quote_id = %quote_id.0,
                    status = quote.status.as_str(),
                    "active quote restored"
                );
                self.active_quote = Some(quote);
                self.track(AnalyticsEvent::new(AnalyticsEventKind::StepViewed, Step::Success)
                    .with_metadata("source", "active_quote"));
                RecoveryApplied::ActiveQuote { quote_id }
            }
        }
    }

    /// Swaps restored placeholders for catalog entries, at most once per restore.
    pub fn on_catalog_loaded(&mut self, index: &CatalogIndex) -> usize {
        if !self.reconcile.should_reconcile() {
            return 0;
        }

        let replaced = self.configuration.reconcile(index);
        self.reconcile = ReconcileGuard::Reconciled;
        info!(
            event_name = "wizard.reconcile.completed",
            replaced,
            remaining_placeholders = self.configuration.has_placeholders(),
            "placeholders reconciled against the catalog"
        );
        replaced
    }

    /// Loads the full catalog through the port and reconciles placeholders.
    pub async fn reconcile_placeholders(&mut self) -> Result<usize, WizardError> {
        if !self.reconcile.should_reconcile() {
            return Ok(0);
        }
        let tiers = self.ports.catalog.list_tiers().await?;
        let services = self.ports.catalog.list_services(None, None).await?;
        Ok(self.on_catalog_loaded(&CatalogIndex::new(tiers, services)))
    }

    /// Picks a tier. On Browse this completes the step and advances.
    pub fn select_tier(&mut self, tier: Tier) -> Transition {
        if let Some(refused) = self.refuse_if_submitted() {
            return refused;
        }

        let tier_id = tier.id.clone();
        let cleared = self.configuration.set_tier(tier);
        if cleared {
            info!(
                event_name = "wizard.selection.dependents_cleared",
                tier_id = %tier_id.0,
                "tier changed, level and optional services cleared"
            );
        }
        // Past Customize a level is required, so a cleared level sends the
        // visitor back to pick one.
        let from = self.current_step();
        let sent_back = from > Step::Customize && self.configuration.level().is_none();
        if sent_back {
            self.move_to(from, Step::Customize);
        }
        self.touched();
        self.track(
            AnalyticsEvent::new(AnalyticsEventKind::TierSelected, self.current_step())
                .with_metadata("tier_id", tier_id.0)
                .with_metadata("cleared_dependents", cleared.to_string()),
        );

        if sent_back {
            Transition::Moved { from, to: Step::Customize }
        } else if from == Step::Browse {
            self.advance()
        } else {
            Transition::Unchanged { step: from }
        }
    }

    /// Picks a level of the selected tier. On Customize this completes the
    /// step and advances.
    pub fn select_level(&mut self, level: Level) -> Result<Transition, WizardError> {
        if let Some(refused) = self.refuse_if_submitted() {
            return Ok(refused);
        }

        let level_id = level.id.clone();
        self.configuration.set_level(level)?;
        self.touched();
        self.track(
            AnalyticsEvent::new(AnalyticsEventKind::LevelSelected, self.current_step())
                .with_metadata("level_id", level_id.0),
        );

        if self.current_step() == Step::Customize {
            Ok(self.advance())
        } else {
            Ok(Transition::Unchanged { step: self.current_step() })
        }
    }

    pub fn set_services(&mut self, services: Vec<Service>) -> Transition {
        if let Some(refused) = self.refuse_services() {
            return refused;
        }

        self.configuration.set_services(services);
        self.touched();
        self.track_services_changed();
        Transition::Unchanged { step: self.current_step() }
    }

    pub fn toggle_service(&mut self, service: Service) -> Transition {
        if let Some(refused) = self.refuse_services() {
            return refused;
        }

        let service_id = service.id.clone();
        let selected = self.configuration.toggle_service(service);
        debug!(
            event_name = "wizard.selection.service_toggled",
            service_id = %service_id.0,
            selected,
            "optional service toggled"
        );
        self.touched();
        self.track_services_changed();
        Transition::Unchanged { step: self.current_step() }
    }

    pub fn set_contact(&mut self, contact: ContactPreferences) -> Transition {
        if let Some(refused) = self.refuse_if_submitted() {
            return refused;
        }
        self.contact = Some(contact);
        self.touched();
        Transition::Unchanged { step: self.current_step() }
    }

    pub fn set_meeting(&mut self, meeting: MeetingRequest) -> Transition {
        if let Some(refused) = self.refuse_if_submitted() {
            return refused;
        }
        self.meeting = Some(meeting);
        self.epoch += 1;
        Transition::Unchanged { step: self.current_step() }
    }

    /// Applies a scorer result as if the visitor had made the choice.
    pub async fn apply_recommendation(
        &mut self,
        result: &RecommendationResult,
    ) -> Result<Transition, WizardError> {
        if let Some(refused) = self.refuse_if_submitted() {
            return Ok(refused);
        }

        let (transition, kind) = match result {
            RecommendationResult::Tier(recommendation) => {
                let tier_id = recommendation.pick.tier_id();
                let tier = self
                    .ports
                    .catalog
                    .list_tiers()
                    .await?
                    .into_iter()
                    .find(|tier| tier.id == tier_id && !tier.is_placeholder())
                    .ok_or(WizardError::UnknownTier { tier: tier_id })?;
                (self.select_tier(tier), "tier")
            }
            RecommendationResult::Level(recommendation) => {
                let Some(tier) = self.configuration.tier().cloned() else {
                    return Ok(Transition::Refused { reason: RefusalReason::TierRequired });
                };
                let slug = recommendation.pick.as_str();
                let expected = LevelId(format!("{}-{slug}", tier.id.0));
                let level = tier
                    .levels
                    .iter()
                    .find(|level| level.id == expected || level.name.eq_ignore_ascii_case(slug))
                    .cloned()
                    .ok_or_else(|| WizardError::UnknownLevel {
                        tier: tier.id.clone(),
                        level: slug.to_string(),
                    })?;
                (self.select_level(level)?, "level")
            }
            RecommendationResult::Services(recommendation) => {
                let (Some(tier), Some(level)) =
                    (self.configuration.tier(), self.configuration.level())
                else {
                    return Ok(Transition::Refused { reason: RefusalReason::LevelRequired });
                };
                let (tier_id, level_id) = (tier.id.clone(), level.id.clone());
                let available =
                    self.ports.catalog.list_services(Some(&tier_id), Some(&level_id)).await?;
                let services: Vec<Service> = recommendation
                    .pick
                    .iter()
                    .filter_map(|id| available.iter().find(|service| &service.id == id).cloned())
                    .collect();
                (self.set_services(services), "services")
            }
        };

        if !transition.is_refused() {
            self.track(
                AnalyticsEvent::new(AnalyticsEventKind::RecommendationApplied, self.current_step())
                    .with_metadata("kind", kind),
            );
        }
        Ok(transition)
    }

    pub fn advance(&mut self) -> Transition {
        let from = self.current_step();
        let refusal = match from {
            Step::Success => Some(RefusalReason::NoNextStep),
            Step::Quote => Some(RefusalReason::SubmitRequired),
            Step::Browse if self.configuration.tier().is_none() => {
                Some(RefusalReason::TierRequired)
            }
            Step::Customize | Step::Optional if self.configuration.level().is_none() => {
                Some(RefusalReason::LevelRequired)
            }
            _ => None,
        };
        if let Some(reason) = refusal {
            return Transition::Refused { reason };
        }

        let Some(to) = from.next() else {
            return Transition::Refused { reason: RefusalReason::NoNextStep };
        };
        self.move_to(from, to);
        self.report_progress(to);
        Transition::Moved { from, to }
    }

    /// Steps back once. Customize to Browse waits for [`Self::confirm_retreat`].
    pub fn retreat(&mut self) -> Transition {
        let from = self.current_step();
        match from {
            Step::Browse => Transition::Refused { reason: RefusalReason::NoPreviousStep },
            Step::Success => Transition::Refused { reason: RefusalReason::QuoteSubmitted },
            Step::Customize => self.request_confirmation(from, Step::Browse),
            _ => match from.previous() {
                Some(to) => {
                    self.move_to(from, to);
                    Transition::Moved { from, to }
                }
                None => Transition::Refused { reason: RefusalReason::NoPreviousStep },
            },
        }
    }

    /// Step indicator click: only completed steps or the next one are
    /// reachable, and only when their required choices exist.
    pub fn jump_to(&mut self, target: Step) -> Transition {
        let from = self.current_step();
        if from == Step::Success {
            return Transition::Refused { reason: RefusalReason::QuoteSubmitted };
        }
        if target == from {
            return Transition::Unchanged { step: from };
        }
        if target == Step::Success {
            return Transition::Refused { reason: RefusalReason::SubmitRequired };
        }

        let reachable = self.configuration.is_completed(target) || from.next() == Some(target);
        if !reachable {
            return Transition::Refused { reason: RefusalReason::NotReachable };
        }
        if let Some(reason) = self.missing_prerequisite(target) {
            return Transition::Refused { reason };
        }
        if from == Step::Customize && target == Step::Browse {
            return self.request_confirmation(from, target);
        }

        self.move_to(from, target);
        if target > from {
            self.report_progress(target);
        }
        Transition::Moved { from, to: target }
    }

    /// Resolves a pending Customize to Browse confirmation.
    pub async fn confirm_retreat(&mut self, choice: BackChoice) -> Transition {
        let Some(to) = self.pending_retreat.take() else {
            return Transition::Refused { reason: RefusalReason::NoPendingConfirmation };
        };
        let from = self.current_step();

        match choice {
            BackChoice::Cancel => {
                debug!(event_name = "wizard.retreat.cancelled", step = from.as_str(), "retreat cancelled");
                Transition::Unchanged { step: from }
            }
            BackChoice::SaveAndGoBack => {
                let selection = self.configuration.selection();
                if let Err(error) =
                    self.autosave.save_now(&selection, self.contact.as_ref(), from).await
                {
                    warn!(
                        event_name = "wizard.retreat.save_failed",
                        step = from.as_str(),
                        error = %error,
                        "save before going back failed, retreating anyway"
                    );
                }
                self.move_to(from, to);
                Transition::Moved { from, to }
            }
            BackChoice::DiscardAndGoBack => {
                self.discard(from).await;
                Transition::Moved { from, to: Step::Browse }
            }
        }
    }

    /// Saves the draft and converts it into a submitted quote.
    pub async fn submit_quote(&mut self) -> Result<ActiveQuote, WizardError> {
        let step = self.current_step();
        if step != Step::Quote {
            return Err(WizardError::NotOnQuoteStep { step });
        }
        if self.configuration.tier().is_none() || self.configuration.level().is_none() {
            return Err(WizardError::IncompleteSelection);
        }

        let selection = self.configuration.selection();
        let draft_id =
            match self.autosave.save_now(&selection, self.contact.as_ref(), Step::Quote).await {
                Ok(draft_id) => draft_id,
                Err(error) => return Err(self.submit_failed(&error)),
            };

        let total_price = self.configuration.total_price();
        let request = SubmitQuoteRequest {
            draft_id: draft_id.clone(),
            meeting: self.meeting.clone(),
            quoted_total: total_price,
        };
        let quote_id = match self.ports.gateway.submit_quote(request).await {
            Ok(quote_id) => quote_id,
            Err(error) => return Err(self.submit_failed(&error)),
        };

        let quote = ActiveQuote {
            id: quote_id,
            status: QuoteStatus::Submitted,
            selection,
            contact: self.contact.clone(),
            meeting: self.meeting.clone(),
            total_price,
            submitted_at: Some(Utc::now()),
        };

        self.autosave.reset();
        self.failure = None;
        self.epoch += 1;
        self.move_to(Step::Quote, Step::Success);
        self.active_quote = Some(quote.clone());

        info!(
            event_name = "wizard.quote.submitted",
            quote_id = %quote.id.0,
            draft_id = %draft_id.0,
            total_price = %total_price,
            "quote submitted"
        );
        self.track(
            AnalyticsEvent::new(AnalyticsEventKind::QuoteSubmitted, Step::Success)
                .with_metadata("quote_id", quote.id.0.clone())
                .with_metadata("total_price", total_price.to_string()),
        );
        Ok(quote)
    }

    /// Success to Quote: withdraws the active quote and keeps the selection
    /// so the visitor can adjust and submit again.
    pub async fn request_another_quote(&mut self) -> Result<Transition, WizardError> {
        if self.current_step() != Step::Success {
            return Ok(Transition::Refused { reason: RefusalReason::NotReachable });
        }
        let Some(quote_id) = self.active_quote.as_ref().map(|quote| quote.id.clone()) else {
            return Err(WizardError::MissingQuote);
        };

        if let Err(error) = self.ports.gateway.delete_quote(Some(&quote_id)).await {
            let error = WizardError::DeleteFailed { reason: error.to_string() };
            warn!(
                event_name = "wizard.quote.delete_failed",
                quote_id = %quote_id.0,
                error = %error,
                "could not withdraw the active quote"
            );
            self.record_failure(FailedAction::Delete, &error);
            return Err(error);
        }

        self.active_quote = None;
        self.autosave.reset();
        self.failure = None;
        self.epoch += 1;
        self.recovery = RecoveryGuard::Settled;
        self.move_to(Step::Success, Step::Quote);
        info!(
            event_name = "wizard.quote.reopened",
            quote_id = %quote_id.0,
            "active quote withdrawn for another request"
        );
        Ok(Transition::Moved { from: Step::Success, to: Step::Quote })
    }

    /// Cancels every pending auto-save. Call when the visitor leaves the flow.
    pub fn close(&mut self) {
        self.autosave.cancel_all();
        self.pending_retreat = None;
    }

    async fn discard(&mut self, from: Step) {
        let draft_id = self.autosave.draft_id();
        self.autosave.reset();
        self.configuration.clear();
        self.contact = None;
        self.meeting = None;
        self.active_quote = None;
        self.reconcile = ReconcileGuard::NotNeeded;
        self.epoch += 1;

        let target = draft_id.as_ref().map(QuoteId::from);
        let outcome = self.delete_with_retry(target.as_ref()).await;
        self.recovery =
            RecoveryGuard::SuppressedUntil(Instant::now() + self.settings.discard_suppression);

        let confirmed = match outcome {
            Ok(deleted_count) => {
                self.failure = None;
                info!(
                    event_name = "wizard.discard.completed",
                    draft_id = draft_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
                    deleted_count,
                    "draft discarded"
                );
                deleted_count > 0
            }
            Err(error) => {
                let error = WizardError::DiscardFailed { reason: error.to_string() };
                warn!(
                    event_name = "wizard.discard.failed",
                    error = %error,
                    "draft delete failed, local state cleared anyway"
                );
                self.record_failure(FailedAction::Discard, &error);
                false
            }
        };

        self.configuration.set_current_step(Step::Browse);
        self.last_departed = None;
        self.pending_retreat = None;
        self.autosave.note_step(Step::Browse);
        self.track(
            AnalyticsEvent::new(AnalyticsEventKind::DraftDiscarded, from)
                .with_metadata("server_confirmed", confirmed.to_string()),
        );
    }

    async fn delete_with_retry(&self, target: Option<&QuoteId>) -> Result<u64, GatewayError> {
        let first = self.ports.gateway.delete_quote(target).await?;
        if first.deleted_count > 0 || !self.settings.discard_retry {
            return Ok(first.deleted_count);
        }

        debug!(event_name = "wizard.discard.retry", "store reported nothing deleted, retrying once");
        let second = self.ports.gateway.delete_quote(target).await?;
        if second.deleted_count == 0 {
            warn!(
                event_name = "wizard.discard.unconfirmed",
                "store still reports nothing deleted after retry"
            );
        }
        Ok(second.deleted_count)
    }

    fn move_to(&mut self, from: Step, to: Step) {
        if to > from {
            self.configuration.mark_completed(from);
        }
        self.configuration.set_current_step(to);
        self.last_departed = Some(from);
        self.pending_retreat = None;
        self.autosave.note_step(to);

        let (event_name, kind) = if to > from {
            ("wizard.step.advanced", AnalyticsEventKind::StepAdvanced)
        } else {
            ("wizard.step.retreated", AnalyticsEventKind::StepRetreated)
        };
        info!(event_name = event_name, from = from.as_str(), to = to.as_str(), "wizard step changed");
        self.track(AnalyticsEvent::new(kind, to).with_metadata("from", from.as_str()));
    }

    fn request_confirmation(&mut self, from: Step, to: Step) -> Transition {
        self.pending_retreat = Some(to);
        debug!(
            event_name = "wizard.retreat.confirmation_required",
            from = from.as_str(),
            to = to.as_str(),
            "retreat needs confirmation"
        );
        Transition::ConfirmationRequired { from, to }
    }

    fn missing_prerequisite(&self, target: Step) -> Option<RefusalReason> {
        let has_tier = self.configuration.tier().is_some();
        let has_level = self.configuration.level().is_some();
        match target {
            Step::Browse => None,
            Step::Customize if !has_tier => Some(RefusalReason::TierRequired),
            Step::Optional | Step::Quote if !has_tier => Some(RefusalReason::TierRequired),
            Step::Optional | Step::Quote if !has_level => Some(RefusalReason::LevelRequired),
            _ => None,
        }
    }

    fn refuse_if_submitted(&self) -> Option<Transition> {
        (self.current_step() == Step::Success)
            .then_some(Transition::Refused { reason: RefusalReason::QuoteSubmitted })
    }

    fn refuse_services(&self) -> Option<Transition> {
        self.refuse_if_submitted().or_else(|| {
            self.configuration
                .level()
                .is_none()
                .then_some(Transition::Refused { reason: RefusalReason::LevelRequired })
        })
    }

    /// Records a visitor mutation and hands the new selection to auto-save.
    fn touched(&mut self) {
        self.epoch += 1;
        let selection = self.configuration.selection();
        let step = self.configuration.current_step();
        self.autosave.on_change(&selection, self.contact.as_ref(), step);
    }

    fn submit_failed(&mut self, error: &GatewayError) -> WizardError {
        let error = WizardError::SubmitFailed { reason: error.to_string() };
        warn!(event_name = "wizard.quote.submit_failed", error = %error, "quote submission failed");
        self.record_failure(FailedAction::Submit, &error);
        self.track(
            AnalyticsEvent::new(AnalyticsEventKind::QuoteSubmitFailed, Step::Quote)
                .with_metadata("reason", error.to_string()),
        );
        error
    }

    fn record_failure(&mut self, action: FailedAction, error: &WizardError) {
        self.failure = Some(WizardFailure { action, message: error.to_string() });
    }

    /// Best-effort progress report; never awaited.
    fn report_progress(&self, step: Step) {
        let Some(draft_id) = self.autosave.draft_id() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            return;
        };

        let gateway = Arc::clone(&self.ports.gateway);
        let quote_id = QuoteId::from(&draft_id);
        runtime.spawn(async move {
            if let Err(error) = gateway.update_progress(&quote_id, step).await {
                debug!(
                    event_name = "wizard.progress.failed",
                    quote_id = %quote_id.0,
                    step = step.as_str(),
                    error = %error,
                    "progress report failed"
                );
            }
        });
    }

    fn track_services_changed(&self) {
        self.track(
            AnalyticsEvent::new(AnalyticsEventKind::ServicesChanged, self.current_step())
                .with_metadata(
                    "selected_count",
                    self.configuration.optional_services().count().to_string(),
                ),
        );
    }

    fn track(&self, event: AnalyticsEvent) {
        self.ports.analytics.track(event);
    }
}
