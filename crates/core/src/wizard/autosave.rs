//! Debounced draft saves, one slot per step that completes a choice.
//!
//! Each armed save is a [`SaveHandle`] that can be cancelled, queried or
//! awaited. When a timer fires it sends the cumulative selection held in the
//! shared ledger at that moment, not the value captured when it was armed,
//! so saves that finish out of order still converge on the same draft.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analytics::{AnalyticsEvent, AnalyticsEventKind, AnalyticsSink};
use crate::domain::quote::{ContactPreferences, DraftId, Selection};
use crate::domain::step::Step;
use crate::gateway::{GatewayError, PersistenceGateway, SaveDraftRequest};

pub const AUTOSAVED_STEPS: [Step; 3] = [Step::Browse, Step::Customize, Step::Optional];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveStatus {
    Scheduled,
    InFlight,
    Saved(DraftId),
    Failed(String),
    Cancelled,
}

impl SaveStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Scheduled | Self::InFlight)
    }
}

pub struct SaveHandle {
    step: Step,
    fingerprint: Selection,
    token: CancellationToken,
    status: watch::Receiver<SaveStatus>,
}

impl SaveHandle {
    pub fn step(&self) -> Step {
        self.step
    }

    pub fn fingerprint(&self) -> &Selection {
        &self.fingerprint
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.status.borrow().is_pending()
    }

    /// Resolves once the save has landed, failed or been cancelled.
    pub async fn wait(&self) -> SaveStatus {
        let mut status = self.status.clone();
        loop {
            let current = status.borrow_and_update().clone();
            if !current.is_pending() {
                return current;
            }
            if status.changed().await.is_err() {
                return status.borrow().clone();
            }
        }
    }
}

/// The fields a step's save is keyed on: the selection prefix that step owns.
pub fn step_fingerprint(step: Step, selection: &Selection) -> Option<Selection> {
    match step {
        Step::Browse => selection
            .tier_id
            .as_ref()
            .map(|tier_id| Selection { tier_id: Some(tier_id.clone()), ..Selection::default() }),
        Step::Customize => match (&selection.tier_id, &selection.level_id) {
            (Some(tier_id), Some(level_id)) => Some(Selection {
                tier_id: Some(tier_id.clone()),
                level_id: Some(level_id.clone()),
                service_ids: Vec::new(),
            }),
            _ => None,
        },
        Step::Optional => match (&selection.tier_id, &selection.level_id) {
            (Some(_), Some(_)) => Some(selection.clone()),
            _ => None,
        },
        Step::Quote | Step::Success => None,
    }
}

#[derive(Debug, Default)]
struct SaveLedger {
    generation: u64,
    draft_id: Option<DraftId>,
    selection: Selection,
    contact: Option<ContactPreferences>,
    current_step: Step,
    saved: BTreeMap<Step, Selection>,
}

impl SaveLedger {
    fn request(&self) -> SaveDraftRequest {
        SaveDraftRequest {
            draft_id: self.draft_id.clone(),
            selection: self.selection.clone(),
            contact: self.contact.clone(),
            current_step: self.current_step,
        }
    }

    fn record_saved(&mut self, draft_id: DraftId, steps: impl IntoIterator<Item = (Step, Selection)>) {
        self.draft_id = Some(draft_id);
        self.saved.extend(steps);
    }
}

fn lock(ledger: &Mutex<SaveLedger>) -> MutexGuard<'_, SaveLedger> {
    match ledger.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct AutosaveScheduler {
    debounce: Duration,
    gateway: Arc<dyn PersistenceGateway>,
    analytics: Arc<dyn AnalyticsSink>,
    ledger: Arc<Mutex<SaveLedger>>,
    slots: BTreeMap<Step, SaveHandle>,
}

impl AutosaveScheduler {
    pub fn new(
        debounce: Duration,
        gateway: Arc<dyn PersistenceGateway>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            debounce,
            gateway,
            analytics,
            ledger: Arc::new(Mutex::new(SaveLedger::default())),
            slots: BTreeMap::new(),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn draft_id(&self) -> Option<DraftId> {
        lock(&self.ledger).draft_id.clone()
    }

    pub fn adopt_draft_id(&mut self, draft_id: DraftId) {
        lock(&self.ledger).draft_id = Some(draft_id);
    }

    pub fn is_saved(&self, step: Step, fingerprint: &Selection) -> bool {
        lock(&self.ledger).saved.get(&step) == Some(fingerprint)
    }

    pub fn handle(&self, step: Step) -> Option<&SaveHandle> {
        self.slots.get(&step)
    }

    pub fn pending(&self) -> Vec<(Step, SaveStatus)> {
        self.slots
            .values()
            .map(|handle| (handle.step, handle.status()))
            .filter(|(_, status)| status.is_pending())
            .collect()
    }

    /// Waits for every armed save to finish.
    pub async fn settle(&self) {
        for handle in self.slots.values() {
            handle.wait().await;
        }
    }

    /// Records the latest selection and arms, rearms or cancels each slot.
    pub fn on_change(
        &mut self,
        selection: &Selection,
        contact: Option<&ContactPreferences>,
        current_step: Step,
    ) {
        let generation = {
            let mut ledger = lock(&self.ledger);
            ledger.selection = selection.clone();
            ledger.contact = contact.cloned();
            ledger.current_step = current_step;
            ledger.generation
        };

        for step in AUTOSAVED_STEPS {
            let Some(fingerprint) = self.fingerprint(step, selection) else {
                self.cancel_slot(step);
                continue;
            };

            if self.is_saved(step, &fingerprint) {
                self.cancel_slot(step);
                continue;
            }

            let unchanged = self
                .slots
                .get(&step)
                .is_some_and(|handle| handle.is_pending() && handle.fingerprint == fingerprint);
            if unchanged {
                continue;
            }

            self.cancel_slot(step);
            if let Some(handle) = self.arm(step, fingerprint, generation) {
                self.slots.insert(step, handle);
            }
        }
    }

    pub fn note_step(&mut self, current_step: Step) {
        lock(&self.ledger).current_step = current_step;
    }

    /// Saves immediately, bypassing the debounce. Pending slots are cancelled
    /// and every step the selection covers is marked saved on success.
    pub async fn save_now(
        &mut self,
        selection: &Selection,
        contact: Option<&ContactPreferences>,
        current_step: Step,
    ) -> Result<DraftId, GatewayError> {
        self.cancel_all();
        let (request, generation) = {
            let mut ledger = lock(&self.ledger);
            ledger.selection = selection.clone();
            ledger.contact = contact.cloned();
            ledger.current_step = current_step;
            (ledger.request(), ledger.generation)
        };

        let draft_id = self.gateway.save_draft(request).await?;

        let covered: Vec<(Step, Selection)> = AUTOSAVED_STEPS
            .into_iter()
            .filter_map(|step| step_fingerprint(step, selection).map(|fp| (step, fp)))
            .collect();
        {
            let mut ledger = lock(&self.ledger);
            if ledger.generation == generation {
                ledger.record_saved(draft_id.clone(), covered);
            }
        }

        info!(
            event_name = "wizard.autosave.saved_now",
            draft_id = %draft_id.0,
            step = current_step.as_str(),
            "draft saved immediately"
        );
        self.analytics.track(
            AnalyticsEvent::new(AnalyticsEventKind::DraftSaved, current_step)
                .with_metadata("draft_id", draft_id.0.clone())
                .with_metadata("trigger", "immediate"),
        );
        Ok(draft_id)
    }

    /// Marks the restored prefix as saved so recovery does not trigger a
    /// redundant save.
    pub fn mark_saved_prefix(&mut self, selection: &Selection, current_step: Step) {
        let mut ledger = lock(&self.ledger);
        ledger.selection = selection.clone();
        ledger.current_step = current_step;
        for step in AUTOSAVED_STEPS {
            match step_fingerprint(step, selection) {
                Some(fp) if step != Step::Optional || !fp.service_ids.is_empty() => {
                    ledger.saved.insert(step, fp);
                }
                _ => {}
            }
        }
    }

    pub fn cancel_all(&mut self) {
        let pending = self.slots.values().filter(|handle| handle.is_pending()).count();
        for handle in self.slots.values() {
            handle.cancel();
        }
        self.slots.clear();
        if pending > 0 {
            debug!(event_name = "wizard.autosave.cancelled", pending, "pending autosaves cancelled");
        }
    }

    /// Cancels every slot and forgets the draft. Saves already in flight
    /// finish without being recorded.
    pub fn reset(&mut self) {
        self.cancel_all();
        let mut ledger = lock(&self.ledger);
        ledger.generation += 1;
        ledger.draft_id = None;
        ledger.selection = Selection::default();
        ledger.contact = None;
        ledger.saved.clear();
    }

    fn fingerprint(&self, step: Step, selection: &Selection) -> Option<Selection> {
        let fingerprint = step_fingerprint(step, selection)?;
        // An empty service list only needs saving once something was saved before it.
        if step == Step::Optional
            && fingerprint.service_ids.is_empty()
            && !lock(&self.ledger).saved.contains_key(&step)
        {
            return None;
        }
        Some(fingerprint)
    }

    fn cancel_slot(&mut self, step: Step) {
        if let Some(handle) = self.slots.remove(&step) {
            handle.cancel();
        }
    }

    fn arm(&self, step: Step, fingerprint: Selection, generation: u64) -> Option<SaveHandle> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(
                    event_name = "wizard.autosave.no_runtime",
                    step = step.as_str(),
                    "no async runtime available, autosave skipped"
                );
                return None;
            }
        };

        let token = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(SaveStatus::Scheduled);
        let job = SaveJob {
            step,
            fingerprint: fingerprint.clone(),
            generation,
            delay: self.debounce,
            token: token.clone(),
            status: status_tx,
            gateway: Arc::clone(&self.gateway),
            analytics: Arc::clone(&self.analytics),
            ledger: Arc::clone(&self.ledger),
        };
        runtime.spawn(job.run());

        debug!(
            event_name = "wizard.autosave.armed",
            step = step.as_str(),
            delay_ms = self.debounce.as_millis() as u64,
            "autosave armed"
        );
        Some(SaveHandle { step, fingerprint, token, status: status_rx })
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        for handle in self.slots.values() {
            handle.cancel();
        }
    }
}

struct SaveJob {
    step: Step,
    fingerprint: Selection,
    generation: u64,
    delay: Duration,
    token: CancellationToken,
    status: watch::Sender<SaveStatus>,
    gateway: Arc<dyn PersistenceGateway>,
    analytics: Arc<dyn AnalyticsSink>,
    ledger: Arc<Mutex<SaveLedger>>,
}

impl SaveJob {
    async fn run(self) {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                self.status.send_replace(SaveStatus::Cancelled);
                return;
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        let request = {
            let ledger = lock(&self.ledger);
            (ledger.generation == self.generation).then(|| ledger.request())
        };
        let Some(request) = request else {
            self.status.send_replace(SaveStatus::Cancelled);
            return;
        };

        self.status.send_replace(SaveStatus::InFlight);
        debug!(
            event_name = "wizard.autosave.fired",
            step = self.step.as_str(),
            draft_id = request.draft_id.as_ref().map(|id| id.0.as_str()).unwrap_or("new"),
            "autosave fired"
        );

        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                self.status.send_replace(SaveStatus::Cancelled);
                return;
            }
            result = self.gateway.save_draft(request) => result,
        };

        match result {
            Ok(draft_id) => {
                let recorded = {
                    let mut ledger = lock(&self.ledger);
                    let current = ledger.generation == self.generation;
                    if current {
                        ledger.record_saved(
                            draft_id.clone(),
                            [(self.step, self.fingerprint.clone())],
                        );
                    }
                    current
                };
                if !recorded {
                    self.status.send_replace(SaveStatus::Cancelled);
                    return;
                }

                info!(
                    event_name = "wizard.autosave.saved",
                    step = self.step.as_str(),
                    draft_id = %draft_id.0,
                    "draft autosaved"
                );
                self.analytics.track(
                    AnalyticsEvent::new(AnalyticsEventKind::DraftSaved, self.step)
                        .with_metadata("draft_id", draft_id.0.clone())
                        .with_metadata("trigger", "debounce"),
                );
                self.status.send_replace(SaveStatus::Saved(draft_id));
            }
            Err(error) => {
                warn!(
                    event_name = "wizard.autosave.failed",
                    step = self.step.as_str(),
                    error = %error,
                    "autosave failed, step left unsaved"
                );
                self.status.send_replace(SaveStatus::Failed(error.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{step_fingerprint, AutosaveScheduler, SaveStatus};
    use crate::analytics::{AnalyticsEventKind, InMemoryAnalyticsSink};
    use crate::domain::catalog::{LevelId, ServiceId, TierId};
    use crate::domain::quote::Selection;
    use crate::domain::step::Step;
    use crate::gateway::{InMemoryPersistenceGateway, PersistenceGateway};

    const DEBOUNCE: Duration = Duration::from_millis(1_000);

    fn tier_only(tier: &str) -> Selection {
        Selection { tier_id: Some(TierId(tier.to_string())), ..Selection::default() }
    }

    fn full(tier: &str, level: &str, services: &[&str]) -> Selection {
        Selection {
            tier_id: Some(TierId(tier.to_string())),
            level_id: Some(LevelId(level.to_string())),
            service_ids: services.iter().map(|id| ServiceId(id.to_string())).collect(),
        }
    }

    fn scheduler(
        gateway: &Arc<InMemoryPersistenceGateway>,
        analytics: &InMemoryAnalyticsSink,
    ) -> AutosaveScheduler {
        AutosaveScheduler::new(DEBOUNCE, gateway.clone(), Arc::new(analytics.clone()))
    }

    #[test]
    fn fingerprints_cover_each_step_prefix() {
        let selection = full("pro", "pro-standard", &["seo-setup"]);

        assert_eq!(step_fingerprint(Step::Browse, &selection), Some(tier_only("pro")));
        assert_eq!(
            step_fingerprint(Step::Customize, &selection),
            Some(full("pro", "pro-standard", &[]))
        );
        assert_eq!(step_fingerprint(Step::Optional, &selection), Some(selection.clone()));
        assert_eq!(step_fingerprint(Step::Customize, &tier_only("pro")), None);
        assert_eq!(step_fingerprint(Step::Quote, &selection), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_collapse_into_one_save_of_the_last_value() {
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let analytics = InMemoryAnalyticsSink::default();
        let mut autosave = scheduler(&gateway, &analytics);

        autosave.on_change(&tier_only("starter"), None, Step::Browse);
        tokio::time::advance(Duration::from_millis(400)).await;
        autosave.on_change(&tier_only("pro"), None, Step::Browse);
        tokio::time::advance(Duration::from_millis(400)).await;
        autosave.on_change(&tier_only("ecommerce"), None, Step::Browse);
        autosave.settle().await;

        assert_eq!(gateway.save_calls(), 1);
        let draft = gateway.load_draft().await.expect("load").expect("draft saved");
        assert_eq!(draft.selection, tier_only("ecommerce"));
        assert!(autosave.is_saved(Step::Browse, &tier_only("ecommerce")));
        assert_eq!(autosave.draft_id(), Some(draft.id));
        assert_eq!(analytics.kinds(), vec![AnalyticsEventKind::DraftSaved]);
    }

    #[tokio::test(start_paused = true)]
    async fn saved_value_is_not_saved_again() {
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let analytics = InMemoryAnalyticsSink::default();
        let mut autosave = scheduler(&gateway, &analytics);

        autosave.on_change(&tier_only("pro"), None, Step::Browse);
        autosave.settle().await;
        autosave.on_change(&tier_only("pro"), None, Step::Customize);

        assert!(autosave.pending().is_empty());
        assert_eq!(gateway.save_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn later_saves_carry_the_cumulative_selection() {
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let analytics = InMemoryAnalyticsSink::default();
        let mut autosave = scheduler(&gateway, &analytics);

        autosave.on_change(&tier_only("pro"), None, Step::Browse);
        tokio::time::advance(Duration::from_millis(200)).await;
        autosave.on_change(&full("pro", "pro-base", &["seo-setup"]), None, Step::Optional);
        autosave.settle().await;

        // Browse fired first but already read the newer cumulative payload.
        let draft = gateway.load_draft().await.expect("load").expect("draft saved");
        assert_eq!(draft.selection, full("pro", "pro-base", &["seo-setup"]));
        assert_eq!(gateway.save_calls(), 3);
        assert_eq!(gateway.records().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_stays_unmarked_and_retries_on_next_change() {
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let analytics = InMemoryAnalyticsSink::default();
        let mut autosave = scheduler(&gateway, &analytics);
        gateway.fail_next_saves(1);

        autosave.on_change(&tier_only("pro"), None, Step::Browse);
        let status = autosave.handle(Step::Browse).expect("browse slot armed").wait().await;
        assert!(matches!(status, SaveStatus::Failed(_)));
        assert!(!autosave.is_saved(Step::Browse, &tier_only("pro")));

        autosave.on_change(&tier_only("pro"), None, Step::Browse);
        let status = autosave.handle(Step::Browse).expect("browse slot rearmed").wait().await;
        assert!(matches!(status, SaveStatus::Saved(_)));
        assert_eq!(gateway.save_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_pending_saves() {
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let analytics = InMemoryAnalyticsSink::default();
        let mut autosave = scheduler(&gateway, &analytics);

        autosave.on_change(&full("pro", "pro-base", &[]), None, Step::Optional);
        assert_eq!(autosave.pending().len(), 2);
        autosave.reset();
        tokio::time::sleep(DEBOUNCE * 2).await;

        assert_eq!(gateway.save_calls(), 0);
        assert!(autosave.pending().is_empty());
        assert_eq!(autosave.draft_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_fields_cancel_their_slot() {
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let analytics = InMemoryAnalyticsSink::default();
        let mut autosave = scheduler(&gateway, &analytics);

        autosave.on_change(&full("pro", "pro-base", &["seo-setup"]), None, Step::Optional);
        assert_eq!(autosave.pending().len(), 3);
        autosave.on_change(&tier_only("starter"), None, Step::Browse);

        assert_eq!(autosave.pending(), vec![(Step::Browse, SaveStatus::Scheduled)]);
    }

    #[tokio::test(start_paused = true)]
    async fn save_now_marks_every_covered_step() {
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let analytics = InMemoryAnalyticsSink::default();
        let mut autosave = scheduler(&gateway, &analytics);
        let selection = full("pro", "pro-base", &["seo-setup"]);

        autosave.on_change(&selection, None, Step::Optional);
        let draft_id = autosave.save_now(&selection, None, Step::Optional).await.expect("saved");

        assert_eq!(gateway.save_calls(), 1);
        assert_eq!(autosave.draft_id(), Some(draft_id));
        for step in [Step::Browse, Step::Customize, Step::Optional] {
            let fingerprint = step_fingerprint(step, &selection).expect("covered");
            assert!(autosave.is_saved(step, &fingerprint));
        }
        autosave.on_change(&selection, None, Step::Optional);
        assert!(autosave.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restored_prefix_is_treated_as_saved() {
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let analytics = InMemoryAnalyticsSink::default();
        let mut autosave = scheduler(&gateway, &analytics);
        let selection = full("pro", "pro-base", &["seo-setup", "copywriting"]);

        autosave.mark_saved_prefix(&selection, Step::Quote);
        autosave.on_change(&selection, None, Step::Quote);

        assert!(autosave.pending().is_empty());
        assert_eq!(gateway.save_calls(), 0);
    }
}
