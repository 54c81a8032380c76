use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::step::Step;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventKind {
    StepViewed,
    StepAdvanced,
    StepRetreated,
    TierSelected,
    LevelSelected,
    ServicesChanged,
    DraftSaved,
    DraftDiscarded,
    QuoteSubmitted,
    QuoteSubmitFailed,
    RecommendationApplied,
}

impl AnalyticsEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StepViewed => "step_viewed",
            Self::StepAdvanced => "step_advanced",
            Self::StepRetreated => "step_retreated",
            Self::TierSelected => "tier_selected",
            Self::LevelSelected => "level_selected",
            Self::ServicesChanged => "services_changed",
            Self::DraftSaved => "draft_saved",
            Self::DraftDiscarded => "draft_discarded",
            Self::QuoteSubmitted => "quote_submitted",
            Self::QuoteSubmitFailed => "quote_submit_failed",
            Self::RecommendationApplied => "recommendation_applied",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: String,
    pub kind: AnalyticsEventKind,
    pub step: Step,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(kind: AnalyticsEventKind, step: Step) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            kind,
            step,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Fire-and-forget event sink. Implementations must not block and the
/// wizard never depends on delivery.
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: AnalyticsEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAnalyticsSink;

impl AnalyticsSink for NoopAnalyticsSink {
    fn track(&self, _event: AnalyticsEvent) {}
}

/// Writes each event as a structured log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAnalyticsSink;

impl AnalyticsSink for TracingAnalyticsSink {
    fn track(&self, event: AnalyticsEvent) {
        tracing::info!(
            event_name = "analytics.track",
            kind = event.kind.as_str(),
            step = event.step.as_str(),
            event_id = %event.event_id,
            metadata = ?event.metadata,
            "analytics event"
        );
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAnalyticsSink {
    events: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

impl InMemoryAnalyticsSink {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<AnalyticsEventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }
}

impl AnalyticsSink for InMemoryAnalyticsSink {
    fn track(&self, event: AnalyticsEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
