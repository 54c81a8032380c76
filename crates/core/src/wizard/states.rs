use serde::{Deserialize, Serialize};

use crate::domain::quote::{QuoteId, QuoteStatus};
use crate::domain::step::Step;

/// Result of a navigation or selection request. Refusals are values, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Moved { from: Step, to: Step },
    /// Nothing moved yet; the visitor must answer with a [`BackChoice`].
    ConfirmationRequired { from: Step, to: Step },
    Refused { reason: RefusalReason },
    Unchanged { step: Step },
}

impl Transition {
    pub fn is_moved(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    NoPreviousStep,
    NoNextStep,
    TierRequired,
    LevelRequired,
    SubmitRequired,
    QuoteSubmitted,
    NotReachable,
    NoPendingConfirmation,
}

impl RefusalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoPreviousStep => "no_previous_step",
            Self::NoNextStep => "no_next_step",
            Self::TierRequired => "tier_required",
            Self::LevelRequired => "level_required",
            Self::SubmitRequired => "submit_required",
            Self::QuoteSubmitted => "quote_submitted",
            Self::NotReachable => "not_reachable",
            Self::NoPendingConfirmation => "no_pending_confirmation",
        }
    }
}

/// Answer to the Customize to Browse confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackChoice {
    SaveAndGoBack,
    DiscardAndGoBack,
    Cancel,
}

/// Informational message surfaced once to the visitor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    PreviousQuoteClosed { quote_id: QuoteId, status: QuoteStatus },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Self::PreviousQuoteClosed { status, .. } => format!(
                "Your previous quote was {}. You can start a new configuration.",
                status.as_str().replace('_', " ")
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedAction {
    Submit,
    Discard,
    Delete,
}

/// User-visible failure left behind by an explicit action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardFailure {
    pub action: FailedAction,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryApplied {
    /// The guard no longer expected this result, e.g. a discard happened meanwhile.
    Ignored,
    NothingFound,
    ActiveQuote { quote_id: QuoteId },
    Draft { step: Step, placeholders: bool },
    /// The visitor changed the selection first; only the draft id was kept.
    DraftIdAdopted,
}

#[cfg(test)]
mod tests {
    use super::{Notice, RefusalReason, Transition};
    use crate::domain::quote::{QuoteId, QuoteStatus};
    use crate::domain::step::Step;

    #[test]
    fn transition_serializes_with_kind_tag() {
        let json = serde_json::to_value(Transition::Refused { reason: RefusalReason::TierRequired })
            .expect("serialize transition");

        assert_eq!(json["kind"], "refused");
        assert_eq!(json["reason"], "tier_required");

        let moved = Transition::Moved { from: Step::Browse, to: Step::Customize };
        assert!(moved.is_moved());
        assert!(!moved.is_refused());
    }

    #[test]
    fn closed_quote_notice_names_the_status() {
        let notice = Notice::PreviousQuoteClosed {
            quote_id: QuoteId("QR-0001".to_string()),
            status: QuoteStatus::UnderReview,
        };
        assert!(notice.message().contains("under review"));
    }
}
