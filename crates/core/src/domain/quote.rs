use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{LevelId, ServiceId, TierId};
use crate::domain::step::Step;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl From<&DraftId> for QuoteId {
    fn from(value: &DraftId) -> Self {
        Self(value.0.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    Expired,
}

impl QuoteStatus {
    /// Rejected and expired quotes leave room for a new draft; every other
    /// submitted status holds the visitor's single active slot.
    pub fn blocks_new_draft(self) -> bool {
        matches!(self, Self::Submitted | Self::UnderReview | Self::Accepted)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Rejected | Self::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for QuoteStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "under_review" => Ok(Self::UnderReview),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            other => Err(DomainError::InvariantViolation(format!("unknown quote status `{other}`"))),
        }
    }
}

/// Id-only snapshot of a configuration, the shape drafts and quotes persist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub tier_id: Option<TierId>,
    pub level_id: Option<LevelId>,
    pub service_ids: Vec<ServiceId>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.tier_id.is_none() && self.level_id.is_none() && self.service_ids.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPreferences {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub preferred_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub preferred_date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    pub selection: Selection,
    pub contact: Option<ContactPreferences>,
    pub last_step: Option<Step>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveQuote {
    pub id: QuoteId,
    pub status: QuoteStatus,
    pub selection: Selection,
    pub contact: Option<ContactPreferences>,
    pub meeting: Option<MeetingRequest>,
    pub total_price: Decimal,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// The stored record behind both drafts and submitted quotes. A draft is a
/// request whose status is still `Draft`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub id: String,
    pub status: QuoteStatus,
    pub selection: Selection,
    pub contact: Option<ContactPreferences>,
    pub meeting: Option<MeetingRequest>,
    pub current_step: Option<Step>,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl QuoteRequest {
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        matches!(
            (self.status, next),
            (QuoteStatus::Draft, QuoteStatus::Submitted)
                | (QuoteStatus::Submitted, QuoteStatus::UnderReview)
                | (QuoteStatus::Submitted, QuoteStatus::Accepted)
                | (QuoteStatus::Submitted, QuoteStatus::Rejected)
                | (QuoteStatus::UnderReview, QuoteStatus::Accepted)
                | (QuoteStatus::UnderReview, QuoteStatus::Rejected)
                | (QuoteStatus::Submitted, QuoteStatus::Expired)
                | (QuoteStatus::UnderReview, QuoteStatus::Expired)
                | (QuoteStatus::Accepted, QuoteStatus::Expired)
        )
    }

    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            if next == QuoteStatus::Submitted {
                self.submitted_at = Some(self.updated_at);
            }
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }

    pub fn as_draft(&self) -> Option<Draft> {
        (self.status == QuoteStatus::Draft).then(|| Draft {
            id: DraftId(self.id.clone()),
            selection: self.selection.clone(),
            contact: self.contact.clone(),
            last_step: self.current_step,
            updated_at: self.updated_at,
        })
    }

    pub fn as_active_quote(&self) -> Option<ActiveQuote> {
        (self.status != QuoteStatus::Draft).then(|| ActiveQuote {
            id: QuoteId(self.id.clone()),
            status: self.status,
            selection: self.selection.clone(),
            contact: self.contact.clone(),
            meeting: self.meeting.clone(),
            total_price: self.total_price,
            submitted_at: self.submitted_at,
        })
    }
}
