use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Wizard steps in their fixed order. Forward and backward are defined by
/// this order, so the derived `Ord` is load-bearing.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Browse,
    Customize,
    Optional,
    Quote,
    Success,
}

impl Step {
    pub const ALL: [Step; 5] =
        [Step::Browse, Step::Customize, Step::Optional, Step::Quote, Step::Success];

    pub fn position(self) -> usize {
        match self {
            Self::Browse => 0,
            Self::Customize => 1,
            Self::Optional => 2,
            Self::Quote => 3,
            Self::Success => 4,
        }
    }

    pub fn next(self) -> Option<Step> {
        Self::ALL.get(self.position() + 1).copied()
    }

    pub fn previous(self) -> Option<Step> {
        self.position().checked_sub(1).map(|index| Self::ALL[index])
    }

    /// Steps strictly before `self`.
    pub fn predecessors(self) -> impl Iterator<Item = Step> {
        Self::ALL.into_iter().take(self.position())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browse => "browse",
            Self::Customize => "customize",
            Self::Optional => "optional",
            Self::Quote => "quote",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "browse" => Ok(Self::Browse),
            "customize" => Ok(Self::Customize),
            "optional" => Ok(Self::Optional),
            "quote" => Ok(Self::Quote),
            "success" => Ok(Self::Success),
            other => Err(DomainError::InvariantViolation(format!("unknown wizard step `{other}`"))),
        }
    }
}
