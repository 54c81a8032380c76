//! Named guard conditions for recovery and placeholder reconciliation.

use tokio::time::Instant;

/// Whether a background draft check may start or land.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecoveryGuard {
    #[default]
    Idle,
    RestorePending { attempt: u64 },
    Settled,
    /// A discard just deleted the draft; reads before the deadline are ignored.
    SuppressedUntil(Instant),
}

impl RecoveryGuard {
    pub fn may_begin(&self, now: Instant) -> bool {
        match self {
            Self::Idle | Self::Settled => true,
            Self::RestorePending { .. } => false,
            Self::SuppressedUntil(deadline) => now >= *deadline,
        }
    }

    /// A fetched result may only be applied by the attempt that is still pending.
    pub fn accepts(&self, attempt: u64) -> bool {
        matches!(self, Self::RestorePending { attempt: pending } if *pending == attempt)
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        matches!(self, Self::SuppressedUntil(deadline) if now < *deadline)
    }
}

/// Placeholder reconciliation runs at most once per restore.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconcileGuard {
    #[default]
    NotNeeded,
    PlaceholdersPending,
    Reconciled,
}

impl ReconcileGuard {
    pub fn after_restore(has_placeholders: bool) -> Self {
        if has_placeholders {
            Self::PlaceholdersPending
        } else {
            Self::NotNeeded
        }
    }

    pub fn should_reconcile(&self) -> bool {
        matches!(self, Self::PlaceholdersPending)
    }
}
