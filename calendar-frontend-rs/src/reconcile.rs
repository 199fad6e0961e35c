//! Periodic comparison of the local unlock state with the stored record.
//!
//! The stored record can be edited from outside the app (an admin deleting days to give a
//! second chance, for instance). Reconciliation picks those edits up without ever writing.
use std::future::Future;
use std::rc::Rc;

use keepsake::DocumentStore;
use keepsake::schedule::{Clock, IntervalHandle, every};

use crate::progress::ProgressRecord;
use crate::session::CalendarSession;
use crate::unlock::{Dialog, UnlockState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The stored record has fewer unlocked days. The cooldown was reset along with it.
    pub days_revoked: bool,
    pub last_open_at_changed: bool,
    pub replies_changed: bool,
}

impl Reconciliation {
    pub fn changed(&self) -> bool {
        self.days_revoked || self.last_open_at_changed || self.replies_changed
    }
}

/// Folds `remote` into `local`.
///
/// Only a shrinking unlocked set is adopted, and it always clears `last_open_at`: removing days
/// is how a stuck calendar gets a fresh start. A larger remote set is ignored since local unlocks
/// are saved as they happen.
pub fn reconcile(local: &mut UnlockState, remote: ProgressRecord) -> Reconciliation {
    let mut outcome = Reconciliation::default();
    let ProgressRecord {
        unlocked_days,
        last_open_at,
        replies,
    } = remote;

    if unlocked_days.len() < local.unlocked_days.len() {
        log::info!(
            "Unlocked days went from {} to {} remotely, resetting the cooldown",
            local.unlocked_days.len(),
            unlocked_days.len()
        );
        local.unlocked_days = unlocked_days;
        local.last_open_at = None;
        outcome.days_revoked = true;

        let stale_dialog = match local.dialog {
            Dialog::Letter { day } => !local.is_unlocked(day),
            Dialog::Password { day } => day != local.next_unlockable_day(),
            Dialog::Closed | Dialog::Notice => false,
        };
        if stale_dialog {
            local.close_dialog();
        }
    } else if last_open_at != local.last_open_at {
        local.last_open_at = last_open_at;
        outcome.last_open_at_changed = true;
    }

    if replies != local.replies {
        local.replies = replies;
        outcome.replies_changed = true;
    }

    outcome
}

/// Runs [`CalendarSession::reconcile_once`] every `reconcile_interval_ms`.
pub fn reconciliation_loop<S, C>(
    session: Rc<CalendarSession<S, C>>,
) -> (impl Future<Output = ()>, IntervalHandle)
where
    S: DocumentStore + 'static,
    C: Clock + Clone + 'static,
{
    let clock = session.clock().clone();
    let period_ms = session.config().reconcile_interval_ms;
    every(clock, period_ms, move || {
        let session = session.clone();
        async move {
            session.reconcile_once().await;
        }
    })
}
