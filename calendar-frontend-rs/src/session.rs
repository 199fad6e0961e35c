use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use chrono::{DateTime, SecondsFormat};
use keepsake::schedule::{Clock, IntervalHandle, every};
use keepsake::{DocumentStore, SyncStatus};

use crate::CalendarError;
use crate::config::CalendarConfig;
use crate::device_id::DeviceId;
use crate::gifts::{GiftSelection, GiftStore, GiftSubmissionRecord};
use crate::letters::Letters;
use crate::progress::{ProgressRecord, ProgressStore};
use crate::reconcile::{Reconciliation, reconcile};
use crate::unlock::{
    Dialog, OpenOutcome, ReplyOutcome, ResetOutcome, Tile, UnlockOutcome, UnlockState,
    format_countdown,
};

/// One calendar for one device: the local unlock state plus everything needed to persist it.
///
/// Never hold a borrow of `state` or `sync` across an `.await`. Every method below copies what it
/// needs out of the cell before awaiting, which is what keeps the interleaving of user actions,
/// reconciliation ticks and in-flight writes panic-free.
pub struct CalendarSession<S, C> {
    progress: ProgressStore<S>,
    gifts: GiftStore<S>,
    clock: C,
    device_id: DeviceId,
    config: CalendarConfig,
    letters: Letters,
    state: RefCell<UnlockState>,
    // bumped by every local mutation, see `apply_remote`
    generation: Cell<u64>,
    sync: RefCell<SyncStatus>,
    on_change: RefCell<Option<Rc<dyn Fn()>>>,
}

impl<S: DocumentStore, C: Clock> CalendarSession<S, C> {
    /// Fails if the stored progress can't be read: starting from an empty calendar would
    /// present a wrong picture, and reconciliation never grows the unlocked set.
    pub async fn load(
        store: Rc<S>,
        clock: C,
        device_id: DeviceId,
        mut config: CalendarConfig,
    ) -> Result<Self, CalendarError> {
        config.validate()?;
        let letters = Letters::new(std::mem::take(&mut config.letters))?;

        let progress = ProgressStore::new(store.clone());
        let record = progress
            .load_progress(&device_id)
            .await
            .inspect_err(|e| log::error!("Failed to load progress for {device_id}: {e:?}"))?;
        log::info!(
            "Loaded progress for {device_id}: {} day(s) unlocked",
            record.unlocked_days.len()
        );

        Ok(Self {
            progress,
            gifts: GiftStore::new(store),
            clock,
            device_id,
            config,
            letters,
            state: RefCell::new(UnlockState::from_record(record)),
            generation: Cell::new(0),
            sync: RefCell::new(SyncStatus::default()),
            on_change: RefCell::new(None),
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> UnlockState {
        self.state.borrow().clone()
    }

    pub fn progress(&self) -> ProgressRecord {
        self.state.borrow().to_record()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Called after every change to the unlock state, local or remote.
    pub fn set_listener(&self, listener: impl Fn() + 'static) {
        *self.on_change.borrow_mut() = Some(Rc::new(listener));
    }

    pub fn clear_listener(&self) {
        self.on_change.borrow_mut().take();
    }

    fn notify(&self) {
        let listener = self.on_change.borrow().clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    fn mutated(&self) {
        self.generation.set(self.generation.get() + 1);
        self.notify();
    }

    pub fn request_open(&self, day: u32) -> OpenOutcome {
        let outcome = self
            .state
            .borrow_mut()
            .request_open(day, self.clock.now_ms());
        log::debug!("Open day {day}: {outcome:?}");
        self.notify();
        outcome
    }

    pub fn close_dialog(&self) {
        self.state.borrow_mut().close_dialog();
        self.notify();
    }

    /// Unlocks the day the password prompt is open for. A failed save is logged and kept in the
    /// sync status; the day stays unlocked locally either way.
    pub async fn submit_password(&self, input: &str) -> UnlockOutcome {
        let now = self.clock.now_ms();
        let outcome = {
            let mut state = self.state.borrow_mut();
            let Dialog::Password { day } = state.dialog else {
                return UnlockOutcome::NotAwaitingPassword;
            };
            state.submit_password(day, input, &self.config.unlock_password, now)
        };

        if let UnlockOutcome::Unlocked { day } = outcome {
            log::info!("Unlocked day {day}");
            self.mutated();
            self.persist_progress().await;
        }
        outcome
    }

    pub async fn reset_cooldown(&self, input: &str) -> ResetOutcome {
        let outcome = self
            .state
            .borrow_mut()
            .reset_cooldown(input, &self.config.reset_password);

        if outcome == ResetOutcome::CooldownReset {
            log::info!("Cooldown reset");
            self.mutated();
            self.persist_progress().await;
        }
        outcome
    }

    async fn persist_progress(&self) {
        let (unlocked_days, last_open_at) = {
            let state = self.state.borrow();
            (state.unlocked_days.clone(), state.last_open_at)
        };
        let started = self.clock.now_ms();
        self.sync.borrow_mut().mark_started(started);
        let result = self
            .progress
            .save_progress_partial(&self.device_id, &unlocked_days, last_open_at, started)
            .await;
        self.sync
            .borrow_mut()
            .mark_finished(self.clock.now_ms(), result.err().map(|e| e.to_string()));
    }

    /// Stores the trimmed reply locally only once the write went through.
    pub async fn submit_reply(&self, day: u32, text: &str) -> Result<ReplyOutcome, CalendarError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(ReplyOutcome::Blank);
        }
        if !self.state.borrow().is_unlocked(day) {
            return Ok(ReplyOutcome::Locked { day });
        }

        let started = self.clock.now_ms();
        self.sync.borrow_mut().mark_started(started);
        let result = self
            .progress
            .save_day_reply(&self.device_id, day, text, started)
            .await;
        self.sync.borrow_mut().mark_finished(
            self.clock.now_ms(),
            result.as_ref().err().map(|e| e.to_string()),
        );
        result?;

        self.state.borrow_mut().replies.insert(day, text.to_string());
        self.mutated();
        Ok(ReplyOutcome::Saved { day })
    }

    pub fn countdown_ms(&self) -> i64 {
        self.state.borrow().countdown(self.clock.now_ms())
    }

    pub fn countdown_label(&self) -> String {
        format_countdown(self.countdown_ms())
    }

    pub fn tiles(&self) -> Vec<Tile> {
        self.state.borrow().tiles(self.clock.now_ms())
    }

    /// The letter behind `day`, if that day has been unlocked.
    pub fn letter(&self, day: u32) -> Option<String> {
        if !self.state.borrow().is_unlocked(day) {
            return None;
        }
        self.letters.get(day).map(str::to_string)
    }

    pub async fn check_gift_submitted(&self) -> bool {
        self.gifts.check_gift_submitted(&self.device_id).await
    }

    pub async fn save_gift_submission(
        &self,
        mut selection: GiftSelection,
    ) -> Result<String, CalendarError> {
        if selection.timestamp.trim().is_empty() {
            selection.timestamp = DateTime::from_timestamp_millis(self.clock.now_ms())
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default();
        }
        let record = GiftSubmissionRecord::new(selection, self.device_id.clone());
        Ok(self.gifts.save_gift_submission(&record).await?)
    }

    /// One reconciliation tick. `None` when the tick was skipped.
    pub async fn reconcile_once(&self) -> Option<Reconciliation> {
        if !self.sync.borrow().is_idle() {
            log::debug!("Writes in flight, skipping reconciliation");
            return None;
        }
        let generation = self.generation.get();
        match self.progress.load_progress(&self.device_id).await {
            Ok(remote) => self.apply_remote(generation, remote),
            Err(e) => {
                log::warn!("Failed to check progress: {e:?}");
                None
            }
        }
    }

    /// Applies a record fetched while the state was at `generation`. Stale reads (a local
    /// mutation happened, or a write is still in flight) are dropped; the next tick will see
    /// the write.
    pub fn apply_remote(
        &self,
        generation: u64,
        remote: ProgressRecord,
    ) -> Option<Reconciliation> {
        if generation != self.generation.get() || !self.sync.borrow().is_idle() {
            log::debug!("Discarding stale progress read");
            return None;
        }
        let outcome = reconcile(&mut self.state.borrow_mut(), remote);
        if outcome.changed() {
            log::info!("Progress changed remotely: {outcome:?}");
            self.notify();
        }
        Some(outcome)
    }
}

impl<S: DocumentStore + 'static, C: Clock + Clone + 'static> CalendarSession<S, C> {
    /// Calls `on_tick` with the remaining cooldown every `countdown_tick_ms`.
    pub fn countdown_loop(
        self: Rc<Self>,
        on_tick: impl Fn(i64) + 'static,
    ) -> (impl Future<Output = ()>, IntervalHandle) {
        let clock = self.clock.clone();
        let period_ms = self.config.countdown_tick_ms;
        every(clock, period_ms, move || {
            on_tick(self.countdown_ms());
            async {}
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> CalendarConfig {
    CalendarConfig {
        unlock_password: "ngoisao".to_string(),
        reset_password: "lamlai".to_string(),
        reconcile_interval_ms: 5_000,
        countdown_tick_ms: 1_000,
        letters: (1..=crate::unlock::DAYS)
            .map(|day| format!("Letter {day}"))
            .collect(),
    }
}
