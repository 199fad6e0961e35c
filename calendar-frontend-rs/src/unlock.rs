//! The 100-day unlock rules: strict day order, a 24 hour cooldown between unlocks, and a shared
//! password. Nothing in here does I/O; [`crate::session::CalendarSession`] persists the results.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::progress::ProgressRecord;

pub const DAYS: u32 = 100;
pub const COOLDOWN_MS: i64 = 24 * 60 * 60 * 1000;

pub fn can_unlock_now(last_open_at: Option<i64>, now_ms: i64) -> bool {
    match last_open_at {
        None => true,
        Some(last_open_at) => now_ms >= last_open_at.saturating_add(COOLDOWN_MS),
    }
}

/// Days must be unlocked in order, so the only candidate is the one after the highest unlocked day.
pub fn next_unlockable_day(unlocked_days: &BTreeSet<u32>) -> u32 {
    unlocked_days.last().map_or(1, |max| max + 1)
}

/// Time left before the next unlock is allowed. Zero when nothing was ever unlocked.
pub fn countdown(last_open_at: Option<i64>, now_ms: i64) -> i64 {
    last_open_at
        .map(|last_open_at| {
            last_open_at
                .saturating_add(COOLDOWN_MS)
                .saturating_sub(now_ms)
                .max(0)
        })
        .unwrap_or(0)
}

/// `HH:MM:SS`, hours are not wrapped.
pub fn format_countdown(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn request_open(
    day: u32,
    unlocked_days: &BTreeSet<u32>,
    last_open_at: Option<i64>,
    now_ms: i64,
) -> OpenOutcome {
    if unlocked_days.contains(&day) {
        return OpenOutcome::AlreadyUnlocked { day };
    }

    let expected = next_unlockable_day(unlocked_days);
    if expected > DAYS {
        return OpenOutcome::Completed;
    }
    // expected is in 1..=DAYS here, so this also turns away 0 and anything past the last day
    if day != expected {
        return OpenOutcome::WrongDay { expected };
    }

    if !can_unlock_now(last_open_at, now_ms) {
        return OpenOutcome::CooldownActive {
            remaining_ms: countdown(last_open_at, now_ms),
        };
    }

    OpenOutcome::AwaitingPassword { day }
}

fn password_matches(input: &str, password: &str) -> bool {
    input.trim() == password
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenOutcome {
    /// Show the letter straight away, no password needed.
    AlreadyUnlocked { day: u32 },
    WrongDay { expected: u32 },
    CooldownActive { remaining_ms: i64 },
    AwaitingPassword { day: u32 },
    /// Every day is already open.
    Completed,
}

impl OpenOutcome {
    pub fn message(&self) -> Option<String> {
        match self {
            OpenOutcome::WrongDay { expected } => {
                Some(format!("Only day {expected} can be opened next 💖"))
            }
            OpenOutcome::CooldownActive { remaining_ms } => Some(format!(
                "Wait the full 24 hours to open the next day 💖 ({} left)",
                format_countdown(*remaining_ms)
            )),
            OpenOutcome::Completed => Some(format!("All {DAYS} days are open 💖")),
            OpenOutcome::AlreadyUnlocked { .. } | OpenOutcome::AwaitingPassword { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnlockOutcome {
    Unlocked { day: u32 },
    InvalidPassword,
    /// No password prompt is open.
    NotAwaitingPassword,
}

impl UnlockOutcome {
    pub fn message(&self) -> Option<String> {
        match self {
            UnlockOutcome::Unlocked { .. } => None,
            UnlockOutcome::InvalidPassword => Some("That password isn't right 🥺".to_string()),
            UnlockOutcome::NotAwaitingPassword => Some("Pick a day to open first".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResetOutcome {
    CooldownReset,
    InvalidPassword,
}

impl ResetOutcome {
    pub fn message(&self) -> Option<String> {
        match self {
            ResetOutcome::CooldownReset => None,
            ResetOutcome::InvalidPassword => Some("Wrong reset password!".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Saved { day: u32 },
    /// Nothing but whitespace, nothing was written.
    Blank,
    /// Replies can only be left on unlocked days.
    Locked { day: u32 },
}

/// What the calendar dialog is showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Dialog {
    #[default]
    Closed,
    /// A rejection notice: wrong day, cooldown, or nothing left to open.
    Notice,
    Password { day: u32 },
    Letter { day: u32 },
}

impl Dialog {
    pub fn open_day(&self) -> Option<u32> {
        match self {
            Dialog::Password { day } | Dialog::Letter { day } => Some(*day),
            Dialog::Closed | Dialog::Notice => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Days 10 through 50.
    Minor,
    /// Days 60 through 100.
    Major,
}

pub fn milestone(day: u32) -> Option<Milestone> {
    match day {
        10 | 20 | 30 | 40 | 50 => Some(Milestone::Minor),
        60 | 70 | 80 | 90 | 100 => Some(Milestone::Major),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum TileStatus {
    Unlocked,
    /// The next day, and the cooldown has passed.
    Available,
    /// The next day, but the cooldown is still running.
    Cooling,
    Upcoming,
    /// Before the next day but never unlocked. Only happens after the record was edited by hand.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Tile {
    pub day: u32,
    pub status: TileStatus,
    pub milestone: Option<Milestone>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnlockState {
    pub unlocked_days: BTreeSet<u32>,
    pub last_open_at: Option<i64>,
    pub replies: BTreeMap<u32, String>,
    pub dialog: Dialog,
}

impl UnlockState {
    pub fn from_record(record: ProgressRecord) -> Self {
        Self {
            unlocked_days: record.unlocked_days,
            last_open_at: record.last_open_at,
            replies: record.replies,
            dialog: Dialog::Closed,
        }
    }

    pub fn to_record(&self) -> ProgressRecord {
        ProgressRecord {
            unlocked_days: self.unlocked_days.clone(),
            last_open_at: self.last_open_at,
            replies: self.replies.clone(),
        }
    }

    pub fn next_unlockable_day(&self) -> u32 {
        next_unlockable_day(&self.unlocked_days)
    }

    pub fn can_unlock_now(&self, now_ms: i64) -> bool {
        can_unlock_now(self.last_open_at, now_ms)
    }

    pub fn countdown(&self, now_ms: i64) -> i64 {
        countdown(self.last_open_at, now_ms)
    }

    pub fn is_unlocked(&self, day: u32) -> bool {
        self.unlocked_days.contains(&day)
    }

    /// A tile was clicked. Only the dialog changes.
    pub fn request_open(&mut self, day: u32, now_ms: i64) -> OpenOutcome {
        let outcome = request_open(day, &self.unlocked_days, self.last_open_at, now_ms);
        self.dialog = match outcome {
            OpenOutcome::AlreadyUnlocked { day } => Dialog::Letter { day },
            OpenOutcome::AwaitingPassword { day } => Dialog::Password { day },
            OpenOutcome::WrongDay { .. }
            | OpenOutcome::CooldownActive { .. }
            | OpenOutcome::Completed => Dialog::Notice,
        };
        outcome
    }

    /// Checks the password and unlocks `day`. Ordering and cooldown are checked by
    /// [`UnlockState::request_open`] before the prompt is shown, not here; only the day range is.
    pub fn submit_password(
        &mut self,
        day: u32,
        input: &str,
        shared_password: &str,
        now_ms: i64,
    ) -> UnlockOutcome {
        if !(1..=DAYS).contains(&day) {
            return UnlockOutcome::NotAwaitingPassword;
        }
        if !password_matches(input, shared_password) {
            return UnlockOutcome::InvalidPassword;
        }
        self.unlocked_days.insert(day);
        self.last_open_at = Some(now_ms);
        self.dialog = Dialog::Letter { day };
        UnlockOutcome::Unlocked { day }
    }

    pub fn reset_cooldown(&mut self, input: &str, reset_password: &str) -> ResetOutcome {
        if !password_matches(input, reset_password) {
            return ResetOutcome::InvalidPassword;
        }
        self.last_open_at = None;
        ResetOutcome::CooldownReset
    }

    pub fn close_dialog(&mut self) {
        self.dialog = Dialog::Closed;
    }

    pub fn tile(&self, day: u32, now_ms: i64) -> Tile {
        let next = self.next_unlockable_day();
        let status = if self.is_unlocked(day) {
            TileStatus::Unlocked
        } else if day == next && self.can_unlock_now(now_ms) {
            TileStatus::Available
        } else if day == next {
            TileStatus::Cooling
        } else if day > next {
            TileStatus::Upcoming
        } else {
            TileStatus::Skipped
        };
        Tile {
            day,
            status,
            milestone: milestone(day),
        }
    }

    pub fn tiles(&self, now_ms: i64) -> Vec<Tile> {
        (1..=DAYS).map(|day| self.tile(day, now_ms)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;

    fn days(days: &[u32]) -> BTreeSet<u32> {
        days.iter().copied().collect()
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let t = NOW;
        assert!(!can_unlock_now(Some(t), t));
        assert!(!can_unlock_now(Some(t), t + COOLDOWN_MS - 1));
        assert!(can_unlock_now(Some(t), t + COOLDOWN_MS));
        assert!(can_unlock_now(Some(t), t + COOLDOWN_MS + 1));
        assert!(can_unlock_now(None, t));
    }

    #[test]
    fn next_day_follows_highest_unlocked() {
        assert_eq!(next_unlockable_day(&days(&[])), 1);
        assert_eq!(next_unlockable_day(&days(&[1, 2, 3])), 4);
        // a gap left by a hand-edited record does not get filled
        assert_eq!(next_unlockable_day(&days(&[1, 5])), 6);
    }

    #[test]
    fn wrong_day_never_mutates_state() {
        let mut state = UnlockState {
            unlocked_days: days(&[1, 2]),
            last_open_at: Some(NOW - 2 * COOLDOWN_MS),
            ..Default::default()
        };
        for day in (0..=101).filter(|day| ![1, 2, 3].contains(day)) {
            let before = (state.unlocked_days.clone(), state.last_open_at);
            assert_eq!(
                state.request_open(day, NOW),
                OpenOutcome::WrongDay { expected: 3 }
            );
            assert_eq!((state.unlocked_days.clone(), state.last_open_at), before);
            assert_eq!(state.dialog, Dialog::Notice);
        }
    }

    #[test]
    fn nothing_opens_past_the_last_day() {
        let mut state = UnlockState {
            unlocked_days: (1..=DAYS).collect(),
            ..Default::default()
        };
        assert_eq!(state.next_unlockable_day(), DAYS + 1);
        for day in [0, DAYS + 1, DAYS + 2, u32::MAX] {
            assert_eq!(state.request_open(day, NOW), OpenOutcome::Completed);
            assert_eq!(state.dialog, Dialog::Notice);
        }
        assert_eq!(
            state.request_open(DAYS, NOW),
            OpenOutcome::AlreadyUnlocked { day: DAYS }
        );

        assert_eq!(
            state.submit_password(DAYS + 1, "Linh", "Linh", NOW),
            UnlockOutcome::NotAwaitingPassword
        );
        assert_eq!(state.unlocked_days, (1..=DAYS).collect::<BTreeSet<_>>());
        assert_eq!(state.last_open_at, None);
        assert!(OpenOutcome::Completed.message().is_some());
    }

    #[test]
    fn day_zero_is_never_next() {
        let mut state = UnlockState::default();
        assert_eq!(
            state.request_open(0, NOW),
            OpenOutcome::WrongDay { expected: 1 }
        );
        assert_eq!(
            state.submit_password(0, "Linh", "Linh", NOW),
            UnlockOutcome::NotAwaitingPassword
        );
        assert!(state.unlocked_days.is_empty());
        assert_eq!(state.last_open_at, None);
    }

    #[test]
    fn fresh_device_unlocks_day_one() {
        let mut state = UnlockState::default();
        assert_eq!(
            state.request_open(1, NOW),
            OpenOutcome::AwaitingPassword { day: 1 }
        );
        assert_eq!(state.dialog, Dialog::Password { day: 1 });
        assert_eq!(
            state.submit_password(1, "Linh", "Linh", NOW),
            UnlockOutcome::Unlocked { day: 1 }
        );
        assert_eq!(state.unlocked_days, days(&[1]));
        assert_eq!(state.last_open_at, Some(NOW));
        assert_eq!(state.dialog, Dialog::Letter { day: 1 });
    }

    #[test]
    fn cooldown_blocks_next_day() {
        let mut state = UnlockState {
            unlocked_days: days(&[1]),
            last_open_at: Some(NOW - 1000),
            ..Default::default()
        };
        assert_eq!(
            state.request_open(2, NOW),
            OpenOutcome::CooldownActive {
                remaining_ms: 86_399_000
            }
        );
        assert_eq!(state.last_open_at, Some(NOW - 1000));
    }

    #[test]
    fn cooldown_passed_prompts_for_password() {
        let mut state = UnlockState {
            unlocked_days: days(&[1]),
            last_open_at: Some(NOW - 90_000_000),
            ..Default::default()
        };
        assert_eq!(
            state.request_open(2, NOW),
            OpenOutcome::AwaitingPassword { day: 2 }
        );
    }

    #[test]
    fn unlocked_day_opens_without_password() {
        let mut state = UnlockState {
            unlocked_days: days(&[1, 2]),
            last_open_at: Some(NOW),
            ..Default::default()
        };
        assert_eq!(
            state.request_open(1, NOW),
            OpenOutcome::AlreadyUnlocked { day: 1 }
        );
        assert_eq!(state.dialog, Dialog::Letter { day: 1 });
    }

    #[test]
    fn wrong_password_changes_nothing() {
        let mut state = UnlockState {
            unlocked_days: days(&[1]),
            last_open_at: Some(NOW - 2 * COOLDOWN_MS),
            ..Default::default()
        };
        state.request_open(2, NOW);
        for attempt in ["linh", "", "Linh!", "nope"] {
            assert_eq!(
                state.submit_password(2, attempt, "Linh", NOW),
                UnlockOutcome::InvalidPassword
            );
        }
        assert_eq!(state.unlocked_days, days(&[1]));
        assert_eq!(state.last_open_at, Some(NOW - 2 * COOLDOWN_MS));
        assert_eq!(state.dialog, Dialog::Password { day: 2 });
    }

    #[test]
    fn surrounding_whitespace_in_password_is_ignored() {
        let mut state = UnlockState::default();
        assert_eq!(
            state.submit_password(1, "  Linh \n", "Linh", NOW),
            UnlockOutcome::Unlocked { day: 1 }
        );
    }

    #[test]
    fn reset_requires_reset_password() {
        let mut state = UnlockState {
            unlocked_days: days(&[1]),
            last_open_at: Some(NOW),
            ..Default::default()
        };
        assert_eq!(
            state.reset_cooldown("wrongsecret", "lamlai"),
            ResetOutcome::InvalidPassword
        );
        assert_eq!(state.last_open_at, Some(NOW));

        assert_eq!(
            state.reset_cooldown("lamlai", "lamlai"),
            ResetOutcome::CooldownReset
        );
        assert_eq!(state.last_open_at, None);
        assert_eq!(
            state.request_open(2, NOW),
            OpenOutcome::AwaitingPassword { day: 2 }
        );
    }

    #[test]
    fn countdown_clamps_at_zero() {
        assert_eq!(countdown(None, NOW), 0);
        assert_eq!(countdown(Some(NOW), NOW), COOLDOWN_MS);
        assert_eq!(countdown(Some(NOW - COOLDOWN_MS - 5), NOW), 0);
        assert_eq!(countdown(Some(i64::MAX), NOW), i64::MAX - NOW);
        assert!(!can_unlock_now(Some(i64::MAX), NOW));
    }

    #[test]
    fn countdown_formatting() {
        assert_eq!(format_countdown(0), "00:00:00");
        assert_eq!(format_countdown(86_399_000), "23:59:59");
        assert_eq!(format_countdown(3_723_999), "01:02:03");
        assert_eq!(format_countdown(-5), "00:00:00");
    }

    #[test]
    fn tiles_reflect_progress() {
        let state = UnlockState {
            unlocked_days: days(&[1, 3]),
            last_open_at: Some(NOW),
            ..Default::default()
        };
        let tiles = state.tiles(NOW);
        assert_eq!(tiles.len(), 100);
        assert_eq!(tiles[0].status, TileStatus::Unlocked);
        assert_eq!(tiles[1].status, TileStatus::Skipped);
        assert_eq!(tiles[2].status, TileStatus::Unlocked);
        assert_eq!(tiles[3].status, TileStatus::Cooling);
        assert_eq!(tiles[4].status, TileStatus::Upcoming);
        assert_eq!(state.tile(4, NOW + COOLDOWN_MS).status, TileStatus::Available);
    }

    #[test]
    fn milestones_are_annotations_only() {
        assert_eq!(milestone(10), Some(Milestone::Minor));
        assert_eq!(milestone(50), Some(Milestone::Minor));
        assert_eq!(milestone(60), Some(Milestone::Major));
        assert_eq!(milestone(100), Some(Milestone::Major));
        assert_eq!(milestone(55), None);

        let mut state = UnlockState {
            unlocked_days: (1..10).collect(),
            ..Default::default()
        };
        assert_eq!(
            state.request_open(10, NOW),
            OpenOutcome::AwaitingPassword { day: 10 }
        );
    }
}
