/// Bookkeeping for remote operations, so the UI can tell "saved" from "local only".
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncStatus {
    pub in_flight: usize,
    pub last_started_at: Option<i64>,
    pub last_finished_at: Option<i64>,
    /// Error message of the most recent operation, cleared by the next success.
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn mark_started(&mut self, now_ms: i64) {
        self.in_flight += 1;
        self.last_started_at = Some(now_ms);
    }

    pub fn mark_finished(&mut self, now_ms: i64, error: Option<String>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.last_finished_at = Some(now_ms);
        if let Some(error) = &error {
            log::warn!("Remote operation failed: {error}");
        }
        self.last_error = error;
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }
}
