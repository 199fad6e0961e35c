use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use keepsake::{Document, DocumentStore, StoreError, UpdateOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::device_id::DeviceId;
use crate::unlock::DAYS;

pub const PROGRESS_COLLECTION: &str = "calendar_progress";

/// One per device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub unlocked_days: BTreeSet<u32>,
    /// Milliseconds since the epoch of the most recent unlock.
    pub last_open_at: Option<i64>,
    pub replies: BTreeMap<u32, String>,
}

impl ProgressRecord {
    /// Decode a stored document. Anyone with database access can edit these, so anything
    /// unexpected is dropped (and logged) instead of failing the whole read.
    pub fn from_document(document: &Document) -> Self {
        let unlocked_days = match document.get("unlockedDays") {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|value| {
                    let day = as_integer(value).and_then(|day| u32::try_from(day).ok());
                    match day {
                        Some(day) if (1..=DAYS).contains(&day) => Some(day),
                        _ => {
                            log::warn!("Ignoring invalid unlocked day {value}");
                            None
                        }
                    }
                })
                .collect(),
            Some(other) => {
                log::warn!("unlockedDays is not an array: {other}");
                BTreeSet::new()
            }
            None => BTreeSet::new(),
        };

        let last_open_at = document.get("lastOpenAt").and_then(as_integer);

        let replies = match document.get("replies") {
            Some(Value::Object(replies)) => replies
                .iter()
                .filter_map(|(day, text)| {
                    let (Ok(day), Some(text)) = (day.parse::<u32>(), text.as_str()) else {
                        log::warn!("Ignoring invalid reply {day}: {text}");
                        return None;
                    };
                    Some((day, text.to_string()))
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        Self {
            unlocked_days,
            last_open_at,
            replies,
        }
    }
}

// Numbers may come back as floats from some clients, `3.0` is still day 3.
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    })
}

fn fields(value: Value) -> Document {
    match value {
        Value::Object(fields) => fields,
        _ => Document::new(),
    }
}

/// Reads and writes [`ProgressRecord`]s.
pub struct ProgressStore<S> {
    store: Rc<S>,
}

impl<S: DocumentStore> ProgressStore<S> {
    pub fn new(store: Rc<S>) -> Self {
        Self { store }
    }

    /// A device without a stored record gets the empty record. Nothing is created remotely.
    pub async fn load_progress(&self, device_id: &DeviceId) -> Result<ProgressRecord, StoreError> {
        let document = self
            .store
            .get(PROGRESS_COLLECTION, device_id.as_str())
            .await?;
        Ok(document
            .map(|document| ProgressRecord::from_document(&document))
            .unwrap_or_default())
    }

    /// Writes only the unlock fields, leaving replies alone.
    pub async fn save_progress_partial(
        &self,
        device_id: &DeviceId,
        unlocked_days: &BTreeSet<u32>,
        last_open_at: Option<i64>,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let update = fields(json!({
            "unlockedDays": unlocked_days,
            "lastOpenAt": last_open_at,
            "updatedAt": now_ms,
        }));
        self.store
            .set(PROGRESS_COLLECTION, device_id.as_str(), update, true)
            .await
    }

    pub async fn save_day_reply(
        &self,
        device_id: &DeviceId,
        day: u32,
        text: &str,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let update = fields(json!({
            format!("replies.{day}"): text,
            "updatedAt": now_ms,
        }));

        match self
            .store
            .update(PROGRESS_COLLECTION, device_id.as_str(), update)
            .await
        {
            Ok(UpdateOutcome::Updated) => return Ok(()),
            Ok(UpdateOutcome::Missing) => {
                log::info!("No progress record for {device_id} yet, creating it with the reply");
            }
            Err(e) => {
                log::warn!("Field update of reply failed, retrying as a merge: {e:?}");
            }
        }

        let document = fields(json!({
            "replies": { day.to_string(): text },
            "updatedAt": now_ms,
        }));
        self.store
            .set(PROGRESS_COLLECTION, device_id.as_str(), document, true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use keepsake::MemoryStore;
    use keepsake::memory::Failure;

    use crate::unlock::{TileStatus, UnlockState};

    fn device() -> DeviceId {
        DeviceId::new("device-1")
    }

    fn doc(value: Value) -> Document {
        fields(value)
    }

    #[test]
    fn missing_record_loads_as_empty_without_creating_it() {
        let store = Rc::new(MemoryStore::new());
        let progress = ProgressStore::new(store.clone());
        let record = block_on(progress.load_progress(&device())).unwrap();
        assert_eq!(record, ProgressRecord::default());
        assert_eq!(store.count(PROGRESS_COLLECTION), 0);
    }

    #[test]
    fn load_failure_is_reported() {
        let store = Rc::new(MemoryStore::new());
        store.set_failure(Some(Failure::Unavailable));
        let progress = ProgressStore::new(store);
        assert!(matches!(
            block_on(progress.load_progress(&device())),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn decoding_tolerates_hand_edited_records() {
        let record = ProgressRecord::from_document(&doc(json!({
            "unlockedDays": [1, 2, 2, 3.0, 0, 101, -4, "5", null],
            "lastOpenAt": "yesterday",
            "replies": {"1": "hi", "two": "nope", "3": 7},
        })));
        assert_eq!(record.unlocked_days, BTreeSet::from([1, 2, 3]));
        assert_eq!(record.last_open_at, None);
        assert_eq!(record.replies, BTreeMap::from([(1, "hi".to_string())]));

        let record = ProgressRecord::from_document(&doc(json!({
            "unlockedDays": "1,2",
            "lastOpenAt": 1_700_000_000_000_i64,
            "replies": [],
        })));
        assert!(record.unlocked_days.is_empty());
        assert_eq!(record.last_open_at, Some(1_700_000_000_000));
        assert!(record.replies.is_empty());
    }

    #[test]
    fn out_of_range_last_open_at_does_not_overflow_the_cooldown() {
        let state = UnlockState::from_record(ProgressRecord::from_document(&doc(json!({
            "unlockedDays": [1],
            "lastOpenAt": 1e300,
        }))));
        assert_eq!(state.last_open_at, Some(i64::MAX));
        assert!(!state.can_unlock_now(0));
        assert!(!state.can_unlock_now(1_760_000_000_000));
        assert_eq!(state.countdown(0), i64::MAX);
        assert_eq!(state.tile(2, 0).status, TileStatus::Cooling);

        let state = UnlockState::from_record(ProgressRecord::from_document(&doc(json!({
            "unlockedDays": [1],
            "lastOpenAt": i64::MIN,
        }))));
        assert!(state.can_unlock_now(1_760_000_000_000));
        assert_eq!(state.countdown(1_760_000_000_000), 0);
    }

    #[test]
    fn partial_save_keeps_replies() {
        let store = Rc::new(MemoryStore::new());
        store.put_document(
            PROGRESS_COLLECTION,
            "device-1",
            doc(json!({"replies": {"1": "thank you"}})),
        );
        let progress = ProgressStore::new(store.clone());

        block_on(progress.save_progress_partial(&device(), &BTreeSet::from([1, 2]), Some(42), 50))
            .unwrap();

        let record = block_on(progress.load_progress(&device())).unwrap();
        assert_eq!(record.unlocked_days, BTreeSet::from([1, 2]));
        assert_eq!(record.last_open_at, Some(42));
        assert_eq!(record.replies.get(&1).map(String::as_str), Some("thank you"));
        assert_eq!(
            store.document(PROGRESS_COLLECTION, "device-1").unwrap()["updatedAt"],
            json!(50)
        );
    }

    #[test]
    fn partial_save_can_clear_last_open_at() {
        let store = Rc::new(MemoryStore::new());
        let progress = ProgressStore::new(store);
        block_on(progress.save_progress_partial(&device(), &BTreeSet::from([1]), Some(1), 1))
            .unwrap();
        block_on(progress.save_progress_partial(&device(), &BTreeSet::from([1]), None, 2))
            .unwrap();
        let record = block_on(progress.load_progress(&device())).unwrap();
        assert_eq!(record.last_open_at, None);
    }

    #[test]
    fn reply_is_merged_into_existing_record() {
        let store = Rc::new(MemoryStore::new());
        let progress = ProgressStore::new(store.clone());
        block_on(progress.save_progress_partial(&device(), &BTreeSet::from([1, 2]), Some(7), 7))
            .unwrap();
        block_on(progress.save_day_reply(&device(), 1, "one", 8)).unwrap();
        block_on(progress.save_day_reply(&device(), 2, "two", 9)).unwrap();

        let record = block_on(progress.load_progress(&device())).unwrap();
        assert_eq!(record.unlocked_days, BTreeSet::from([1, 2]));
        assert_eq!(record.last_open_at, Some(7));
        assert_eq!(
            record.replies,
            BTreeMap::from([(1, "one".to_string()), (2, "two".to_string())])
        );
    }

    #[test]
    fn reply_creates_missing_record() {
        let store = Rc::new(MemoryStore::new());
        let progress = ProgressStore::new(store.clone());
        block_on(progress.save_day_reply(&device(), 4, "four", 1)).unwrap();

        let record = block_on(progress.load_progress(&device())).unwrap();
        assert_eq!(record.replies, BTreeMap::from([(4, "four".to_string())]));
        assert!(record.unlocked_days.is_empty());
        assert_eq!(store.count(PROGRESS_COLLECTION), 1);
    }
}
