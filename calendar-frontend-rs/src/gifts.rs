use std::rc::Rc;

use keepsake::{Document, DocumentStore, Filter, StoreError};
use serde::{Deserialize, Serialize};

use crate::device_id::DeviceId;

pub const GIFTS_COLLECTION: &str = "gift_submissions";

/// What the gift-selection form collects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct GiftSelection {
    pub box_number: u32,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub dob: String,
    #[serde(default)]
    pub gift_type: Option<String>,
    #[serde(default)]
    pub favorite_genre: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// ISO-8601, as produced by the form.
    pub timestamp: String,
}

/// Stored once per completed form and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftSubmissionRecord {
    pub box_number: u32,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub dob: String,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub gift_type: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub favorite_genre: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub note: Option<String>,
    pub timestamp: String,
    pub device_id: DeviceId,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|value| value.trim().is_empty())
}

impl GiftSubmissionRecord {
    pub fn new(selection: GiftSelection, device_id: DeviceId) -> Self {
        let GiftSelection {
            box_number,
            name,
            phone,
            address,
            dob,
            gift_type,
            favorite_genre,
            note,
            timestamp,
        } = selection;
        Self {
            box_number,
            name,
            phone,
            address,
            dob,
            gift_type,
            favorite_genre,
            note,
            timestamp,
            device_id,
        }
    }

    fn to_document(&self) -> Result<Document, StoreError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(document) => Ok(document),
            other => Err(StoreError::Unavailable(format!(
                "gift submission serialized to a non-object: {other}"
            ))),
        }
    }
}

pub struct GiftStore<S> {
    store: Rc<S>,
}

impl<S: DocumentStore> GiftStore<S> {
    pub fn new(store: Rc<S>) -> Self {
        Self { store }
    }

    /// Returns the id of the new record.
    pub async fn save_gift_submission(
        &self,
        record: &GiftSubmissionRecord,
    ) -> Result<String, StoreError> {
        let id = self
            .store
            .add(GIFTS_COLLECTION, record.to_document()?)
            .await?;
        log::info!("Gift submission saved with id {id}");
        Ok(id)
    }

    /// Any failure reads as "not submitted": showing the gift selection again is better than
    /// locking someone out of it.
    pub async fn check_gift_submitted(&self, device_id: &DeviceId) -> bool {
        let filter = Filter::field_equals("deviceId", device_id.as_str());
        match self.store.query(GIFTS_COLLECTION, &filter).await {
            Ok(submissions) => {
                log::info!(
                    "Found {} gift submission(s) for {device_id}",
                    submissions.len()
                );
                !submissions.is_empty()
            }
            Err(e) => {
                log::warn!("Failed to check gift status, assuming none: {e:?}");
                false
            }
        }
    }
}
