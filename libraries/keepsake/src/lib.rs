//! This is a library for keeping small per-device records in a hosted document store.
//! It was created for the 100-day calendar, so it doesn't include much that was not needed for that project.
//!
//! Storage model:
//! 1. Documents are JSON objects grouped into named collections and addressed by a string id.
//! 2. Callers talk to the store through the [`DocumentStore`] capability, which is always passed in
//!    explicitly. There is no global connection.
//! 3. Writes are either whole-document sets, merge-sets (nested objects are merged key by key), or
//!    field-level updates addressed with dotted paths such as `replies.3`.
//! 4. There is no compare-and-swap. The last write wins.
//!
//! Keeping local state in line with the remote copy is done by polling (see [`schedule::every`]).

pub mod memory;
pub mod schedule;
mod status;

#[cfg(feature = "supabase")]
pub mod supabase;

pub use memory::MemoryStore;
pub use status::SyncStatus;

/// A stored document. Top-level keys are field names.
pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Malformed document")]
    Decode(#[from] serde_json::Error),
}

/// Result of a field-level update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The document does not exist, so nothing was written.
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    FieldEquals {
        field: String,
        value: serde_json::Value,
    },
}

impl Filter {
    pub fn field_equals(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Filter::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::FieldEquals { field, value } => document.get(field) == Some(value),
        }
    }
}

/// Keyed document access. Implementations are single-threaded; futures are not required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Fetch a document. `Ok(None)` means it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document. With `merge` the fields are deep-merged into any existing document,
    /// otherwise the document is replaced.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        merge: bool,
    ) -> Result<(), StoreError>;

    /// Update individual fields of an existing document. Keys may be dotted paths.
    /// Does not create the document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Append a new document under a store-generated id, which is returned.
    async fn add(&self, collection: &str, fields: Document) -> Result<String, StoreError>;

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Document)>, StoreError>;
}

/// Deep-merge `fields` into `target`: nested objects are merged, everything else is overwritten.
pub fn merge_into(target: &mut Document, fields: Document) {
    for (key, value) in fields {
        match (target.get_mut(&key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Set the value at a dotted path (`replies.3`), creating intermediate objects.
/// A non-object found along the path is replaced by an object.
pub fn set_path(target: &mut Document, path: &str, value: serde_json::Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::Value::Object(Document::new()));
        if !entry.is_object() {
            *entry = serde_json::Value::Object(Document::new());
        }
        let serde_json::Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
}
