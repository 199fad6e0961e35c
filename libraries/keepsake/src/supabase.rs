//! A [`DocumentStore`] backed by a Supabase database, talking to PostgREST.
//!
//! Expects the `documents` table and the `doc_merge` / `doc_update` functions from `schema.sql`.
use serde_json::json;

use crate::{Document, DocumentStore, Filter, StoreError, UpdateOutcome};

#[derive(serde::Serialize, serde::Deserialize, tsify::Tsify, Clone, Debug)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct SupabaseConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

#[derive(Clone, Debug)]
pub struct SupabaseStore {
    config: SupabaseConfig,
}

#[derive(Debug, serde::Deserialize)]
struct Row {
    id: String,
    #[serde(default)]
    data: Document,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Self {
        Self { config }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/documents", self.config.supabase_url)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{function}", self.config.supabase_url)
    }

    async fn rows(&self, url: &str) -> Result<Vec<Row>, StoreError> {
        let SupabaseConfig {
            supabase_anon_key, ..
        } = &self.config;

        let response = fetch_happen::Client
            .get(url)
            .header("apikey", supabase_anon_key)
            .header("Authorization", format!("Bearer {supabase_anon_key}"))
            .send()
            .await
            .map_err(transport_error)?;

        let body = checked_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post(
        &self,
        url: &str,
        prefer: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<String, StoreError> {
        let SupabaseConfig {
            supabase_anon_key, ..
        } = &self.config;

        let mut request = fetch_happen::Client
            .post(url)
            .header("apikey", supabase_anon_key)
            .header("Authorization", format!("Bearer {supabase_anon_key}"));
        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }

        let response = request
            .json(payload)
            .map_err(transport_error)?
            .send()
            .await
            .map_err(transport_error)?;

        checked_body(response).await
    }
}

fn transport_error(e: fetch_happen::Error) -> StoreError {
    StoreError::Unavailable(format!("{e:?}"))
}

async fn checked_body(response: fetch_happen::Response) -> Result<String, StoreError> {
    let status = response.status().to_string();
    let ok = response.ok();
    let body = response.text().await.map_err(transport_error)?;
    if ok {
        return Ok(body);
    }
    // PostgREST reports row-level-security rejections as 401/403
    if status.starts_with("401") || status.starts_with("403") {
        return Err(StoreError::PermissionDenied);
    }
    Err(StoreError::Unavailable(format!(
        "Request failed with status {status}: {body}"
    )))
}

fn eq(value: &str) -> String {
    format!("eq.{}", urlencoding::encode(value))
}

impl DocumentStore for SupabaseStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let url = format!(
            "{}?collection={}&id={}&select=id,data",
            self.table_url(),
            eq(collection),
            eq(id)
        );
        Ok(self.rows(&url).await?.into_iter().next().map(|row| row.data))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        merge: bool,
    ) -> Result<(), StoreError> {
        if merge {
            let payload = json!({
                "p_collection": collection,
                "p_id": id,
                "p_fields": fields,
            });
            self.post(&self.rpc_url("doc_merge"), None, &payload)
                .await?;
        } else {
            let payload = json!({
                "collection": collection,
                "id": id,
                "data": fields,
            });
            self.post(
                &self.table_url(),
                Some("resolution=merge-duplicates"),
                &payload,
            )
            .await?;
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<UpdateOutcome, StoreError> {
        let payload = json!({
            "p_collection": collection,
            "p_id": id,
            "p_fields": fields,
        });
        let body = self
            .post(&self.rpc_url("doc_update"), None, &payload)
            .await?;
        let updated_rows: i64 = serde_json::from_str(&body)?;
        Ok(if updated_rows == 0 {
            UpdateOutcome::Missing
        } else {
            UpdateOutcome::Updated
        })
    }

    async fn add(&self, collection: &str, fields: Document) -> Result<String, StoreError> {
        let payload = json!({
            "collection": collection,
            "data": fields,
        });
        let body = self
            .post(&self.table_url(), Some("return=representation"), &payload)
            .await?;
        let rows: Vec<Row> = serde_json::from_str(&body)?;
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| StoreError::Unavailable("Insert returned no rows".to_string()))
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let Filter::FieldEquals { field, value } = filter;
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let url = format!(
            "{}?collection={}&data->>{}={}&select=id,data",
            self.table_url(),
            eq(collection),
            urlencoding::encode(field),
            eq(&value)
        );
        Ok(self
            .rows(&url)
            .await?
            .into_iter()
            .map(|row| (row.id, row.data))
            .collect())
    }
}
