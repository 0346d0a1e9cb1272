// src/store/firestore.rs
//! Firestore backend over the REST v1 API.
//!
//! Auth is a bearer token taken from the environment (`FIRESTORE_ACCESS_TOKEN`);
//! token minting is left to the deployment. With `FIRESTORE_EMULATOR_HOST`
//! set, requests go to the emulator over plain HTTP.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};

use super::{
    Document, DocumentStore, DocumentStream, FieldValue, Fields, StoreError, StoreResult,
};

pub const ENV_PROJECT_ID: &str = "FIRESTORE_PROJECT_ID";
pub const ENV_ACCESS_TOKEN: &str = "FIRESTORE_ACCESS_TOKEN";
pub const ENV_EMULATOR_HOST: &str = "FIRESTORE_EMULATOR_HOST";

const PUBLIC_ROOT: &str = "https://firestore.googleapis.com";

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub access_token: Option<String>,
    pub emulator_host: Option<String>,
    pub timeout: Duration,
}

impl FirestoreConfig {
    /// Project from `FIRESTORE_PROJECT_ID` (fallback `GOOGLE_CLOUD_PROJECT`).
    pub fn from_env() -> Result<Self> {
        let project_id = std::env::var(ENV_PROJECT_ID)
            .or_else(|_| std::env::var("GOOGLE_CLOUD_PROJECT"))
            .map_err(|_| anyhow!("Missing {ENV_PROJECT_ID} env var"))?;
        let access_token = std::env::var(ENV_ACCESS_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty());
        let emulator_host = std::env::var(ENV_EMULATOR_HOST)
            .ok()
            .filter(|h| !h.trim().is_empty());
        Ok(Self {
            project_id,
            database: "(default)".to_string(),
            access_token,
            emulator_host,
            timeout: Duration::from_secs(15),
        })
    }
}

pub struct FirestoreStore {
    client: Client,
    cfg: FirestoreConfig,
    root: String,
}

impl FirestoreStore {
    pub fn new(cfg: FirestoreConfig) -> Result<Self> {
        if cfg.emulator_host.is_none() && cfg.access_token.is_none() {
            return Err(anyhow!(
                "Missing {ENV_ACCESS_TOKEN} (required unless {ENV_EMULATOR_HOST} is set)"
            ));
        }
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("Failed to create Firestore HTTP client")?;
        let root = match &cfg.emulator_host {
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None => PUBLIC_ROOT.to_string(),
        };
        Ok(Self { client, cfg, root })
    }

    fn parent(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.cfg.project_id, self.cfg.database
        )
    }

    fn documents_url(&self) -> String {
        format!("{}/v1/{}", self.root, self.parent())
    }

    fn authorized(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.cfg.access_token {
            Some(token) => rb.bearer_auth(token),
            // The emulator accepts this fixed admin token.
            None => rb.bearer_auth("owner"),
        }
    }

    async fn send(&self, rb: RequestBuilder) -> StoreResult<Response> {
        let resp = self.authorized(rb).send().await?;
        Ok(resp)
    }
}

async fn ensure_success(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn query_in(
        &self,
        collection: &str,
        field: &str,
        values: &[&str],
        limit: usize,
    ) -> StoreResult<DocumentStream> {
        let body = run_query_body(collection, field, values, limit);
        let url = format!("{}:runQuery", self.documents_url());
        let resp = ensure_success(self.send(self.client.post(url).json(&body)).await?).await?;
        let rows: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("runQuery response: {e}")))?;

        // One row per matched document; rows without `document` only carry readTime.
        let docs: Vec<StoreResult<Document>> = rows
            .into_iter()
            .filter_map(|mut row| row.get_mut("document").map(Value::take))
            .map(|doc| decode_document(&doc))
            .collect();
        Ok(Box::pin(futures::stream::iter(docs)))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let url = format!("{}/{}/{}", self.documents_url(), collection, id);
        let mut query: Vec<(&str, &str)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", k.as_str()))
            .collect();
        query.push(("currentDocument.exists", "true"));
        let body = json!({ "fields": encode_fields(&fields) });

        let resp = self
            .send(self.client.patch(url).query(&query).json(&body))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        ensure_success(resp).await?;
        Ok(())
    }

    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        let url = format!("{}/{}", self.documents_url(), collection);
        let body = json!({ "fields": encode_fields(&fields) });
        let resp = ensure_success(self.send(self.client.post(url).json(&body)).await?).await?;
        let doc: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("create response: {e}")))?;
        Ok(decode_document(&doc)?.id)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Fields>> {
        let url = format!("{}/{}/{}", self.documents_url(), collection, id);
        let resp = self.send(self.client.get(url)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Value = ensure_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("get response: {e}")))?;
        Ok(Some(decode_document(&doc)?.fields))
    }

    async fn ping(&self) -> StoreResult<()> {
        let url = format!("{}:listCollectionIds", self.documents_url());
        let resp = self
            .send(self.client.post(url).json(&json!({ "pageSize": 1 })))
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "firestore"
    }
}

/// `structuredQuery` selecting `field IN values` with a limit.
pub fn run_query_body(collection: &str, field: &str, values: &[&str], limit: usize) -> Value {
    let in_values: Vec<Value> = values
        .iter()
        .map(|v| json!({ "stringValue": v }))
        .collect();
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "IN",
                    "value": { "arrayValue": { "values": in_values } }
                }
            },
            "limit": limit
        }
    })
}

pub fn encode_fields(fields: &Fields) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect();
    Value::Object(map)
}

pub fn encode_value(v: &FieldValue) -> Value {
    match v {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        // int64 travels as a decimal string
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Double(d) => json!({ "doubleValue": d }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        FieldValue::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
    }
}

/// Decode one typed value. Types this service never writes (maps, references,
/// geo points, bytes) decode as `Null` so a foreign field cannot poison a record.
pub fn decode_value(v: &Value) -> StoreResult<FieldValue> {
    let obj = v
        .as_object()
        .ok_or_else(|| StoreError::Decode(format!("value is not an object: {v}")))?;

    if let Some(s) = obj.get("stringValue") {
        return Ok(FieldValue::String(s.as_str().unwrap_or_default().to_string()));
    }
    if let Some(d) = obj.get("doubleValue") {
        // NaN/Infinity arrive as strings
        let n = d
            .as_f64()
            .or_else(|| d.as_str().and_then(|s| s.parse::<f64>().ok()))
            .ok_or_else(|| StoreError::Decode(format!("bad doubleValue: {d}")))?;
        return Ok(FieldValue::Double(n));
    }
    if let Some(i) = obj.get("integerValue") {
        let n = i
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| i.as_i64())
            .ok_or_else(|| StoreError::Decode(format!("bad integerValue: {i}")))?;
        return Ok(FieldValue::Integer(n));
    }
    if let Some(b) = obj.get("booleanValue") {
        return Ok(FieldValue::Bool(b.as_bool().unwrap_or_default()));
    }
    if let Some(ts) = obj.get("timestampValue") {
        let parsed = ts
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| StoreError::Decode(format!("bad timestampValue: {ts}")))?;
        return Ok(FieldValue::Timestamp(parsed));
    }
    if let Some(arr) = obj.get("arrayValue") {
        let items = match arr.get("values").and_then(Value::as_array) {
            Some(values) => values
                .iter()
                .map(decode_value)
                .collect::<StoreResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        return Ok(FieldValue::Array(items));
    }
    Ok(FieldValue::Null)
}

/// Decode a REST `Document` resource; the id is the last path segment of `name`.
pub fn decode_document(doc: &Value) -> StoreResult<Document> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Decode("document without name".into()))?;
    let id = name
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| StoreError::Decode(format!("bad document name: {name}")))?
        .to_string();

    let mut fields = Fields::new();
    if let Some(map) = doc.get("fields").and_then(Value::as_object) {
        for (k, v) in map {
            fields.insert(k.clone(), decode_value(v)?);
        }
    }
    Ok(Document { id, fields })
}
