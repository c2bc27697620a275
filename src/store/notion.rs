//! Notion database as a `RecordStore`.
//!
//! One page per application. Property names are fixed: `Number`, `Role`
//! (title), `Organization` (rich text), `Status` (select), `Job description`
//! (url) and `Notes` (rich text).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::StoreError;
use crate::store::traits::{NewRecord, RecordPage, RecordStore, RecordUpdate, StoredRecord};

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";

const PROP_NUMBER: &str = "Number";
const PROP_ROLE: &str = "Role";
const PROP_ORGANIZATION: &str = "Organization";
const PROP_STATUS: &str = "Status";
const PROP_LINK: &str = "Job description";
const PROP_NOTES: &str = "Notes";

/// Notion-backed record store.
pub struct NotionStore {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    database_id: String,
}

impl NotionStore {
    pub fn new(api_key: SecretString, database_id: impl Into<String>) -> Self {
        Self::with_base_url(NOTION_API_BASE, api_key, database_id)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: SecretString,
        database_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database_id: database_id.into(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, String> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("HTTP {status}: {body}"));
    }
    resp.json::<Value>().await.map_err(|e| e.to_string())
}

// ── Property encoding ───────────────────────────────────────────────

fn text_content(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": content } }])
}

/// Properties for a new page.
fn create_properties(record: &NewRecord) -> Value {
    let notes = if record.notes.is_empty() {
        json!([])
    } else {
        text_content(&record.notes)
    };
    let mut properties = json!({
        PROP_NUMBER: { "number": record.sequence_number },
        PROP_ROLE: { "title": text_content(&record.role) },
        PROP_ORGANIZATION: { "rich_text": text_content(&record.organization) },
        PROP_STATUS: { "select": { "name": record.status.as_str() } },
        PROP_NOTES: { "rich_text": notes },
    });
    if let Some(link) = &record.job_description_link {
        properties[PROP_LINK] = json!({ "url": link });
    }
    properties
}

/// Properties for a partial update. The link is only sent when present.
fn update_properties(update: &RecordUpdate) -> Value {
    let mut properties = json!({
        PROP_STATUS: { "select": { "name": update.status.as_str() } },
    });
    if let Some(link) = &update.job_description_link {
        properties[PROP_LINK] = json!({ "url": link });
    }
    properties
}

// ── Page decoding ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

fn plain_text(rich: Option<&Value>) -> String {
    rich.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.get("plain_text")
                        .or_else(|| item.get("text").and_then(|t| t.get("content")))
                        .and_then(Value::as_str)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parent_id(page: &Value) -> String {
    let parent = &page["parent"];
    parent
        .get("database_id")
        .or_else(|| parent.get("data_source_id"))
        .or_else(|| parent.get("page_id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn decode_page(page: &Value) -> Option<StoredRecord> {
    let id = page.get("id")?.as_str()?.to_string();
    let props = page.get("properties")?;

    let sequence_number = props[PROP_NUMBER]
        .get("number")
        .and_then(Value::as_f64)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64);

    Some(StoredRecord {
        id,
        parent_id: parent_id(page),
        role: plain_text(props[PROP_ROLE].get("title")),
        organization: plain_text(props[PROP_ORGANIZATION].get("rich_text")),
        status: props[PROP_STATUS]
            .get("select")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        job_description_link: props[PROP_LINK]
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string),
        sequence_number,
        notes: plain_text(props[PROP_NOTES].get("rich_text")),
    })
}

// ── RecordStore ─────────────────────────────────────────────────────

#[async_trait]
impl RecordStore for NotionStore {
    async fn query(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<RecordPage, StoreError> {
        let mut body = json!({ "page_size": page_size });
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/databases/{}/query", self.database_id),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let value = read_json(resp).await.map_err(StoreError::Query)?;
        let parsed: QueryResponse =
            serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let records: Vec<StoredRecord> = parsed.results.iter().filter_map(decode_page).collect();
        debug!(
            count = records.len(),
            has_more = parsed.has_more,
            "Queried Notion database page"
        );

        Ok(RecordPage {
            records,
            has_more: parsed.has_more,
            next_cursor: parsed.next_cursor,
        })
    }

    async fn create(&self, record: &NewRecord) -> Result<String, StoreError> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": create_properties(record),
        });

        let resp = self
            .request(reqwest::Method::POST, "/pages")
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Create(e.to_string()))?;
        let page = read_json(resp).await.map_err(StoreError::Create)?;

        page.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Serialization("created page has no id".into()))
    }

    async fn update(&self, record_id: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        let body = json!({ "properties": update_properties(update) });

        let resp = self
            .request(reqwest::Method::PATCH, &format!("/pages/{record_id}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Update {
                id: record_id.to_string(),
                reason: e.to_string(),
            })?;
        read_json(resp).await.map_err(|reason| StoreError::Update {
            id: record_id.to_string(),
            reason,
        })?;
        Ok(())
    }
}
