//! `RecordStore` trait: the raw query/write surface of the external record store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::pipeline::types::ApplicationStatus;

/// A persisted row, as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-assigned record id.
    pub id: String,
    /// Id of the container the record lives under (e.g. a database id).
    pub parent_id: String,
    pub role: String,
    pub organization: String,
    /// Raw status label; may be anything if edited by hand.
    pub status: Option<String>,
    pub job_description_link: Option<String>,
    pub sequence_number: Option<u64>,
    pub notes: String,
}

/// One page of a paginated query.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Fields written when a record is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub role: String,
    pub organization: String,
    pub status: ApplicationStatus,
    pub sequence_number: u64,
    pub notes: String,
    pub job_description_link: Option<String>,
}

/// Fields written when an existing record is updated.
///
/// A `None` link leaves the stored link untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub status: ApplicationStatus,
    pub job_description_link: Option<String>,
}

/// Backend-agnostic record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one page of records, starting at `cursor` (first page when `None`).
    async fn query(&self, cursor: Option<&str>, page_size: usize)
    -> Result<RecordPage, StoreError>;

    /// Create a record. Returns the new record id.
    async fn create(&self, record: &NewRecord) -> Result<String, StoreError>;

    /// Partially update a record.
    async fn update(&self, record_id: &str, update: &RecordUpdate) -> Result<(), StoreError>;
}
