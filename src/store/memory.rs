//! In-memory `RecordStore`, paginated like a remote store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::traits::{NewRecord, RecordPage, RecordStore, RecordUpdate, StoredRecord};

/// Records held in a `Vec`, in insertion order.
pub struct MemoryStore {
    parent_id: String,
    max_page_size: usize,
    records: Mutex<Vec<StoredRecord>>,
    fail_writes: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryStore {
    /// New empty store; created records are parented under `parent_id`.
    pub fn new(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            max_page_size: usize::MAX,
            records: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    /// Cap page size below whatever the caller asks for.
    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    /// Insert a record as-is.
    pub async fn insert(&self, record: StoredRecord) {
        self.records.lock().await.push(record);
    }

    /// Snapshot of all records.
    pub async fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().await.clone()
    }

    /// Make every subsequent create/update fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `query` calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<RecordPage, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| StoreError::Query(format!("invalid cursor: {c}")))?,
            None => 0,
        };
        let size = page_size.min(self.max_page_size).max(1);

        let records = self.records.lock().await;
        let end = (start + size).min(records.len());
        let page = records.get(start..end).unwrap_or_default().to_vec();
        let has_more = end < records.len();

        Ok(RecordPage {
            records: page,
            has_more,
            next_cursor: has_more.then(|| end.to_string()),
        })
    }

    async fn create(&self, record: &NewRecord) -> Result<String, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Create("write failures enabled".into()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.records.lock().await.push(StoredRecord {
            id: id.clone(),
            parent_id: self.parent_id.clone(),
            role: record.role.clone(),
            organization: record.organization.clone(),
            status: Some(record.status.as_str().to_string()),
            job_description_link: record.job_description_link.clone(),
            sequence_number: Some(record.sequence_number),
            notes: record.notes.clone(),
        });
        Ok(id)
    }

    async fn update(&self, record_id: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Update {
                id: record_id.to_string(),
                reason: "write failures enabled".into(),
            });
        }

        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| StoreError::NotFound {
                id: record_id.to_string(),
            })?;

        record.status = Some(update.status.as_str().to_string());
        if let Some(link) = &update.job_description_link {
            record.job_description_link = Some(link.clone());
        }
        Ok(())
    }
}
