//! Reconciler: decides create-vs-update for a candidate and applies it.
//!
//! Lookup and numbering are full paginated scans of the store, filtered to
//! records parented under the configured target. Nothing is locked: two
//! concurrent runs against the same store can hand out the same sequence
//! number.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{PipelineError, StoreError};
use crate::pipeline::types::JobApplication;
use crate::store::traits::{NewRecord, RecordStore, RecordUpdate, StoredRecord};

/// Records requested per store query.
pub const STORE_PAGE_SIZE: usize = 100;

/// What the reconciler did with a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Created {
        record_id: String,
        sequence_number: u64,
    },
    Updated {
        record_id: String,
    },
}

/// A container id accepted in both its hyphenated and compact forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentTarget {
    hyphenated: String,
    compact: String,
}

impl ParentTarget {
    pub fn new(id: &str) -> Self {
        let compact: String = id.trim().chars().filter(|c| *c != '-').collect();
        let hyphenated = if compact.len() == 32 && compact.is_ascii() {
            format!(
                "{}-{}-{}-{}-{}",
                &compact[..8],
                &compact[8..12],
                &compact[12..16],
                &compact[16..20],
                &compact[20..]
            )
        } else {
            id.trim().to_string()
        };
        Self {
            hyphenated,
            compact,
        }
    }

    pub fn matches(&self, parent_id: &str) -> bool {
        let parent_id = parent_id.trim();
        parent_id.eq_ignore_ascii_case(&self.hyphenated)
            || parent_id.eq_ignore_ascii_case(&self.compact)
    }
}

/// Reflects candidates into the record store.
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    target: ParentTarget,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>, target_id: &str) -> Self {
        Self {
            store,
            target: ParentTarget::new(target_id),
        }
    }

    /// Create a new record or update the existing one for this natural key.
    pub async fn reconcile(
        &self,
        candidate: &JobApplication,
    ) -> Result<Reconciliation, PipelineError> {
        validate(candidate)?;

        match self.find_existing(candidate).await? {
            Some(existing) => {
                debug!(record_id = %existing.id, "Application already tracked, updating");
                self.update(&existing, candidate).await
            }
            None => {
                debug!("New application, creating record");
                self.create(candidate).await
            }
        }
    }

    /// First record under the target whose trimmed role and organization equal
    /// the candidate's.
    pub async fn find_existing(
        &self,
        candidate: &JobApplication,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let (role, organization) = candidate.natural_key();
        let mut found = None;

        self.scan(|record| {
            if record.role.trim() == role && record.organization.trim() == organization {
                found = Some(record.clone());
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;

        Ok(found)
    }

    /// One more than the highest sequence number under the target, or 1.
    pub async fn next_sequence_number(&self) -> Result<u64, StoreError> {
        let mut max = 0_u64;
        self.scan(|record| {
            if let Some(n) = record.sequence_number {
                max = max.max(n);
            }
            ControlFlow::Continue(())
        })
        .await?;
        max.checked_add(1).ok_or_else(|| {
            StoreError::Query(format!("sequence number {max} cannot be incremented"))
        })
    }

    async fn create(&self, candidate: &JobApplication) -> Result<Reconciliation, PipelineError> {
        let sequence_number = self.next_sequence_number().await?;
        let (role, organization) = candidate.natural_key();

        let record = NewRecord {
            role: role.to_string(),
            organization: organization.to_string(),
            status: candidate.status,
            sequence_number,
            notes: String::new(),
            job_description_link: candidate.job_description_link.clone(),
        };
        let record_id = self.store.create(&record).await?;

        info!(
            role = %record.role,
            organization = %record.organization,
            sequence_number,
            "Created job application"
        );
        Ok(Reconciliation::Created {
            record_id,
            sequence_number,
        })
    }

    async fn update(
        &self,
        existing: &StoredRecord,
        candidate: &JobApplication,
    ) -> Result<Reconciliation, PipelineError> {
        let update = RecordUpdate {
            status: candidate.status,
            job_description_link: candidate.job_description_link.clone(),
        };
        self.store.update(&existing.id, &update).await?;

        info!(
            role = %existing.role,
            organization = %existing.organization,
            status = %update.status,
            "Updated job application"
        );
        Ok(Reconciliation::Updated {
            record_id: existing.id.clone(),
        })
    }

    /// Visit every record under the target, page by page, until the store
    /// reports no more pages or the visitor breaks.
    async fn scan<F>(&self, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(&StoredRecord) -> ControlFlow<()>,
    {
        let mut cursor: Option<String> = None;
        loop {
            let page = self.store.query(cursor.as_deref(), STORE_PAGE_SIZE).await?;

            for record in page.records.iter().filter(|r| self.target.matches(&r.parent_id)) {
                if visit(record).is_break() {
                    return Ok(());
                }
            }

            if !page.has_more {
                return Ok(());
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    warn!("Store reported more pages without a cursor");
                    return Err(StoreError::Query(
                        "has_more set but no next_cursor returned".into(),
                    ));
                }
            }
        }
    }
}

/// Refuse candidates whose natural key is empty after trimming.
fn validate(candidate: &JobApplication) -> Result<(), PipelineError> {
    let (role, organization) = candidate.natural_key();
    if role.is_empty() || organization.is_empty() {
        return Err(PipelineError::Validation(format!(
            "role and organization must be non-empty (role: {role:?}, organization: {organization:?})"
        )));
    }
    Ok(())
}
