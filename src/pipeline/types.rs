//! Shared types for the classification-and-reconciliation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mail::MessageId;

/// Placeholder used when the model cannot name the role.
pub const UNKNOWN_ROLE: &str = "Unknown Role";

/// Placeholder used when the model cannot name the organization.
pub const UNKNOWN_ORGANIZATION: &str = "Unknown Organization";

// ── Application status ──────────────────────────────────────────────

/// Where an application stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[default]
    Applied,
    Interview,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::Interview => "Interview",
            Self::Rejected => "Rejected",
        }
    }

    /// Normalize a free-form status label.
    ///
    /// The label is trimmed and title-cased; anything other than the three
    /// known values (including no label at all) becomes `Applied`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Applied;
        };
        match title_case(raw.trim()).as_str() {
            "Interview" => Self::Interview,
            "Rejected" => Self::Rejected,
            _ => Self::Applied,
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"iNTERVIEW"` → `"Interview"`.
fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

// ── Job application ─────────────────────────────────────────────────

/// A job application, either a candidate from extraction or a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApplication {
    pub role: String,
    pub organization: String,
    pub job_description_link: Option<String>,
    pub status: ApplicationStatus,
    /// Only set once the record has been created in the store.
    pub sequence_number: Option<u64>,
}

impl JobApplication {
    /// Candidate with no sequence number yet.
    pub fn candidate(
        role: impl Into<String>,
        organization: impl Into<String>,
        job_description_link: Option<String>,
        status: ApplicationStatus,
    ) -> Self {
        Self {
            role: role.into(),
            organization: organization.into(),
            job_description_link,
            status,
            sequence_number: None,
        }
    }

    /// The natural key: trimmed role and trimmed organization.
    pub fn natural_key(&self) -> (&str, &str) {
        (self.role.trim(), self.organization.trim())
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// What happened to a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    /// Classifier said the message is not about a job application.
    SkippedIrrelevant,
    /// The model's extraction could not be parsed.
    SkippedExtractionFailed,
    /// A new record was created.
    Created {
        record_id: String,
        sequence_number: u64,
    },
    /// An existing record was updated.
    Updated { record_id: String },
    /// Any transport, model or validation failure.
    Failed { reason: String },
}

impl MessageOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SkippedIrrelevant => "skipped_irrelevant",
            Self::SkippedExtractionFailed => "skipped_extraction_failed",
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of running one message through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub id: MessageId,
    /// Empty when the message could not be fetched.
    pub subject: String,
    pub outcome: MessageOutcome,
    /// Whether `mark_read` succeeded.
    pub acknowledged: bool,
}

/// Per-category counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub skipped_irrelevant: usize,
    pub skipped_extraction_failed: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Result of one batch pass.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub messages: Vec<ProcessedMessage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchOutcome {
    pub fn counts(&self) -> BatchCounts {
        let mut counts = BatchCounts::default();
        for message in &self.messages {
            match message.outcome {
                MessageOutcome::SkippedIrrelevant => counts.skipped_irrelevant += 1,
                MessageOutcome::SkippedExtractionFailed => counts.skipped_extraction_failed += 1,
                MessageOutcome::Created { .. } => counts.created += 1,
                MessageOutcome::Updated { .. } => counts.updated += 1,
                MessageOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.messages.len()
    }

    pub fn unacknowledged(&self) -> usize {
        self.messages.iter().filter(|m| !m.acknowledged).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_known_values_any_case() {
        assert_eq!(ApplicationStatus::normalize(Some("applied")), ApplicationStatus::Applied);
        assert_eq!(ApplicationStatus::normalize(Some("INTERVIEW")), ApplicationStatus::Interview);
        assert_eq!(ApplicationStatus::normalize(Some("rEjEcTeD")), ApplicationStatus::Rejected);
        assert_eq!(ApplicationStatus::normalize(Some("  Interview \n")), ApplicationStatus::Interview);
    }

    #[test]
    fn status_unknown_values_collapse_to_applied() {
        for raw in ["offer", "Offer", "", "   ", "null", "interviewing", "Rejected!"] {
            assert_eq!(
                ApplicationStatus::normalize(Some(raw)),
                ApplicationStatus::Applied,
                "{raw:?}"
            );
        }
        assert_eq!(ApplicationStatus::normalize(None), ApplicationStatus::Applied);
    }

    #[test]
    fn status_display_matches_as_str() {
        assert_eq!(ApplicationStatus::Interview.to_string(), "Interview");
        assert_eq!(ApplicationStatus::default(), ApplicationStatus::Applied);
    }

    #[test]
    fn title_case_handles_unicode_and_empty() {
        assert_eq!(title_case("éCOLE"), "École");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn natural_key_is_trimmed_and_case_sensitive() {
        let a = JobApplication::candidate(" Engineer ", "Acme\t", None, ApplicationStatus::Applied);
        let b = JobApplication::candidate("engineer", "Acme", None, ApplicationStatus::Applied);
        assert_eq!(a.natural_key(), ("Engineer", "Acme"));
        assert_ne!(a.natural_key(), b.natural_key());
        assert!(a.sequence_number.is_none());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(MessageOutcome::SkippedIrrelevant.label(), "skipped_irrelevant");
        assert_eq!(MessageOutcome::SkippedExtractionFailed.label(), "skipped_extraction_failed");
        assert_eq!(
            MessageOutcome::Created {
                record_id: "r".into(),
                sequence_number: 1
            }
            .label(),
            "created"
        );
        assert_eq!(MessageOutcome::Updated { record_id: "r".into() }.label(), "updated");
        assert_eq!(MessageOutcome::Failed { reason: "x".into() }.label(), "failed");
    }

    #[test]
    fn outcome_serialization_is_tagged() {
        let json = serde_json::to_value(MessageOutcome::Updated {
            record_id: "page-1".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "updated");
        assert_eq!(json["record_id"], "page-1");
    }

    #[test]
    fn batch_counts_tally_outcomes() {
        let now = Utc::now();
        let processed = |outcome, acknowledged| ProcessedMessage {
            id: MessageId::new("m"),
            subject: String::new(),
            outcome,
            acknowledged,
        };
        let batch = BatchOutcome {
            messages: vec![
                processed(MessageOutcome::SkippedIrrelevant, true),
                processed(MessageOutcome::SkippedIrrelevant, true),
                processed(MessageOutcome::Updated { record_id: "r".into() }, true),
                processed(MessageOutcome::Failed { reason: "x".into() }, false),
            ],
            started_at: now,
            finished_at: now,
        };
        let counts = batch.counts();
        assert_eq!(counts.skipped_irrelevant, 2);
        assert_eq!(counts.updated, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.created, 0);
        assert_eq!(batch.total(), 4);
        assert_eq!(batch.unacknowledged(), 1);
    }
}
