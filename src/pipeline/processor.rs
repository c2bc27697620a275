//! Batch processor: drives unread mail through classify, extract and reconcile.
//!
//! Every message that was fetched is acknowledged at the end of its
//! iteration, whatever happened to it. A message that could not be fetched
//! is left unread so the next run sees it again.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::mail::{MailSource, MessageId, RawMessage, extract_body};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::extractor::Extractor;
use crate::pipeline::reconciler::{Reconciler, Reconciliation};
use crate::pipeline::types::{BatchOutcome, MessageOutcome, ProcessedMessage};

/// Sequential job-application pipeline over one mailbox.
pub struct Pipeline {
    mail: Arc<dyn MailSource>,
    classifier: Classifier,
    extractor: Extractor,
    reconciler: Reconciler,
}

impl Pipeline {
    pub fn new(
        mail: Arc<dyn MailSource>,
        classifier: Classifier,
        extractor: Extractor,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            mail,
            classifier,
            extractor,
            reconciler,
        }
    }

    /// Process at most `max_messages` unread messages, one at a time, in the
    /// order the mail source lists them.
    ///
    /// Never fails: per-message problems land in the message's outcome and a
    /// listing failure yields an empty batch.
    pub async fn process(&self, max_messages: usize) -> BatchOutcome {
        let started_at = Utc::now();

        let ids = match self.mail.list_unread(max_messages).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to list unread messages");
                Vec::new()
            }
        };
        info!(count = ids.len(), "Processing unread messages");

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids.into_iter().take(max_messages) {
            messages.push(self.process_one(id).await);
        }

        let batch = BatchOutcome {
            messages,
            started_at,
            finished_at: Utc::now(),
        };
        let counts = batch.counts();
        info!(
            total = batch.total(),
            created = counts.created,
            updated = counts.updated,
            skipped_irrelevant = counts.skipped_irrelevant,
            skipped_extraction_failed = counts.skipped_extraction_failed,
            failed = counts.failed,
            unacknowledged = batch.unacknowledged(),
            "Batch processing complete"
        );
        batch
    }

    async fn process_one(&self, id: MessageId) -> ProcessedMessage {
        let message = match self.mail.get(&id).await {
            Ok(message) => message,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to fetch message, leaving it unread");
                return ProcessedMessage {
                    id,
                    subject: String::new(),
                    outcome: MessageOutcome::Failed {
                        reason: format!("fetch failed: {e}"),
                    },
                    acknowledged: false,
                };
            }
        };

        info!(id = %id, subject = %message.subject, "Processing message");
        let outcome = self.evaluate(&message).await;
        match &outcome {
            MessageOutcome::Failed { reason } => {
                warn!(id = %id, reason = %reason, "Message failed");
            }
            other => debug!(id = %id, outcome = other.label(), "Message processed"),
        }

        let acknowledged = match self.mail.mark_read(&id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to mark message as read");
                false
            }
        };

        ProcessedMessage {
            id,
            subject: message.subject,
            outcome,
            acknowledged,
        }
    }

    async fn evaluate(&self, message: &RawMessage) -> MessageOutcome {
        let body = extract_body(message);

        match self
            .classifier
            .is_job_application(&message.subject, &body)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(id = %message.id, "Not a job application email");
                return MessageOutcome::SkippedIrrelevant;
            }
            Err(e) => {
                return MessageOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }

        let candidate = match self
            .extractor
            .extract(&message.subject, &body, &message.date)
            .await
        {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return MessageOutcome::SkippedExtractionFailed,
            Err(e) => {
                return MessageOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        match self.reconciler.reconcile(&candidate).await {
            Ok(Reconciliation::Created {
                record_id,
                sequence_number,
            }) => MessageOutcome::Created {
                record_id,
                sequence_number,
            },
            Ok(Reconciliation::Updated { record_id }) => MessageOutcome::Updated { record_id },
            Err(e) => MessageOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, MailError};
    use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
    use crate::mail::MessagePart;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const DB: &str = "db-1";

    /// Mailbox stub: every listed id is fetchable unless marked missing.
    #[derive(Default)]
    struct StubMailbox {
        ids: Vec<&'static str>,
        missing: HashSet<&'static str>,
        fail_list: bool,
        fail_mark_read: bool,
        marked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MailSource for StubMailbox {
        async fn list_unread(&self, limit: usize) -> Result<Vec<MessageId>, MailError> {
            if self.fail_list {
                return Err(MailError::RequestFailed {
                    operation: "list".into(),
                    reason: "offline".into(),
                });
            }
            Ok(self.ids.iter().take(limit).map(|id| MessageId::new(*id)).collect())
        }

        async fn get(&self, id: &MessageId) -> Result<RawMessage, MailError> {
            if self.missing.contains(id.as_str()) {
                return Err(MailError::NotFound {
                    id: id.to_string(),
                });
            }
            Ok(RawMessage {
                id: id.clone(),
                subject: format!("subject {id}"),
                date: String::new(),
                payload: MessagePart::text("text/plain", "body"),
            })
        }

        async fn mark_read(&self, id: &MessageId) -> Result<(), MailError> {
            if self.fail_mark_read {
                return Err(MailError::RequestFailed {
                    operation: "modify".into(),
                    reason: "offline".into(),
                });
            }
            self.marked.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    /// LLM stub that always gives the same answer.
    struct ConstLlm(&'static str);

    #[async_trait]
    impl LlmProvider for ConstLlm {
        fn model_name(&self) -> &str {
            "const"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.0.to_string(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    fn pipeline(mail: Arc<StubMailbox>, classifier: &'static str, extractor: &'static str) -> Pipeline {
        let store = Arc::new(MemoryStore::new(DB));
        Pipeline::new(
            mail,
            Classifier::new(Arc::new(ConstLlm(classifier))),
            Extractor::new(Arc::new(ConstLlm(extractor))),
            Reconciler::new(store, DB),
        )
    }

    #[tokio::test]
    async fn irrelevant_messages_are_acknowledged() {
        let mail = Arc::new(StubMailbox {
            ids: vec!["a", "b"],
            ..Default::default()
        });
        let batch = pipeline(mail.clone(), "NO", "{}").process(10).await;

        assert_eq!(batch.counts().skipped_irrelevant, 2);
        assert_eq!(batch.unacknowledged(), 0);
        assert_eq!(*mail.marked.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn listing_failure_yields_empty_batch() {
        let mail = Arc::new(StubMailbox {
            ids: vec!["a"],
            fail_list: true,
            ..Default::default()
        });
        let batch = pipeline(mail, "YES", "{}").process(10).await;
        assert_eq!(batch.total(), 0);
        assert!(batch.finished_at >= batch.started_at);
    }

    #[tokio::test]
    async fn fetch_failure_is_failed_and_not_acknowledged() {
        let mail = Arc::new(StubMailbox {
            ids: vec!["gone", "ok"],
            missing: HashSet::from(["gone"]),
            ..Default::default()
        });
        let batch = pipeline(mail.clone(), "NO", "{}").process(10).await;

        assert!(matches!(batch.messages[0].outcome, MessageOutcome::Failed { .. }));
        assert!(!batch.messages[0].acknowledged);
        assert_eq!(batch.messages[1].outcome, MessageOutcome::SkippedIrrelevant);
        assert_eq!(*mail.marked.lock().unwrap(), vec!["ok"]);
    }

    #[tokio::test]
    async fn mark_read_failure_is_recorded_not_fatal() {
        let mail = Arc::new(StubMailbox {
            ids: vec!["a"],
            fail_mark_read: true,
            ..Default::default()
        });
        let batch = pipeline(mail, "NO", "{}").process(10).await;
        assert_eq!(batch.messages[0].outcome, MessageOutcome::SkippedIrrelevant);
        assert!(!batch.messages[0].acknowledged);
        assert_eq!(batch.unacknowledged(), 1);
    }

    #[tokio::test]
    async fn max_messages_caps_the_batch() {
        let mail = Arc::new(StubMailbox {
            ids: vec!["a", "b", "c"],
            ..Default::default()
        });
        let batch = pipeline(mail, "NO", "{}").process(2).await;
        assert_eq!(batch.total(), 2);
    }

    #[tokio::test]
    async fn unparseable_extraction_is_skipped_and_acknowledged() {
        let mail = Arc::new(StubMailbox {
            ids: vec!["a"],
            ..Default::default()
        });
        let batch = pipeline(mail, "YES", "not json at all").process(10).await;
        assert_eq!(batch.messages[0].outcome, MessageOutcome::SkippedExtractionFailed);
        assert!(batch.messages[0].acknowledged);
    }

    #[tokio::test]
    async fn relevant_message_creates_record() {
        let mail = Arc::new(StubMailbox {
            ids: vec!["a"],
            ..Default::default()
        });
        let batch = pipeline(
            mail,
            "YES",
            r#"{"role": "Engineer", "organization": "Acme", "status": "applied"}"#,
        )
        .process(10)
        .await;

        assert!(matches!(
            batch.messages[0].outcome,
            MessageOutcome::Created {
                sequence_number: 1,
                ..
            }
        ));
        assert_eq!(batch.messages[0].subject, "subject a");
    }
}
