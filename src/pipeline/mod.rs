//! Job-application mail pipeline.
//!
//! Each unread message flows through:
//! 1. `Classifier::is_job_application()`: YES/NO from the model
//! 2. `Extractor::extract()`: structured fields, repaired and normalized
//! 3. `Reconciler::reconcile()`: create or update keyed on role + organization
//! 4. acknowledgement, whatever the outcome

pub mod classifier;
pub mod extractor;
pub mod processor;
pub mod reconciler;
pub mod types;

pub use processor::Pipeline;
