//! Job mail tracker: turns job-application emails into tracker records.

pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod store;
