//! Upload of staged job batches to asynchronous destinations.
//!
//! This crate provides:
//! - UploadRequest: batch assembly from staged job lines
//! - submit_upload / HttpTransport: one observed submission over HTTP
//! - Reconciler: partitions a batch into importing, failed and aborted jobs
//! - FailedPayload: dead-letter projection of failed jobs
//! - AsyncDestinationManager: the assemble → submit → reconcile chain

mod assembler;
mod batch;
mod config;
mod error;
mod failed_payload;
mod job;
mod manager;
mod reconciler;
mod sender;
pub mod stats;
mod transport;

pub use assembler::UploadRequest;
pub use batch::StagedBatch;
pub use config::{
    ManagerConfig, RetryConfig, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_OVERFLOW_FAILED_REASON,
    HTTP_TIMEOUT_ENV,
};
pub use error::{UploadError, UploadResult};
pub use failed_payload::{generate_failed_payload, FailedPayload};
pub use job::{staged_line, JobId, JobRecord, StagedJob};
pub use manager::AsyncDestinationManager;
pub use reconciler::{
    clean_up_data, Cleanup, DestinationStatus, ImportDescriptor, ImportMetadata,
    ImportParameters, Reconciler, UploadOutcome, TRANSPORT_FAILED_REASON,
};
pub use sender::HttpTransport;
pub use stats::{NoopStats, StatTags, TracingStats, UploadStats};
pub use transport::{submit_upload, TransportResponse, TransportResult, UploadTransport};
