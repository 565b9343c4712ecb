//! Job records and their staged wire form.

use crate::{UploadError, UploadResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Job identifier as assigned by the job store.
pub type JobId = i64;

/// A job as handed over by the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job ID.
    pub job_id: JobId,
    /// Serialized event payload; the transformed message lives at `body.JSON`.
    pub event_payload: Value,
}

impl JobRecord {
    /// Create a new job record.
    pub fn new(job_id: JobId, event_payload: Value) -> Self {
        Self {
            job_id,
            event_payload,
        }
    }

    /// The transformed message carried in the event payload, if any.
    pub fn transformed_data(&self) -> Option<&Value> {
        self.event_payload.get("body").and_then(|body| body.get("JSON"))
    }

    /// The transformed message as a JSON object.
    pub fn transformed_message(&self) -> UploadResult<Map<String, Value>> {
        let data = self
            .transformed_data()
            .ok_or(UploadError::MissingTransformedData(self.job_id))?;
        serde_json::from_value(data.clone()).map_err(|source| {
            UploadError::MalformedTransformedData {
                job_id: self.job_id,
                source,
            }
        })
    }
}

/// One staged job line: the message for the destination plus its metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagedJob {
    /// Destination-shaped message.
    #[serde(default)]
    pub message: Map<String, Value>,
    /// Job metadata (at least `job_id`).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StagedJob {
    /// Build a staged job from a message, stamping the job ID into metadata.
    pub fn for_job(message: Map<String, Value>, job_id: JobId) -> Self {
        let mut metadata = Map::new();
        metadata.insert("job_id".to_string(), Value::from(job_id));
        Self { message, metadata }
    }

    /// The job ID stamped into metadata, if present and numeric.
    pub fn job_id(&self) -> Option<JobId> {
        self.metadata.get("job_id").and_then(Value::as_i64)
    }
}

/// Serialize a transformed payload into one staged line for `job_id`.
pub fn staged_line(transformed_payload: &str, job_id: JobId) -> UploadResult<String> {
    let message: Map<String, Value> = serde_json::from_str(transformed_payload)
        .map_err(|source| UploadError::MalformedTransformedData { job_id, source })?;
    let line = serde_json::to_string(&StagedJob::for_job(message, job_id))?;
    Ok(line)
}
