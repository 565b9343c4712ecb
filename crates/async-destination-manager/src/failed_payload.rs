//! Failed-payload projection for dead-letter reporting.

use crate::{ImportMetadata, JobRecord, StagedJob, UploadResult};
use serde::Serialize;
use serde_json::{Map, Value};

/// Report of jobs that failed inside a destination import.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPayload {
    config: Map<String, Value>,
    input: Vec<StagedJob>,
    dest_type: String,
    import_id: String,
    metadata: ImportMetadata,
}

impl FailedPayload {
    /// Build the payload from job records. Each record must carry its
    /// transformed message as a JSON object; the first that does not fails
    /// the whole call.
    pub fn build(
        config: &Map<String, Value>,
        jobs: &[JobRecord],
        import_id: &str,
        dest_type: &str,
        csv_header: &str,
    ) -> UploadResult<Self> {
        let input = jobs
            .iter()
            .map(|job| {
                job.transformed_message()
                    .map(|message| StagedJob::for_job(message, job.job_id))
            })
            .collect::<UploadResult<Vec<_>>>()?;

        Ok(Self {
            config: config.clone(),
            input,
            dest_type: dest_type.to_lowercase(),
            import_id: import_id.to_string(),
            metadata: ImportMetadata {
                csv_header: csv_header.to_string(),
            },
        })
    }

    /// Jobs in the report.
    pub fn jobs(&self) -> &[StagedJob] {
        &self.input
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> UploadResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Build and serialize a failed payload in one step.
pub fn generate_failed_payload(
    config: &Map<String, Value>,
    jobs: &[JobRecord],
    import_id: &str,
    dest_type: &str,
    csv_header: &str,
) -> UploadResult<Vec<u8>> {
    FailedPayload::build(config, jobs, import_id, dest_type, csv_header)?.to_bytes()
}
