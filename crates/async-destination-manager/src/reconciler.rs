//! Outcome reconciliation: destination response to disjoint job sets.
//!
//! Every job of a batch ends up in exactly one of `importing_job_ids`,
//! `failed_job_ids` or `aborted_job_ids`. Jobs that were already failed before
//! the upload always stay failed.

use crate::stats::{
    StatTags, UploadStats, EVENTS_DELIVERY_ABORTED, EVENTS_DELIVERY_FAILED,
    EVENTS_DELIVERY_SUCCESS,
};
use crate::{JobId, TransportResult, UploadError, UploadResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{info, warn};

/// Failure reason used when the transport could not deliver the upload.
pub const TRANSPORT_FAILED_REASON: &str = r#""error" : "HTTP Call to Transformer Returned Non 200""#;

const SUCCESSFUL_JOBS_KEY: &str = "successfulJobs";
const UNSUCCESSFUL_JOBS_KEY: &str = "unsuccessfulJobs";
const CSV_HEADER_KEY: &str = "csvHeader";

/// Status the destination declares inside the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationStatus {
    /// `"200"`: accepted for asynchronous import.
    Accepted,
    /// `"400"`: the batch is permanently invalid.
    Rejected,
    /// Anything else, including a missing field or a non-JSON body.
    Unknown,
}

impl DestinationStatus {
    /// Decode the `statusCode` field of a response body. Accepts a string or a
    /// number.
    pub fn from_body(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return Self::Unknown;
        };
        let code = match value.get("statusCode") {
            Some(Value::String(code)) => code.clone(),
            Some(Value::Number(code)) => code.to_string(),
            _ => return Self::Unknown,
        };
        match code.as_str() {
            "200" => Self::Accepted,
            "400" => Self::Rejected,
            _ => Self::Unknown,
        }
    }
}

/// Import descriptor returned with a 200/400 declaration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportDescriptor {
    /// Destination-side import ID.
    #[serde(rename = "importId", default)]
    pub import_id: Option<String>,
    /// URL to poll for the import's final status.
    #[serde(rename = "pollURL", default)]
    pub poll_url: Option<String>,
    /// Destination metadata (`csvHeader`, per-job outcome lists).
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl ImportDescriptor {
    /// Decode a response body. Failure here is fatal for the batch.
    pub fn from_body(body: &[u8]) -> UploadResult<Self> {
        serde_json::from_slice(body).map_err(UploadError::MalformedResponse)
    }

    /// CSV header schema declared by the destination, empty when absent.
    pub fn csv_header(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(CSV_HEADER_KEY))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Poll parameters for the downstream poller.
    pub fn poll_parameters(&self) -> ImportParameters {
        ImportParameters {
            import_id: self.import_id.clone().unwrap_or_default(),
            poll_url: self.poll_url.clone().unwrap_or_default(),
            metadata: ImportMetadata {
                csv_header: self.csv_header().to_string(),
            },
        }
    }
}

/// Destination metadata carried along with poll and failed payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMetadata {
    /// CSV header schema of the import.
    #[serde(rename = "csvHeader")]
    pub csv_header: String,
}

/// Parameters the poller needs to query an import's final status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportParameters {
    /// Destination-side import ID.
    #[serde(rename = "importId")]
    pub import_id: String,
    /// URL to poll.
    #[serde(rename = "pollURL")]
    pub poll_url: String,
    /// Import metadata.
    pub metadata: ImportMetadata,
}

/// Result of reconciling one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// Destination the batch was uploaded to.
    pub destination_id: String,
    /// Jobs awaiting asynchronous completion.
    pub importing_job_ids: Vec<JobId>,
    /// Poll parameters for the importing jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importing_parameters: Option<ImportParameters>,
    /// Jobs to retry at a higher layer.
    pub failed_job_ids: Vec<JobId>,
    /// Why the failed jobs failed.
    pub failed_reason: String,
    /// Jobs the destination permanently rejected.
    pub aborted_job_ids: Vec<JobId>,
    /// Why the aborted jobs were aborted.
    pub abort_reason: String,
}

impl UploadOutcome {
    /// Number of importing jobs.
    pub fn importing_count(&self) -> usize {
        self.importing_job_ids.len()
    }

    /// Number of failed jobs.
    pub fn failed_count(&self) -> usize {
        self.failed_job_ids.len()
    }

    /// Number of aborted jobs.
    pub fn abort_count(&self) -> usize {
        self.aborted_job_ids.len()
    }
}

/// Split of the importing jobs according to the destination's job lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cleanup {
    /// Jobs the destination accepted.
    pub successful: Vec<JobId>,
    /// Jobs the destination did not accept.
    pub unsuccessful: Vec<JobId>,
}

/// Split `importing` using the `successfulJobs`/`unsuccessfulJobs` lists in
/// `metadata`.
///
/// - no metadata at all: everything is unsuccessful
/// - metadata with neither list: everything is successful
/// - a list present but unreadable: everything is unsuccessful
/// - otherwise successful = named in `successfulJobs` (or all, when that list
///   is absent) and not named in `unsuccessfulJobs`; the rest is unsuccessful
pub fn clean_up_data(metadata: Option<&Map<String, Value>>, importing: &[JobId]) -> Cleanup {
    let Some(metadata) = metadata else {
        warn!(
            count = importing.len(),
            "No metadata in destination response, failing importing jobs"
        );
        return Cleanup {
            successful: Vec::new(),
            unsuccessful: importing.to_vec(),
        };
    };

    let successful_ids = job_list(metadata, SUCCESSFUL_JOBS_KEY).map(convert_job_ids);
    let unsuccessful_ids = job_list(metadata, UNSUCCESSFUL_JOBS_KEY).map(convert_job_ids);

    if matches!(successful_ids, Some(None)) || matches!(unsuccessful_ids, Some(None)) {
        warn!(
            count = importing.len(),
            "Unreadable job lists in destination metadata, failing importing jobs"
        );
        return Cleanup {
            successful: Vec::new(),
            unsuccessful: importing.to_vec(),
        };
    }

    let successful_ids = successful_ids.flatten();
    let unsuccessful_ids = unsuccessful_ids.flatten().unwrap_or_default();

    let (successful, unsuccessful): (Vec<JobId>, Vec<JobId>) =
        importing.iter().copied().partition(|id| {
            let named_successful = successful_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(id));
            named_successful && !unsuccessful_ids.contains(id)
        });

    Cleanup {
        successful,
        unsuccessful,
    }
}

/// A job list from destination metadata; `null` counts as absent.
fn job_list<'a>(metadata: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    metadata.get(key).filter(|value| !value.is_null())
}

/// Convert a destination job list into job IDs. Elements may be integers or
/// decimal strings; anything else makes the whole list unreadable.
fn convert_job_ids(value: &Value) -> Option<HashSet<JobId>> {
    value
        .as_array()?
        .iter()
        .map(|element| match element {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<JobId>().ok(),
            _ => None,
        })
        .collect()
}

/// Removes duplicates, keeping first occurrences and skipping IDs in `exclude`.
fn distinct(ids: &[JobId], exclude: &HashSet<JobId>) -> Vec<JobId> {
    let mut seen = exclude.clone();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Classifies one batch's transport result into an [`UploadOutcome`].
pub struct Reconciler<'a> {
    stats: &'a dyn UploadStats,
    tags: &'a StatTags,
    overflow_failed_reason: &'a str,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler reporting to `stats` with `tags`.
    pub fn new(
        stats: &'a dyn UploadStats,
        tags: &'a StatTags,
        overflow_failed_reason: &'a str,
    ) -> Self {
        Self {
            stats,
            tags,
            overflow_failed_reason,
        }
    }

    /// Reconcile a transport result against the batch's job IDs.
    ///
    /// Returns `Err` only when the destination declared 200/400 with a body
    /// that is not an import descriptor.
    pub fn reconcile(
        &self,
        result: &TransportResult,
        failed_in: &[JobId],
        importing_in: &[JobId],
        destination_id: &str,
    ) -> UploadResult<UploadOutcome> {
        let failed_in = distinct(failed_in, &HashSet::new());
        let already_failed: HashSet<JobId> = failed_in.iter().copied().collect();
        let importing_in = distinct(importing_in, &already_failed);

        let body = match result {
            TransportResult::Delivered(body) => body,
            TransportResult::Failed { status } => {
                warn!(
                    destination_id = %destination_id,
                    status = ?status,
                    count = failed_in.len() + importing_in.len(),
                    "Upload transport failed, failing batch"
                );
                return Ok(Self::fail_all(
                    failed_in,
                    importing_in,
                    TRANSPORT_FAILED_REASON.to_string(),
                    destination_id,
                ));
            }
        };

        match DestinationStatus::from_body(body) {
            DestinationStatus::Accepted => {
                let descriptor = ImportDescriptor::from_body(body)?;
                let cleanup = clean_up_data(descriptor.metadata.as_ref(), &importing_in);
                self.stats
                    .record_count(EVENTS_DELIVERY_FAILED, cleanup.unsuccessful.len(), self.tags);
                self.stats
                    .record_count(EVENTS_DELIVERY_SUCCESS, cleanup.successful.len(), self.tags);

                info!(
                    destination_id = %destination_id,
                    import_id = descriptor.import_id.as_deref().unwrap_or_default(),
                    importing = cleanup.successful.len(),
                    failed = cleanup.unsuccessful.len(),
                    "Upload accepted by destination"
                );

                let mut failed_job_ids = failed_in;
                failed_job_ids.extend(cleanup.unsuccessful);
                Ok(UploadOutcome {
                    destination_id: destination_id.to_string(),
                    importing_job_ids: cleanup.successful,
                    importing_parameters: Some(descriptor.poll_parameters()),
                    failed_job_ids,
                    failed_reason: self.overflow_failed_reason.to_string(),
                    ..Default::default()
                })
            }
            DestinationStatus::Rejected => {
                let descriptor = ImportDescriptor::from_body(body)?;
                let cleanup = clean_up_data(descriptor.metadata.as_ref(), &importing_in);
                self.stats
                    .record_count(EVENTS_DELIVERY_FAILED, cleanup.unsuccessful.len(), self.tags);
                self.stats
                    .record_count(EVENTS_DELIVERY_ABORTED, cleanup.successful.len(), self.tags);

                warn!(
                    destination_id = %destination_id,
                    aborted = cleanup.successful.len(),
                    failed = cleanup.unsuccessful.len(),
                    "Upload rejected by destination"
                );

                let mut failed_job_ids = failed_in;
                failed_job_ids.extend(cleanup.unsuccessful);
                Ok(UploadOutcome {
                    destination_id: destination_id.to_string(),
                    failed_job_ids,
                    failed_reason: self.overflow_failed_reason.to_string(),
                    aborted_job_ids: cleanup.successful,
                    abort_reason: String::from_utf8_lossy(body).into_owned(),
                    ..Default::default()
                })
            }
            DestinationStatus::Unknown => {
                warn!(
                    destination_id = %destination_id,
                    count = failed_in.len() + importing_in.len(),
                    "Unknown destination status, failing batch"
                );
                Ok(Self::fail_all(
                    failed_in,
                    importing_in,
                    String::from_utf8_lossy(body).into_owned(),
                    destination_id,
                ))
            }
        }
    }

    fn fail_all(
        mut failed_in: Vec<JobId>,
        importing_in: Vec<JobId>,
        failed_reason: String,
        destination_id: &str,
    ) -> UploadOutcome {
        failed_in.extend(importing_in);
        UploadOutcome {
            destination_id: destination_id.to_string(),
            failed_job_ids: failed_in,
            failed_reason,
            ..Default::default()
        }
    }
}
