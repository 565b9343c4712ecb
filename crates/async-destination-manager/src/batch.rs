//! Staged batch handed to the manager for upload.

use crate::JobId;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

/// One destination's staged upload.
#[derive(Debug, Clone)]
pub struct StagedBatch {
    /// Destination ID.
    pub destination_id: String,
    /// Upload endpoint for the destination type.
    pub url: String,
    /// JSONL file holding the staged jobs.
    pub file_path: PathBuf,
    /// Jobs already failed before this upload.
    pub failed_job_ids: Vec<JobId>,
    /// Jobs staged in the file.
    pub importing_job_ids: Vec<JobId>,
    /// When staging started.
    pub created_at: DateTime<Utc>,
    /// Staged job count.
    pub count: usize,
    /// Staged file size in bytes.
    pub size: u64,
}

impl StagedBatch {
    /// Create an empty batch for a destination.
    pub fn new(destination_id: &str, url: &str, file_path: impl Into<PathBuf>) -> Self {
        Self {
            destination_id: destination_id.to_string(),
            url: url.to_string(),
            file_path: file_path.into(),
            failed_job_ids: Vec::new(),
            importing_job_ids: Vec::new(),
            created_at: Utc::now(),
            count: 0,
            size: 0,
        }
    }

    /// Record a job written to the staged file.
    pub fn add_staged(&mut self, job_id: JobId, bytes: usize) {
        self.importing_job_ids.push(job_id);
        self.count += 1;
        self.size += bytes as u64;
    }

    /// Record a job that failed before it could be staged.
    pub fn add_failed(&mut self, job_id: JobId) {
        self.failed_job_ids.push(job_id);
    }

    /// All job IDs of the batch.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.failed_job_ids
            .iter()
            .chain(&self.importing_job_ids)
            .copied()
            .collect()
    }

    /// Time since staging started.
    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    /// True when nothing was staged or failed.
    pub fn is_empty(&self) -> bool {
        self.failed_job_ids.is_empty() && self.importing_job_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_batch_new() {
        let batch = StagedBatch::new("dest-1", "http://transformer/upload", "/tmp/staged.jsonl");
        assert_eq!(batch.destination_id, "dest-1");
        assert_eq!(batch.count, 0);
        assert_eq!(batch.size, 0);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_staged_batch_tracks_jobs() {
        let mut batch = StagedBatch::new("dest-1", "http://transformer/upload", "/tmp/staged.jsonl");
        batch.add_failed(1);
        batch.add_staged(2, 100);
        batch.add_staged(3, 50);

        assert_eq!(batch.job_ids(), vec![1, 2, 3]);
        assert_eq!(batch.count, 2);
        assert_eq!(batch.size, 150);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_staged_batch_age() {
        let mut batch = StagedBatch::new("dest-1", "http://transformer/upload", "/tmp/staged.jsonl");
        batch.created_at = Utc::now() - Duration::seconds(90);

        let age = batch.age();
        assert!(age >= Duration::seconds(90));
        assert!(age < Duration::seconds(120));
    }
}
