//! Upload manager: assemble, submit and reconcile one batch.

use crate::stats::StatTags;
use crate::{
    submit_upload, HttpTransport, JobId, ManagerConfig, Reconciler, StagedBatch, TracingStats,
    UploadOutcome, UploadRequest, UploadResult, UploadStats, UploadTransport,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Runs destination uploads.
///
/// Holds no per-batch state, so one manager can serve batches for several
/// destinations concurrently.
pub struct AsyncDestinationManager {
    config: ManagerConfig,
    transport: Arc<dyn UploadTransport>,
    stats: Arc<dyn UploadStats>,
}

impl AsyncDestinationManager {
    /// Create a new manager.
    pub fn new(
        config: ManagerConfig,
        transport: Arc<dyn UploadTransport>,
        stats: Arc<dyn UploadStats>,
    ) -> Self {
        Self {
            config,
            transport,
            stats,
        }
    }

    /// Create a manager backed by [`HttpTransport`] and [`TracingStats`].
    pub fn with_http(config: ManagerConfig) -> UploadResult<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(config.retry.clone())?);
        Ok(Self::new(config, transport, Arc::new(TracingStats)))
    }

    /// Manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Upload a staged batch from its staged file.
    pub async fn upload(
        &self,
        batch: &StagedBatch,
        dest_config: &Map<String, Value>,
        dest_type: &str,
    ) -> UploadResult<UploadOutcome> {
        info!(
            destination_id = %batch.destination_id,
            staged_jobs = batch.count,
            staged_bytes = batch.size,
            age_ms = batch.age().num_milliseconds(),
            file = %batch.file_path.display(),
            "Reading staged batch"
        );
        let request =
            UploadRequest::from_staged_file(&batch.file_path, dest_config, dest_type).await?;
        self.submit(
            request,
            dest_type,
            &batch.url,
            &batch.failed_job_ids,
            &batch.importing_job_ids,
            &batch.destination_id,
        )
        .await
    }

    /// Upload staged job lines held in memory.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload_jobs<I, L>(
        &self,
        lines: I,
        url: &str,
        dest_config: &Map<String, Value>,
        dest_type: &str,
        failed_job_ids: &[JobId],
        importing_job_ids: &[JobId],
        destination_id: &str,
    ) -> UploadResult<UploadOutcome>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let request = UploadRequest::assemble(lines, dest_config, dest_type)?;
        self.submit(
            request,
            dest_type,
            url,
            failed_job_ids,
            importing_job_ids,
            destination_id,
        )
        .await
    }

    async fn submit(
        &self,
        request: UploadRequest,
        dest_type: &str,
        url: &str,
        failed_job_ids: &[JobId],
        importing_job_ids: &[JobId],
        destination_id: &str,
    ) -> UploadResult<UploadOutcome> {
        Url::parse(url)?;
        let payload = request.to_payload()?;
        let tags = StatTags::new(dest_type, url);

        info!(
            destination_id = %destination_id,
            dest_type = %request.dest_type(),
            jobs = request.job_count(),
            "Uploading batch"
        );
        drop(request);

        let result = submit_upload(
            self.transport.as_ref(),
            self.stats.as_ref(),
            url,
            payload,
            self.config.http_timeout(),
            &tags,
        )
        .await;

        Reconciler::new(
            self.stats.as_ref(),
            &tags,
            &self.config.overflow_failed_reason,
        )
        .reconcile(&result, failed_job_ids, importing_job_ids, destination_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::testing::RecordingStats;
    use crate::stats::{EVENTS_DELIVERY_SUCCESS, PAYLOAD_SIZE};
    use crate::transport::testing::ScriptedTransport;
    use crate::{UploadError, TRANSPORT_FAILED_REASON};
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const URL: &str = "http://transformer:9090/marketo_bulk_upload/fileUpload";

    fn manager(
        transport: Arc<ScriptedTransport>,
        stats: Arc<RecordingStats>,
    ) -> AsyncDestinationManager {
        AsyncDestinationManager::new(ManagerConfig::default(), transport, stats)
    }

    fn dest_config() -> Map<String, Value> {
        json!({ "munchkinId": "585" }).as_object().cloned().unwrap()
    }

    fn staged_lines() -> Vec<String> {
        vec![
            r#"{"message":{"email":"a@b.c"},"metadata":{"job_id":3}}"#.to_string(),
            r#"{"message":{"email":"d@e.f"},"metadata":{"job_id":4}}"#.to_string(),
        ]
    }

    #[tokio::test]
    async fn test_upload_jobs_accepted() {
        let transport = Arc::new(ScriptedTransport::responding(
            200,
            r#"{"statusCode":"200","importId":"imp-1","pollURL":"/poll","metadata":{"csvHeader":"email","successfulJobs":["3"],"unsuccessfulJobs":["4"]}}"#,
        ));
        let stats = Arc::new(RecordingStats::default());
        let manager = manager(transport.clone(), stats.clone());

        let outcome = manager
            .upload_jobs(
                staged_lines(),
                URL,
                &dest_config(),
                "MARKETO_BULK_UPLOAD",
                &[1, 2],
                &[3, 4],
                "dest-1",
            )
            .await
            .unwrap();

        assert_eq!(outcome.importing_job_ids, vec![3]);
        assert_eq!(outcome.failed_job_ids, vec![1, 2, 4]);
        assert_eq!(outcome.importing_parameters.unwrap().import_id, "imp-1");

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, URL);
        assert_eq!(sent[0].2, Duration::from_secs(600));
        let payload: Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(payload["destType"], json!("marketo_bulk_upload"));
        assert_eq!(payload["input"].as_array().unwrap().len(), 2);

        assert_eq!(
            stats.timing(PAYLOAD_SIZE),
            Some(Duration::from_millis(sent[0].1.len() as u64))
        );
        assert_eq!(stats.count(EVENTS_DELIVERY_SUCCESS), Some(1));
        assert!(stats
            .records()
            .iter()
            .all(|(_, tags)| tags.dest_type == "MARKETO_BULK_UPLOAD" && tags.url == URL));
    }

    #[tokio::test]
    async fn test_upload_jobs_transport_failure() {
        let transport = Arc::new(ScriptedTransport::responding(500, "boom"));
        let stats = Arc::new(RecordingStats::default());
        let manager = manager(transport, stats);

        let outcome = manager
            .upload_jobs(
                staged_lines(),
                URL,
                &dest_config(),
                "marketo",
                &[1, 2],
                &[3, 4],
                "dest-1",
            )
            .await
            .unwrap();

        assert_eq!(outcome.failed_job_ids, vec![1, 2, 3, 4]);
        assert!(outcome.importing_job_ids.is_empty());
        assert!(outcome.aborted_job_ids.is_empty());
        assert_eq!(outcome.failed_reason, TRANSPORT_FAILED_REASON);
    }

    #[tokio::test]
    async fn test_malformed_staged_job_halts_before_network() {
        let transport = Arc::new(ScriptedTransport::responding(200, "{}"));
        let stats = Arc::new(RecordingStats::default());
        let manager = manager(transport.clone(), stats.clone());

        let lines = vec![
            r#"{"message":{},"metadata":{"job_id":3}}"#.to_string(),
            "{broken".to_string(),
        ];
        let result = manager
            .upload_jobs(lines, URL, &dest_config(), "marketo", &[], &[3, 4], "dest-1")
            .await;

        assert!(matches!(result, Err(UploadError::MalformedJob { line: 2, .. })));
        assert!(transport.sent().is_empty());
        assert!(stats.records().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_halts_before_network() {
        let transport = Arc::new(ScriptedTransport::responding(200, "{}"));
        let manager = manager(transport.clone(), Arc::new(RecordingStats::default()));

        let result = manager
            .upload_jobs(
                staged_lines(),
                "not a url",
                &dest_config(),
                "marketo",
                &[],
                &[3, 4],
                "dest-1",
            )
            .await;

        assert!(matches!(result, Err(UploadError::InvalidUrl(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_upload_staged_batch_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        for line in staged_lines() {
            writeln!(file, "{line}").unwrap();
        }

        let transport = Arc::new(ScriptedTransport::responding(
            200,
            r#"{"statusCode":"400","metadata":{"successfulJobs":[3],"unsuccessfulJobs":[4]}}"#,
        ));
        let manager = manager(transport, Arc::new(RecordingStats::default()));

        let mut batch = StagedBatch::new("dest-1", URL, file.path());
        batch.add_failed(1);
        batch.add_staged(3, 60);
        batch.add_staged(4, 60);

        let outcome = manager.upload(&batch, &dest_config(), "MARKETO").await.unwrap();

        assert!(outcome.importing_job_ids.is_empty());
        assert_eq!(outcome.aborted_job_ids, vec![3]);
        assert_eq!(outcome.failed_job_ids, vec![1, 4]);
        assert!(outcome.abort_reason.contains("\"400\""));
        assert_eq!(outcome.destination_id, "dest-1");
    }

    #[tokio::test]
    async fn test_upload_missing_staged_file() {
        let transport = Arc::new(ScriptedTransport::responding(200, "{}"));
        let manager = manager(transport.clone(), Arc::new(RecordingStats::default()));
        let batch = StagedBatch::new("dest-1", URL, "/nonexistent/staged.jsonl");

        let result = manager.upload(&batch, &dest_config(), "marketo").await;

        assert!(matches!(result, Err(UploadError::Io(_))));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_with_http_rejects_invalid_config() {
        let config = ManagerConfig {
            http_timeout_secs: 0,
            ..Default::default()
        };
        assert!(AsyncDestinationManager::with_http(config).is_err());
    }

    #[test]
    fn test_manager_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AsyncDestinationManager>();
    }
}
