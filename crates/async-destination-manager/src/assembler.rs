//! Batch assembly: staged job lines to one upload request.

use crate::{StagedJob, UploadError, UploadResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Request payload for one destination upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    config: Map<String, Value>,
    input: Vec<StagedJob>,
    dest_type: String,
}

impl UploadRequest {
    /// Assemble a request from staged job lines.
    ///
    /// Every non-blank line must decode into a [`StagedJob`]. The first one
    /// that does not aborts the whole batch with [`UploadError::MalformedJob`].
    pub fn assemble<I, L>(
        lines: I,
        config: &Map<String, Value>,
        dest_type: &str,
    ) -> UploadResult<Self>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut input = Vec::new();
        for (index, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            let job: StagedJob = serde_json::from_str(line).map_err(|source| {
                UploadError::MalformedJob {
                    line: index + 1,
                    source,
                }
            })?;
            input.push(job);
        }

        Ok(Self::from_jobs(input, config, dest_type))
    }

    /// Assemble a request from a staged JSONL file.
    pub async fn from_staged_file(
        path: &Path,
        config: &Map<String, Value>,
        dest_type: &str,
    ) -> UploadResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        debug!(path = %path.display(), bytes = content.len(), "Read staged file");
        Self::assemble(content.lines(), config, dest_type)
    }

    /// Build a request from already decoded jobs.
    pub fn from_jobs(input: Vec<StagedJob>, config: &Map<String, Value>, dest_type: &str) -> Self {
        Self {
            config: config.clone(),
            input,
            dest_type: dest_type.to_lowercase(),
        }
    }

    /// Destination type, lower-cased.
    pub fn dest_type(&self) -> &str {
        &self.dest_type
    }

    /// Jobs in submission order.
    pub fn jobs(&self) -> &[StagedJob] {
        &self.input
    }

    /// Number of jobs in the request.
    pub fn job_count(&self) -> usize {
        self.input.len()
    }

    /// Serialize the request for the wire.
    pub fn to_payload(&self) -> UploadResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dest_config() -> Map<String, Value> {
        json!({ "munchkinId": "585-AXP-425", "deduplicationField": "email" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_assemble_lowercases_dest_type() {
        let lines = [
            r#"{"message":{"email":"a@b.c"},"metadata":{"job_id":1}}"#,
            r#"{"message":{"email":"d@e.f"},"metadata":{"job_id":2}}"#,
        ];
        let request =
            UploadRequest::assemble(lines, &dest_config(), "MARKETO_BULK_UPLOAD").unwrap();

        assert_eq!(request.dest_type(), "marketo_bulk_upload");
        assert_eq!(request.job_count(), 2);
        assert_eq!(request.jobs()[1].job_id(), Some(2));
    }

    #[test]
    fn test_assemble_wire_shape() {
        let lines = [r#"{"message":{"email":"a@b.c"},"metadata":{"job_id":1}}"#];
        let request = UploadRequest::assemble(lines, &dest_config(), "Marketo").unwrap();
        let payload: Value = serde_json::from_slice(&request.to_payload().unwrap()).unwrap();

        assert_eq!(
            payload,
            json!({
                "config": { "munchkinId": "585-AXP-425", "deduplicationField": "email" },
                "input": [{ "message": { "email": "a@b.c" }, "metadata": { "job_id": 1 } }],
                "destType": "marketo"
            })
        );
    }

    #[test]
    fn test_assemble_fails_on_malformed_line() {
        let lines = [
            r#"{"message":{},"metadata":{"job_id":1}}"#,
            r#"{"message": oops"#,
            r#"{"message":{},"metadata":{"job_id":3}}"#,
        ];
        let result = UploadRequest::assemble(lines, &dest_config(), "marketo");

        match result {
            Err(UploadError::MalformedJob { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed job error, got {other:?}"),
        }
    }

    #[test]
    fn test_assemble_rejects_non_object_message() {
        let lines = [r#"{"message":[1,2],"metadata":{"job_id":1}}"#];
        let result = UploadRequest::assemble(lines, &dest_config(), "marketo");
        assert!(matches!(result, Err(UploadError::MalformedJob { line: 1, .. })));
    }

    #[test]
    fn test_assemble_skips_blank_lines() {
        let lines = ["", r#"{"message":{},"metadata":{"job_id":1}}"#, "   "];
        let request = UploadRequest::assemble(lines, &dest_config(), "marketo").unwrap();
        assert_eq!(request.job_count(), 1);
    }

    #[tokio::test]
    async fn test_from_staged_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"message":{{"email":"a@b.c"}},"metadata":{{"job_id":10}}}}"#).unwrap();
        writeln!(file, r#"{{"message":{{"email":"d@e.f"}},"metadata":{{"job_id":11}}}}"#).unwrap();

        let request = UploadRequest::from_staged_file(file.path(), &dest_config(), "MARKETO")
            .await
            .unwrap();
        assert_eq!(request.job_count(), 2);
        assert_eq!(request.jobs()[0].job_id(), Some(10));
    }

    #[tokio::test]
    async fn test_from_staged_file_missing() {
        let result = UploadRequest::from_staged_file(
            Path::new("/nonexistent/staged.jsonl"),
            &dest_config(),
            "marketo",
        )
        .await;
        assert!(matches!(result, Err(UploadError::Io(_))));
    }
}
