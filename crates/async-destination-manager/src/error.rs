//! Upload error types.

use thiserror::Error;

/// Upload error type.
///
/// Every variant is fatal for the batch being processed. Destination-side
/// rejections and transport failures are not errors: they are reported through
/// [`UploadOutcome`](crate::UploadOutcome).
#[derive(Error, Debug)]
pub enum UploadError {
    /// A staged job or job record could not be decoded
    #[error("Malformed job at line {line}: {source}")]
    MalformedJob {
        /// 1-based position of the offending record in the batch.
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A job record carries no transformed message
    #[error("Job {0} has no transformed payload")]
    MissingTransformedData(i64),

    /// A job record's transformed message is not a JSON object
    #[error("Malformed transformed payload for job {job_id}: {source}")]
    MalformedTransformedData {
        /// Job whose payload failed to decode.
        job_id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// The destination declared 200/400 but the body is not an import descriptor
    #[error("Incorrect response from destination: {0}")]
    MalformedResponse(#[source] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error while reading staged input
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid destination URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias using UploadError.
pub type UploadResult<T> = Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_job_display_includes_line() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = UploadError::MalformedJob { line: 3, source };
        assert!(err.to_string().starts_with("Malformed job at line 3:"));
    }

    #[test]
    fn json_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err: UploadError = serde_err.into();
        assert!(err.to_string().starts_with("JSON error:"));
    }

    #[test]
    fn config_error_display() {
        let err = UploadError::Config("timeout must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: timeout must be positive"
        );
    }

    #[test]
    fn missing_transformed_data_display() {
        let err = UploadError::MissingTransformedData(42);
        assert_eq!(err.to_string(), "Job 42 has no transformed payload");
    }
}
