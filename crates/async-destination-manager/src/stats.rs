// Stats hooks for destination uploads.
//
// Observations are fire-and-forget: a sink never returns an error and nothing
// it does can change an upload outcome. Callers pick the backend by handing an
// `UploadStats` implementation to the manager.
use std::time::{Duration, Instant};
use tracing::debug;

/// Timer: wall-clock time of the upload call.
pub const ASYNC_UPLOAD_TIME: &str = "async_upload_time";
/// Size observation of the serialized upload payload.
pub const PAYLOAD_SIZE: &str = "payload_size";
/// Count of jobs the destination accepted.
pub const EVENTS_DELIVERY_SUCCESS: &str = "events_delivery_success";
/// Count of jobs the destination reported as unsuccessful.
pub const EVENTS_DELIVERY_FAILED: &str = "events_delivery_failed";
/// Count of jobs aborted by a rejected batch.
pub const EVENTS_DELIVERY_ABORTED: &str = "events_delivery_aborted";

const MODULE_TAG: &str = "batch_router";

/// Tags attached to every upload observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatTags {
    /// Emitting module.
    pub module: &'static str,
    /// Destination type as given by the caller.
    pub dest_type: String,
    /// Upload URL.
    pub url: String,
}

impl StatTags {
    /// Tags for uploads of `dest_type` to `url`.
    pub fn new(dest_type: &str, url: &str) -> Self {
        Self {
            module: MODULE_TAG,
            dest_type: dest_type.to_string(),
            url: url.to_string(),
        }
    }
}

/// Metrics observer for destination uploads.
pub trait UploadStats: Send + Sync {
    /// Record a duration-valued observation.
    fn record_timing(&self, name: &'static str, value: Duration, tags: &StatTags);

    /// Record a counter increment.
    fn record_count(&self, name: &'static str, value: usize, tags: &StatTags);

    /// Record a size observation in bytes.
    ///
    /// Defaults to a timing of one millisecond per byte so sinks that only
    /// know timers keep the existing dashboards working.
    fn record_size(&self, name: &'static str, bytes: usize, tags: &StatTags) {
        self.record_timing(name, Duration::from_millis(bytes as u64), tags);
    }
}

/// Stats sink that emits every observation as a `debug` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStats;

impl UploadStats for TracingStats {
    fn record_timing(&self, name: &'static str, value: Duration, tags: &StatTags) {
        debug!(
            stat = name,
            value_ms = value.as_millis() as u64,
            module = tags.module,
            dest_type = %tags.dest_type,
            url = %tags.url,
            "timing"
        );
    }

    fn record_count(&self, name: &'static str, value: usize, tags: &StatTags) {
        debug!(
            stat = name,
            value = value,
            module = tags.module,
            dest_type = %tags.dest_type,
            url = %tags.url,
            "count"
        );
    }
}

/// Stats sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl UploadStats for NoopStats {
    fn record_timing(&self, _name: &'static str, _value: Duration, _tags: &StatTags) {}

    fn record_count(&self, _name: &'static str, _value: usize, _tags: &StatTags) {}
}

/// Running latency timer. Recorded when [`UploadTimer::end`] is called.
pub(crate) struct UploadTimer<'a> {
    stats: &'a dyn UploadStats,
    tags: &'a StatTags,
    start: Instant,
}

impl<'a> UploadTimer<'a> {
    pub(crate) fn start(stats: &'a dyn UploadStats, tags: &'a StatTags) -> Self {
        Self {
            stats,
            tags,
            start: Instant::now(),
        }
    }

    pub(crate) fn end(self) {
        self.stats
            .record_timing(ASYNC_UPLOAD_TIME, self.start.elapsed(), self.tags);
    }
}
