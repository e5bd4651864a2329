use std::time::Duration;

use nightjar_camera::{CaptureRequest, Warmup};
use serde::{Deserialize, Serialize};

/// Configuration for the capture loop and stream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Geometry / codec / buffer depth asked of the device
    pub request: CaptureRequest,
    /// Discard-read protocol before streaming
    pub warmup: Warmup,
    /// JPEG quality for published frames, 1-100
    pub jpeg_quality: u8,
    /// Consecutive read failures tolerated; one more is fatal
    pub read_failure_budget: u32,
    /// Pause between a failed read and the retry
    pub retry_backoff_ms: u64,
    /// How long a stream consumer sleeps when no new frame is ready
    pub stream_idle_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            request: CaptureRequest::default(),
            warmup: Warmup::default(),
            jpeg_quality: 80,
            read_failure_budget: 2,
            retry_backoff_ms: 100,
            stream_idle_ms: 10,
        }
    }
}

impl CaptureConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn stream_idle(&self) -> Duration {
        Duration::from_millis(self.stream_idle_ms)
    }
}
