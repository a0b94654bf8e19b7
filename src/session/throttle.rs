//! Leading-edge limiter for outbound analysis requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::Backend;
use crate::clock::Clock;
use crate::models::{AnalysisRequest, LandmarkSample};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(200);

/// Forwards at most one sample per `interval`, measured from the last
/// forwarded sample. Everything in between is dropped.
pub struct SampleThrottler {
    interval: Duration,
    last_forwarded: Option<Instant>,
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
}

impl SampleThrottler {
    pub fn new(interval: Duration, backend: Arc<dyn Backend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            last_forwarded: None,
            backend,
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Forgets the last forwarded timestamp so the next sample goes out
    /// immediately.
    pub fn reset(&mut self) {
        self.last_forwarded = None;
    }

    /// Whether a sample offered now would be forwarded; records it if so.
    fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_forwarded {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_forwarded = Some(now);
        true
    }

    /// Returns true if the sample was handed to the backend. The call is not
    /// awaited; failures are logged and the next window supersedes it.
    pub fn submit(
        &mut self,
        session_id: &str,
        sample: LandmarkSample,
        pose_hint: Option<String>,
    ) -> bool {
        if !self.admit(self.clock.now()) {
            return false;
        }

        let request = AnalysisRequest::from_sample(session_id, sample, pose_hint);
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(err) = backend.analyze_pose(&request).await {
                log_warn!(
                    "analysis request for session {} dropped: {err}",
                    request.session_id
                );
            }
        });
        true
    }
}
