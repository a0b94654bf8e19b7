use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::models::{Landmark, LandmarkSample};
use crate::session::SessionController;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// One line of the capture feed.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureFrame {
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub pose_hint: Option<String>,
    /// Defaults to the time the line was read.
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub read: u64,
    pub forwarded: u64,
    /// Valid frames dropped by the throttle or because no session was active.
    pub skipped: u64,
    pub rejected: u64,
}

/// Feeds newline-delimited JSON frames into `session` until the input ends or
/// the token is cancelled.
pub async fn capture_loop<R>(
    reader: R,
    session: SessionController,
    cancel_token: CancellationToken,
) -> CaptureStats
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = CaptureStats::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    stats.read += 1;
                    match parse_frame(&line) {
                        Ok((sample, pose_hint)) => {
                            if session.submit_sample(sample, pose_hint).await {
                                stats.forwarded += 1;
                            } else {
                                stats.skipped += 1;
                            }
                        }
                        Err(err) => {
                            stats.rejected += 1;
                            log_warn!("rejected capture frame {}: {err:#}", stats.read);
                        }
                    }
                }
                Ok(None) => {
                    log_info!("capture feed ended after {} frames", stats.read);
                    break;
                }
                Err(err) => {
                    log_error!("capture feed read failed: {err}");
                    break;
                }
            }
        }
    }

    log_debug!("capture stats: {stats:?}");
    stats
}

fn parse_frame(line: &str) -> anyhow::Result<(LandmarkSample, Option<String>)> {
    let frame: CaptureFrame = serde_json::from_str(line)?;
    let captured_at = frame.captured_at.unwrap_or_else(Utc::now);
    let sample = LandmarkSample::new(frame.landmarks, captured_at)?;
    Ok((sample, frame.pose_hint))
}
