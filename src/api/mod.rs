//! Request/response surface of the analysis backend.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{
    AnalysisRequest, ExportDescriptor, SegmentRecord, SessionDetail, UserHistory,
};

pub use http::HttpBackend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndSegmentRequest {
    pub session_id: String,
    pub pose_name: String,
    pub avg_score: u32,
    pub duration_seconds: u64,
}

/// Backend commands consumed by the session controller.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn start_session(&self, user_id: &str) -> Result<StartedSession, ApiError>;

    /// Fire-and-forget from the caller's point of view: the response body
    /// carries nothing the client uses, feedback arrives over the channel.
    async fn analyze_pose(&self, request: &AnalysisRequest) -> Result<(), ApiError>;

    async fn end_segment(&self, request: &EndSegmentRequest) -> Result<SegmentRecord, ApiError>;

    async fn merge_and_export(&self, session_id: &str) -> Result<ExportDescriptor, ApiError>;

    /// Past sessions for `user_id`, newest first, paged by `limit`/`skip`.
    async fn user_history(&self, user_id: &str, limit: u32, skip: u32) -> Result<UserHistory, ApiError>;

    async fn session_detail(&self, session_id: &str) -> Result<SessionDetail, ApiError>;
}
