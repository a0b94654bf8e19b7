use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::{Backend, EndSegmentRequest, StartedSession};
use crate::error::ApiError;
use crate::models::{
    AnalysisRequest, ExportDescriptor, SegmentRecord, SessionDetail, UserHistory,
};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// JSON-over-HTTP client for the analysis backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        log_debug!("POST {url}");
        self.send(self.client.post(&url).json(body)).await
    }

    async fn get<Q, R>(&self, path: &str, query: &Q) -> Result<R, ApiError>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        log_debug!("GET {url}");
        self.send(self.client.get(&url).query(query)).await
    }

    async fn send<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn start_session(&self, user_id: &str) -> Result<StartedSession, ApiError> {
        self.post("/start_session", &json!({ "user_id": user_id }))
            .await
    }

    async fn analyze_pose(&self, request: &AnalysisRequest) -> Result<(), ApiError> {
        let _: Value = self.post("/pose_analysis", request).await?;
        Ok(())
    }

    async fn end_segment(&self, request: &EndSegmentRequest) -> Result<SegmentRecord, ApiError> {
        self.post("/end_segment", request).await
    }

    async fn merge_and_export(&self, session_id: &str) -> Result<ExportDescriptor, ApiError> {
        self.post("/merge_and_export", &json!({ "session_id": session_id }))
            .await
    }

    async fn user_history(&self, user_id: &str, limit: u32, skip: u32) -> Result<UserHistory, ApiError> {
        let query = [
            ("user_id", user_id.to_string()),
            ("limit", limit.to_string()),
            ("skip", skip.to_string()),
        ];
        self.get("/user_history", &query).await
    }

    async fn session_detail(&self, session_id: &str) -> Result<SessionDetail, ApiError> {
        self.get("/session_detail", &[("session_id", session_id)]).await
    }
}
