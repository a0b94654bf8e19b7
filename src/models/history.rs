use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of a user's past sessions, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: String,
    /// Session start as reported by the backend.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub avg_score: f64,
    #[serde(default)]
    pub poses_count: u32,
    #[serde(default)]
    pub video_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserHistory {
    pub total: u64,
    #[serde(default)]
    pub sessions: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_poses: u32,
    pub correct_poses: u32,
    /// Percentage, 0-100.
    pub accuracy_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub avg_score: f64,
    /// `None` until the recording has been exported.
    #[serde(default)]
    pub video_url: Option<String>,
    /// Stored per-pose records, passed through as the backend keeps them.
    #[serde(default)]
    pub poses: Vec<Value>,
    #[serde(default)]
    pub stats: SessionStats,
}
