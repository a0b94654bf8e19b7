use serde::{Deserialize, Serialize};

/// Result of closing one pose segment on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub segment_id: u32,
    pub status: String,
    #[serde(default)]
    pub video_path: String,
}

/// What the backend hands back once a session has been finalized and its
/// recording exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDescriptor {
    pub video_url: String,
    #[serde(default)]
    pub download_path: String,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub file_size_mb: f64,
    pub status: String,
}
