use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::channel::ReconnectPolicy;
use crate::session::state::pose_label;
use crate::session::SessionOptions;

pub const CONFIG_PATH_VAR: &str = "POSE_COACH_CONFIG";

const ENV_OVERRIDES: [&str; 4] = [
    "POSE_COACH_API_URL",
    "POSE_COACH_WS_URL",
    "POSE_COACH_USER_ID",
    "POSE_COACH_TARGET_POSE",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachSettings {
    pub api_base_url: String,
    pub channel_url: String,
    pub user_id: String,
    /// `None` or empty means auto-detect.
    pub target_pose: Option<String>,
    pub throttle_interval_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub flush_segments_on_end: bool,
}

impl Default for CoachSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            channel_url: "ws://localhost:8000/ws".into(),
            user_id: "default_user".into(),
            target_pose: None,
            throttle_interval_ms: 200,
            reconnect_base_delay_ms: 2000,
            max_reconnect_attempts: 5,
            request_timeout_secs: 10,
            connect_timeout_secs: 10,
            flush_segments_on_end: false,
        }
    }
}

impl CoachSettings {
    /// Reads settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// File named by `POSE_COACH_CONFIG` (if any), then environment overrides.
    pub fn load_from_env() -> Result<Self> {
        let path = env::var_os(CONFIG_PATH_VAR).map(PathBuf::from);
        let mut settings = Self::load(path.as_deref())?;
        settings.apply_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in ENV_OVERRIDES {
            let Some(value) = lookup(key) else {
                continue;
            };
            match key {
                "POSE_COACH_API_URL" => self.api_base_url = value,
                "POSE_COACH_WS_URL" => self.channel_url = value,
                "POSE_COACH_USER_ID" => self.user_id = value,
                _ => self.target_pose = Some(value),
            }
        }
        self.target_pose = pose_label(self.target_pose.take());
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

impl From<&CoachSettings> for SessionOptions {
    fn from(settings: &CoachSettings) -> Self {
        Self {
            user_id: settings.user_id.clone(),
            throttle_interval: settings.throttle_interval(),
            reconnect: settings.reconnect_policy(),
            flush_segments_on_end: settings.flush_segments_on_end,
            ..Self::default()
        }
    }
}
