use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ExportDescriptor;

/// Life-cycle of one practice session.
///
/// `Idle → Starting → Active → Ending → Ended`, with `Error` absorbing
/// backend failures from `Starting` or `Ending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    Ending,
    Ended,
    Error,
}

impl SessionState {
    /// Whether the session still holds live resources (channel, ticker).
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Active | SessionState::Ending
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub state: SessionState,
    /// Issued by the backend on start.
    pub id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds spent `Active`, advanced by the controller's ticker.
    pub elapsed_secs: u64,
    /// `None` means auto-detect.
    pub target_pose: Option<String>,
    pub last_error: Option<String>,
    pub export: Option<ExportDescriptor>,
    /// Set when the session was torn down instead of ended.
    pub abandoned: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_starting(&mut self) {
        self.state = SessionState::Starting;
        self.last_error = None;
    }

    pub fn activate(&mut self, id: String, started_at: DateTime<Utc>) {
        *self = Self {
            state: SessionState::Active,
            id: Some(id),
            started_at: Some(started_at),
            target_pose: self.target_pose.take(),
            ..Self::default()
        };
    }

    pub fn begin_ending(&mut self) {
        self.state = SessionState::Ending;
    }

    pub fn finish(&mut self, export: ExportDescriptor) {
        self.state = SessionState::Ended;
        self.export = Some(export);
    }

    /// Start failures leave no id behind; finalize failures keep it so the
    /// caller can still report which session broke.
    pub fn fail(&mut self, reason: String) {
        if self.state == SessionState::Starting {
            self.id = None;
        }
        self.state = SessionState::Error;
        self.last_error = Some(reason);
    }

    pub fn abandon(&mut self) {
        self.state = SessionState::Ended;
        self.abandoned = true;
    }

    pub fn set_target_pose(&mut self, pose: Option<String>) {
        self.target_pose = pose_label(pose);
    }
}

/// A blank pose label means auto-detect.
pub(crate) fn pose_label(pose: Option<String>) -> Option<String> {
    pose.filter(|p| !p.trim().is_empty())
}
