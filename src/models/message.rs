use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope of every server-to-client channel frame: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// First frame sent on every freshly opened channel.
#[derive(Debug, Serialize)]
pub(crate) struct BindFrame<'a> {
    pub session_id: &'a str,
}
