use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One scored observation pushed by the analysis service.
///
/// Events arrive unordered relative to the analysis requests that caused
/// them; nothing links an event back to its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub pose_name: String,
    /// 0–100.
    pub score: f64,
    pub feedback: String,
    pub correct: bool,
    #[serde(default)]
    pub details: BTreeMap<String, Metric>,
}

/// A named measurement attached to feedback. Joint angles come through as
/// degrees; a few poses also report categorical facts such as which leg is
/// the support leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Degrees(f64),
    Label(String),
}

impl FeedbackEvent {
    pub fn angle(&self, name: &str) -> Option<f64> {
        match self.details.get(name)? {
            Metric::Degrees(value) => Some(*value),
            Metric::Label(_) => None,
        }
    }
}
