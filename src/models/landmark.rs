use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoachError;

/// Number of body keypoints the pose model emits per frame.
pub const LANDMARK_COUNT: usize = 33;

/// One body keypoint in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

/// A full frame of landmarks as produced by the capture collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LandmarkSample {
    landmarks: Vec<Landmark>,
    captured_at: DateTime<Utc>,
}

impl LandmarkSample {
    pub fn new(landmarks: Vec<Landmark>, captured_at: DateTime<Utc>) -> Result<Self, CoachError> {
        if landmarks.len() != LANDMARK_COUNT {
            return Err(CoachError::InvalidSample(format!(
                "expected {LANDMARK_COUNT} landmarks, got {}",
                landmarks.len()
            )));
        }

        if let Some(index) = landmarks
            .iter()
            .position(|point| ![point.x, point.y, point.z, point.visibility].iter().all(|v| v.is_finite()))
        {
            return Err(CoachError::InvalidSample(format!(
                "landmark {index} has a non-finite coordinate"
            )));
        }

        Ok(Self {
            landmarks,
            captured_at,
        })
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Body of one `analyze pose` call. Built once per throttle window and never
/// acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub session_id: String,
    pub landmarks: Vec<Landmark>,
    /// Capture time, unix seconds.
    pub timestamp: i64,
    pub pose_hint: Option<String>,
}

impl AnalysisRequest {
    pub fn from_sample(session_id: &str, sample: LandmarkSample, pose_hint: Option<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: sample.captured_at().timestamp(),
            landmarks: sample.landmarks,
            pose_hint,
        }
    }
}

#[cfg(test)]
pub(crate) fn standing_landmarks() -> Vec<Landmark> {
    (0..LANDMARK_COUNT)
        .map(|i| Landmark {
            x: 0.5,
            y: i as f32 / LANDMARK_COUNT as f32,
            z: 0.0,
            visibility: 0.9,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_wrong_arity() {
        let mut points = standing_landmarks();
        points.pop();
        let err = LandmarkSample::new(points, Utc::now()).unwrap_err();
        assert!(matches!(err, CoachError::InvalidSample(_)));
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let mut points = standing_landmarks();
        points[4].y = f32::NAN;
        assert!(LandmarkSample::new(points, Utc::now()).is_err());
    }

    #[test]
    fn analysis_request_matches_backend_shape() {
        let captured_at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let sample = LandmarkSample::new(standing_landmarks(), captured_at).unwrap();
        let request = AnalysisRequest::from_sample("abc123", sample, Some("Tree Pose".into()));

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["session_id"], json!("abc123"));
        assert_eq!(value["timestamp"], json!(1714557600));
        assert_eq!(value["pose_hint"], json!("Tree Pose"));
        assert_eq!(value["landmarks"].as_array().unwrap().len(), LANDMARK_COUNT);
        assert!(value["landmarks"][0].get("visibility").is_some());
    }
}
