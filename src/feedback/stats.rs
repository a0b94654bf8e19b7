//! Per-session tally of feedback, keyed by pose.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::channel::Listener;
use crate::clock::Clock;
use crate::models::FeedbackEvent;

const MAX_RECENT_EVENTS: usize = 20;

/// Label the analysis service reports when no pose matched.
pub const UNKNOWN_POSE: &str = "Unknown";

/// Aggregate of all feedback received for one pose during a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseSegment {
    pub pose_name: String,
    pub samples: u32,
    pub avg_score: f64,
    pub correct_ratio: f64,
    /// Time between the first and last feedback for this pose.
    pub duration_secs: u64,
}

struct PoseTally {
    pose_name: String,
    samples: u32,
    score_sum: f64,
    correct: u32,
    first_seen: Instant,
    last_seen: Instant,
}

impl PoseTally {
    fn segment(&self) -> PoseSegment {
        let samples = f64::from(self.samples.max(1));
        PoseSegment {
            pose_name: self.pose_name.clone(),
            samples: self.samples,
            avg_score: self.score_sum / samples,
            correct_ratio: f64::from(self.correct) / samples,
            duration_secs: self
                .last_seen
                .saturating_duration_since(self.first_seen)
                .as_secs(),
        }
    }
}

#[derive(Default)]
struct TrackerState {
    poses: Vec<PoseTally>,
    recent: Vec<FeedbackEvent>,
}

/// Feedback observer that keeps running scores per pose, in the order poses
/// were first seen.
pub struct PoseScoreTracker {
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

impl PoseScoreTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn record(&self, event: &FeedbackEvent) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match state
            .poses
            .iter_mut()
            .find(|tally| tally.pose_name == event.pose_name)
        {
            Some(tally) => {
                tally.samples += 1;
                tally.score_sum += event.score;
                tally.correct += u32::from(event.correct);
                tally.last_seen = now;
            }
            None => state.poses.push(PoseTally {
                pose_name: event.pose_name.clone(),
                samples: 1,
                score_sum: event.score,
                correct: u32::from(event.correct),
                first_seen: now,
                last_seen: now,
            }),
        }

        state.recent.push(event.clone());
        if state.recent.len() > MAX_RECENT_EVENTS {
            state.recent.remove(0);
        }
    }

    pub fn latest(&self) -> Option<FeedbackEvent> {
        self.state.lock().recent.last().cloned()
    }

    pub fn recent(&self) -> Vec<FeedbackEvent> {
        self.state.lock().recent.clone()
    }

    /// One segment per recognized pose. Unmatched frames are not a segment.
    pub fn segments(&self) -> Vec<PoseSegment> {
        self.state
            .lock()
            .poses
            .iter()
            .filter(|tally| tally.pose_name != UNKNOWN_POSE)
            .map(PoseTally::segment)
            .collect()
    }

    /// Time since feedback for `pose_name` was last seen, if ever.
    pub fn idle_for(&self, pose_name: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.state
            .lock()
            .poses
            .iter()
            .find(|tally| tally.pose_name == pose_name)
            .map(|tally| now.saturating_duration_since(tally.last_seen))
    }
}

impl Listener<FeedbackEvent> for PoseScoreTracker {
    fn handle(&self, event: &FeedbackEvent) -> anyhow::Result<()> {
        self.record(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn event(pose: &str, score: f64, correct: bool) -> FeedbackEvent {
        FeedbackEvent {
            pose_name: pose.into(),
            score,
            feedback: String::new(),
            correct,
            details: Default::default(),
        }
    }

    #[test]
    fn tallies_per_pose_in_first_seen_order() {
        let clock = Arc::new(ManualClock::new());
        let tracker = PoseScoreTracker::new(clock.clone());

        tracker.record(&event("Warrior II", 60.0, false));
        clock.advance(Duration::from_secs(2));
        tracker.record(&event("Tree Pose", 90.0, true));
        clock.advance(Duration::from_secs(3));
        tracker.record(&event("Warrior II", 80.0, true));

        let segments = tracker.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].pose_name, "Warrior II");
        assert_eq!(segments[0].samples, 2);
        assert_eq!(segments[0].avg_score, 70.0);
        assert_eq!(segments[0].correct_ratio, 0.5);
        assert_eq!(segments[0].duration_secs, 5);
        assert_eq!(segments[1].duration_secs, 0);

        assert_eq!(tracker.latest().unwrap().score, 80.0);
        assert_eq!(tracker.idle_for("Tree Pose"), Some(Duration::from_secs(3)));
        assert_eq!(tracker.idle_for("Downward Dog"), None);
    }

    #[test]
    fn unmatched_frames_never_form_a_segment() {
        let tracker = PoseScoreTracker::new(Arc::new(ManualClock::new()));
        tracker.record(&event(UNKNOWN_POSE, 0.0, false));
        tracker.record(&event("Tree Pose", 75.0, true));
        tracker.record(&event(UNKNOWN_POSE, 0.0, false));

        let segments = tracker.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].pose_name, "Tree Pose");
        assert_eq!(tracker.latest().unwrap().pose_name, UNKNOWN_POSE);
        assert!(tracker.idle_for(UNKNOWN_POSE).is_some());
    }

    #[test]
    fn recent_history_is_bounded() {
        let tracker = PoseScoreTracker::new(Arc::new(ManualClock::new()));
        for i in 0..(MAX_RECENT_EVENTS + 5) {
            tracker.record(&event("Tree Pose", i as f64, true));
        }
        let recent = tracker.recent();
        assert_eq!(recent.len(), MAX_RECENT_EVENTS);
        assert_eq!(recent[0].score, 5.0);
    }
}
