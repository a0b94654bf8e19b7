pub mod router;
pub mod stats;

pub use router::{FeedbackRouter, POSE_FEEDBACK};
pub use stats::{PoseScoreTracker, PoseSegment, UNKNOWN_POSE};
