pub mod export;
pub mod feedback;
pub mod history;
pub mod landmark;
pub mod message;

pub use export::{ExportDescriptor, SegmentRecord};
pub use feedback::{FeedbackEvent, Metric};
pub use history::{HistoryEntry, SessionDetail, SessionStats, UserHistory};
pub use landmark::{AnalysisRequest, Landmark, LandmarkSample, LANDMARK_COUNT};
pub use message::ChannelMessage;
