pub mod controller;
pub mod state;
pub mod throttle;

pub use controller::{SessionController, SessionOptions, SessionSummary};
pub use state::{Session, SessionState};
pub use throttle::{SampleThrottler, DEFAULT_THROTTLE_INTERVAL};
