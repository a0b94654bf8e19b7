mod controller;
mod loop_worker;

pub use controller::CaptureController;
pub use loop_worker::{capture_loop, CaptureFrame, CaptureStats};
