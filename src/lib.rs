pub mod api;
pub mod capture;
pub mod channel;
pub mod clock;
pub mod error;
pub mod feedback;
pub mod models;
pub mod session;
pub mod settings;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use log::info;

use api::HttpBackend;
use capture::CaptureController;
use channel::WsConnector;
use models::FeedbackEvent;
use session::{SessionController, SessionOptions};
use settings::CoachSettings;

pub use error::{ApiError, ChannelError, CoachError};

/// Runs one session end to end: landmark frames stream in on stdin, feedback
/// is logged as it arrives and the session summary is printed on exit.
pub async fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let settings = CoachSettings::load_from_env()?;
    info!(
        "Pose coach starting up (api {}, channel {})",
        settings.api_base_url, settings.channel_url
    );

    let backend = HttpBackend::new(&settings.api_base_url, settings.request_timeout())?;
    let connector = WsConnector::new(&settings.channel_url, settings.connect_timeout());
    let controller = SessionController::new(
        Arc::new(backend),
        Arc::new(connector),
        SessionOptions::from(&settings),
    );

    controller.feedback().subscribe(Arc::new(|event: &FeedbackEvent| -> anyhow::Result<()> {
        info!(
            "{} {:.0} {} {}",
            event.pose_name,
            event.score,
            if event.correct { "ok" } else { "adjust" },
            event.feedback
        );
        Ok(())
    }));

    controller.set_target_pose(settings.target_pose.clone()).await;
    let session = controller
        .start()
        .await
        .context("could not start a session")?;
    info!(
        "Streaming frames for session {}",
        session.id.as_deref().unwrap_or_default()
    );

    let mut capture = CaptureController::new();
    capture.start(tokio::io::BufReader::new(tokio::io::stdin()), controller.clone())?;
    if let Some(token) = capture.cancellation() {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, ending session");
                token.cancel();
            }
        });
    }

    let stats = capture.join().await?;
    info!(
        "Capture finished: {} read, {} forwarded, {} skipped, {} rejected",
        stats.read, stats.forwarded, stats.skipped, stats.rejected
    );

    let summary = controller
        .end()
        .await
        .context("could not finalize the session")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
