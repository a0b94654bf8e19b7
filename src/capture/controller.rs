use anyhow::{bail, Context, Result};
use log::info;
use tokio::io::AsyncBufRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::SessionController;

use super::loop_worker::{capture_loop, CaptureStats};

/// Owns the background capture task feeding a session.
#[derive(Default)]
pub struct CaptureController {
    handle: Option<JoinHandle<CaptureStats>>,
    cancel_token: Option<CancellationToken>,
}

impl CaptureController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start<R>(&mut self, reader: R, session: SessionController) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        if self.handle.is_some() {
            bail!("capture already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(reader, session, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("Capture started");
        Ok(())
    }

    /// Token that stops the running capture when cancelled, e.g. from a
    /// signal handler.
    pub fn cancellation(&self) -> Option<CancellationToken> {
        self.cancel_token.clone()
    }

    /// Waits for the feed to end on its own.
    pub async fn join(&mut self) -> Result<CaptureStats> {
        self.cancel_token = None;
        match self.handle.take() {
            Some(handle) => handle.await.context("capture task failed to join"),
            None => Ok(CaptureStats::default()),
        }
    }

    pub async fn stop(&mut self) -> Result<CaptureStats> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.join().await
    }
}
