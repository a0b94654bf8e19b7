use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use super::state::{pose_label, Session, SessionState};
use super::throttle::{SampleThrottler, DEFAULT_THROTTLE_INTERVAL};
use crate::api::{Backend, EndSegmentRequest};
use crate::channel::{ChannelClient, ChannelState, Connector, ListenerId, ReconnectPolicy};
use crate::clock::{Clock, TokioClock};
use crate::error::{CoachError, Result};
use crate::feedback::{FeedbackRouter, PoseScoreTracker, PoseSegment};
use crate::models::{ExportDescriptor, LandmarkSample, SegmentRecord};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub user_id: String,
    pub throttle_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub tick_interval: Duration,
    /// Report one segment per tracked pose before finalizing.
    pub flush_segments_on_end: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            user_id: "default_user".into(),
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            tick_interval: Duration::from_secs(1),
            flush_segments_on_end: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub elapsed_secs: u64,
    pub export: ExportDescriptor,
    pub segments: Vec<PoseSegment>,
}

struct ControllerInner {
    session: Session,
    throttler: SampleThrottler,
    channel: Option<ChannelClient>,
    ticker: Option<JoinHandle<()>>,
    tracker: Option<(ListenerId, Arc<PoseScoreTracker>)>,
}

impl ControllerInner {
    fn release(&mut self, router: &FeedbackRouter) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
        if let Some(channel) = self.channel.take() {
            channel.disconnect();
        }
        if let Some((id, _)) = self.tracker.take() {
            router.unsubscribe(id);
        }
    }
}

/// Owns one practice session: its life-cycle, its feedback channel and the
/// elapsed-time ticker.
///
/// Clones share the same session. The feedback router outlives individual
/// channels so UI observers subscribe once.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Mutex<ControllerInner>>,
    backend: Arc<dyn Backend>,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    router: Arc<FeedbackRouter>,
    state_tx: Arc<watch::Sender<Session>>,
    options: Arc<SessionOptions>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn Backend>, connector: Arc<dyn Connector>, options: SessionOptions) -> Self {
        Self::with_clock(backend, connector, options, Arc::new(TokioClock))
    }

    pub fn with_clock(
        backend: Arc<dyn Backend>,
        connector: Arc<dyn Connector>,
        options: SessionOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let throttler = SampleThrottler::new(options.throttle_interval, backend.clone(), clock.clone());
        let (state_tx, _) = watch::channel(Session::new());

        Self {
            inner: Arc::new(Mutex::new(ControllerInner {
                session: Session::new(),
                throttler,
                channel: None,
                ticker: None,
                tracker: None,
            })),
            backend,
            connector,
            clock,
            router: Arc::new(FeedbackRouter::new()),
            state_tx: Arc::new(state_tx),
            options: Arc::new(options),
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.lock().await.session.clone()
    }

    /// Receives a snapshot on every transition and every elapsed-time tick.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state_tx.subscribe()
    }

    /// Typed feedback fan-out for UI observers.
    pub fn feedback(&self) -> Arc<FeedbackRouter> {
        Arc::clone(&self.router)
    }

    pub async fn pose_tracker(&self) -> Option<Arc<PoseScoreTracker>> {
        self.inner
            .lock()
            .await
            .tracker
            .as_ref()
            .map(|(_, tracker)| Arc::clone(tracker))
    }

    pub async fn channel_state(&self) -> Option<ChannelState> {
        self.inner.lock().await.channel.as_ref().map(ChannelClient::state)
    }

    /// `None` or an empty label selects auto-detection.
    pub async fn set_target_pose(&self, pose: Option<String>) {
        let mut inner = self.inner.lock().await;
        inner.session.set_target_pose(pose);
        self.publish(&inner.session);
    }

    pub async fn start(&self) -> Result<Session> {
        {
            let mut inner = self.inner.lock().await;
            if inner.session.state != SessionState::Idle {
                return Err(CoachError::InvalidState {
                    operation: "start",
                    state: inner.session.state,
                });
            }
            inner.session.begin_starting();
            self.publish(&inner.session);
        }

        let started = match self.backend.start_session(&self.options.user_id).await {
            Ok(started) => started,
            Err(err) => {
                error!("Failed to start session: {err}");
                let mut inner = self.inner.lock().await;
                if inner.session.state == SessionState::Starting {
                    inner.session.fail(err.to_string());
                    self.publish(&inner.session);
                }
                return Err(err.into());
            }
        };
        let session_id = started.session_id;

        if self.inner.lock().await.session.state != SessionState::Starting {
            warn!("Session {session_id} was torn down while starting; not opening a channel");
            return Err(CoachError::Abandoned("start"));
        }

        let channel = ChannelClient::new(self.connector.clone(), self.options.reconnect);
        channel.add_listener(self.router.clone());
        channel.connect(session_id.clone()).await;

        let mut inner = self.inner.lock().await;
        if inner.session.state != SessionState::Starting {
            warn!("Session {session_id} was torn down while starting; closing its channel");
            channel.disconnect();
            return Err(CoachError::Abandoned("start"));
        }

        let tracker = Arc::new(PoseScoreTracker::new(self.clock.clone()));
        let tracker_id = self.router.subscribe(tracker.clone());

        inner.session.activate(session_id.clone(), Utc::now());
        inner.throttler.reset();
        inner.channel = Some(channel);
        inner.tracker = Some((tracker_id, tracker));
        inner.ticker = Some(self.spawn_ticker(session_id.clone()));
        self.publish(&inner.session);

        info!(
            "Session {session_id} active, forwarding at most one sample per {:?}",
            inner.throttler.interval()
        );
        Ok(inner.session.clone())
    }

    /// Offers one capture frame for analysis. Returns true if it was
    /// forwarded; frames outside `Active` or inside the throttle window are
    /// dropped silently.
    pub async fn submit_sample(&self, sample: LandmarkSample, pose_hint: Option<String>) -> bool {
        let mut inner = self.inner.lock().await;
        let ControllerInner {
            session, throttler, ..
        } = &mut *inner;

        if session.state != SessionState::Active {
            return false;
        }
        let Some(session_id) = session.id.as_deref() else {
            return false;
        };

        let pose_hint = pose_label(pose_hint).or_else(|| session.target_pose.clone());
        throttler.submit(session_id, sample, pose_hint)
    }

    pub async fn end_segment(
        &self,
        pose_name: &str,
        avg_score: u32,
        duration_seconds: u64,
    ) -> Result<SegmentRecord> {
        let session_id = {
            let inner = self.inner.lock().await;
            match (inner.session.state, inner.session.id.clone()) {
                (SessionState::Active, Some(id)) => id,
                (state, _) => {
                    return Err(CoachError::InvalidState {
                        operation: "end a segment",
                        state,
                    })
                }
            }
        };

        let request = EndSegmentRequest {
            session_id,
            pose_name: pose_name.to_string(),
            avg_score,
            duration_seconds,
        };
        Ok(self.backend.end_segment(&request).await?)
    }

    /// Stops the ticker, finalizes the session on the backend and closes the
    /// channel. Resolves only after the finalize call does.
    pub async fn end(&self) -> Result<SessionSummary> {
        let (session_id, tracker) = {
            let mut inner = self.inner.lock().await;
            let session_id = match (inner.session.state, inner.session.id.clone()) {
                (SessionState::Active, Some(id)) => id,
                (state, _) => {
                    return Err(CoachError::InvalidState {
                        operation: "end",
                        state,
                    })
                }
            };

            inner.session.begin_ending();
            if let Some(handle) = inner.ticker.take() {
                handle.abort();
            }
            self.publish(&inner.session);
            let tracker = inner.tracker.as_ref().map(|(_, tracker)| Arc::clone(tracker));
            (session_id, tracker)
        };

        let segments = tracker.map(|tracker| tracker.segments()).unwrap_or_default();
        if self.options.flush_segments_on_end {
            self.flush_segments(&session_id, &segments).await;
        }

        let result = self.backend.merge_and_export(&session_id).await;

        let mut inner = self.inner.lock().await;
        inner.release(&self.router);
        let still_ending = inner.session.state == SessionState::Ending;

        match result {
            Ok(export) => {
                if still_ending {
                    inner.session.finish(export.clone());
                    self.publish(&inner.session);
                }
                info!("Session {session_id} ended after {}s", inner.session.elapsed_secs);
                Ok(SessionSummary {
                    session_id,
                    elapsed_secs: inner.session.elapsed_secs,
                    export,
                    segments,
                })
            }
            Err(err) => {
                error!("Failed to finalize session {session_id}: {err}");
                if still_ending {
                    inner.session.fail(err.to_string());
                    self.publish(&inner.session);
                }
                Err(err.into())
            }
        }
    }

    /// Best-effort cleanup for when the owner goes away without ending the
    /// session: closes the channel and stops the ticker. No backend calls.
    pub async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.session.state.is_live() {
            return;
        }

        inner.release(&self.router);
        inner.session.abandon();
        self.publish(&inner.session);
        info!(
            "Session {} torn down",
            inner.session.id.as_deref().unwrap_or("<pending>")
        );
    }

    async fn flush_segments(&self, session_id: &str, segments: &[PoseSegment]) {
        for segment in segments {
            let request = EndSegmentRequest {
                session_id: session_id.to_string(),
                pose_name: segment.pose_name.clone(),
                avg_score: segment.avg_score.round().clamp(0.0, 100.0) as u32,
                duration_seconds: segment.duration_secs,
            };
            if let Err(err) = self.backend.end_segment(&request).await {
                warn!(
                    "Could not record segment {} for session {session_id}: {err}",
                    segment.pose_name
                );
            }
        }
    }

    fn spawn_ticker(&self, session_id: String) -> JoinHandle<()> {
        let handle: Weak<Mutex<ControllerInner>> = Arc::downgrade(&self.inner);
        let state_tx = Arc::clone(&self.state_tx);
        let period = self.options.tick_interval;
        let first = time::Instant::now() + period;

        tokio::spawn(async move {
            let mut interval = time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;

                let Some(inner) = handle.upgrade() else {
                    break;
                };
                let mut guard = inner.lock().await;
                if guard.session.state != SessionState::Active
                    || guard.session.id.as_deref() != Some(session_id.as_str())
                {
                    break;
                }
                guard.session.elapsed_secs += 1;
                state_tx.send_replace(guard.session.clone());
            }
        })
    }

    fn publish(&self, session: &Session) {
        self.state_tx.send_replace(session.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedBackend;
    use crate::channel::MemoryConnector;
    use crate::error::ApiError;
    use crate::models::landmark::standing_landmarks;
    use serde_json::json;
    use tokio::time::advance;

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn sample() -> LandmarkSample {
        LandmarkSample::new(standing_landmarks(), Utc::now()).unwrap()
    }

    fn controller(backend: &Arc<ScriptedBackend>, server: &MemoryConnector) -> SessionController {
        controller_with(backend, server, SessionOptions::default())
    }

    fn controller_with(
        backend: &Arc<ScriptedBackend>,
        server: &MemoryConnector,
        options: SessionOptions,
    ) -> SessionController {
        SessionController::new(backend.clone(), Arc::new(server.clone()), options)
    }

    fn feedback_frame(pose: &str, score: u32) -> String {
        json!({
            "type": "pose_feedback",
            "data": {
                "pose_name": pose,
                "score": score,
                "feedback": "hold steady",
                "correct": score >= 80
            }
        })
        .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn streams_one_request_per_window() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        let session = controller.start().await.unwrap();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.id.as_deref(), Some("abc123"));
        assert_eq!(server.received(0)[0], r#"{"session_id":"abc123"}"#);

        assert!(controller.submit_sample(sample(), None).await);
        advance(Duration::from_millis(50)).await;
        assert!(!controller.submit_sample(sample(), None).await);
        advance(Duration::from_millis(50)).await;
        assert!(!controller.submit_sample(sample(), None).await);
        settle().await;
        assert_eq!(backend.analyzed_count(), 1);

        advance(Duration::from_millis(100)).await;
        assert!(controller.submit_sample(sample(), None).await);
        settle().await;

        let analyzed = backend.analyzed.lock();
        assert_eq!(analyzed.len(), 2);
        assert!(analyzed.iter().all(|r| r.session_id == "abc123"));
    }

    #[tokio::test(start_paused = true)]
    async fn samples_before_start_resolves_are_ignored() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        *backend.start_delay.lock() = Some(Duration::from_secs(1));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        assert!(!controller.submit_sample(sample(), None).await);

        let starting = controller.clone();
        let start = tokio::spawn(async move { starting.start().await });
        settle().await;
        assert_eq!(controller.snapshot().await.state, SessionState::Starting);
        assert!(!controller.submit_sample(sample(), None).await);

        advance(Duration::from_secs(1)).await;
        start.await.unwrap().unwrap();
        settle().await;
        assert_eq!(backend.analyzed_count(), 0);
        assert!(controller.submit_sample(sample(), None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_surfaces_and_keeps_no_id() {
        let backend = Arc::new(ScriptedBackend::default());
        backend
            .starts
            .lock()
            .push_back(Err(ApiError::Http { status: 500, body: "camera offline".into() }));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, CoachError::Backend(ApiError::Http { status: 500, .. })));

        let session = controller.snapshot().await;
        assert_eq!(session.state, SessionState::Error);
        assert_eq!(session.id, None);
        assert!(session.last_error.is_some());
        assert_eq!(server.attempts(), 0);
        assert!(!controller.submit_sample(sample(), None).await);
        assert!(matches!(
            controller.start().await,
            Err(CoachError::InvalidState { operation: "start", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_ticks_only_while_active() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);
        let updates = controller.subscribe();

        controller.start().await.unwrap();
        for _ in 0..3 {
            advance(Duration::from_secs(1)).await;
            settle().await;
        }
        assert_eq!(controller.snapshot().await.elapsed_secs, 3);
        assert_eq!(updates.borrow().elapsed_secs, 3);

        let summary = controller.end().await.unwrap();
        assert_eq!(summary.elapsed_secs, 3);

        for _ in 0..5 {
            advance(Duration::from_secs(1)).await;
            settle().await;
        }
        let session = controller.snapshot().await;
        assert_eq!(session.state, SessionState::Ended);
        assert_eq!(session.elapsed_secs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_finalize_leaves_error_with_resources_released() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        backend
            .exports
            .lock()
            .push_back(Err(ApiError::Transport("connection reset".into())));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        controller.start().await.unwrap();
        advance(Duration::from_secs(1)).await;
        settle().await;

        let err = controller.end().await.unwrap_err();
        assert!(matches!(err, CoachError::Backend(ApiError::Transport(_))));
        settle().await;

        let session = controller.snapshot().await;
        assert_eq!(session.state, SessionState::Error);
        assert_eq!(session.id.as_deref(), Some("abc123"));
        assert_eq!(controller.channel_state().await, None);
        assert!(!server.client_attached(0));

        advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(controller.snapshot().await.elapsed_secs, 1);
        assert!(!controller.submit_sample(sample(), None).await);
        assert!(matches!(
            controller.end().await,
            Err(CoachError::InvalidState { operation: "end", state: SessionState::Error })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn end_flushes_tracked_segments_before_finalizing() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        let server = MemoryConnector::new();
        let options = SessionOptions {
            flush_segments_on_end: true,
            ..SessionOptions::default()
        };
        let controller = controller_with(&backend, &server, options);

        controller.start().await.unwrap();
        server.push(feedback_frame("Unknown", 0));
        for score in [80, 90] {
            server.push(feedback_frame("Tree Pose", score));
            advance(Duration::from_secs(2)).await;
            settle().await;
        }

        let summary = controller.end().await.unwrap();
        assert_eq!(summary.session_id, "abc123");
        assert_eq!(summary.segments.len(), 1);
        assert_eq!(summary.segments[0].avg_score, 85.0);
        assert_eq!(summary.export.status, "completed");

        let segments = backend.segments.lock();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].pose_name, "Tree Pose");
        assert_eq!(segments[0].avg_score, 85);
        assert_eq!(segments[0].duration_seconds, 2);
        assert_eq!(*backend.finalized.lock(), vec!["abc123".to_string()]);

        let session = controller.snapshot().await;
        assert_eq!(session.state, SessionState::Ended);
        assert!(session.export.is_some());
        assert_eq!(controller.feedback().observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn end_only_finalizes_by_default() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        controller.start().await.unwrap();
        server.push(feedback_frame("Unknown", 0));
        server.push(feedback_frame("Warrior II", 70));
        settle().await;

        let summary = controller.end().await.unwrap();
        assert_eq!(summary.segments.len(), 1);
        assert_eq!(summary.segments[0].pose_name, "Warrior II");
        assert!(backend.segments.lock().is_empty());
        assert_eq!(*backend.finalized.lock(), vec!["abc123".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_releases_without_finalizing() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        controller.start().await.unwrap();
        server.drop_connection();
        settle().await;
        assert_eq!(controller.channel_state().await, Some(ChannelState::Reconnecting));

        controller.teardown().await;
        controller.teardown().await;
        advance(Duration::from_secs(30)).await;
        settle().await;

        let session = controller.snapshot().await;
        assert_eq!(session.state, SessionState::Ended);
        assert!(session.abandoned);
        assert_eq!(session.elapsed_secs, 0);
        assert_eq!(server.attempts(), 1);
        assert!(backend.finalized.lock().is_empty());
        assert!(!controller.submit_sample(sample(), None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_start_abandons_the_session() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        *backend.start_delay.lock() = Some(Duration::from_secs(1));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        let starting = controller.clone();
        let start = tokio::spawn(async move { starting.start().await });
        settle().await;
        controller.teardown().await;

        advance(Duration::from_secs(1)).await;
        let result = start.await.unwrap();
        assert!(matches!(result, Err(CoachError::Abandoned("start"))));
        settle().await;

        assert_eq!(controller.snapshot().await.state, SessionState::Ended);
        assert_eq!(server.attempts(), 0);
        assert_eq!(server.connections(), 0);
        assert_eq!(controller.channel_state().await, None);
        assert!(!controller.submit_sample(sample(), None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn target_pose_is_the_default_hint() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        controller.set_target_pose(Some("Warrior II".into())).await;
        controller.start().await.unwrap();
        assert!(controller.submit_sample(sample(), None).await);
        advance(Duration::from_millis(200)).await;
        assert!(controller.submit_sample(sample(), Some("Tree Pose".into())).await);
        advance(Duration::from_millis(200)).await;
        assert!(controller.submit_sample(sample(), Some("  ".into())).await);
        settle().await;

        let analyzed = backend.analyzed.lock();
        assert_eq!(analyzed[0].pose_hint.as_deref(), Some("Warrior II"));
        assert_eq!(analyzed[1].pose_hint.as_deref(), Some("Tree Pose"));
        assert_eq!(analyzed[2].pose_hint.as_deref(), Some("Warrior II"));
    }

    #[tokio::test(start_paused = true)]
    async fn segments_can_only_end_while_active() {
        let backend = Arc::new(ScriptedBackend::starting_with("abc123"));
        let server = MemoryConnector::new();
        let controller = controller(&backend, &server);

        assert!(matches!(
            controller.end_segment("Tree Pose", 80, 10).await,
            Err(CoachError::InvalidState { state: SessionState::Idle, .. })
        ));

        controller.start().await.unwrap();
        let record = controller.end_segment("Tree Pose", 80, 10).await.unwrap();
        assert_eq!(record.segment_id, 1);
        assert_eq!(backend.segments.lock()[0].session_id, "abc123");
    }
}
