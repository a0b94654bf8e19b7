use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::channel::{Listener, ListenerId, ListenerRegistry};
use crate::models::{ChannelMessage, FeedbackEvent};

/// Channel message tag carrying a [`FeedbackEvent`] payload.
pub const POSE_FEEDBACK: &str = "pose_feedback";

/// Unwraps `pose_feedback` envelopes and republishes the typed payload to UI
/// observers. Every other tag is ignored.
pub struct FeedbackRouter {
    observers: ListenerRegistry<FeedbackEvent>,
}

impl FeedbackRouter {
    pub fn new() -> Self {
        Self {
            observers: ListenerRegistry::new("feedback"),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn Listener<FeedbackEvent>>) -> ListenerId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for FeedbackRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener<ChannelMessage> for FeedbackRouter {
    fn handle(&self, message: &ChannelMessage) -> anyhow::Result<()> {
        if message.kind != POSE_FEEDBACK {
            return Ok(());
        }

        let event = FeedbackEvent::deserialize(&message.data)
            .context("pose_feedback payload did not match the feedback schema")?;
        self.observers.publish(&event);
        Ok(())
    }
}
