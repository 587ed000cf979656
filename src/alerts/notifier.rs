use crate::alerts::channels::NotificationChannel;
use crate::error::AlertError;
use crate::events::{AlarmState, TransitionEvent};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// Message for a transition into `ALARM`
pub const CRITICAL_MESSAGE: &str = "🔥 CRITICAL: 🍺 Beer count is low";

/// Message for a transition into `OK`
pub const ALL_CLEAR_MESSAGE: &str = "🎉 ALL GOOD: 🍺 We have beer!";

/// Select the message for a newly entered state
///
/// `INSUFFICIENT_DATA` has no message; such transitions are not announced.
pub fn message_for(state: AlarmState) -> Option<&'static str> {
    match state {
        AlarmState::Alarm => Some(CRITICAL_MESSAGE),
        AlarmState::Ok => Some(ALL_CLEAR_MESSAGE),
        AlarmState::InsufficientData => None,
    }
}

/// What happened to a transition handed to the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The message was accepted by the channel
    Sent(&'static str),
    /// The new state has no message
    Suppressed,
}

/// Delivers transition events to a notification channel
///
/// Delivery is best-effort: each event gets exactly one attempt bounded by
/// `timeout`, and failures are reported to the caller, never retried.
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Attempt delivery of one transition event
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Timeout` if the channel does not answer within the
    /// timeout, or the channel's own error if delivery fails.
    pub async fn notify(&self, event: &TransitionEvent) -> Result<Delivery, AlertError> {
        let Some(text) = message_for(event.to) else {
            debug!(
                "Suppressing notification for {} -> {}",
                event.from, event.to
            );
            return Ok(Delivery::Suppressed);
        };

        match tokio::time::timeout(self.timeout, self.channel.send(text)).await {
            Ok(Ok(())) => {
                info!(
                    "Sent {} notification via {}: {}",
                    event.to,
                    self.channel.name(),
                    text
                );
                Ok(Delivery::Sent(text))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AlertError::Timeout),
        }
    }
}
