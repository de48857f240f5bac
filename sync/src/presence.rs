//! Presence broadcaster — throttled pointer advertisement.
//!
//! Pointer samples arrive at input frequency; at most one presence message
//! per window leaves. The gate is a timestamp comparison rather than a
//! timer: samples inside the window are dropped outright, never queued or
//! deferred, and the next sample after the window carries the freshest
//! position anyway.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use wire::{Camera, PresenceMessage, WireMessage};

use crate::session::Session;

/// Minimum spacing between outbound presence messages.
pub const PRESENCE_INTERVAL: Duration = Duration::from_millis(50);

/// Throttle gate for the local user's pointer.
pub struct PresenceBroadcaster {
    session_rx: watch::Receiver<Session>,
    interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl PresenceBroadcaster {
    pub(crate) fn new(session_rx: watch::Receiver<Session>) -> Self {
        Self::with_interval(session_rx, PRESENCE_INTERVAL)
    }

    /// Gate with a custom window.
    pub(crate) fn with_interval(session_rx: watch::Receiver<Session>, interval: Duration) -> Self {
        Self { session_rx, interval, last_sent: Mutex::new(None) }
    }

    /// Convert a pointer sample into a presence message, or `None` when the
    /// sample falls inside the throttle window. The first sample always
    /// passes.
    pub fn pointer_sample(&self, x: f64, y: f64, camera: Camera) -> Option<WireMessage> {
        let now = Instant::now();
        {
            let mut last = self.last_sent.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.interval {
                    return None;
                }
            }
            *last = Some(now);
        }

        let session = self.session_rx.borrow().clone();
        Some(WireMessage::Presence(PresenceMessage {
            user_id: session.user_id,
            user_name: session.user_name,
            page_id: session.page_id,
            whiteboard_id: session.whiteboard_id,
            x,
            y,
            camera,
        }))
    }
}
