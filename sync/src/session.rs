//! Session identity, connection status, and engine events.

/// Identity of one page-scoped connection. One connection exists per
/// (whiteboard, page, user); switching the viewed page replaces the
/// connection rather than re-targeting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub whiteboard_id: i64,
    pub page_id: i64,
    /// Opaque user identity; travels as `drawerId` on the wire.
    pub user_id: String,
    pub user_name: String,
}

impl Session {
    /// True when both identity strings are usable. Sessions missing either
    /// must not open a connection.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.user_id.is_empty() && !self.user_name.is_empty()
    }
}

/// Connection lifecycle as observed by the embedding surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No live socket; outbound messages are dropped.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open and pumping.
    Connected,
}

/// Out-of-band notifications for the embedding surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// A peer deleted the page this client is viewing. The record is already
    /// gone from the local store; the surface should prompt for a reload.
    PageDeleted { page_id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: &str, user_name: &str) -> Session {
        Session {
            whiteboard_id: 1,
            page_id: 1,
            user_id: user_id.to_owned(),
            user_name: user_name.to_owned(),
        }
    }

    #[test]
    fn complete_session_requires_both_identity_strings() {
        assert!(session("u1", "Ada").is_complete());
        assert!(!session("", "Ada").is_complete());
        assert!(!session("u1", "").is_complete());
        assert!(!session("", "").is_complete());
    }

    #[test]
    fn status_defaults_to_disconnected() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }
}
