use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A verified identity with an expiry.
///
/// Owned by the auth collaborator; the engine only ever reads it to gate
/// remote operations and never mutates session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// The seam to the auth layer: yields a verified session or nothing.
pub trait SessionProvider: Send + Sync {
    fn verified_session(&self) -> Option<Session>;
}

/// Holds whatever session the auth layer last handed over.
///
/// Expired sessions are filtered out on read, so callers always see either
/// a currently valid identity or `None`.
#[derive(Default)]
pub struct StaticSessionProvider {
    current: RwLock<Option<Session>>,
}

impl StaticSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session: Session) {
        if let Ok(mut guard) = self.current.write() {
            *guard = Some(session);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.current.write() {
            *guard = None;
        }
    }
}

impl SessionProvider for StaticSessionProvider {
    fn verified_session(&self) -> Option<Session> {
        self.current
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(Session::is_valid)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session_expiring_in(minutes: i64) -> Session {
        Session {
            user: "medic-7".into(),
            expires_at: Utc::now() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn empty_provider_yields_none() {
        let provider = StaticSessionProvider::new();
        assert!(provider.verified_session().is_none());
    }

    #[test]
    fn valid_session_is_returned() {
        let provider = StaticSessionProvider::new();
        provider.set(session_expiring_in(30));
        let session = provider.verified_session().unwrap();
        assert_eq!(session.user, "medic-7");
    }

    #[test]
    fn expired_session_is_filtered_out() {
        let provider = StaticSessionProvider::new();
        provider.set(session_expiring_in(-5));
        assert!(provider.verified_session().is_none());
    }

    #[test]
    fn clear_removes_the_session() {
        let provider = StaticSessionProvider::new();
        provider.set(session_expiring_in(30));
        provider.clear();
        assert!(provider.verified_session().is_none());
    }
}
