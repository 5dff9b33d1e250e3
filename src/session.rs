//! Session tokens.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::AuthError;
use crate::model::{SessionToken, UserId};

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: SessionToken,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<SessionToken, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    pub fn create(&mut self, user_id: &UserId, now: DateTime<Utc>) -> Session {
        let session = Session {
            token: format!("tok_{}", Uuid::new_v4().simple()),
            user_id: user_id.clone(),
            expires_at: now + self.ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Resolve a token to its user. Expired sessions are evicted on sight.
    pub fn validate(&mut self, token: &str, now: DateTime<Utc>) -> Result<UserId, AuthError> {
        let session = self.sessions.get(token).ok_or(AuthError::SessionInvalid)?;
        if session.expires_at <= now {
            self.sessions.remove(token);
            return Err(AuthError::SessionExpired);
        }
        Ok(session.user_id.clone())
    }

    pub fn revoke(&mut self, token: &str) -> Option<Session> {
        self.sessions.remove(token)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_session_validates() {
        let now = Utc::now();
        let mut sessions = SessionStore::new(Duration::hours(24));
        let session = sessions.create(&"u1".to_string(), now);

        assert!(session.token.starts_with("tok_"));
        assert_eq!(sessions.validate(&session.token, now).unwrap(), "u1");
    }

    #[test]
    fn unknown_token_is_invalid() {
        let mut sessions = SessionStore::new(Duration::hours(24));
        assert!(matches!(
            sessions.validate("tok_nope", Utc::now()),
            Err(AuthError::SessionInvalid)
        ));
    }

    #[test]
    fn expired_session_is_evicted() {
        let now = Utc::now();
        let mut sessions = SessionStore::new(Duration::hours(1));
        let session = sessions.create(&"u1".to_string(), now);

        let later = now + Duration::hours(2);
        assert!(matches!(
            sessions.validate(&session.token, later),
            Err(AuthError::SessionExpired)
        ));
        assert!(sessions.is_empty());
        assert!(matches!(
            sessions.validate(&session.token, later),
            Err(AuthError::SessionInvalid)
        ));
    }

    #[test]
    fn revoke_removes_session() {
        let now = Utc::now();
        let mut sessions = SessionStore::new(Duration::hours(1));
        let session = sessions.create(&"u1".to_string(), now);

        assert!(sessions.revoke(&session.token).is_some());
        assert!(sessions.revoke(&session.token).is_none());
        assert_eq!(sessions.len(), 0);
    }
}
