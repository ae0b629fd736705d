// src/server/session.rs
// Session bookkeeping for the request server. Sessions are created by
// `initialize` and carry only metadata; no streaming state is held across
// requests. An expired session is never silently renewed: the client
// must call `initialize` again.

use crate::models::Session;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl_hours: i64,
}

impl SessionStore {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl_hours,
        }
    }

    pub fn create(&self, subject: &str) -> Session {
        let now = Utc::now();
        let session = Session {
            session_id: format!("sess_{}", Uuid::new_v4().simple()),
            created_at: now,
            expires_at: now + ChronoDuration::hours(self.ttl_hours),
            subject: subject.to_string(),
        };

        self.sessions.write().insert(session.session_id.clone(), session.clone());
        session
    }

    /// Returns the session if it exists and has not expired. An expired
    /// entry is evicted as a side effect but never re-created.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read();
            match sessions.get(session_id) {
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().remove(session_id);
        None
    }

    pub fn evict_expired(&self) {
        let now = Utc::now();
        self.sessions.write().retain(|_, s| !s.is_expired(now));
    }
}
