// Session registry - bookkeeping of known session identifiers
// Author: kelexine (https://github.com/kelexine)

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// A registered session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Tracks which sessions exist. Owns the [`Session`] records; per-session
/// generation state lives in the session's store, not here.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

/// Title given to sessions created without one.
pub fn default_title(now: DateTime<Utc>) -> String {
    format!("Studio {}", now.format("%Y-%m-%d"))
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, or refresh the title of an existing one.
    pub fn register(&self, id: &str, title: Option<&str>) -> Session {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            debug!("Registering session {}", id);
            Session {
                id: id.to_string(),
                title: default_title(now),
                created_at: now,
                last_active: now,
            }
        });
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            session.title = title.to_string();
        }
        session.last_active = now;
        session.clone()
    }

    /// Mark activity on a session, registering it on first sight.
    pub fn touch(&self, id: &str) {
        let now = Utc::now();
        if let Some(session) = self.sessions.write().get_mut(id) {
            session.last_active = now;
            return;
        }
        self.register(id, None);
    }

    /// Returns whether the session existed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            debug!("Unregistered session {}", id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// All sessions, most recently active first.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active).then_with(|| a.id.cmp(&b.id)));
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_count_remove() {
        let registry = SessionRegistry::new();
        registry.register("abc", Some("Night shoot"));
        registry.register("def", None);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get("abc").unwrap().title, "Night shoot");
        assert!(registry.get("def").unwrap().title.starts_with("Studio "));

        assert!(registry.unregister("abc"));
        assert!(!registry.unregister("abc"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_reregister_keeps_creation_time() {
        let registry = SessionRegistry::new();
        let first = registry.register("abc", None);
        let second = registry.register("abc", Some("Renamed"));
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.title, "Renamed");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_touch_registers_unknown_sessions() {
        let registry = SessionRegistry::new();
        registry.touch("fresh");
        assert!(registry.get("fresh").is_some());
    }
}
