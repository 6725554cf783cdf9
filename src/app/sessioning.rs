use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::concept::{ActionError, ActionResult, Concept};
use crate::record;
use crate::value::{Record, Value};

/// Concept name.
pub const SESSIONING: &str = "Sessioning";

/// Maps session tokens to the user who opened them.
#[derive(Debug, Default)]
pub struct Sessioning {
    sessions: RwLock<HashMap<String, Value>>,
}

impl Sessioning {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The user owning `session`, if the session is live.
    #[must_use]
    pub fn user(&self, session: &str) -> Option<Value> {
        self.sessions.read().ok()?.get(session).cloned()
    }

    fn create(&self, input: &Record) -> ActionResult {
        let Some(user) = input.get("user").filter(|u| u.as_str().is_some()) else {
            return Err(ActionError::new("create requires a user"));
        };
        let session = Value::new_id();
        let key = session.as_str().unwrap_or_default().to_string();
        self.sessions
            .write()
            .map_err(|_| ActionError::poisoned("sessions"))?
            .insert(key, user.clone());
        Ok(record! { "session" => session })
    }

    fn delete(&self, input: &Record) -> ActionResult {
        let Some(session) = input.get("session").and_then(Value::as_str) else {
            return Err(ActionError::new("delete requires a session"));
        };
        let removed = self
            .sessions
            .write()
            .map_err(|_| ActionError::poisoned("sessions"))?
            .remove(session);
        match removed {
            Some(_) => Ok(record! { "session" => Value::id(session) }),
            None => Err(ActionError::new(format!("unknown session {session}"))),
        }
    }
}

#[async_trait]
impl Concept for Sessioning {
    fn name(&self) -> &str {
        SESSIONING
    }

    fn actions(&self) -> &[&'static str] {
        &["create", "delete"]
    }

    fn queries(&self) -> &[&'static str] {
        &["_getUser"]
    }

    async fn perform(&self, action: &str, input: &Record) -> ActionResult {
        match action {
            "create" => self.create(input),
            "delete" => self.delete(input),
            other => Err(ActionError::new(format!("Sessioning has no action {other}"))),
        }
    }

    async fn query(&self, query: &str, input: &Record) -> Vec<Record> {
        if query != "_getUser" {
            return Vec::new();
        }
        input
            .get("session")
            .and_then(Value::as_str)
            .and_then(|s| self.user(s))
            .map(|user| vec![record! { "user" => user }])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_lifecycle() {
        let sessions = Sessioning::new();
        let out = sessions
            .perform("create", &record! { "user" => "alice" })
            .await
            .unwrap();
        let session = out.get("session").cloned().unwrap();
        assert!(session.is_id());

        let rows = sessions.query("_getUser", &record! { "session" => session.clone() }).await;
        assert_eq!(rows, vec![record! { "user" => "alice" }]);

        sessions
            .perform("delete", &record! { "session" => session.clone() })
            .await
            .unwrap();
        assert!(sessions.query("_getUser", &record! { "session" => session }).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_session_has_no_user() {
        let sessions = Sessioning::new();
        assert!(sessions
            .query("_getUser", &record! { "session" => "nope" })
            .await
            .is_empty());
        assert!(sessions
            .perform("delete", &record! { "session" => "nope" })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn create_requires_user() {
        let err = Sessioning::new().perform("create", &Record::new()).await.unwrap_err();
        assert!(err.message.contains("user"));
    }
}
