use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::value::{Record, Value};

use super::{ActionError, ActionResult, Concept};

/// Concept name the engine seeds every request under.
pub const REQUESTING: &str = "Requesting";
/// Action recording an inbound request.
pub const REQUEST: &str = "request";
/// Action recording the response to a request.
pub const RESPOND: &str = "respond";

/// Tracks in-flight requests and the response each one receives.
///
/// `request` mints a request id from `{ path, ..body }`; `respond` stores the
/// remaining input fields as the response for `request`. A request can be
/// answered once.
#[derive(Debug, Default)]
pub struct Requesting {
    pending: RwLock<HashMap<String, Option<Record>>>,
}

impl Requesting {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a request and returns its response, if one was recorded.
    pub fn take_response(&self, request: &str) -> Option<Record> {
        let mut guard = self.pending.write().ok()?;
        guard.remove(request).flatten()
    }

    /// Number of requests that have not been collected yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.read().map(|g| g.len()).unwrap_or(0)
    }

    fn request(&self, input: &Record) -> ActionResult {
        if !input.get("path").is_some_and(Value::is_string) {
            return Err(ActionError::new("request requires a string path"));
        }
        let id = Value::new_id();
        let key = id.as_str().unwrap_or_default().to_string();
        self.pending
            .write()
            .map_err(|_| ActionError::poisoned("requesting"))?
            .insert(key, None);

        let mut output = Record::new();
        output.insert("request".to_string(), id);
        Ok(output)
    }

    fn respond(&self, input: &Record) -> ActionResult {
        let Some(request) = input.get("request").and_then(Value::as_str) else {
            return Err(ActionError::new("respond requires a request id"));
        };

        let mut guard = self.pending.write().map_err(|_| ActionError::poisoned("requesting"))?;
        let Some(slot) = guard.get_mut(request) else {
            return Err(ActionError::new(format!("unknown request {request}")));
        };
        if slot.is_some() {
            return Err(ActionError::new(format!("request {request} already answered")));
        }

        let mut response = input.clone();
        response.remove("request");
        *slot = Some(response);

        let mut output = Record::new();
        output.insert("request".to_string(), Value::id(request));
        Ok(output)
    }
}

#[async_trait]
impl Concept for Requesting {
    fn name(&self) -> &str {
        REQUESTING
    }

    fn actions(&self) -> &[&'static str] {
        &[REQUEST, RESPOND]
    }

    async fn perform(&self, action: &str, input: &Record) -> ActionResult {
        match action {
            REQUEST => self.request(input),
            RESPOND => self.respond(input),
            other => Err(ActionError::new(format!("Requesting has no action {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[tokio::test]
    async fn request_then_respond_once() {
        let requesting = Requesting::new();
        let out = requesting
            .perform(REQUEST, &record! { "path" => "/ping" })
            .await
            .unwrap();
        let id = out.get("request").and_then(Value::as_str).unwrap().to_string();
        assert_eq!(requesting.in_flight(), 1);

        let respond = record! { "request" => Value::id(id.clone()), "pong" => true };
        assert!(requesting.perform(RESPOND, &respond).await.is_ok());
        assert!(requesting.perform(RESPOND, &respond).await.is_err());

        let response = requesting.take_response(&id).unwrap();
        assert_eq!(response.get("pong"), Some(&Value::Bool(true)));
        assert!(!response.contains_key("request"));
        assert_eq!(requesting.in_flight(), 0);
    }

    #[tokio::test]
    async fn request_requires_path() {
        let requesting = Requesting::new();
        let err = requesting.perform(REQUEST, &Record::new()).await.unwrap_err();
        assert!(err.message.contains("path"));
    }

    #[tokio::test]
    async fn respond_to_unknown_request_fails() {
        let requesting = Requesting::new();
        let err = requesting
            .perform(RESPOND, &record! { "request" => "r-404" })
            .await
            .unwrap_err();
        assert!(err.message.contains("unknown request"));
    }
}
