use std::sync::Arc;

use async_trait::async_trait;

use crate::concept::{ActionError, ActionResult, Concept};
use crate::record;
use crate::value::{Record, Value};

/// Concept name.
pub const ASSISTANT: &str = "Assistant";

/// Boundary to an external text generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produces a reply for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ActionError>;
}

/// Deterministic generator that repeats the prompt back.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ActionError> {
        if prompt.is_empty() {
            return Err(ActionError::new("empty prompt"));
        }
        Ok(format!("You said: {prompt}"))
    }
}

/// Produces assistant replies for conversations.
pub struct Assistant {
    generator: Arc<dyn TextGenerator>,
}

impl Assistant {
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    async fn reply(&self, input: &Record) -> ActionResult {
        let conversation = input
            .get("conversation")
            .ok_or_else(|| ActionError::new("reply requires a conversation"))?;
        let prompt = input
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::new("reply requires a text prompt"))?;
        let reply = self.generator.generate(prompt).await?;
        Ok(record! { "conversation" => conversation.clone(), "reply" => reply })
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant").finish_non_exhaustive()
    }
}

#[async_trait]
impl Concept for Assistant {
    fn name(&self) -> &str {
        ASSISTANT
    }

    fn actions(&self) -> &[&'static str] {
        &["reply"]
    }

    async fn perform(&self, action: &str, input: &Record) -> ActionResult {
        match action {
            "reply" => self.reply(input).await,
            other => Err(ActionError::new(format!("Assistant has no action {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_reply() {
        let assistant = Assistant::new(Arc::new(EchoGenerator));
        let out = assistant
            .perform("reply", &record! { "conversation" => "c1", "prompt" => "hello" })
            .await
            .unwrap();
        assert_eq!(out.get("reply"), Some(&Value::from("You said: hello")));
    }

    #[tokio::test]
    async fn generator_errors_surface_as_action_errors() {
        let assistant = Assistant::new(Arc::new(EchoGenerator));
        let err = assistant
            .perform("reply", &record! { "conversation" => "c1", "prompt" => "" })
            .await
            .unwrap_err();
        assert_eq!(err.message, "empty prompt");
    }
}
