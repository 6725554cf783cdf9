//! Reference messaging backend built from concepts and syncs.
//!
//! Users open sessions, post messages to conversations through session-gated
//! requests, and summon an assistant by mentioning it in a message.

/// Assistant replies backed by a pluggable text generator.
pub mod assistant;
/// Conversations and messages.
pub mod conversing;
/// Session tokens.
pub mod sessioning;
/// The app's sync rules.
pub mod syncs;

use std::sync::Arc;

use crate::concept::ConceptSet;
use crate::config::EngineConfig;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::sync::SyncRegistry;

pub use assistant::{Assistant, EchoGenerator, TextGenerator};
pub use conversing::Conversing;
pub use sessioning::Sessioning;

/// Handles to the app's concepts.
///
/// The handles stay usable after the engine is built, so callers can seed
/// state directly and inspect it afterwards.
#[derive(Debug, Clone)]
pub struct App {
    pub sessioning: Arc<Sessioning>,
    pub conversing: Arc<Conversing>,
    pub assistant: Arc<Assistant>,
}

impl App {
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            sessioning: Arc::new(Sessioning::new()),
            conversing: Arc::new(Conversing::new()),
            assistant: Arc::new(Assistant::new(generator)),
        }
    }

    /// The app's concepts.
    pub fn concepts(&self) -> SyncResult<ConceptSet> {
        ConceptSet::new()
            .with(self.sessioning.clone())?
            .with(self.conversing.clone())?
            .with(self.assistant.clone())
    }

    /// The app's sync registry.
    pub fn registry() -> SyncResult<SyncRegistry> {
        Ok(SyncRegistry::builder().extend(syncs::rules()?)?.build())
    }

    /// Builds an engine running the app's syncs over its concepts.
    pub fn engine(&self, config: EngineConfig) -> SyncResult<SyncEngine> {
        SyncEngine::new(Self::registry()?, self.concepts()?, config)
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(Arc::new(EchoGenerator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_engine_validates() {
        let engine = App::default().engine(EngineConfig::default()).unwrap();
        assert_eq!(engine.registry().len(), 6);
        assert!(engine.concepts().contains("Requesting"));
        assert!(engine.concepts().has_query("Sessioning", "_getUser"));
    }
}
