//! Builder wiring collaborators, a spawner and configuration into an
//! [`Engine`].

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::SlaConfig;
use crate::core::{AppResult, Collaborators, Engine, SlaError, Spawn};
use crate::runtime::ThreadSpawner;

/// Builds an [`Engine`] and applies its first configuration.
pub struct EngineBuilder {
    collab: Collaborators,
    spawner: Option<Arc<dyn Spawn>>,
    config: Option<SlaConfig>,
}

impl EngineBuilder {
    /// Start from the external services the engine will drive.
    #[must_use]
    pub fn new(collab: Collaborators) -> Self {
        Self {
            collab,
            spawner: None,
            config: None,
        }
    }

    /// Use `spawner` for the coordinator and workers instead of plain
    /// OS threads.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Configuration applied by [`EngineBuilder::build`].
    #[must_use]
    pub fn with_config(mut self, config: SlaConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed or validated.
    pub fn with_config_file(self, path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let config = SlaConfig::from_json_file(path)
            .with_context(|| format!("building engine from {}", path.display()))?;
        Ok(self.with_config(config))
    }

    /// Create the engine and apply the configuration, if any.
    ///
    /// # Errors
    ///
    /// Propagates [`Engine::reload`] errors.
    pub fn build(self) -> Result<Engine, SlaError> {
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(ThreadSpawner::new()));
        let engine = Engine::new(self.collab, spawner);
        if let Some(config) = &self.config {
            let summary = engine.reload(config)?;
            tracing::debug!(?summary, "initial configuration applied");
        }
        Ok(engine)
    }
}
