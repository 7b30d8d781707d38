//! OS thread spawner implementation.

use std::thread::{self, JoinHandle};

use crate::core::{Job, SlaError, Spawn};

/// Spawner that runs every job on a dedicated, named OS thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadSpawner {
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    /// Create a spawner using the platform's default stack size.
    #[must_use]
    pub const fn new() -> Self {
        Self { stack_size: None }
    }

    /// Create a spawner whose threads get `bytes` of stack.
    #[must_use]
    pub const fn with_stack_size(bytes: usize) -> Self {
        Self {
            stack_size: Some(bytes),
        }
    }
}

impl Spawn for ThreadSpawner {
    fn spawn(&self, name: &str, job: Job) -> Result<JoinHandle<()>, SlaError> {
        let mut builder = thread::Builder::new().name(name.to_owned());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        builder
            .spawn(job)
            .map_err(|e| SlaError::Spawn(format!("{name}: {e}")))
    }
}
