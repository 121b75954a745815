//! Reusable entry point for running many programs with the same options

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::{launch, RunHandle, RunOptions};
use crate::config::Config;
use crate::errors::RunError;
use crate::instrument::instrument;

/// Starts independent runs; instrumented output is cached by source hash
#[derive(Default)]
pub struct Interpreter {
    options: RunOptions,
    cache: Mutex<HashMap<String, Arc<str>>>,
}

impl Interpreter {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(RunOptions::from_config(config))
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<str>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Instrumented text of `source`
    pub fn prepare(&self, source: &str) -> Result<Arc<str>, RunError> {
        let hash = hash_source(source);
        if let Some(text) = self.cache().get(&hash) {
            debug!(hash = %hash, "instrumentation cache hit");
            return Ok(text.clone());
        }

        let text: Arc<str> = Arc::from(instrument(source)?);
        self.cache().insert(hash, text.clone());
        Ok(text)
    }

    pub fn start(&self, source: &str) -> Result<RunHandle, RunError> {
        self.start_with(source, self.options.clone())
    }

    pub fn start_with(&self, source: &str, options: RunOptions) -> Result<RunHandle, RunError> {
        let text = self.prepare(source)?;
        launch(text.to_string(), options)
    }

    /// Start a run and wait for it to finish
    pub async fn run(&self, source: &str) -> Result<(), RunError> {
        let handle = self.start(source)?;
        handle.completion().await
    }

    pub fn cached(&self) -> usize {
        self.cache().len()
    }
}

/// Hash program source using SHA256
fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}
