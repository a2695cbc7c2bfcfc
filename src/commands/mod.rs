// Stack lifecycle
pub mod apply;
pub mod validate;

// Single-resource operations
pub mod resource;
pub mod status;

// Utilities
pub mod shorten;

use anyhow::{Context as _, Result, bail};
use lifecycle::retry::Phase;
use lifecycle::{Engine, EngineConfig, Error, LogCallback, Resource, ResourceStore, RetryCallback, StackContext};
use std::sync::Arc;

use crate::Context;
use crate::state::FileStore;
use crate::ui::{self, ConsoleEvents};
use crate::{config, paths};

/// Engine and store for one command invocation
pub struct Session {
    pub engine: Engine,
    pub store: Arc<FileStore>,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let mut engine_config = config::load(ctx.config.as_deref())?;
        if let Some(limit) = ctx.retry_limit {
            engine_config = engine_config.with_retry_limit(limit);
        }

        let state_dir = match &ctx.state_dir {
            Some(dir) => dir.clone(),
            None => paths::state_dir()?,
        };
        let store = Arc::new(FileStore::open(&state_dir)?);
        log::debug!("Using store {}", store.path().display());
        Ok(Self::new(store, engine_config, ctx.quiet))
    }

    pub fn new(store: Arc<FileStore>, engine_config: EngineConfig, quiet: bool) -> Self {
        let engine = Engine::new(Arc::new(crate::resource::registry()), store.clone())
            .with_config(engine_config)
            .with_events(Arc::new(ConsoleEvents::new(quiet)))
            .with_retry_callback(Arc::new(ConsoleRetries { quiet }));
        Self { engine, store }
    }

    /// Stacks are keyed by name
    pub fn stack(&self, name: &str) -> StackContext {
        StackContext::new(name).with_id(name)
    }

    /// Latest stored instance of `name` in `stack`
    pub async fn load(&self, stack: &str, name: &str) -> Result<Resource> {
        let record = self
            .store
            .get_by_name_and_stack(name, stack)
            .await?
            .with_context(|| format!("No resource \"{name}\" in stack \"{stack}\""))?;
        let Some(id) = record.id else {
            bail!("Record for {name} has no id");
        };
        Ok(Resource::load(id, self.stack(stack), self.engine.clone()).await?)
    }
}

/// Reports retries on the console as well as in the log
struct ConsoleRetries {
    quiet: bool,
}

impl RetryCallback for ConsoleRetries {
    fn on_retry(&self, phase: Phase, failures: u32, retry_limit: u32, error: &Error) {
        LogCallback.on_retry(phase, failures, retry_limit, error);
        if !self.quiet {
            ui::dim(&retry_line(phase, failures, retry_limit, error));
        }
    }
}

fn retry_line(phase: Phase, failures: u32, retry_limit: u32, error: &Error) -> String {
    format!(
        "{phase} attempt {failures}/{} failed, retrying ({}): {error}",
        retry_limit + 1,
        error.category().description()
    )
}

/// Ask before doing something destructive, unless `yes`
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}
