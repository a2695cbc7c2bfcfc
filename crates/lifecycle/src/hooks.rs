//! Pre-action breakpoints
//!
//! A hook is a pause point before CREATE or UPDATE. When a resource has a
//! breakpoint configured, the state machine sets the flag in the resource's
//! `resource_data` (`{"pre-create": "True"}`), persists it, and waits until
//! someone clears it, usually with `signal({"unset_hook": "pre-create"})`.

use crate::error::{Error, Result};
use crate::types::{Action, ResourceData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

const HOOK_SET: &str = "True";

/// Supported hook names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hook {
    PreCreate,
    PreUpdate,
}

impl Hook {
    pub const ALL: [Self; 2] = [Self::PreCreate, Self::PreUpdate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCreate => "pre-create",
            Self::PreUpdate => "pre-update",
        }
    }

    /// The action this hook pauses
    pub fn action(&self) -> Action {
        match self {
            Self::PreCreate => Action::Create,
            Self::PreUpdate => Action::Update,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Hook {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| Error::InvalidHook {
                message: format!("Invalid hook type \"{s}\""),
            })
    }
}

/// Whether the flag for `hook` is set
pub fn has_hook(data: &ResourceData, hook: Hook) -> bool {
    data.get(hook.as_str()).is_some_and(|v| v == HOOK_SET)
}

pub fn trigger_hook(data: &mut ResourceData, hook: Hook) {
    data.insert(hook.as_str().to_string(), HOOK_SET.to_string());
}

pub fn clear_hook(data: &mut ResourceData, hook: Hook) {
    data.remove(hook.as_str());
}

/// Hooks configured for a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Breakpoints(BTreeSet<Hook>);

impl Breakpoints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Hook) -> Self {
        self.0.insert(hook);
        self
    }

    /// Parse hook names, e.g. from a template's `hooks = ["pre-create"]`
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<BTreeSet<Hook>>>()
            .map(Self)
    }

    pub fn matches(&self, hook: Hook) -> bool {
        self.0.contains(&hook)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Poll `reload` every `interval` until the flag for `hook` is gone.
///
/// `reload` returns the persisted `resource_data`; errors end the wait.
pub async fn wait_until_cleared<F, Fut>(hook: Hook, interval: Duration, mut reload: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ResourceData>>,
{
    loop {
        let data = reload().await?;
        if !has_hook(&data, hook) {
            log::debug!("Hook {hook} cleared");
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }
}
