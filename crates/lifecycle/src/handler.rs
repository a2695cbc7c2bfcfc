//! Provider handler capability set
//!
//! A [`ResourceHandler`] performs the provider-side effects of each
//! lifecycle action for one resource type. Every method has a default, and
//! [`ResourceHandler::capabilities`] tells the state machine which ones the
//! type really implements. The distinction matters for three operations:
//!
//! - no update handler means any property change requires replacement
//! - no check handler completes CHECK as "not supported"
//! - no signal handler rejects every payload except hook clearing
//!
//! Missing create/delete/suspend/resume handlers are simply skipped.

use crate::context::HandlerContext;
use crate::diff::TemplateDiff;
use crate::error::Result;
use crate::types::{Action, PropertyMap, ResourceDefinition};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Handler operations a type may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Suspend,
    Resume,
    Check,
    Signal,
}

impl Operation {
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Check => "check",
            Self::Signal => "signal",
        };
        f.write_str(name)
    }
}

/// Set of operations a handler implements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    bits: u8,
}

impl Capabilities {
    pub const fn none() -> Self {
        Self { bits: 0 }
    }

    /// Create, update, delete, suspend and resume; the usual CRUD set
    pub const fn lifecycle() -> Self {
        Self::none()
            .with(Operation::Create)
            .with(Operation::Update)
            .with(Operation::Delete)
            .with(Operation::Suspend)
            .with(Operation::Resume)
    }

    pub const fn with(self, op: Operation) -> Self {
        Self {
            bits: self.bits | op.bit(),
        }
    }

    pub const fn without(self, op: Operation) -> Self {
        Self {
            bits: self.bits & !op.bit(),
        }
    }

    pub const fn contains(&self, op: Operation) -> bool {
        self.bits & op.bit() != 0
    }
}

/// Provider-side behaviour of a resource type
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Operations this handler actually implements
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    async fn handle_create(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Apply `property_diff` in place. Returning `Error::Replace` hands the
    /// resource back to the scheduler for replacement.
    async fn handle_update(
        &self,
        _ctx: &mut HandlerContext<'_>,
        _new_definition: &ResourceDefinition,
        _template_diff: &TemplateDiff,
        _property_diff: &PropertyMap,
    ) -> Result<()> {
        Ok(())
    }

    async fn handle_delete(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn handle_suspend(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn handle_resume(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn handle_check(&self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn handle_signal(
        &self,
        _ctx: &mut HandlerContext<'_>,
        _details: Option<&Value>,
    ) -> Result<()> {
        Ok(())
    }

    /// Poll whether the provider finished `action`. Called after the
    /// handler returns, until it yields `true`.
    async fn check_complete(&self, _action: Action, _ctx: &mut HandlerContext<'_>) -> Result<bool> {
        Ok(true)
    }

    /// Resolve an output attribute from provider state
    async fn resolve_attribute(&self, _ctx: &HandlerContext<'_>, _name: &str) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Handler with no provider side at all. Implements the lifecycle set as
/// no-ops, so updates are applied in place and never force replacement.
pub struct GenericHandler;

#[async_trait]
impl ResourceHandler for GenericHandler {
    fn capabilities(&self) -> Capabilities {
        Capabilities::lifecycle()
    }
}

/// Check a set of `(key, expected, actual)` conditions and aggregate every
/// mismatch into one error, e.g. `'foo1': expected 'bar1', got 'baz1'`.
pub fn verify_check_conditions(checks: &[CheckCondition]) -> Result<()> {
    let failures: Vec<String> = checks
        .iter()
        .filter(|c| !c.expected.accepts(&c.actual))
        .map(|c| format!("'{}': expected '{}', got '{}'", c.key, c.expected, c.actual))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(crate::error::Error::provider(failures.join("\n")))
    }
}

/// Expected value of a check condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    One(String),
    AnyOf(Vec<String>),
}

impl Expected {
    fn accepts(&self, actual: &str) -> bool {
        match self {
            Self::One(v) => v == actual,
            Self::AnyOf(values) => values.iter().any(|v| v == actual),
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(v) => f.write_str(v),
            Self::AnyOf(values) => {
                let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
                write!(f, "[{}]", quoted.join(", "))
            }
        }
    }
}

/// One condition verified by a check handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckCondition {
    pub key: String,
    pub expected: Expected,
    pub actual: String,
}

impl CheckCondition {
    pub fn new(key: impl Into<String>, expected: Expected, actual: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expected,
            actual: actual.into(),
        }
    }
}
