//! # Lifecycle
//!
//! A resource lifecycle engine for declarative infrastructure stacks.
//!
//! Each resource in a stack is a small state machine. It validates its
//! properties against the schema of its registered type, diffs a new
//! definition against the last applied one, and then creates, updates in
//! place, requests replacement, deletes, suspends, resumes, checks or adopts
//! the provider-side object through the type's handler.
//!
//! ## Core Concepts
//!
//! - **ResourceType**: A registered type: property/attribute schemas plus a handler
//! - **ResourceHandler**: The provider side (create, update, delete, ...)
//! - **Resource**: One instance, persisted as a [`ResourceRecord`]
//! - **State**: The `(action, status)` pair, e.g. `(CREATE, COMPLETE)`
//! - **Dependencies**: The graph built from references between resources
//!
//! ## Example
//!
//! ```ignore
//! use lifecycle::{
//!     Engine, GenericHandler, MemoryStore, Resource, ResourceDefinition,
//!     ResourceType, StackContext, TypeRegistry,
//! };
//! use std::sync::Arc;
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(ResourceType::new("Generic", Arc::new(GenericHandler)));
//! let engine = Engine::new(Arc::new(registry), Arc::new(MemoryStore::new()));
//!
//! let definition = ResourceDefinition::new("web", "Generic");
//! let stack = StackContext::new("demo").with_id("demo-1");
//! let mut resource = Resource::new(definition, stack, engine).await?;
//! resource.create().await?;
//! ```
//!
//! ## Injection Points
//!
//! The engine takes its collaborators as trait objects:
//!
//! - [`ResourceStore`]: Where records are persisted
//! - [`EventSink`]: Receives every transition and guard violation
//! - [`BackoffStrategy`]: Delay between retries
//! - [`RetryCallback`]: Receives retry notifications
//!
//! so the scheduler, persistence and UI live outside this crate.

pub mod config;
pub mod context;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handler;
pub mod hooks;
pub mod naming;
pub mod planner;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use config::EngineConfig;
pub use context::{Event, EventSink, HandlerContext, LogEvents, MemoryEvents, NoEvents};
pub use diff::{
    DiffSummary, Reconciliation, ResourceChange, SectionChange, TemplateDiff, diff_properties,
    diff_template,
};
pub use engine::Engine;
pub use error::{Error, ErrorCategory, ResourceFailure, Result};
pub use handler::{Capabilities, GenericHandler, Operation, ResourceHandler};
pub use hooks::{Breakpoints, Hook};
pub use planner::{Dependencies, build_dependencies};
pub use registry::{ResourceType, TypeRegistry};
pub use resource::Resource;
pub use retry::{
    BackoffStrategy, ExponentialBackoff, FixedDelay, LogCallback, NoCallback, NoDelay,
    RetryCallback, RetryPolicy,
};
pub use schema::{
    AttributeSchema, AttributeType, AttributesSchema, Constraint, PropertiesSchema,
    PropertySchema, PropertyType,
};
pub use store::{MemoryStore, ResourceStore, StoreError};
pub use types::{
    AbandonData, Action, AdoptData, PropertyMap, ResourceData, ResourceDefinition,
    ResourceRecord, StackContext, State, Status, UpdateOutcome, UpdateReplace,
};
