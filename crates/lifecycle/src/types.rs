//! Core types for resource lifecycle management

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Resolved property bag, keyed by property name
pub type PropertyMap = BTreeMap<String, Value>;

/// Auxiliary string side-store attached to a resource (hook flags etc.)
pub type ResourceData = BTreeMap<String, String>;

/// Lifecycle action a resource is performing or last performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Init,
    Create,
    Update,
    Delete,
    Suspend,
    Resume,
    Adopt,
    Check,
    Snapshot,
    Rollback,
}

impl Action {
    pub const ALL: [Self; 10] = [
        Self::Init,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Suspend,
        Self::Resume,
        Self::Adopt,
        Self::Check,
        Self::Snapshot,
        Self::Rollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Suspend => "SUSPEND",
            Self::Resume => "RESUME",
            Self::Adopt => "ADOPT",
            Self::Check => "CHECK",
            Self::Snapshot => "SNAPSHOT",
            Self::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::InvalidState {
                message: format!("Invalid action {s}"),
            })
    }
}

/// Progress of the current action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    InProgress,
    Complete,
    Failed,
}

impl Status {
    pub const ALL: [Self; 3] = [Self::InProgress, Self::Complete, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| Error::InvalidState {
                message: format!("Invalid status {s}"),
            })
    }
}

/// The (action, status) pair that fully describes where a resource is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub action: Action,
    pub status: Status,
}

impl State {
    /// State of a freshly constructed resource
    pub const INITIAL: Self = Self::new(Action::Init, Status::Complete);

    pub const fn new(action: Action, status: Status) -> Self {
        Self { action, status }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == Status::InProgress
    }
}

impl Default for State {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.action, self.status)
    }
}

/// A resource as declared in a template, after the template layer is done
/// with it. Property values may still contain reference nodes
/// (`{"get_resource": "foo"}`) until a resolver has run over them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub metadata: PropertyMap,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceDefinition {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_metadata(mut self, metadata: PropertyMap) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(ToString::to_string).collect();
        self
    }
}

/// Identity and state of the stack that owns a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackContext {
    pub name: String,
    /// `None` until the stack itself has been stored
    pub id: Option<String>,
    pub state: State,
}

impl StackContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            state: State::INITIAL,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_state(mut self, action: Action, status: Status) -> Self {
        self.state = State::new(action, status);
        self
    }

    pub fn is_stored(&self) -> bool {
        self.id.is_some()
    }
}

/// The persisted form of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Assigned by the store on first persist
    #[serde(default)]
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub stack_id: Option<String>,
    /// Provider-side identifier
    #[serde(default)]
    pub physical_id: Option<String>,
    pub action: Action,
    pub status: Status,
    #[serde(default)]
    pub status_reason: String,
    /// Last successfully applied property snapshot
    #[serde(default)]
    pub stored_properties_data: Option<PropertyMap>,
    #[serde(default)]
    pub metadata: PropertyMap,
    #[serde(default)]
    pub attributes: PropertyMap,
    #[serde(default)]
    pub resource_data: ResourceData,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_time: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    pub fn new(name: &str, resource_type: &str, stack_id: Option<&str>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            stack_id: stack_id.map(ToString::to_string),
            physical_id: None,
            action: Action::Init,
            status: Status::Complete,
            status_reason: String::new(),
            stored_properties_data: None,
            metadata: PropertyMap::new(),
            attributes: PropertyMap::new(),
            resource_data: ResourceData::new(),
            created_time: None,
            updated_time: None,
        }
    }

    pub fn state(&self) -> State {
        State::new(self.action, self.status)
    }

    pub fn is_stored(&self) -> bool {
        self.id.is_some()
    }
}

/// Export snapshot produced by `prepare_abandon`, and the shape accepted by
/// `adopt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbandonData {
    pub action: Action,
    pub status: Status,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub metadata: PropertyMap,
    #[serde(default)]
    pub resource_data: ResourceData,
}

/// Adoption input. Only the physical id is mandatory, and even that is
/// checked by `adopt` rather than by deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdoptData {
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub metadata: PropertyMap,
    #[serde(default)]
    pub resource_data: ResourceData,
}

impl From<AbandonData> for AdoptData {
    fn from(data: AbandonData) -> Self {
        Self {
            resource_id: data.resource_id,
            metadata: data.metadata,
            resource_data: data.resource_data,
        }
    }
}

/// Signal that a resource cannot be updated in place and must be replaced
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("The Resource {resource} requires replacement.")]
pub struct UpdateReplace {
    pub resource: String,
}

impl UpdateReplace {
    pub fn new(resource: Option<&str>) -> Self {
        Self {
            resource: resource
                .filter(|n| !n.is_empty())
                .unwrap_or("Unknown")
                .to_string(),
        }
    }
}

/// Result of a successful `update` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The resource now matches the new definition (possibly untouched)
    Completed,
    /// The scheduler must delete this instance and create a fresh one
    NeedsReplacement(UpdateReplace),
}

impl UpdateOutcome {
    pub fn needs_replacement(&self) -> bool {
        matches!(self, Self::NeedsReplacement(_))
    }
}
