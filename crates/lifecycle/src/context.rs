//! Handler context and event sinks
//!
//! Handlers only see a [`HandlerContext`]: the resolved properties plus the
//! parts of the record they are allowed to touch. Events are reported
//! through an [`EventSink`] so the engine does not depend on any particular
//! UI or audit backend.

use crate::types::{Action, PropertyMap, ResourceData, Status};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;

/// Mutable view of a resource handed to provider handlers
pub struct HandlerContext<'a> {
    /// Resource name within the stack
    pub name: &'a str,
    /// Registered type name
    pub resource_type: &'a str,
    /// Owning stack name
    pub stack_name: &'a str,
    /// Validated, resolved properties for the current action
    pub properties: &'a PropertyMap,
    physical_id: &'a mut Option<String>,
    data: &'a mut ResourceData,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        name: &'a str,
        resource_type: &'a str,
        stack_name: &'a str,
        properties: &'a PropertyMap,
        physical_id: &'a mut Option<String>,
        data: &'a mut ResourceData,
    ) -> Self {
        Self {
            name,
            resource_type,
            stack_name,
            properties,
            physical_id,
            data,
        }
    }

    /// Provider-side identifier, if one has been assigned
    pub fn physical_id(&self) -> Option<&str> {
        self.physical_id.as_deref()
    }

    /// Record the provider-side identifier
    pub fn set_physical_id(&mut self, id: impl Into<String>) {
        *self.physical_id = Some(id.into());
    }

    pub fn clear_physical_id(&mut self) {
        *self.physical_id = None;
    }

    /// Property value as a string, if present and a string
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn data_get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn data_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn data_delete(&mut self, key: &str) {
        self.data.remove(key);
    }
}

/// A recorded lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub resource: String,
    pub physical_id: Option<String>,
    pub action: Action,
    pub status: Status,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Receiver for lifecycle events
///
/// Implement this trait to feed an audit log, a UI, or a test collector.
pub trait EventSink: Send + Sync {
    /// Called for every transition, guard violation and signal
    fn record(&self, event: &Event);
}

/// Event sink that drops everything
pub struct NoEvents;

impl EventSink for NoEvents {
    fn record(&self, _event: &Event) {}
}

/// Event sink that writes events to the log
pub struct LogEvents;

impl EventSink for LogEvents {
    fn record(&self, event: &Event) {
        if event.status == Status::Failed {
            log::warn!(
                "{} {}_{}: {}",
                event.resource,
                event.action,
                event.status,
                event.reason
            );
        } else {
            log::info!(
                "{} {}_{}: {}",
                event.resource,
                event.action,
                event.status,
                event.reason
            );
        }
    }
}

/// Event sink that keeps events in memory
#[derive(Default)]
pub struct MemoryEvents {
    events: Mutex<Vec<Event>>,
}

impl MemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// (action, status, reason) triples, handy for assertions
    pub fn triples(&self) -> Vec<(Action, Status, String)> {
        self.events()
            .into_iter()
            .map(|e| (e.action, e.status, e.reason))
            .collect()
    }
}

impl EventSink for MemoryEvents {
    fn record(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
