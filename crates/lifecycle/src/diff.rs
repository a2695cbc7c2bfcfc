//! Diff computation for resource definitions
//!
//! Two levels: [`diff_template`] compares whole sections of a definition
//! (`Properties`, `Metadata`), and [`diff_properties`] classifies each
//! property change as in-place, replacement-required or forbidden.

use crate::error::{Error, Result};
use crate::schema::PropertiesSchema;
use crate::types::{PropertyMap, ResourceDefinition};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// How a property change can be applied
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Apply these changes in place; an empty map means nothing to do
    InPlace(PropertyMap),
    /// At least one changed property is not update-allowed
    Replace,
}

/// Compare resolved property bags.
///
/// A key missing from `after` takes its schema default (null when none).
/// Changed immutable properties are reported together as `NotSupported`,
/// and take precedence over the replacement decision.
pub fn diff_properties(
    after: &PropertyMap,
    before: &PropertyMap,
    schema: &PropertiesSchema,
    resource: &str,
    resource_type: &str,
) -> Result<Reconciliation> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    let mut changes = PropertyMap::new();
    let mut immutable = Vec::new();
    let mut replace = false;

    for key in keys {
        let prop = schema.get(key.as_str());
        let old = before.get(key).unwrap_or(&Value::Null);
        let new = match after.get(key) {
            Some(value) => value.clone(),
            None => prop.map(|p| p.default_or_null()).unwrap_or(Value::Null),
        };

        if *old == new {
            continue;
        }

        if prop.is_some_and(|p| p.immutable) {
            immutable.push(key.as_str());
        } else if prop.is_some_and(|p| p.update_allowed) {
            changes.insert(key.clone(), new);
        } else {
            replace = true;
        }
    }

    if !immutable.is_empty() {
        return Err(Error::NotSupported {
            feature: format!(
                "Update to properties {} of {resource} ({resource_type})",
                immutable.join(", ")
            ),
        });
    }

    if replace {
        Ok(Reconciliation::Replace)
    } else {
        Ok(Reconciliation::InPlace(changes))
    }
}

/// Change to one section of a definition
#[derive(Debug, Clone, PartialEq)]
pub enum SectionChange {
    Changed(PropertyMap),
    Removed,
}

impl SectionChange {
    fn to_value(&self) -> Value {
        match self {
            Self::Changed(map) => Value::Object(map.clone().into_iter().collect()),
            Self::Removed => Value::Null,
        }
    }
}

/// Section-level difference between two definitions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateDiff {
    pub properties: Option<SectionChange>,
    pub metadata: Option<SectionChange>,
}

impl TemplateDiff {
    pub fn is_empty(&self) -> bool {
        self.properties.is_none() && self.metadata.is_none()
    }

    /// Render as `{"Properties": {...}, "Metadata": null}`, omitting unchanged sections
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        if let Some(change) = &self.properties {
            out.insert("Properties".into(), change.to_value());
        }
        if let Some(change) = &self.metadata {
            out.insert("Metadata".into(), change.to_value());
        }
        Value::Object(out)
    }
}

/// Compare the `Properties` and `Metadata` sections of two definitions.
pub fn diff_template(after: &ResourceDefinition, before: &ResourceDefinition) -> TemplateDiff {
    TemplateDiff {
        properties: diff_section(&after.properties, &before.properties),
        metadata: diff_section(&after.metadata, &before.metadata),
    }
}

fn diff_section(after: &PropertyMap, before: &PropertyMap) -> Option<SectionChange> {
    if after == before {
        None
    } else if after.is_empty() {
        Some(SectionChange::Removed)
    } else {
        Some(SectionChange::Changed(after.clone()))
    }
}

/// What an apply would do to one resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceChange {
    Create,
    Update(PropertyMap),
    Replace,
    Delete,
    NoChange,
}

impl ResourceChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    pub creations: usize,
    pub updates: usize,
    pub replacements: usize,
    pub deletions: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    /// Create a summary from a list of planned changes
    pub fn from_changes<'a>(changes: impl IntoIterator<Item = &'a ResourceChange>) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change {
                ResourceChange::Create => summary.creations += 1,
                ResourceChange::Update(_) => summary.updates += 1,
                ResourceChange::Replace => summary.replacements += 1,
                ResourceChange::Delete => summary.deletions += 1,
                ResourceChange::NoChange => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creations + self.updates + self.replacements + self.deletions
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
