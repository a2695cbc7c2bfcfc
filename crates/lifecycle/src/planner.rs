//! Dependency planner - builds the resource graph from references
//!
//! Every `Ref`, `get_resource`, `Fn::GetAtt` and `get_attr` node found in a
//! resource's properties or metadata, at any depth, is an edge from that
//! resource to the one it names. Explicit `depends_on` entries add edges too.
//! References to template parameters are not edges.

use crate::error::{Error, Result};
use crate::types::ResourceDefinition;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Graph
// ============================================================================

/// Directed dependency graph, `requirer -> required`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no edges (no-op if present)
    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
    }

    /// Record that `requirer` needs `required` to exist first
    pub fn add_edge(&mut self, requirer: &str, required: &str) {
        self.add_node(required);
        self.edges
            .entry(requirer.to_string())
            .or_default()
            .insert(required.to_string());
    }

    /// Resources `name` depends on
    pub fn requires(&self, name: &str) -> Vec<&str> {
        self.edges
            .get(name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Resources that depend on `name`
    pub fn required_by(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Creation order: every resource after everything it requires.
    ///
    /// Ties are broken by name so the order is stable.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut pending: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();
        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(name) = ready.pop_first() {
            pending.remove(name);
            order.push(name.to_string());
            for dependent in self.required_by(name) {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if pending.is_empty() {
            Ok(order)
        } else {
            let cycle: Vec<&str> = pending.keys().copied().collect();
            Err(Error::CircularDependency {
                cycle: cycle.join(", "),
            })
        }
    }

    /// Deletion order: dependents before what they depend on
    pub fn reverse_order(&self) -> Result<Vec<String>> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }
}

// ============================================================================
// Reference Extraction
// ============================================================================

/// Names a definition may refer to
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    pub resources: BTreeSet<String>,
    pub parameters: BTreeSet<String>,
}

impl TemplateIndex {
    pub fn new<'a>(
        resources: impl IntoIterator<Item = &'a str>,
        parameters: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            resources: resources.into_iter().map(ToString::to_string).collect(),
            parameters: parameters.into_iter().map(ToString::to_string).collect(),
        }
    }
}

/// How a value refers to another resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `Ref` / `get_resource`: the physical id
    Resource,
    /// `Fn::GetAtt` / `get_attr`: an output attribute
    Attribute,
}

/// A reference found while walking a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub kind: ReferenceKind,
    /// Where it was found, e.g. `bar.Properties.Foo.Fn::Join[1][3]`
    pub path: String,
}

/// Name a single reference node points at, if `value` is one
pub fn reference_target(value: &Value) -> Option<(ReferenceKind, &str)> {
    let Value::Object(map) = value else {
        return None;
    };
    if map.len() != 1 {
        return None;
    }
    let (key, arg) = map.iter().next()?;
    match key.as_str() {
        "Ref" | "get_resource" => arg.as_str().map(|n| (ReferenceKind::Resource, n)),
        "Fn::GetAtt" | "get_attr" => {
            let name = match arg {
                Value::Array(items) => items.first().and_then(Value::as_str),
                Value::String(dotted) => dotted.split('.').next(),
                _ => None,
            };
            name.map(|n| (ReferenceKind::Attribute, n))
        }
        _ => None,
    }
}

/// Collect every reference node under `value`
pub fn collect_references(value: &Value, path: &str, out: &mut Vec<Reference>) {
    if let Some((kind, name)) = reference_target(value) {
        out.push(Reference {
            name: name.to_string(),
            kind,
            path: path.to_string(),
        });
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_references(child, &format!("{path}.{key}"), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_references(child, &format!("{path}[{i}]"), out);
            }
        }
        _ => {}
    }
}

/// Add the edges contributed by `definition` to `graph`.
///
/// Fails with `InvalidTemplateReference` on the first dangling name.
pub fn add_dependencies(
    definition: &ResourceDefinition,
    index: &TemplateIndex,
    graph: &mut Dependencies,
) -> Result<()> {
    let name = definition.name.as_str();
    graph.add_node(name);

    let mut references = Vec::new();
    for (key, value) in &definition.properties {
        collect_references(value, &format!("{name}.Properties.{key}"), &mut references);
    }
    for (key, value) in &definition.metadata {
        collect_references(value, &format!("{name}.Metadata.{key}"), &mut references);
    }

    for reference in references {
        if reference.kind == ReferenceKind::Resource && index.parameters.contains(&reference.name)
        {
            continue;
        }
        if !index.resources.contains(&reference.name) {
            return Err(Error::InvalidTemplateReference {
                name: reference.name,
                path: reference.path,
            });
        }
        graph.add_edge(name, &reference.name);
    }

    for required in &definition.depends_on {
        if !index.resources.contains(required) {
            return Err(Error::InvalidTemplateReference {
                name: required.clone(),
                path: name.to_string(),
            });
        }
        graph.add_edge(name, required);
    }

    Ok(())
}

/// Graph for a whole set of definitions
pub fn build_dependencies<'a>(
    definitions: impl IntoIterator<Item = &'a ResourceDefinition> + Clone,
    parameters: impl IntoIterator<Item = &'a str>,
) -> Result<Dependencies> {
    let index = TemplateIndex::new(
        definitions.clone().into_iter().map(|d| d.name.as_str()),
        parameters,
    );
    let mut graph = Dependencies::new();
    for definition in definitions {
        add_dependencies(definition, &index, &mut graph)?;
    }
    Ok(graph)
}
