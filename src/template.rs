//! Stack templates
//!
//! A template is a TOML or JSON document:
//!
//! ```toml
//! name = "demo"
//!
//! [parameters]
//! greeting = "hello"
//!
//! [resources.secret]
//! type = "Local::RandomString"
//! properties = { length = 16 }
//!
//! [resources.config]
//! type = "Local::File"
//! depends_on = ["secret"]
//! hooks = ["pre-create"]
//! properties.path = "/tmp/demo/config"
//! properties.content = { "Fn::Join" = ["=", [{ get_param = "greeting" }, { get_attr = ["secret", "value"] }]] }
//! ```
//!
//! Property and metadata values may contain intrinsic functions, resolved
//! just before a resource is created or updated:
//!
//! - `Ref` / `get_resource`: a parameter value, or a resource's physical id
//! - `get_param`: a parameter value
//! - `get_attr` / `Fn::GetAtt`: a resource attribute (`[name, attr]` or `"name.attr"`)
//! - `Fn::Join`: `[delimiter, [values...]]`

use anyhow::{Context, Result};
use lifecycle::{Breakpoints, PropertyMap, ResourceDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while resolving intrinsic functions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown parameter \"{0}\"")]
    UnknownParameter(String),

    #[error("Invalid arguments to {function}: {message}")]
    InvalidArguments { function: String, message: String },
}

// ============================================================================
// Template Document
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Template {
    /// Stack name; defaults to the file stem
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,

    #[serde(default)]
    pub resources: BTreeMap<String, TemplateResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateResource {
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub properties: PropertyMap,

    #[serde(default)]
    pub metadata: PropertyMap,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Breakpoints, e.g. `["pre-create"]`
    #[serde(default)]
    pub hooks: Vec<String>,
}

impl Template {
    /// Load a template, picking the format from the extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read template {}", path.display()))?;
        let mut template: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON template: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML template: {}", path.display()))?
        };

        if template.name.is_none() {
            template.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        log::debug!(
            "Loaded template {} with {} resources",
            path.display(),
            template.resources.len()
        );
        Ok(template)
    }

    pub fn stack_name(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }

    /// Override parameters from `key=value` pairs. Values that parse as
    /// JSON are taken as such, anything else as a string.
    pub fn set_parameters(&mut self, overrides: &[String]) -> Result<()> {
        for pair in overrides {
            let (key, raw) = pair
                .split_once('=')
                .with_context(|| format!("Invalid parameter \"{pair}\", expected key=value"))?;
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            self.parameters.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Unresolved definitions in name order
    pub fn definitions(&self) -> Vec<ResourceDefinition> {
        self.resources
            .iter()
            .map(|(name, resource)| ResourceDefinition {
                name: name.clone(),
                resource_type: resource.resource_type.clone(),
                properties: resource.properties.clone(),
                metadata: resource.metadata.clone(),
                depends_on: resource.depends_on.clone(),
            })
            .collect()
    }

    pub fn breakpoints(&self, name: &str) -> Result<Breakpoints> {
        let hooks = self
            .resources
            .get(name)
            .map(|r| r.hooks.as_slice())
            .unwrap_or_default();
        Breakpoints::parse(hooks).with_context(|| format!("Invalid hooks on resource {name}"))
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Values intrinsic functions resolve against
#[derive(Debug, Default)]
pub struct Lookup {
    pub parameters: BTreeMap<String, Value>,
    /// Physical ids of resources that exist so far
    pub physical_ids: BTreeMap<String, Option<String>>,
    /// Attribute values fetched ahead of resolution
    pub attributes: BTreeMap<(String, String), Value>,
    /// Stand in `<name>` / `<name.attr>` for anything not known yet
    pub placeholders: bool,
}

impl Lookup {
    pub fn new(parameters: &BTreeMap<String, Value>) -> Self {
        Self {
            parameters: parameters.clone(),
            ..Default::default()
        }
    }

    pub fn with_placeholders(mut self) -> Self {
        self.placeholders = true;
        self
    }

    fn resource(&self, name: &str) -> Value {
        match self.physical_ids.get(name) {
            Some(Some(id)) => Value::String(id.clone()),
            _ if self.placeholders => Value::String(format!("<{name}>")),
            _ => Value::Null,
        }
    }

    fn attribute(&self, name: &str, attribute: &str) -> Value {
        match self.attributes.get(&(name.to_string(), attribute.to_string())) {
            Some(value) => value.clone(),
            None if self.placeholders => Value::String(format!("<{name}.{attribute}>")),
            None => Value::Null,
        }
    }
}

/// Split `get_attr` arguments into (resource, attribute)
fn attribute_args(arg: &Value) -> Option<(String, String)> {
    match arg {
        Value::Array(items) if items.len() >= 2 => Some((
            items[0].as_str()?.to_string(),
            items[1].as_str()?.to_string(),
        )),
        Value::String(dotted) => dotted
            .split_once('.')
            .map(|(name, attr)| (name.to_string(), attr.to_string())),
        _ => None,
    }
}

/// Every (resource, attribute) pair `value` reads
pub fn attribute_refs(value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if map.len() == 1 => {
            for (key, arg) in map {
                if matches!(key.as_str(), "get_attr" | "Fn::GetAtt") {
                    out.extend(attribute_args(arg));
                } else {
                    attribute_refs(arg, out);
                }
            }
        }
        Value::Object(map) => map.values().for_each(|v| attribute_refs(v, out)),
        Value::Array(items) => items.iter().for_each(|v| attribute_refs(v, out)),
        _ => {}
    }
}

/// Resolve every intrinsic function in `value`
pub fn resolve(value: &Value, lookup: &Lookup) -> Result<Value, TemplateError> {
    match value {
        Value::Object(map) if map.len() == 1 => {
            let Some((key, arg)) = map.iter().next() else {
                return Ok(value.clone());
            };
            match key.as_str() {
                "Ref" | "get_resource" => {
                    let name = arg.as_str().ok_or_else(|| invalid(key, "expected a name"))?;
                    Ok(match lookup.parameters.get(name) {
                        Some(param) => param.clone(),
                        None => lookup.resource(name),
                    })
                }
                "get_param" => {
                    let name = arg.as_str().ok_or_else(|| invalid(key, "expected a name"))?;
                    lookup
                        .parameters
                        .get(name)
                        .cloned()
                        .ok_or_else(|| TemplateError::UnknownParameter(name.to_string()))
                }
                "get_attr" | "Fn::GetAtt" => {
                    let (name, attribute) = attribute_args(arg)
                        .ok_or_else(|| invalid(key, "expected [resource, attribute]"))?;
                    Ok(lookup.attribute(&name, &attribute))
                }
                "Fn::Join" => join(arg, lookup),
                _ => Ok(Value::Object(
                    [(key.clone(), resolve(arg, lookup)?)].into_iter().collect(),
                )),
            }
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, child) in map {
                out.insert(key.clone(), resolve(child, lookup)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Ok(value.clone()),
    }
}

/// Resolve a whole property or metadata map
pub fn resolve_map(map: &PropertyMap, lookup: &Lookup) -> Result<PropertyMap, TemplateError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), resolve(value, lookup)?)))
        .collect()
}

fn join(arg: &Value, lookup: &Lookup) -> Result<Value, TemplateError> {
    let function = "Fn::Join";
    let Some([delimiter, items]) = arg.as_array().map(Vec::as_slice) else {
        return Err(invalid(function, "expected [delimiter, [values]]"));
    };
    let delimiter = delimiter
        .as_str()
        .ok_or_else(|| invalid(function, "delimiter must be a string"))?;
    let Value::Array(items) = resolve(items, lookup)? else {
        return Err(invalid(function, "values must be a list"));
    };

    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => parts.push(s),
            Value::Number(n) => parts.push(n.to_string()),
            Value::Bool(b) => parts.push(b.to_string()),
            Value::Null => parts.push(String::new()),
            _ => return Err(invalid(function, "values must be strings")),
        }
    }
    Ok(Value::String(parts.join(delimiter)))
}

fn invalid(function: &str, message: &str) -> TemplateError {
    TemplateError::InvalidArguments {
        function: function.to_string(),
        message: message.to_string(),
    }
}
