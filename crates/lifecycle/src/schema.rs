//! Property and attribute schemas
//!
//! Each resource type declares its accepted properties as data: a
//! [`PropertySchema`] per key with a type tag, constraints, required/default
//! and the update-allowed/immutable annotations the differ relies on.
//! [`validate`] checks a raw property bag against that schema and returns the
//! resolved bag with defaults applied and values converted to their declared
//! types.

use crate::error::{Error, Result};
use crate::types::PropertyMap;
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Property schemas of a resource type, keyed by property name
pub type PropertiesSchema = BTreeMap<String, PropertySchema>;

/// Attribute schemas of a resource type, keyed by attribute name
pub type AttributesSchema = BTreeMap<String, AttributeSchema>;

/// Declared type of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
    List,
    Map,
}

/// Value constraint attached to a property
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Character count for strings, element count for lists and maps
    Length { min: Option<usize>, max: Option<usize> },
    /// Numeric bounds, inclusive
    Range { min: Option<f64>, max: Option<f64> },
    AllowedValues(Vec<Value>),
    /// Regular expression the whole string value must match
    AllowedPattern(String),
}

/// Schema for a single property
#[derive(Debug, Clone)]
pub struct PropertySchema {
    pub property_type: PropertyType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<Value>,
    /// Changes can be applied in place by the type's update handler
    pub update_allowed: bool,
    /// Changes are never allowed, not even through replacement
    pub immutable: bool,
    /// `false` means the property is declared but rejected when supplied
    pub implemented: bool,
    pub constraints: Vec<Constraint>,
    /// Schema applied to every element of a list
    pub items: Option<Box<PropertySchema>>,
    /// Schema applied to the keys of a map
    pub fields: Option<PropertiesSchema>,
}

impl PropertySchema {
    pub fn new(property_type: PropertyType) -> Self {
        Self {
            property_type,
            description: None,
            required: false,
            default: None,
            update_allowed: false,
            immutable: false,
            implemented: true,
            constraints: Vec::new(),
            items: None,
            fields: None,
        }
    }

    pub fn string() -> Self {
        Self::new(PropertyType::String)
    }

    pub fn integer() -> Self {
        Self::new(PropertyType::Integer)
    }

    pub fn number() -> Self {
        Self::new(PropertyType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(PropertyType::Boolean)
    }

    pub fn list() -> Self {
        Self::new(PropertyType::List)
    }

    pub fn map() -> Self {
        Self::new(PropertyType::Map)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn update_allowed(mut self) -> Self {
        self.update_allowed = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn not_implemented(mut self) -> Self {
        self.implemented = false;
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn items(mut self, schema: PropertySchema) -> Self {
        self.items = Some(Box::new(schema));
        self
    }

    pub fn fields(mut self, schema: PropertiesSchema) -> Self {
        self.fields = Some(schema);
        self
    }

    /// Default value, or JSON null when none is declared
    pub fn default_or_null(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

/// Names of properties that may change in place
pub fn update_allowed_set(schema: &PropertiesSchema) -> BTreeSet<String> {
    schema
        .iter()
        .filter(|(_, p)| p.update_allowed)
        .map(|(k, _)| k.clone())
        .collect()
}

/// Names of properties that may never change
pub fn immutable_set(schema: &PropertiesSchema) -> BTreeSet<String> {
    schema
        .iter()
        .filter(|(_, p)| p.immutable)
        .map(|(k, _)| k.clone())
        .collect()
}

// ============================================================================
// Validation
// ============================================================================

/// Validate `raw` against `schema`.
///
/// `path` prefixes error messages, e.g. `test_resource.Properties`. With
/// `strict` off, values are passed through without type conversion or
/// constraint checks; unknown and missing required properties are still
/// rejected.
pub fn validate(
    raw: &PropertyMap,
    schema: &PropertiesSchema,
    path: &str,
    strict: bool,
) -> Result<PropertyMap> {
    for key in raw.keys() {
        if !schema.contains_key(key) {
            return Err(property_error(path, format!("Unknown Property {key}")));
        }
    }

    let mut resolved = PropertyMap::new();
    for (key, prop) in schema {
        let value = raw.get(key).filter(|v| !v.is_null());

        match value {
            Some(_) if !prop.implemented => {
                return Err(property_error(
                    path,
                    format!("Property {key} not implemented yet"),
                ));
            }
            Some(value) => {
                let value = if strict {
                    convert(value, prop, &format!("{path}.{key}"), strict)?
                } else {
                    value.clone()
                };
                resolved.insert(key.clone(), value);
            }
            None if prop.required => {
                return Err(property_error(path, format!("Property {key} not assigned")));
            }
            None => {
                if let Some(default) = &prop.default {
                    resolved.insert(key.clone(), default.clone());
                }
            }
        }
    }

    Ok(resolved)
}

fn property_error(path: &str, message: String) -> Error {
    Error::PropertyValidation {
        path: path.to_string(),
        message,
    }
}

/// Convert a value to the declared type, then apply constraints
fn convert(value: &Value, prop: &PropertySchema, path: &str, strict: bool) -> Result<Value> {
    let converted = match prop.property_type {
        PropertyType::String => match value {
            Value::String(_) => value.clone(),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            _ => return Err(property_error(path, "Value must be a string".into())),
        },
        PropertyType::Integer => to_integer(value).ok_or_else(|| {
            property_error(
                path,
                format!("Value '{}' is not an integer", display_value(value)),
            )
        })?,
        PropertyType::Number => to_number(value).ok_or_else(|| {
            property_error(
                path,
                format!("Value '{}' is not a number", display_value(value)),
            )
        })?,
        PropertyType::Boolean => to_boolean(value).ok_or_else(|| {
            property_error(
                path,
                format!("\"{}\" is not a valid boolean", display_value(value)),
            )
        })?,
        PropertyType::List => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    match &prop.items {
                        Some(item_schema) => {
                            out.push(convert(item, item_schema, &item_path, strict)?);
                        }
                        None => out.push(item.clone()),
                    }
                }
                Value::Array(out)
            }
            _ => return Err(property_error(path, "Value must be a list".into())),
        },
        PropertyType::Map => match value {
            Value::Object(map) => match &prop.fields {
                Some(fields) => {
                    let nested: PropertyMap =
                        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    let resolved = validate(&nested, fields, path, strict)?;
                    Value::Object(resolved.into_iter().collect())
                }
                None => value.clone(),
            },
            _ => return Err(property_error(path, "Value must be a map".into())),
        },
    };

    for constraint in &prop.constraints {
        check_constraint(constraint, &converted, path)?;
    }

    Ok(converted)
}

fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn to_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(Value::from(i));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}

fn to_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn check_constraint(constraint: &Constraint, value: &Value, path: &str) -> Result<()> {
    match constraint {
        Constraint::Length { min, max } => {
            let length = match value {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(m) => m.len(),
                _ => return Ok(()),
            };
            if min.is_some_and(|m| length < m) || max.is_some_and(|m| length > m) {
                return Err(property_error(
                    path,
                    format!("length ({length}) is out of range {}", bounds(*min, *max)),
                ));
            }
        }
        Constraint::Range { min, max } => {
            if let Some(n) = value.as_f64()
                && (min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m))
            {
                return Err(property_error(
                    path,
                    format!("{} is out of range {}", display_value(value), bounds(*min, *max)),
                ));
            }
        }
        Constraint::AllowedValues(allowed) => {
            if !allowed.contains(value) {
                let listed = allowed
                    .iter()
                    .map(|v| format!("'{}'", display_value(v)))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(property_error(
                    path,
                    format!(
                        "\"{}\" is not an allowed value [{listed}]",
                        display_value(value)
                    ),
                ));
            }
        }
        Constraint::AllowedPattern(pattern) => {
            let Some(s) = value.as_str() else {
                return Ok(());
            };
            let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                property_error(path, format!("Invalid pattern \"{pattern}\": {e}"))
            })?;
            if !re.is_match(s) {
                return Err(property_error(
                    path,
                    format!("\"{s}\" does not match pattern \"{pattern}\""),
                ));
            }
        }
    }
    Ok(())
}

fn bounds<T: fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("(min: {min}, max: {max})"),
        (Some(min), None) => format!("(min: {min})"),
        (None, Some(max)) => format!("(max: {max})"),
        (None, None) => String::new(),
    }
}

/// Render a value the way it appears in messages: strings unquoted
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Schema Lint
// ============================================================================

/// Find properties that are both required and carry a default.
///
/// Such a declaration is ambiguous: the default can never apply. This is an
/// authoring check meant for tests over every registered type, not something
/// enforced when a type is registered.
pub fn lint_ambiguous_defaults(type_name: &str, schema: &PropertiesSchema) -> Vec<String> {
    let mut findings = Vec::new();
    for (name, prop) in schema {
        lint_property(type_name, name, prop, &mut findings);
    }
    findings
}

fn lint_property(type_name: &str, name: &str, prop: &PropertySchema, out: &mut Vec<String>) {
    if prop.implemented && prop.required && prop.default.is_some() {
        out.push(format!(
            "The definition of the property '{name}' in resource '{type_name}' is ambiguous: \
             it has default value and required flag. Please delete one of these options."
        ));
    }
    if let Some(items) = &prop.items {
        lint_property(type_name, name, items, out);
    }
    if let Some(fields) = &prop.fields {
        for (nested_name, nested) in fields {
            lint_property(type_name, nested_name, nested, out);
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Declared type of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Integer,
    Boolean,
    List,
    Map,
}

impl AttributeType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Boolean => "Boolean",
            Self::List => "List",
            Self::Map => "Map",
        };
        f.write_str(name)
    }
}

/// Schema for a single output attribute
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    pub description: String,
    pub attribute_type: Option<AttributeType>,
}

impl AttributeSchema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            attribute_type: None,
        }
    }

    pub fn typed(mut self, attribute_type: AttributeType) -> Self {
        self.attribute_type = Some(attribute_type);
        self
    }

    /// Check a resolved value against the declared type.
    ///
    /// A mismatch is only logged; the value is still handed out.
    pub fn check(&self, name: &str, value: &Value) -> bool {
        match self.attribute_type {
            Some(expected) if !value.is_null() && !expected.matches(value) => {
                log::warn!("Attribute {name} is not of type {expected}");
                false
            }
            _ => true,
        }
    }
}
