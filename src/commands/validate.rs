use anyhow::{Result, bail};
use colored::Colorize;
use lifecycle::planner::collect_references;
use lifecycle::{
    PropertiesSchema, PropertyMap, ResourceDefinition, TypeRegistry, build_dependencies, schema,
};
use std::collections::BTreeSet;
use std::path::Path;

use crate::Context;
use crate::config;
use crate::template::{self, Lookup, Template};
use crate::ui;

pub fn validate(ctx: &Context, path: &Path) -> Result<()> {
    let template = Template::load(path)?;
    let strict = config::load(ctx.config.as_deref())?.strict_validate;
    let registry = crate::resource::registry();

    ui::header(&format!("Validating {}", template.stack_name()));
    let problems = check(&template, &registry, strict);

    for name in template.resources.keys() {
        let own: Vec<&Problem> = problems.iter().filter(|p| p.resource.as_deref() == Some(name.as_str())).collect();
        let resource_type = &template.resources[name].resource_type;
        if own.is_empty() {
            ui::success(&format!("{name} {}", resource_type.dimmed()));
        } else {
            for problem in own {
                ui::error(&format!("{name}: {}", problem.message));
            }
        }
    }
    for problem in problems.iter().filter(|p| p.resource.is_none()) {
        ui::error(&problem.message);
    }

    for type_name in template
        .resources
        .values()
        .map(|r| r.resource_type.as_str())
        .collect::<BTreeSet<_>>()
    {
        if let Ok(resource_type) = registry.get_class(type_name) {
            for warning in schema::lint_ambiguous_defaults(type_name, &resource_type.properties_schema) {
                ui::warn(&warning);
            }
        }
    }

    if !problems.is_empty() {
        bail!("{} problem(s) found in {}", problems.len(), path.display());
    }
    if !ctx.quiet {
        println!();
        ui::success(&format!("{} resources valid", template.resources.len()));
    }
    Ok(())
}

pub fn deps(_ctx: &Context, path: &Path) -> Result<()> {
    let template = Template::load(path)?;
    let definitions = template.definitions();
    let graph = build_dependencies(&definitions, template.parameters.keys().map(String::as_str))?;
    let order = graph.topological_order()?;

    ui::header(&format!("Dependencies of {}", template.stack_name()));
    ui::section("Create order");
    for (i, name) in order.iter().enumerate() {
        let requires = graph.requires(name);
        if requires.is_empty() {
            ui::step(i + 1, order.len(), name);
        } else {
            ui::step(
                i + 1,
                order.len(),
                &format!("{name} {}", format!("(after {})", requires.join(", ")).dimmed()),
            );
        }
    }

    ui::section("Delete order");
    for name in graph.reverse_order()? {
        ui::dim(&name);
    }
    Ok(())
}

pub fn types(ctx: &Context) -> Result<()> {
    let registry = crate::resource::registry();
    ui::header("Resource Types");
    for resource_type in registry.types() {
        ui::section(&resource_type.name);
        for (name, prop) in &resource_type.properties_schema {
            ui::kv(name, &describe_property(prop));
            if ctx.verbose > 0 {
                if let Some(description) = &prop.description {
                    ui::dim(&format!("  {description}"));
                }
            }
        }
        let attributes: Vec<&str> = resource_type.attributes_schema.keys().map(String::as_str).collect();
        if !attributes.is_empty() {
            ui::dim(&format!("attributes: {}", attributes.join(", ")));
        }
    }
    Ok(())
}

fn describe_property(prop: &lifecycle::PropertySchema) -> String {
    let mut parts = vec![format!("{:?}", prop.property_type)];
    if prop.required {
        parts.push("required".to_string());
    }
    if let Some(default) = &prop.default {
        parts.push(format!("default {default}"));
    }
    if prop.immutable {
        parts.push("immutable".to_string());
    } else if prop.update_allowed {
        parts.push("updatable".to_string());
    } else {
        parts.push("replace on change".to_string());
    }
    parts.join(", ")
}

/// A problem found in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// Resource it belongs to; `None` for stack-wide problems
    pub resource: Option<String>,
    pub message: String,
}

impl Problem {
    fn resource(name: &str, message: impl ToString) -> Self {
        Self {
            resource: Some(name.to_string()),
            message: message.to_string(),
        }
    }

    fn stack(message: impl ToString) -> Self {
        Self {
            resource: None,
            message: message.to_string(),
        }
    }
}

/// Every problem in `template`, without touching the store
pub fn check(template: &Template, registry: &TypeRegistry, strict: bool) -> Vec<Problem> {
    let mut problems = Vec::new();
    let definitions = template.definitions();

    match build_dependencies(&definitions, template.parameters.keys().map(String::as_str)) {
        Ok(graph) => {
            if let Err(e) = graph.topological_order() {
                problems.push(Problem::stack(e));
            }
        }
        Err(e) => problems.push(Problem::stack(e)),
    }

    let lookup = Lookup::new(&template.parameters).with_placeholders();
    for definition in &definitions {
        let name = definition.name.as_str();
        if let Err(e) = template.breakpoints(name) {
            problems.push(Problem::resource(name, format!("{e:#}")));
        }
        if let Err(message) = check_definition(definition, registry, &lookup, strict) {
            problems.push(Problem::resource(name, message));
        }
    }
    problems
}

fn check_definition(
    definition: &ResourceDefinition,
    registry: &TypeRegistry,
    lookup: &Lookup,
    strict: bool,
) -> Result<(), String> {
    if definition.name.contains('/') {
        return Err("Resource name may not contain \"/\"".to_string());
    }
    let resource_type = registry.get_class(&definition.resource_type).map_err(|e| e.to_string())?;
    let resolved = template::resolve_map(&definition.properties, lookup).map_err(|e| e.to_string())?;
    template::resolve_map(&definition.metadata, lookup).map_err(|e| e.to_string())?;

    let path = format!("{}.Properties", definition.name);
    schema::validate(&resolved, &resource_type.properties_schema, &path, false)
        .map_err(|e| e.to_string())?;
    if !strict {
        return Ok(());
    }

    // values fed by other resources are only known at apply time
    let referenced = referenced_keys(&definition.properties);
    let literal_schema: PropertiesSchema = resource_type
        .properties_schema
        .iter()
        .filter(|(key, _)| !referenced.contains(key.as_str()))
        .map(|(key, prop)| (key.clone(), prop.clone()))
        .collect();
    let literal: PropertyMap = resolved
        .into_iter()
        .filter(|(key, _)| !referenced.contains(key.as_str()))
        .collect();
    schema::validate(&literal, &literal_schema, &path, true).map_err(|e| e.to_string())?;
    Ok(())
}

fn referenced_keys(properties: &PropertyMap) -> BTreeSet<&str> {
    properties
        .iter()
        .filter(|(key, value)| {
            let mut references = Vec::new();
            collect_references(value, key, &mut references);
            !references.is_empty()
        })
        .map(|(key, _)| key.as_str())
        .collect()
}
