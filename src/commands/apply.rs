use anyhow::{Result, bail};
use colored::Colorize;
use lifecycle::{
    Action, Breakpoints, DiffSummary, Resource, ResourceChange, ResourceDefinition, ResourceStore,
    State, Status, UpdateOutcome, build_dependencies,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::{Session, confirm};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::template::{self, Lookup, Template};
use crate::ui;

// ============================================================================
// Commands
// ============================================================================

pub async fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let mut template = Template::load(&args.template)?;
    template.set_parameters(&args.params)?;
    let session = Session::open(ctx)?;

    ui::header(&format!("Applying {}", template.stack_name()));
    let changes = plan(&session, &template).await?;
    print_plan(ctx, &changes);

    let summary = DiffSummary::from_changes(changes.values());
    if !summary.has_changes() {
        ui::success("Stack is up to date");
        return Ok(());
    }
    if args.dry_run {
        println!();
        ui::warn("Dry run - no changes made");
        return Ok(());
    }
    if !confirm(&format!("Apply {} change(s)?", summary.total()), args.yes)? {
        ui::info("Cancelled");
        return Ok(());
    }

    ui::section("Changes");
    let report = deploy(&session, &template).await?;
    report.finish("applied")
}

pub async fn destroy(ctx: &Context, path: &Path, yes: bool) -> Result<()> {
    let template = Template::load(path)?;
    let session = Session::open(ctx)?;
    let stack = template.stack_name();

    let live = live_records(&session, stack).await?;
    if live.is_empty() {
        ui::info(&format!("Stack {stack} has no resources"));
        return Ok(());
    }

    ui::header(&format!("Destroying {stack}"));
    for name in live.keys() {
        println!("  {} {name}", "-".red());
    }
    if !confirm(&format!("Delete {} resource(s)?", live.len()), yes)? {
        ui::info("Cancelled");
        return Ok(());
    }

    ui::section("Changes");
    let report = teardown(&session, &template).await?;
    report.finish("destroyed")
}

// ============================================================================
// Planning
// ============================================================================

/// What `deploy` would do to every resource, in creation order, followed by
/// deletions of resources no longer in the template
pub async fn plan(session: &Session, template: &Template) -> Result<BTreeMap<String, ResourceChange>> {
    let stack = template.stack_name();
    let definitions = template.definitions();
    let order = creation_order(template, &definitions)?;
    let by_name: BTreeMap<&str, &ResourceDefinition> =
        definitions.iter().map(|d| (d.name.as_str(), d)).collect();

    let mut known: BTreeMap<String, Resource> = BTreeMap::new();
    let mut changes = BTreeMap::new();
    for name in order {
        let Some(definition) = by_name.get(name.as_str()) else {
            continue;
        };
        let lookup = lookup_for(definition, &template.parameters, &mut known, true).await?;
        let resolved = resolve_definition(definition, &lookup)?;

        let change = match existing(session, stack, &name).await? {
            Some(resource) => {
                let change = resource.plan_update(&resolved)?;
                known.insert(name.clone(), resource);
                change
            }
            None => ResourceChange::Create,
        };
        changes.insert(name, change);
    }

    for name in live_records(session, stack).await?.into_keys() {
        if !template.resources.contains_key(&name) {
            changes.insert(name, ResourceChange::Delete);
        }
    }
    Ok(changes)
}

fn print_plan(ctx: &Context, changes: &BTreeMap<String, ResourceChange>) {
    for (name, change) in changes {
        match change {
            ResourceChange::Create => println!("  {} {name}", "+".green()),
            ResourceChange::Update(diff) => {
                let keys: Vec<&str> = diff.keys().map(String::as_str).collect();
                println!("  {} {name} {}", "~".yellow(), keys.join(", ").dimmed());
            }
            ResourceChange::Replace => println!("  {} {name}", "-/+".magenta()),
            ResourceChange::Delete => println!("  {} {name}", "-".red()),
            ResourceChange::NoChange if ctx.verbose > 0 => ui::dim(&format!("  {name}")),
            ResourceChange::NoChange => {}
        }
    }

    let summary = DiffSummary::from_changes(changes.values());
    println!();
    ui::kv(
        "Plan",
        &format!(
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            summary.creations, summary.updates, summary.replacements, summary.deletions, summary.unchanged
        ),
    );
}

// ============================================================================
// Execution
// ============================================================================

/// Outcome of a deploy or teardown
#[derive(Debug, Default)]
pub struct Report {
    pub done: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Not attempted because something they require failed
    pub skipped: Vec<String>,
}

impl Report {
    fn finish(self, verb: &str) -> Result<()> {
        println!();
        for name in &self.skipped {
            ui::warn(&format!("{name} skipped: a dependency failed"));
        }
        if self.failed.is_empty() {
            ui::success(&format!("{} resource(s) {verb}", self.done.len()));
            return Ok(());
        }
        for (name, reason) in &self.failed {
            ui::error(&format!("{name}: {reason}"));
        }
        bail!("{} resource(s) failed", self.failed.len())
    }
}

/// Bring the stack in line with `template`
pub async fn deploy(session: &Session, template: &Template) -> Result<Report> {
    let stack = template.stack_name();
    let definitions = template.definitions();
    let order = creation_order(template, &definitions)?;
    let graph = build_dependencies(&definitions, template.parameters.keys().map(String::as_str))?;
    let by_name: BTreeMap<&str, &ResourceDefinition> =
        definitions.iter().map(|d| (d.name.as_str(), d)).collect();

    let mut report = Report::default();
    let mut applied: BTreeMap<String, Resource> = BTreeMap::new();
    let mut unusable: BTreeSet<String> = BTreeSet::new();

    for name in order {
        let Some(definition) = by_name.get(name.as_str()) else {
            continue;
        };
        if graph.requires(&name).iter().any(|dep| unusable.contains(*dep)) {
            unusable.insert(name.clone());
            report.skipped.push(name);
            continue;
        }

        match converge(session, template, definition, &mut applied).await {
            Ok(resource) => {
                applied.insert(name.clone(), resource);
                report.done.push(name);
            }
            Err(e) => {
                log::debug!("{name} failed: {e:?}");
                unusable.insert(name.clone());
                report.failed.push((name, format!("{e:#}")));
            }
        }
    }

    if report.failed.is_empty() {
        let removed: Vec<i64> = live_records(session, stack)
            .await?
            .into_iter()
            .filter(|(name, _)| !template.resources.contains_key(name))
            .map(|(_, id)| id)
            .collect();
        remove_newest_first(session, stack, removed, &mut report).await;
    }
    Ok(report)
}

/// Delete every live resource of the stack, dependents first
pub async fn teardown(session: &Session, template: &Template) -> Result<Report> {
    let stack = template.stack_name();
    let definitions = template.definitions();
    let mut live = live_records(session, stack).await?;
    let mut report = Report::default();

    for name in creation_order(template, &definitions)?.into_iter().rev() {
        let Some(id) = live.remove(&name) else {
            continue;
        };
        destroy_record(session, stack, &name, id, &mut report).await;
    }

    // records the template no longer mentions
    let leftovers = live.into_values().collect();
    remove_newest_first(session, stack, leftovers, &mut report).await;
    Ok(report)
}

async fn remove_newest_first(session: &Session, stack: &str, mut ids: Vec<i64>, report: &mut Report) {
    ids.sort_unstable_by(|a, b| b.cmp(a));
    for id in ids {
        let name = match session.store.get(id).await {
            Ok(record) => record.name,
            Err(e) => {
                report.failed.push((format!("#{id}"), e.to_string()));
                continue;
            }
        };
        destroy_record(session, stack, &name, id, report).await;
    }
}

async fn destroy_record(session: &Session, stack: &str, name: &str, id: i64, report: &mut Report) {
    let stack_ctx = session.stack(stack).with_state(Action::Delete, Status::InProgress);
    let result = match Resource::load(id, stack_ctx, session.engine.clone()).await {
        Ok(mut resource) => resource.destroy().await.map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => report.done.push(name.to_string()),
        Err(e) => report.failed.push((name.to_string(), format!("{e:#}"))),
    }
}

/// Create or update one resource, replacing it when an in-place update is
/// not possible
async fn converge(
    session: &Session,
    template: &Template,
    definition: &ResourceDefinition,
    applied: &mut BTreeMap<String, Resource>,
) -> Result<Resource> {
    let stack = template.stack_name();
    let breakpoints = template.breakpoints(&definition.name)?;
    let lookup = lookup_for(definition, &template.parameters, applied, false).await?;
    let resolved = resolve_definition(definition, &lookup)?;

    let Some(resource) = existing(session, stack, &definition.name).await? else {
        return create_fresh(session, stack, resolved, breakpoints).await;
    };

    let mut resource = resource.with_breakpoints(breakpoints.clone());
    match resource.update(&resolved).await? {
        UpdateOutcome::Completed => Ok(resource),
        UpdateOutcome::NeedsReplacement(replace) => {
            log::info!("{replace}");
            resource.destroy().await?;
            create_fresh(session, stack, resolved, breakpoints).await
        }
    }
}

async fn create_fresh(
    session: &Session,
    stack: &str,
    definition: ResourceDefinition,
    breakpoints: Breakpoints,
) -> Result<Resource> {
    let mut resource = Resource::new(definition, session.stack(stack), session.engine.clone())
        .await?
        .with_breakpoints(breakpoints);
    if resource.state() != State::INITIAL {
        resource.state_reset();
    }
    resource.create().await?;
    Ok(resource)
}

// ============================================================================
// Helpers
// ============================================================================

fn creation_order(template: &Template, definitions: &[ResourceDefinition]) -> Result<Vec<String>> {
    let graph = build_dependencies(definitions, template.parameters.keys().map(String::as_str))?;
    Ok(graph.topological_order()?)
}

fn is_live(state: State) -> bool {
    state.action != Action::Init && state != State::new(Action::Delete, Status::Complete)
}

/// Latest live record id of every resource in the stack
async fn live_records(session: &Session, stack: &str) -> Result<BTreeMap<String, i64>> {
    Ok(session
        .store
        .latest(Some(stack))
        .await?
        .into_iter()
        .filter(|record| is_live(record.state()))
        .filter_map(|record| record.id.map(|id| (record.name, id)))
        .collect())
}

/// The stored instance of `name`, unless it was never created or is gone
async fn existing(session: &Session, stack: &str, name: &str) -> Result<Option<Resource>> {
    let Some(record) = session.store.get_by_name_and_stack(name, stack).await? else {
        return Ok(None);
    };
    match record.id {
        Some(id) if is_live(record.state()) => {
            Ok(Some(Resource::load(id, session.stack(stack), session.engine.clone()).await?))
        }
        _ => Ok(None),
    }
}

/// Physical ids and the attributes `definition` reads from `resources`
async fn lookup_for(
    definition: &ResourceDefinition,
    parameters: &BTreeMap<String, Value>,
    resources: &mut BTreeMap<String, Resource>,
    placeholders: bool,
) -> Result<Lookup> {
    let mut lookup = Lookup::new(parameters);
    lookup.placeholders = placeholders;

    let mut refs = Vec::new();
    for value in definition.properties.values().chain(definition.metadata.values()) {
        template::attribute_refs(value, &mut refs);
    }
    for (name, attribute) in refs {
        if let Some(resource) = resources.get_mut(&name) {
            let value = resource.get_attribute(&attribute).await?;
            lookup.attributes.insert((name, attribute), value);
        }
    }
    for (name, resource) in resources.iter() {
        lookup
            .physical_ids
            .insert(name.clone(), resource.physical_id().map(str::to_string));
    }
    Ok(lookup)
}

/// Resolve `definition` against the stored resources it refers to
pub(super) async fn resolve_in_stack(
    session: &Session,
    template: &Template,
    definition: &ResourceDefinition,
) -> Result<ResourceDefinition> {
    let mut references = Vec::new();
    for (key, value) in definition.properties.iter().chain(&definition.metadata) {
        lifecycle::planner::collect_references(value, key, &mut references);
    }

    let mut resources = BTreeMap::new();
    for reference in references {
        if resources.contains_key(&reference.name) {
            continue;
        }
        if let Some(resource) = existing(session, template.stack_name(), &reference.name).await? {
            resources.insert(reference.name, resource);
        }
    }
    let lookup = lookup_for(definition, &template.parameters, &mut resources, false).await?;
    resolve_definition(definition, &lookup)
}

fn resolve_definition(definition: &ResourceDefinition, lookup: &Lookup) -> Result<ResourceDefinition> {
    Ok(ResourceDefinition {
        properties: template::resolve_map(&definition.properties, lookup)?,
        metadata: template::resolve_map(&definition.metadata, lookup)?,
        ..definition.clone()
    })
}
