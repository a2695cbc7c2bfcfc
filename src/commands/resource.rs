//! Operations on a single stored resource

use anyhow::{Context as _, Result, bail};
use lifecycle::{Action, AdoptData, Resource, State, Status};
use serde_json::{Value, json};
use std::fs;

use super::{Session, apply};
use crate::Context;
use crate::cli::{AdoptArgs, ResourceArgs, SignalArgs};
use crate::template::Template;
use crate::ui;

pub async fn suspend(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let mut resource = session.load(&args.stack, &args.name).await?;
    resource.suspend().await?;
    report(&resource);
    Ok(())
}

pub async fn resume(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let mut resource = session.load(&args.stack, &args.name).await?;
    resource.resume().await?;
    report(&resource);
    Ok(())
}

pub async fn check(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let mut resource = session.load(&args.stack, &args.name).await?;
    resource.check().await?;
    report(&resource);
    Ok(())
}

pub async fn signal(ctx: &Context, args: &SignalArgs) -> Result<()> {
    let details = signal_details(args)?;
    let session = Session::open(ctx)?;
    let mut resource = session.load(&args.stack, &args.name).await?;
    resource.signal(details.as_ref()).await?;

    match &args.unset_hook {
        Some(hook) => ui::success(&format!("Cleared {hook} on {}", args.name)),
        None => ui::success(&format!("Signalled {}", args.name)),
    }
    Ok(())
}

/// Print the export data of a resource and make the stack forget it. The
/// provider-side object is left alone.
pub async fn abandon(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let mut resource = session.load(&args.stack, &args.name).await?;
    let data = resource.prepare_abandon();
    println!("{}", serde_json::to_string_pretty(&data)?);

    resource
        .state_set(Action::Delete, Status::Complete, "Abandoned")
        .await?;
    log::info!("Abandoned {}", args.name);
    Ok(())
}

/// Take over a provider-side object, e.g. one printed by `abandon`
pub async fn adopt(ctx: &Context, args: &AdoptArgs) -> Result<()> {
    let content = fs::read_to_string(&args.data)
        .with_context(|| format!("Could not read {}", args.data.display()))?;
    let data: AdoptData = serde_json::from_str(&content)
        .with_context(|| format!("Invalid adopt data: {}", args.data.display()))?;

    let template = Template::load(&args.template)?;
    let Some(definition) = template
        .definitions()
        .into_iter()
        .find(|d| d.name == args.name)
    else {
        bail!("No resource \"{}\" in {}", args.name, args.template.display());
    };

    let session = Session::open(ctx)?;
    let stack = template.stack_name();
    let resolved = apply::resolve_in_stack(&session, &template, &definition).await?;
    let mut resource = Resource::new(resolved, session.stack(stack), session.engine.clone()).await?;
    match resource.state() {
        State::INITIAL => {}
        state if state == State::new(Action::Delete, Status::Complete) => resource.state_reset(),
        state => bail!("{} already exists in stack {stack} ({state})", args.name),
    }

    resource.adopt(Some(&data)).await?;
    report(&resource);
    Ok(())
}

fn signal_details(args: &SignalArgs) -> Result<Option<Value>> {
    if let Some(hook) = &args.unset_hook {
        return Ok(Some(json!({ "unset_hook": hook })));
    }
    Ok(args
        .data
        .as_deref()
        .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))))
}

fn report(resource: &Resource) {
    let state = ui::state_label(resource.state());
    ui::success(&format!("{} {state}", resource.name()));
    if !resource.status_reason().is_empty() {
        ui::dim(resource.status_reason());
    }
}
