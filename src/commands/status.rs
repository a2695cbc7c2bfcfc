use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use lifecycle::ResourceRecord;
use std::collections::BTreeMap;

use super::Session;
use crate::Context;
use crate::ui;

pub async fn run(ctx: &Context, stack: Option<&str>) -> Result<()> {
    let session = Session::open(ctx)?;
    let records = session.store.latest(stack).await?;

    if records.is_empty() {
        match stack {
            Some(name) => ui::info(&format!("No resources in stack {name}")),
            None => ui::info("No stacks yet. Run: stackwright apply <template>"),
        }
        return Ok(());
    }

    ui::header("Stack Status");
    for (stack, records) in group_by_stack(records) {
        ui::section(&stack);
        for record in records {
            print_record(ctx, &record);
        }
    }
    println!();
    ui::kv("Store", &session.store.path().display().to_string());
    Ok(())
}

fn group_by_stack(records: Vec<ResourceRecord>) -> BTreeMap<String, Vec<ResourceRecord>> {
    let mut stacks: BTreeMap<String, Vec<ResourceRecord>> = BTreeMap::new();
    for record in records {
        let stack = record.stack_id.clone().unwrap_or_default();
        stacks.entry(stack).or_default().push(record);
    }
    stacks
}

fn print_record(ctx: &Context, record: &ResourceRecord) {
    let physical_id = record
        .physical_id
        .as_deref()
        .map_or_else(|| "-".to_string(), |id| ui::truncate_path(id, 40));
    println!(
        "  {:<20} {:<24} {:<22} {}",
        record.name.bold(),
        ui::state_label(record.state()),
        record.resource_type.dimmed(),
        physical_id
    );

    if !record.status_reason.is_empty() && (ctx.verbose > 0 || record.state().status == lifecycle::Status::Failed) {
        ui::dim(&format!("  {}", record.status_reason));
    }
    if ctx.verbose > 0 {
        if let Some(updated) = record.updated_time.or(record.created_time) {
            ui::dim(&format!(
                "  last change {} ({})",
                updated.format("%Y-%m-%d %H:%M:%S UTC"),
                age(updated, Utc::now())
            ));
        }
        for (key, value) in &record.resource_data {
            ui::dim(&format!("  {key} = {value}"));
        }
    }
}

/// Coarse "how long ago", e.g. `5m ago`
fn age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    match seconds {
        0..60 => format!("{seconds}s ago"),
        60..3600 => format!("{}m ago", seconds / 60),
        3600..86400 => format!("{}h ago", seconds / 3600),
        _ => format!("{}d ago", seconds / 86400),
    }
}
