use anyhow::Result;
use colored::Colorize;
use lifecycle::naming::reduce_physical_resource_name;

use crate::Context;

pub fn run(ctx: &Context, name: &str, limit: usize) -> Result<()> {
    let reduced = reduce_physical_resource_name(name, limit)?;
    if ctx.quiet || reduced == name {
        println!("{reduced}");
    } else {
        println!("{} {}", reduced, format!("({} -> {} chars)", name.chars().count(), reduced.chars().count()).dimmed());
    }
    Ok(())
}
