//! Handler execution - one provider call plus completion polling

use crate::context::HandlerContext;
use crate::diff::TemplateDiff;
use crate::error::Result;
use crate::handler::{Operation, ResourceHandler};
use crate::types::{Action, PropertyMap, ResourceDefinition};
use std::time::Duration;

/// A single handler invocation
pub enum HandlerCall<'a> {
    Create,
    Update {
        definition: &'a ResourceDefinition,
        template_diff: &'a TemplateDiff,
        property_diff: &'a PropertyMap,
    },
    Delete,
    Suspend,
    Resume,
    Check,
}

impl HandlerCall<'_> {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Create => Operation::Create,
            Self::Update { .. } => Operation::Update,
            Self::Delete => Operation::Delete,
            Self::Suspend => Operation::Suspend,
            Self::Resume => Operation::Resume,
            Self::Check => Operation::Check,
        }
    }

    /// Action reported to `check_complete`
    pub fn action(&self) -> Action {
        match self {
            Self::Create => Action::Create,
            Self::Update { .. } => Action::Update,
            Self::Delete => Action::Delete,
            Self::Suspend => Action::Suspend,
            Self::Resume => Action::Resume,
            Self::Check => Action::Check,
        }
    }
}

/// Run `call` against `handler`, then poll `check_complete` every
/// `poll_interval` until the provider reports the action finished.
///
/// Operations the handler does not implement are skipped entirely, so no
/// completion polling happens for them either.
pub async fn execute(
    handler: &dyn ResourceHandler,
    call: HandlerCall<'_>,
    ctx: &mut HandlerContext<'_>,
    poll_interval: Duration,
) -> Result<()> {
    let operation = call.operation();
    if !handler.capabilities().contains(operation) {
        log::debug!("{} has no {operation} handler, skipping", ctx.resource_type);
        return Ok(());
    }

    let action = call.action();
    match call {
        HandlerCall::Create => handler.handle_create(ctx).await?,
        HandlerCall::Update {
            definition,
            template_diff,
            property_diff,
        } => {
            handler
                .handle_update(ctx, definition, template_diff, property_diff)
                .await?;
        }
        HandlerCall::Delete => handler.handle_delete(ctx).await?,
        HandlerCall::Suspend => handler.handle_suspend(ctx).await?,
        HandlerCall::Resume => handler.handle_resume(ctx).await?,
        HandlerCall::Check => handler.handle_check(ctx).await?,
    }

    let mut polls = 0u32;
    while !handler.check_complete(action, ctx).await? {
        polls += 1;
        log::debug!("{} {action} not complete yet (poll {polls})", ctx.name);
        tokio::time::sleep(poll_interval).await;
    }
    Ok(())
}
