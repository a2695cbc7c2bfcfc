//! `Stackwright::Noop` - a resource with no provider side
//!
//! Useful for wiring: its `value` can be read back as an attribute, and it
//! accepts signals, keeping the last payload in resource data.

use async_trait::async_trait;
use lifecycle::{
    AttributeSchema, Capabilities, HandlerContext, Operation, PropertySchema, ResourceHandler,
    ResourceType, Result,
};
use serde_json::Value;
use std::sync::Arc;

pub const TYPE_NAME: &str = "Stackwright::Noop";

const SIGNAL_KEY: &str = "last_signal";

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, Arc::new(NoopHandler))
        .property(
            "value",
            PropertySchema::string()
                .description("Echoed back through the value attribute")
                .update_allowed(),
        )
        .attribute("value", AttributeSchema::new("The value property"))
        .attribute("last_signal", AttributeSchema::new("Payload of the most recent signal"))
}

pub struct NoopHandler;

#[async_trait]
impl ResourceHandler for NoopHandler {
    fn capabilities(&self) -> Capabilities {
        Capabilities::lifecycle()
            .with(Operation::Check)
            .with(Operation::Signal)
    }

    async fn handle_create(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let id = format!("{}-{}", ctx.stack_name, ctx.name);
        ctx.set_physical_id(id);
        Ok(())
    }

    async fn handle_signal(&self, ctx: &mut HandlerContext<'_>, details: Option<&Value>) -> Result<()> {
        let payload = details.map_or_else(String::new, Value::to_string);
        log::info!("{} received signal {payload}", ctx.name);
        ctx.data_set(SIGNAL_KEY, payload);
        Ok(())
    }

    async fn resolve_attribute(&self, ctx: &HandlerContext<'_>, name: &str) -> Result<Value> {
        Ok(match name {
            "value" => ctx.properties.get("value").cloned().unwrap_or(Value::Null),
            SIGNAL_KEY => ctx
                .data_get(SIGNAL_KEY)
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(Value::Null),
            _ => Value::Null,
        })
    }
}
