//! `Local::RandomString` - a generated string kept in resource data
//!
//! There is no update handler: any property change generates a new value
//! through replacement.

use async_trait::async_trait;
use lifecycle::{
    AttributeSchema, AttributeType, Capabilities, Constraint, Error, HandlerContext, Operation,
    PropertySchema, ResourceHandler, ResourceType, Result,
};
use rand::Rng;
use serde_json::{Value, json};
use std::sync::Arc;

pub const TYPE_NAME: &str = "Local::RandomString";

const DEFAULT_LENGTH: u64 = 32;
const VALUE_KEY: &str = "value";

const SEQUENCES: [&str; 7] = [
    "lettersdigits",
    "letters",
    "lowercase",
    "uppercase",
    "digits",
    "hexdigits",
    "octdigits",
];

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, Arc::new(RandomStringHandler))
        .property(
            "length",
            PropertySchema::integer()
                .with_default(json!(DEFAULT_LENGTH))
                .constraint(Constraint::Range {
                    min: Some(1.0),
                    max: Some(512.0),
                }),
        )
        .property(
            "sequence",
            PropertySchema::string()
                .with_default(json!("lettersdigits"))
                .constraint(Constraint::AllowedValues(
                    SEQUENCES.iter().map(|s| json!(s)).collect(),
                )),
        )
        .property("salt", PropertySchema::string().description("Change to force a new value"))
        .attribute("value", AttributeSchema::new("The generated string").typed(AttributeType::String))
}

fn alphabet(sequence: &str) -> Result<&'static [u8]> {
    Ok(match sequence {
        "lettersdigits" => b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
        "letters" => b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
        "lowercase" => b"abcdefghijklmnopqrstuvwxyz",
        "uppercase" => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
        "digits" => b"0123456789",
        "hexdigits" => b"0123456789abcdef",
        "octdigits" => b"01234567",
        other => return Err(Error::provider(format!("Unknown sequence \"{other}\""))),
    })
}

/// Random string of `length` characters drawn from `sequence`
pub fn generate(length: usize, sequence: &str) -> Result<String> {
    let chars = alphabet(sequence)?;
    let mut rng = rand::thread_rng();
    Ok((0..length)
        .map(|_| char::from(chars[rng.gen_range(0..chars.len())]))
        .collect())
}

pub struct RandomStringHandler;

#[async_trait]
impl ResourceHandler for RandomStringHandler {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .with(Operation::Create)
            .with(Operation::Delete)
    }

    async fn handle_create(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let length = ctx
            .properties
            .get("length")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_LENGTH) as usize;
        let sequence = ctx.property_str("sequence").unwrap_or("lettersdigits");
        let value = generate(length, sequence)?;

        ctx.data_set(VALUE_KEY, value.clone());
        ctx.set_physical_id(value);
        Ok(())
    }

    async fn handle_delete(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        ctx.data_delete(VALUE_KEY);
        Ok(())
    }

    async fn resolve_attribute(&self, ctx: &HandlerContext<'_>, name: &str) -> Result<Value> {
        Ok(match name {
            VALUE_KEY => ctx.data_get(VALUE_KEY).map_or(Value::Null, |v| json!(v)),
            _ => Value::Null,
        })
    }
}
