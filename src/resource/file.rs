//! `Local::File` - a file with managed content
//!
//! Changing `path` replaces the resource (the old file is removed by the
//! delete of the replaced instance). `content` and `mode` update in place.

use async_trait::async_trait;
use lifecycle::handler::{CheckCondition, Expected, verify_check_conditions};
use lifecycle::{
    AttributeSchema, AttributeType, Capabilities, Constraint, Error, HandlerContext, Operation,
    PropertyMap, PropertySchema, ResourceDefinition, ResourceHandler, ResourceType, Result,
    TemplateDiff,
};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::io_error;

pub const TYPE_NAME: &str = "Local::File";

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, Arc::new(FileHandler))
        .property(
            "path",
            PropertySchema::string()
                .required()
                .description("Where the file lives; `~` and variables are expanded"),
        )
        .property(
            "content",
            PropertySchema::string()
                .with_default(json!(""))
                .update_allowed(),
        )
        .property(
            "mode",
            PropertySchema::string()
                .description("Octal permission bits, e.g. \"0644\"")
                .constraint(Constraint::AllowedPattern("^[0-7]{3,4}$".to_string()))
                .update_allowed(),
        )
        .attribute("path", AttributeSchema::new("Expanded file path").typed(AttributeType::String))
        .attribute(
            "checksum",
            AttributeSchema::new("blake3 hash of the content on disk").typed(AttributeType::String),
        )
}

pub struct FileHandler;

fn target(ctx: &HandlerContext<'_>) -> Result<PathBuf> {
    if let Some(id) = ctx.physical_id() {
        return Ok(PathBuf::from(id));
    }
    ctx.property_str("path")
        .map(crate::paths::expand)
        .ok_or_else(|| Error::provider("path is not set"))
}

fn checksum(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

fn write_file(path: &Path, properties: &PropertyMap) -> Result<String> {
    let content = properties.get("content").and_then(Value::as_str).unwrap_or_default();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create directory", parent, &e))?;
    }
    fs::write(path, content).map_err(|e| io_error("write", path, &e))?;

    if let Some(mode) = properties.get("mode").and_then(Value::as_str) {
        set_mode(path, mode)?;
    }
    log::debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(checksum(content.as_bytes()))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let bits = u32::from_str_radix(mode, 8)
        .map_err(|_| Error::provider(format!("Invalid mode \"{mode}\"")))?;
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
        .map_err(|e| io_error("set permissions on", path, &e))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: &str) -> Result<()> {
    log::warn!("Ignoring mode {mode} for {}: not supported on this platform", path.display());
    Ok(())
}

#[async_trait]
impl ResourceHandler for FileHandler {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .with(Operation::Create)
            .with(Operation::Update)
            .with(Operation::Delete)
            .with(Operation::Check)
    }

    async fn handle_create(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let path = target(ctx)?;
        if path.is_dir() {
            return Err(Error::provider(format!("{} is a directory", path.display())));
        }
        let sum = write_file(&path, ctx.properties)?;
        ctx.set_physical_id(path.to_string_lossy());
        ctx.data_set("checksum", sum);
        Ok(())
    }

    async fn handle_update(
        &self,
        ctx: &mut HandlerContext<'_>,
        _new_definition: &ResourceDefinition,
        _template_diff: &TemplateDiff,
        property_diff: &PropertyMap,
    ) -> Result<()> {
        if property_diff.is_empty() {
            return Ok(());
        }
        let path = target(ctx)?;
        let sum = write_file(&path, ctx.properties)?;
        ctx.data_set("checksum", sum);
        Ok(())
    }

    async fn handle_delete(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let Some(path) = ctx.physical_id().map(PathBuf::from) else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{} already gone", path.display());
            }
            Err(e) => return Err(io_error("remove", &path, &e)),
        }
        ctx.data_delete("checksum");
        Ok(())
    }

    async fn handle_check(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let path = target(ctx)?;
        let actual = fs::read(&path).map_or_else(|_| "missing".to_string(), |bytes| checksum(&bytes));
        let expected = ctx.data_get("checksum").unwrap_or("unknown").to_string();
        verify_check_conditions(&[CheckCondition::new(
            path.to_string_lossy(),
            Expected::One(expected),
            actual,
        )])
    }

    async fn resolve_attribute(&self, ctx: &HandlerContext<'_>, name: &str) -> Result<Value> {
        Ok(match name {
            "path" => Value::String(target(ctx)?.to_string_lossy().into_owned()),
            "checksum" => ctx.data_get("checksum").map_or(Value::Null, |s| json!(s)),
            _ => Value::Null,
        })
    }
}
