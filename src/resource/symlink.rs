//! `Local::Symlink` - a symlink at `target` pointing to `source`

use async_trait::async_trait;
use lifecycle::handler::{CheckCondition, Expected, verify_check_conditions};
use lifecycle::{
    AttributeSchema, AttributeType, Capabilities, Error, HandlerContext, Operation, PropertyMap,
    PropertySchema, ResourceDefinition, ResourceHandler, ResourceType, Result, TemplateDiff,
};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::io_error;

pub const TYPE_NAME: &str = "Local::Symlink";

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, Arc::new(SymlinkHandler))
        .property(
            "source",
            PropertySchema::string()
                .required()
                .description("What the symlink points to")
                .update_allowed(),
        )
        .property(
            "target",
            PropertySchema::string()
                .required()
                .description("Where the symlink is created"),
        )
        .attribute("target", AttributeSchema::new("Expanded link path").typed(AttributeType::String))
        .attribute("source", AttributeSchema::new("Expanded link source").typed(AttributeType::String))
}

pub struct SymlinkHandler;

#[derive(Debug, PartialEq, Eq)]
enum LinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    FileExists,
}

fn paths(ctx: &HandlerContext<'_>) -> Result<(PathBuf, PathBuf)> {
    let source = ctx
        .property_str("source")
        .ok_or_else(|| Error::provider("source is not set"))?;
    let target = match ctx.physical_id() {
        Some(id) => PathBuf::from(id),
        None => ctx
            .property_str("target")
            .map(crate::paths::expand)
            .ok_or_else(|| Error::provider("target is not set"))?,
    };
    Ok((crate::paths::expand(source), target))
}

fn inspect(source: &Path, target: &Path) -> Result<LinkState> {
    if !target.exists() && !target.is_symlink() {
        return Ok(LinkState::Missing);
    }
    if !target.is_symlink() {
        return Ok(LinkState::FileExists);
    }

    let link = fs::read_link(target).map_err(|e| io_error("read symlink", target, &e))?;
    let expected = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    let actual = if link.is_absolute() {
        link.canonicalize().unwrap_or(link)
    } else {
        target
            .parent()
            .map(|p| p.join(&link))
            .and_then(|p| p.canonicalize().ok())
            .unwrap_or(link)
    };

    if expected == actual {
        Ok(LinkState::Correct)
    } else {
        Ok(LinkState::WrongTarget(actual))
    }
}

fn link(source: &Path, target: &Path) -> Result<()> {
    if !source.exists() {
        return Err(Error::provider(format!("Source does not exist: {}", source.display())));
    }

    match inspect(source, target)? {
        LinkState::Correct => return Ok(()),
        LinkState::FileExists => {
            return Err(Error::provider(format!(
                "{} exists and is not a symlink",
                target.display()
            )));
        }
        LinkState::WrongTarget(_) => {
            fs::remove_file(target).map_err(|e| io_error("remove symlink", target, &e))?;
        }
        LinkState::Missing => {}
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create directory", parent, &e))?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(source, target).map_err(|e| io_error("create symlink", target, &e))?;

    #[cfg(windows)]
    {
        use std::os::windows::fs::{symlink_dir, symlink_file};

        let result = if source.is_dir() {
            symlink_dir(source, target)
        } else {
            symlink_file(source, target)
        };
        result.map_err(|e| io_error("create symlink", target, &e))?;
    }

    log::debug!("Linked {} -> {}", target.display(), source.display());
    Ok(())
}

#[async_trait]
impl ResourceHandler for SymlinkHandler {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .with(Operation::Create)
            .with(Operation::Update)
            .with(Operation::Delete)
            .with(Operation::Check)
    }

    async fn handle_create(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let (source, target) = paths(ctx)?;
        link(&source, &target)?;
        ctx.set_physical_id(target.to_string_lossy());
        Ok(())
    }

    async fn handle_update(
        &self,
        ctx: &mut HandlerContext<'_>,
        _new_definition: &ResourceDefinition,
        _template_diff: &TemplateDiff,
        property_diff: &PropertyMap,
    ) -> Result<()> {
        if !property_diff.contains_key("source") {
            return Ok(());
        }
        let (source, target) = paths(ctx)?;
        link(&source, &target)
    }

    async fn handle_delete(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let Some(target) = ctx.physical_id().map(PathBuf::from) else {
            return Ok(());
        };
        // never remove something we did not create
        if target.is_symlink() {
            fs::remove_file(&target).map_err(|e| io_error("remove symlink", &target, &e))?;
        }
        Ok(())
    }

    async fn handle_check(&self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let (source, target) = paths(ctx)?;
        let actual = match inspect(&source, &target)? {
            LinkState::Correct => source.to_string_lossy().into_owned(),
            LinkState::WrongTarget(actual) => actual.to_string_lossy().into_owned(),
            LinkState::Missing => "missing".to_string(),
            LinkState::FileExists => "regular file".to_string(),
        };
        verify_check_conditions(&[CheckCondition::new(
            target.to_string_lossy(),
            Expected::One(source.to_string_lossy().into_owned()),
            actual,
        )])
    }

    async fn resolve_attribute(&self, ctx: &HandlerContext<'_>, name: &str) -> Result<Value> {
        let (source, target) = paths(ctx)?;
        Ok(match name {
            "target" => json!(target.to_string_lossy()),
            "source" => json!(source.to_string_lossy()),
            _ => Value::Null,
        })
    }
}
