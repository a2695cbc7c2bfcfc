//! Built-in resource types
//!
//! Every type is a [`ResourceType`] (property and attribute schemas) paired
//! with a [`lifecycle::ResourceHandler`] doing the provider-side work:
//!
//! - `Local::File` - a file with the given content and mode
//! - `Local::Symlink` - a symlink pointing at a source path
//! - `Local::RandomString` - a generated secret, kept in resource data
//! - `Stackwright::Noop` - no provider side; echoes its `value`

use lifecycle::{Error, ResourceType, TypeRegistry};
use std::path::Path;

pub mod file;
pub mod noop;
pub mod random_string;
pub mod symlink;

/// All built-in types, plus the `OS::` aliases templates may use
pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    for resource_type in builtin_types() {
        registry.register(resource_type);
    }
    registry
        .register_alias("OS::Heat::RandomString", random_string::TYPE_NAME)
        .register_alias("OS::Heat::None", noop::TYPE_NAME);
    registry
}

fn builtin_types() -> Vec<ResourceType> {
    vec![
        file::resource_type(),
        symlink::resource_type(),
        random_string::resource_type(),
        noop::resource_type(),
    ]
}

/// Provider error for a failed filesystem operation
fn io_error(what: &str, path: &Path, err: &std::io::Error) -> Error {
    Error::provider(format!("Failed to {what} {}: {err}", path.display()))
}
