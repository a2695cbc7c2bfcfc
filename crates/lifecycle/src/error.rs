//! Error types for resource lifecycle operations.
//!
//! Errors are categorized so the state machine can tell a retryable provider
//! fault from a terminal input problem. Each variant also knows the
//! exception-kind name that prefixes failure reasons recorded on a resource,
//! e.g. `ResourceInError: Went to status ERROR due to "just because"`.

use crate::store::StoreError;
use crate::types::{Action, UpdateReplace};
use thiserror::Error;

/// Categories of lifecycle errors for retry and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input does not match the type's schema or the template is malformed
    Validation,
    /// The requested change is never allowed (immutable property)
    NotSupported,
    /// In-place update impossible, the resource must be replaced
    Replace,
    /// The provider reported the resource in an error state (transient)
    Provider,
    /// A signal or action the resource cannot honour
    ActionNotSupported,
    /// A dangling template reference
    Reference,
    /// Invalid state or name passed by the caller
    Programming,
    /// Persistence failure
    Store,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are worth a cleanup-and-retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid resource definition",
            Self::NotSupported => "Unsupported change",
            Self::Replace => "Replacement required",
            Self::Provider => "Provider error",
            Self::ActionNotSupported => "Action not supported",
            Self::Reference => "Invalid template reference",
            Self::Programming => "Invalid argument",
            Self::Store => "Persistence failure",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors raised by validation, diffing, handlers and the state machine.
#[derive(Debug, Error)]
pub enum Error {
    /// A property value failed schema validation
    #[error("Property error : {path}: {message}")]
    PropertyValidation {
        /// Dotted path to the property, e.g. `test_resource.Properties.Foo`
        path: String,
        /// What was wrong with it
        message: String,
    },

    /// The resource definition itself is unusable
    #[error("{message}")]
    StackValidation {
        /// Description of the problem
        message: String,
    },

    /// The definition carries an empty type
    #[error("Resource \"{name}\" has no type")]
    InvalidResourceType {
        /// Resource name
        name: String,
    },

    /// No registered type under this name
    #[error("The Resource Type ({type_name}) could not be found.")]
    ResourceTypeNotFound {
        /// Requested type name
        type_name: String,
    },

    /// A change that can never be applied (immutable property)
    #[error("{feature} is not supported.")]
    NotSupported {
        /// What was attempted
        feature: String,
    },

    /// A handler decided the resource must be replaced
    #[error(transparent)]
    Replace(#[from] UpdateReplace),

    /// The provider reports the resource in an error state
    #[error("Went to status {status} due to \"{reason}\"")]
    ResourceInError {
        /// Provider-side status, e.g. `ERROR`
        status: String,
        /// Provider-side reason
        reason: String,
    },

    /// The provider reports a status the handler does not recognize
    #[error("{result} - Unknown status {status} due to \"{reason}\"")]
    ResourceUnknownStatus {
        /// Summary of the outcome
        result: String,
        /// Unrecognized status
        status: String,
        /// Provider-side reason
        reason: String,
    },

    /// The resource cannot honour an action or signal payload
    #[error("{action} is not supported for resource.")]
    ActionNotSupported {
        /// Description of the unsupported action
        action: String,
    },

    /// A hook signal naming an unknown hook or one that is not set
    #[error("{message}")]
    InvalidHook {
        /// Description naming the hook and the resource
        message: String,
    },

    /// A reference names a resource absent from the template
    #[error("The specified reference \"{name}\" (in {path}) is incorrect.")]
    InvalidTemplateReference {
        /// The dangling name
        name: String,
        /// Where the reference was found
        path: String,
    },

    /// An attribute name not declared by the resource type
    #[error("The Referenced Attribute ({resource} {attribute}) is incorrect.")]
    InvalidTemplateAttribute {
        /// Resource name
        resource: String,
        /// Requested attribute
        attribute: String,
    },

    /// The dependency graph contains a cycle
    #[error("Circular Dependency Found: {cycle}")]
    CircularDependency {
        /// Names involved in the cycle
        cycle: String,
    },

    /// An action or status outside the enumerated sets
    #[error("{message}")]
    InvalidState {
        /// Description of the invalid value
        message: String,
    },

    /// A name or length argument that cannot be honoured
    #[error("{message}")]
    InvalidName {
        /// Description of the problem
        message: String,
    },

    /// Any other handler failure
    #[error("{0}")]
    Provider(String),

    /// Persistence error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Engine configuration could not be parsed
    #[error("invalid engine configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a generic handler failure.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Shorthand for a provider error state, e.g. `resource_in_error("ERROR", "quota")`.
    pub fn resource_in_error(status: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceInError {
            status: status.into(),
            reason: reason.into(),
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::PropertyValidation { .. }
            | Error::StackValidation { .. }
            | Error::InvalidResourceType { .. }
            | Error::ResourceTypeNotFound { .. }
            | Error::InvalidTemplateAttribute { .. }
            | Error::CircularDependency { .. } => ErrorCategory::Validation,
            Error::NotSupported { .. } => ErrorCategory::NotSupported,
            Error::Replace(_) => ErrorCategory::Replace,
            Error::ResourceInError { .. } => ErrorCategory::Provider,
            Error::ActionNotSupported { .. } | Error::InvalidHook { .. } => {
                ErrorCategory::ActionNotSupported
            }
            Error::InvalidTemplateReference { .. } => ErrorCategory::Reference,
            Error::InvalidState { .. } | Error::InvalidName { .. } => ErrorCategory::Programming,
            Error::Store(_) => ErrorCategory::Store,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error should trigger a cleanup-and-retry.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Exception-kind name used as the prefix of failure reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::PropertyValidation { .. } | Error::StackValidation { .. } => {
                "StackValidationFailed"
            }
            Error::InvalidResourceType { .. } => "InvalidResourceType",
            Error::ResourceTypeNotFound { .. } => "ResourceTypeNotFound",
            Error::NotSupported { .. } => "NotSupported",
            Error::Replace(_) => "UpdateReplace",
            Error::ResourceInError { .. } => "ResourceInError",
            Error::ResourceUnknownStatus { .. } => "ResourceUnknownStatus",
            Error::ActionNotSupported { .. } | Error::InvalidHook { .. } => {
                "ResourceActionNotSupported"
            }
            Error::InvalidTemplateReference { .. } => "InvalidTemplateReference",
            Error::InvalidTemplateAttribute { .. } => "InvalidTemplateAttribute",
            Error::CircularDependency { .. } => "CircularDependencyException",
            Error::InvalidState { .. } | Error::InvalidName { .. } => "ValueError",
            Error::Store(_) => "StoreError",
            Error::Provider(_) | Error::Config(_) => "Exception",
        }
    }
}

/// Uniform wrapper surfaced to callers for any terminal action failure.
///
/// Displays as `<Kind>: <message>`, which is also what ends up in the
/// resource's `status_reason`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ResourceFailure {
    /// Resource the action ran against
    pub resource: String,
    /// Action that failed
    pub action: Action,
    /// Exception-kind name of the root cause
    pub kind: String,
    /// Root cause message
    pub message: String,
}

impl ResourceFailure {
    /// Wrap an error raised while performing `action` on `resource`.
    pub fn new(resource: &str, action: Action, cause: &Error) -> Self {
        Self {
            resource: resource.to_string(),
            action,
            kind: cause.kind().to_string(),
            message: cause.to_string(),
        }
    }

    /// A failure with no more specific cause, e.g. a guard violation.
    pub fn exception(resource: &str, action: Action, message: impl Into<String>) -> Self {
        Self {
            resource: resource.to_string(),
            action,
            kind: "Exception".to_string(),
            message: message.into(),
        }
    }
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
