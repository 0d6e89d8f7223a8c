// Error taxonomy shared by resource providers, tools and plugins

/// Result type for provider, tool and plugin operations.
pub type ToolhostResult<T> = Result<T, ToolhostError>;

/// Error kinds surfaced to protocol callers.
///
/// Internal failures (I/O, JSON, join errors) are converted into one of these
/// at the provider/tool boundary so callers see a stable set of kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolhostError {
    /// Unknown URI, unsupported scheme, or a path outside an allowed root.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Missing required field or a field of the wrong type.
    #[error("Invalid arguments: {0}")]
    Argument(String),

    /// Failure while a tool was running.
    #[error("Tool execution failed: {0}")]
    Execution(String),

    /// Malformed configuration or a lifecycle call made in the wrong state.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ToolhostError {
    pub fn not_found(uri: impl AsRef<str>) -> Self {
        Self::ResourceNotFound(uri.as_ref().to_string())
    }

    /// Path resolved outside every configured root.
    pub fn access_denied(uri: impl AsRef<str>) -> Self {
        Self::ResourceNotFound(format!("access denied: {}", uri.as_ref()))
    }

    pub fn unsupported_scheme(uri: impl AsRef<str>) -> Self {
        Self::ResourceNotFound(format!("unsupported scheme: {}", uri.as_ref()))
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::Argument(_) => "argument_error",
            Self::Execution(_) => "execution_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}
