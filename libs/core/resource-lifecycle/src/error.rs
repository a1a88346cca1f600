use thiserror::Error;

/// Errors raised while bringing a managed resource to life.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Construction failed. The slot stays empty, so the next `acquire()` retries.
    #[error("Failed to initialize resource '{resource}': {message}")]
    Init { resource: String, message: String },
}

impl ResourceError {
    pub fn init(resource: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Init {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    /// Name of the resource that failed
    pub fn resource(&self) -> &str {
        match self {
            Self::Init { resource, .. } => resource,
        }
    }
}
