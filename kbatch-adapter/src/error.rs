//! Error types for the Kubernetes adapter

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors that can occur while building, submitting or querying jobs
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The job descriptor or adapter configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The control plane reported that the target object does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other failed control-plane invocation; carries the raw stderr
    #[error("{0}")]
    ControlPlane(String),

    /// Control-plane output could not be parsed
    #[error("Malformed control-plane output: {0}")]
    MalformedOutput(String),

    /// The command could not be spawned at all
    #[error("Failed to execute '{command}': {source}")]
    Process {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The resource graph could not be rendered
    #[error("Failed to render resources: {0}")]
    Render(String),

    /// Host user/group records could not be read
    #[error("Identity lookup failed: {0}")]
    Identity(String),
}

impl AdapterError {
    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Classify the stderr of a failed control-plane call
    pub fn from_stderr(stderr: &str) -> Self {
        if stderr
            .lines()
            .any(|line| line.starts_with("Error from server (NotFound):"))
        {
            Self::NotFound(stderr.to_string())
        } else {
            Self::ControlPlane(stderr.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_classified() {
        let err = AdapterError::from_stderr(r#"Error from server (NotFound): pods "x" not found"#);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_not_found_on_later_line() {
        let stderr = "Warning: something\nError from server (NotFound): secrets \"x-secret\" not found";
        assert!(AdapterError::from_stderr(stderr).is_not_found());
    }

    #[test]
    fn test_other_errors_carry_raw_stderr() {
        let stderr = "Error from server (Forbidden): pods is forbidden: User \"bob\" cannot list";
        let err = AdapterError::from_stderr(stderr);
        assert!(!err.is_not_found());
        match err {
            AdapterError::ControlPlane(msg) => assert_eq!(msg, stderr),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_control_plane_error_displays_stderr() {
        let err = AdapterError::ControlPlane("the server doesn't have a resource type".into());
        assert_eq!(err.to_string(), "the server doesn't have a resource type");
    }
}
