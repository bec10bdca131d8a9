use std::io;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum SyncError {
    /// Transport-level failure: no usable response reached us
    #[error("Network error: {0}")]
    Network(String),

    /// Well-formed error response from the control plane
    #[error("Application error: {0}")]
    Application(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn network(msg: impl Into<String>) -> Self {
        SyncError::Network(msg.into())
    }

    pub fn application(msg: impl Into<String>) -> Self {
        SyncError::Application(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        SyncError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }

    /// Connectivity failures are shown as a banner, not next to a field.
    pub fn is_network_error(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}

impl From<io::Error> for SyncError {
    fn from(e: io::Error) -> Self {
        SyncError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(e: serde_yaml::Error) -> Self {
        SyncError::Yaml(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Json(e.to_string())
        } else {
            SyncError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(SyncError::network("connection refused").is_network_error());
        assert!(!SyncError::application("replicaset not found").is_network_error());
        assert!(!SyncError::config("bad interval").is_network_error());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: SyncError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, SyncError::Json(_)));
    }
}
