use std::io;

use http::status::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum TreeError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Parent chain of '{node}' revisits '{revisited}'")]
    CycleDetected { node: String, revisited: String },
    #[error("Fetch failed for {branch}: {message}")]
    Fetch { branch: String, message: String },
    #[error("File System error: {0}")]
    Io(String),
    #[error("Malformed relationship: {0}")]
    MalformedRelationship(String),
    #[error("Malformed fetch response for {branch}: {message}")]
    MalformedResponse { branch: String, message: String },
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Unknown control tag: {0}")]
    UnknownControl(String),
}

impl TreeError {
    /// Convenience constructor for data sources reporting a failed request.
    pub fn fetch<B: ToString, M: ToString>(branch: B, message: M) -> TreeError {
        TreeError::Fetch {
            branch: branch.to_string(),
            message: message.to_string(),
        }
    }

    /// True for the kinds that leave a branch in placeholder state so the user can retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TreeError::Fetch { .. } | TreeError::MalformedResponse { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TreeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TreeError::CycleDetected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TreeError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            TreeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TreeError::MalformedRelationship(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TreeError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
            TreeError::NotFound(_) => StatusCode::NOT_FOUND,
            TreeError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TreeError::UnknownControl(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<toml::de::Error> for TreeError {
    fn from(src: toml::de::Error) -> TreeError {
        TreeError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for TreeError {
    fn from(src: JsonError) -> TreeError {
        TreeError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for TreeError {
    fn from(src: YamlError) -> TreeError {
        TreeError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for TreeError {
    fn from(src: UrlParseError) -> TreeError {
        TreeError::Config(format!("Invalid URL: {src}"))
    }
}

impl From<io::Error> for TreeError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => TreeError::NotFound(format!("{x}")),
            _ => TreeError::Io(format!("IOError: {}", x.kind())),
        }
    }
}
