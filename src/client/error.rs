use std::collections::BTreeMap;

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never got an answer: refused connection, DNS, timeout.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The service answered with its error envelope.
    #[error("{message} (HTTP {status}, {code})")]
    Service {
        status: u16,
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Rejected locally before anything was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Per-field messages of a validation failure, if the service sent any.
    pub fn field_errors(&self) -> BTreeMap<String, Vec<String>> {
        let Self::Service {
            details: Some(details),
            ..
        } = self
        else {
            return BTreeMap::new();
        };
        details
            .get("fields")
            .cloned()
            .and_then(|fields| serde_json::from_value(fields).ok())
            .unwrap_or_default()
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}
