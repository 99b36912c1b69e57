use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Failures at the Vault HTTP boundary
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("request to {path} failed")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Vault returned {status} for {path}: {message}")]
    Status {
        path: String,
        status: StatusCode,
        message: String,
    },

    #[error("failed to decode Vault response from {path}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Vault response from {path} is missing {field}")]
    MissingField { path: String, field: &'static str },
}

impl VaultError {
    /// Build a status error, preferring Vault's `errors` array over the raw body
    pub(crate) fn status(path: &str, status: StatusCode, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            #[serde(default)]
            errors: Vec<String>,
        }

        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
            _ if body.trim().is_empty() => "<empty body>".to_string(),
            _ => body.trim().to_string(),
        };

        VaultError::Status {
            path: path.to_string(),
            status,
            message,
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            VaultError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
