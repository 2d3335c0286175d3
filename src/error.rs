//! Error types shared by the sync pipeline.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Required input is missing or malformed
    #[error("{0}")]
    Validation(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The request never produced a usable response (network, TLS, decoding)
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a non-success status
    #[error("{endpoint} returned {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("{0} is not implemented")]
    Unimplemented(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Remote call failures, the only errors the batch writer recovers from.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http { .. } | Error::Api { .. })
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let api = Error::Api {
            endpoint: "people:batchCreateContacts".into(),
            status: 429,
            message: "quota exceeded".into(),
        };
        assert!(api.is_transport());
        assert!(!Error::validation("missing --account").is_transport());
        assert!(!Error::Unimplemented("contacts clean".into()).is_transport());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::NotFound(PathBuf::from("contacts.json")).to_string(),
            "file not found: contacts.json"
        );
        assert_eq!(
            Error::Unimplemented("account-to-account import".into()).to_string(),
            "account-to-account import is not implemented"
        );
    }
}
