use thiserror::Error;

use procura_core::errors::{DomainError, ValidationError};
use procura_db::StoreError;

/// The error surface of every engine operation. `kind()` is the stable tag
/// callers dispatch on; messages are human-readable and safe to show, with
/// authorization deliberately carrying no detail beyond "not authorized".
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not authorized")]
    NotAuthorized,
    #[error(transparent)]
    Conflict(#[from] DomainError),
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },
    #[error("external service `{service}` failed: {message}")]
    ExternalService { service: &'static str, message: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotAuthorized => "authorization",
            Self::Conflict(_) => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::ExternalService { .. } => "external_service",
            Self::Persistence(_) => "persistence",
        }
    }

    pub(crate) fn external(service: &'static str, message: impl Into<String>) -> Self {
        Self::ExternalService { service, message: message.into() }
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Domain(domain) => Self::Conflict(domain),
            StoreError::MissingRequest(id) => Self::NotFound { resource: "purchase request", id },
            StoreError::MissingUser(id) => Self::NotFound { resource: "user", id },
            StoreError::Database(source) => Self::Persistence(source.to_string()),
            StoreError::Decode(message) => Self::Persistence(message),
        }
    }
}
