//! Errores del core de revisión.
//!
//! `ReviewError` es lo que ve el llamador; `StoreError` lo que devuelven los
//! backends de persistencia. Toda variante de `ReviewError` salvo `Internal`
//! implica que no se realizó ninguna mutación.

use review_domain::DomainError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ReviewError {
    #[error("not found: {0}")] NotFound(String),
    #[error("validation: {0}")] Validation(String),
    #[error("conflict: {0}")] Conflict(String),
    #[error("forbidden: {0}")] Forbidden(String),
    #[error("internal: {0}")] Internal(String),
}

impl ReviewError {
    pub fn not_found(what: &str, id: Uuid) -> Self {
        ReviewError::NotFound(format!("{what} {id}"))
    }
}

impl From<DomainError> for ReviewError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::ValidationError(msg) => ReviewError::Validation(msg),
            DomainError::SerializationError(msg) => ReviewError::Internal(msg),
        }
    }
}

/// Fallos de un backend de persistencia.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StoreError {
    #[error("record not found: {0}")] NotFound(String),
    #[error("duplicate record: {0}")] Duplicate(String),
    #[error("record still referenced: {0}")] InUse(String),
    #[error("stale write: expected version {expected}, stored {stored}")] StaleVersion { expected: i64, stored: i64 },
    #[error("backend: {0}")] Backend(String),
}

impl StoreError {
    /// Convierte a `ReviewError` nombrando la entidad cuando no existe.
    pub fn named(self, what: &str, id: Uuid) -> ReviewError {
        match self {
            StoreError::NotFound(_) => ReviewError::not_found(what, id),
            other => other.into(),
        }
    }
}

impl From<StoreError> for ReviewError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ReviewError::NotFound(what),
            StoreError::Duplicate(what) => ReviewError::Conflict(format!("duplicate {what}")),
            StoreError::InUse(what) => ReviewError::Conflict(format!("{what} is still referenced")),
            StoreError::StaleVersion { expected, stored } => {
                ReviewError::Conflict(format!("version mismatch: expected {expected}, stored {stored}"))
            }
            StoreError::Backend(msg) => ReviewError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_caller_kinds() {
        assert!(matches!(ReviewError::from(StoreError::NotFound("x".into())), ReviewError::NotFound(_)));
        assert!(matches!(ReviewError::from(StoreError::Duplicate("x".into())), ReviewError::Conflict(_)));
        assert!(matches!(ReviewError::from(StoreError::StaleVersion { expected: 1, stored: 2 }),
                         ReviewError::Conflict(_)));
        assert!(matches!(ReviewError::from(StoreError::Backend("io".into())), ReviewError::Internal(_)));
        assert!(matches!(ReviewError::from(DomainError::ValidationError("v".into())), ReviewError::Validation(_)));
    }
}
