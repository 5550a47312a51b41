use review_core::{NotifyError, ReviewError};
use review_persistence::PersistenceError;
use thiserror::Error;

/// Errores de la aplicación (binario y wiring de servicios).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de revisión: {0}")]
    Review(#[from] ReviewError),
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Error de notificación: {0}")]
    Notify(#[from] NotifyError),
    #[error("Error de configuración: {0}")]
    Config(String),
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error interno: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_variant_from() {
        let err: AppError = ReviewError::Forbidden("system group".into()).into();
        assert_eq!(err.to_string(), "Error de revisión: forbidden: system group");
    }

    #[test]
    fn test_io_variant_from() {
        let io_err = std::io::Error::other("falló IO");
        let err: AppError = io_err.into();
        assert_eq!(err.to_string(), "Error en IO: falló IO");
    }

    #[test]
    fn test_config_variant_format() {
        let err = AppError::Config("mala configuración".into());
        assert_eq!(err.to_string(), "Error de configuración: mala configuración");
    }
}
