use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("No encontrado: {0}")]
    NotFound(String),
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),
    #[error("Prohibido: {0}")]
    Forbidden(String),
    #[error("Recurso no disponible: {0}")]
    ResourceUnavailable(String),
    #[error("Detector no disponible: {0}")]
    DetectionUnavailable(String),
    #[error("Tiempo de espera agotado tras {0:?}")]
    Timeout(Duration),
    #[error("Error de operación: {0}")]
    OperationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<std::io::Error> for DomainError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => DomainError::NotFound(e.to_string()),
            _ => DomainError::ResourceUnavailable(e.to_string()),
        }
    }
}
