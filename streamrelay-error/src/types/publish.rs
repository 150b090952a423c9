use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode, TransportError};

/// Ошибки публикации.
///
/// Наружу из `Publisher::publish` выходит только `NotInitialized`: остальные
/// варианты логируются и превращаются в `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// `publish` вызван до `initialize`.
    #[error("publisher is not initialized; call initialize() first")]
    NotInitialized,

    /// Конверт не удалось сериализовать.
    #[error("envelope serialization failed: {reason}")]
    Serialization { reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ErrorExt for PublishError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotInitialized => StatusCode::NotInitialized,
            Self::Serialization { .. } => StatusCode::SerializationFailed,
            Self::Transport(err) => err.status_code(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::NotInitialized => "Publisher not ready".to_string(),
            Self::Serialization { .. } => "Message format error".to_string(),
            Self::Transport(err) => err.client_message(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Transport(err) => err.metrics_tags(),
            _ => vec![
                ("error_type", "publish".to_string()),
                ("status_code", self.status_code().to_string()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_is_caller_error() {
        let err = PublishError::NotInitialized;
        assert_eq!(err.status_code(), StatusCode::NotInitialized);
        assert!(err.status_code().is_caller_error());
        assert!(!err.status_code().is_retryable());
    }

    /// Тест проверяет, что транспортная ошибка сохраняет свой код после
    /// оборачивания.
    #[test]
    fn test_transport_conversion_keeps_code() {
        let err: PublishError = TransportError::ConnectionLost {
            reason: "reset".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::ConnectionLost);
        assert_eq!(err.to_string(), "connection lost: reset");
    }
}
