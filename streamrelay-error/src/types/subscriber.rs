use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode, TransportError};

/// Ошибки подписчика.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriberError {
    /// Нарушение жизненного цикла: повторный `start`/`close` или `start`
    /// после `close`. `state`: наблюдаемое состояние на момент вызова.
    #[error("subscriber already {state}")]
    AlreadyClosed { state: &'static str },

    /// Поток pull-доставки уже выдан этому экземпляру.
    #[error("envelope stream already taken for this subscriber")]
    StreamTaken,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SubscriberError {
    /// Возвращает `true` для ошибок жизненного цикла.
    pub fn is_already_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed { .. })
    }
}

impl ErrorExt for SubscriberError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyClosed { .. } => StatusCode::AlreadyClosed,
            Self::StreamTaken => StatusCode::InvalidState,
            Self::Transport(err) => err.status_code(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Transport(err) => err.client_message(),
            _ => self.to_string(),
        }
    }
}
