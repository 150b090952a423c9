use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка разбора конверта, пришедшего по каналу.
///
/// Никогда не выходит за пределы подписчика: сообщение отбрасывается, а
/// доставка продолжается.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {reason}")]
    Malformed { reason: String },
}

impl ErrorExt for EnvelopeError {
    fn status_code(&self) -> StatusCode {
        StatusCode::DeserializationFailed
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
