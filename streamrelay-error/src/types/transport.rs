use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки канала вещания (соединение, команды LISTEN/NOTIFY).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Не удалось установить соединение с бэкендом.
    #[error("failed to connect to {target}: {reason}")]
    ConnectionFailed { target: String, reason: String },

    /// Установленное соединение оборвалось.
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// Имя канала нельзя безопасно использовать как идентификатор.
    #[error("invalid channel name '{channel}': {reason}")]
    InvalidChannel { channel: String, reason: String },

    /// Payload нельзя безопасно передать как литерал.
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// Payload превышает лимит бэкенда.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Бэкенд отклонил команду.
    #[error("{command} failed: {reason}")]
    Command {
        command: &'static str,
        reason: String,
    },

    /// Операция над уже закрытым соединением или пулом.
    #[error("connection is closed")]
    Closed,
}

impl TransportError {
    pub fn invalid_channel(
        channel: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidChannel {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    pub fn command(
        command: &'static str,
        reason: impl ToString,
    ) -> Self {
        Self::Command {
            command,
            reason: reason.to_string(),
        }
    }
}

impl ErrorExt for TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectionLost { .. } => StatusCode::ConnectionLost,
            Self::InvalidChannel { .. } => StatusCode::InvalidChannel,
            Self::InvalidPayload { .. } => StatusCode::InvalidData,
            Self::PayloadTooLarge { .. } => StatusCode::SizeLimit,
            Self::Command { .. } => StatusCode::CommandFailed,
            Self::Closed => StatusCode::ConnectionClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            // Адрес и причина могут содержать учётные данные.
            Self::ConnectionFailed { .. } => "Broadcast backend unavailable".to_string(),
            Self::ConnectionLost { .. } => "Broadcast connection lost".to_string(),
            Self::Command { command, .. } => format!("{command} rejected by backend"),
            _ => self.to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "transport".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::InvalidChannel { channel, .. } => tags.push(("channel", channel.clone())),
            Self::Command { command, .. } => tags.push(("command", command.to_string())),
            Self::PayloadTooLarge { size, .. } => tags.push(("payload_size", size.to_string())),
            _ => {}
        }

        tags
    }
}
