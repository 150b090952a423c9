use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса для категоризации ошибок relay.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки и нарушения порядка вызовов
/// - 2xxx: Ошибки данных (каналы, конверты, payload)
/// - 6xxx: Транспорт (соединения, команды)
///
/// `num_enum::TryFromPrimitive` даёт `TryFrom<u32>`, что удобно для
/// передачи кода наружу (например, в ответе HTTP-слоя).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Internal = 1001,
    NotInitialized = 1003,
    InvalidState = 1004,
    AlreadyClosed = 1005,

    // === 2xxx: Ошибки данных ===
    InvalidChannel = 2000,
    InvalidData = 2001,
    SerializationFailed = 2002,
    DeserializationFailed = 2003,
    SizeLimit = 2004,

    // === 6xxx: Транспорт ===
    ConnectionFailed = 6000,
    ConnectionClosed = 6001,
    ConnectionLost = 6002,
    CommandFailed = 6003,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Имеет ли смысл повторить операцию, завершившуюся этим кодом.
    ///
    /// Ошибки порядка вызовов (`NotInitialized`, `AlreadyClosed`) никогда не
    /// повторяются автоматически: их исправляет вызывающий код.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed | Self::ConnectionLost | Self::CommandFailed
        )
    }

    /// Ошибка вызывающего кода: неверные данные или порядок вызовов.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::InvalidState
                | Self::AlreadyClosed
                | Self::InvalidChannel
                | Self::InvalidData
                | Self::SizeLimit
        )
    }

    /// Ошибка транспорта (диапазон 6xxx).
    pub fn is_transport_error(&self) -> bool {
        (6000..=6999).contains(&self.code())
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::InvalidChannel
            | Self::InvalidData
            | Self::SizeLimit
            | Self::DeserializationFailed => LogLevel::Warn,
            Self::ConnectionClosed => LogLevel::Warn,
            Self::Internal
            | Self::NotInitialized
            | Self::ConnectionFailed
            | Self::ConnectionLost => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
