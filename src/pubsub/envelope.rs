use chrono::Utc;
use serde::{Deserialize, Serialize};
use streamrelay_error::{EnvelopeError, PublishError};

/// Единица обмена по каналу вещания: `{source, data, timestamp}`.
///
/// `source` выставляет издатель из идентификатора подписки, переданного
/// вызывающим кодом. Подписчик сравнивает его со своим идентификатором
/// на точное равенство.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Идентификатор подписки-источника.
    pub source: String,
    /// Полезная нагрузка.
    pub data: String,
    /// Миллисекунды с эпохи на момент публикации.
    pub timestamp: i64,
}

impl Envelope {
    /// Создаёт конверт с текущим временем.
    pub fn new(
        source: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            data: data.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Строгий разбор JSON-представления.
    ///
    /// Любое отклонение от формы (лишнее или отсутствующее поле, неверный
    /// тип, дробный `timestamp`) считается ошибкой.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let malformed = |e: serde_json::Error| EnvelopeError::Malformed {
            reason: e.to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(raw).map_err(malformed)?;
        // derive(Deserialize) принимает и массив полей по порядку.
        if !value.is_object() {
            return Err(EnvelopeError::Malformed {
                reason: "expected a JSON object".to_string(),
            });
        }
        serde_json::from_value(value).map_err(malformed)
    }

    /// Сериализует конверт в wire-формат.
    pub fn to_json(&self) -> Result<String, PublishError> {
        serde_json::to_string(self).map_err(|e| PublishError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Принадлежит ли конверт указанной подписке.
    #[inline]
    pub fn is_from(
        &self,
        subscription_id: &str,
    ) -> bool {
        self.source == subscription_id
    }
}
