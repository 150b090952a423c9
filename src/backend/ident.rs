use streamrelay_error::TransportError;

/// Максимальная длина идентификатора PostgreSQL (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_BYTES: usize = 63;
/// Payload `NOTIFY` должен быть короче этого значения.
pub const MAX_PAYLOAD_BYTES: usize = 8000;

/// Проверяет, что имя канала можно безопасно использовать как идентификатор.
///
/// Те же правила применяются и во внутрипроцессном бэкенде, чтобы оба
/// бэкенда принимали и отвергали одинаковые имена.
pub fn validate_channel(channel: &str) -> Result<(), TransportError> {
    if channel.is_empty() {
        return Err(TransportError::invalid_channel(channel, "name is empty"));
    }
    if channel.len() > MAX_IDENTIFIER_BYTES {
        return Err(TransportError::invalid_channel(
            channel,
            format!("name exceeds {MAX_IDENTIFIER_BYTES} bytes"),
        ));
    }
    if channel.contains('\0') {
        return Err(TransportError::invalid_channel(channel, "name contains NUL"));
    }
    Ok(())
}

/// Экранирует имя канала как идентификатор: всегда в двойных кавычках,
/// внутренние `"` удваиваются.
pub fn quote_ident(channel: &str) -> Result<String, TransportError> {
    validate_channel(channel)?;
    Ok(format!("\"{}\"", channel.replace('"', "\"\"")))
}

/// Экранирует значение как строковый литерал.
///
/// Одинарные кавычки удваиваются; при наличии обратного слэша используется
/// форма `E'...'` с удвоенными слэшами.
pub fn quote_literal(value: &str) -> Result<String, TransportError> {
    if value.contains('\0') {
        return Err(TransportError::InvalidPayload {
            reason: "payload contains NUL".to_string(),
        });
    }
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        Ok(format!("E'{}'", escaped.replace('\\', "\\\\")))
    } else {
        Ok(format!("'{escaped}'"))
    }
}

/// Проверяет лимит размера payload.
pub fn check_payload_size(payload: &str) -> Result<(), TransportError> {
    if payload.len() >= MAX_PAYLOAD_BYTES {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_BYTES - 1,
        });
    }
    Ok(())
}

/// Проверяет payload по правилам `NOTIFY`: размер и отсутствие NUL.
///
/// Внутрипроцессный бэкенд применяет те же правила.
pub fn validate_payload(payload: &str) -> Result<(), TransportError> {
    check_payload_size(payload)?;
    if payload.contains('\0') {
        return Err(TransportError::InvalidPayload {
            reason: "payload contains NUL".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("stream-channel", "\"stream-channel\"")]
    #[case("MixedCase", "\"MixedCase\"")]
    #[case("with\"quote", "\"with\"\"quote\"")]
    #[case("select", "\"select\"")]
    fn test_quote_ident(
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(quote_ident(input).unwrap(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::nul("a\0b")]
    fn test_invalid_channel_names(#[case] input: &str) {
        let err = quote_ident(input).unwrap_err();
        assert!(matches!(err, TransportError::InvalidChannel { .. }));
    }

    #[test]
    fn test_channel_length_limit() {
        assert!(validate_channel(&"c".repeat(MAX_IDENTIFIER_BYTES)).is_ok());
        assert!(matches!(
            validate_channel(&"c".repeat(MAX_IDENTIFIER_BYTES + 1)),
            Err(TransportError::InvalidChannel { .. })
        ));
    }

    #[rstest]
    #[case("plain", "'plain'")]
    #[case("it's", "'it''s'")]
    #[case(r"back\slash", r"E'back\\slash'")]
    #[case(r#"{"source":"a'b\\c"}"#, r#"E'{"source":"a''b\\\\c"}'"#)]
    fn test_quote_literal(
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(quote_literal(input).unwrap(), expected);
    }

    #[test]
    fn test_quote_literal_rejects_nul() {
        assert!(matches!(
            quote_literal("a\0"),
            Err(TransportError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_payload_size_limit() {
        assert!(check_payload_size(&"x".repeat(MAX_PAYLOAD_BYTES - 1)).is_ok());
        assert!(matches!(
            check_payload_size(&"x".repeat(MAX_PAYLOAD_BYTES)),
            Err(TransportError::PayloadTooLarge { size: 8000, max: 7999 })
        ));
    }

    #[rstest]
    #[case::nul("a\0b")]
    #[case::oversized(&"x".repeat(MAX_PAYLOAD_BYTES))]
    fn test_validate_payload_rejects(#[case] payload: &str) {
        let err = validate_payload(payload).unwrap_err();
        assert!(matches!(
            err,
            TransportError::InvalidPayload { .. } | TransportError::PayloadTooLarge { .. }
        ));
    }

    /// Обратное преобразование литерала по правилам PostgreSQL.
    fn unquote_literal(quoted: &str) -> String {
        let (escape, body) = match quoted.strip_prefix('E') {
            Some(rest) => (true, rest),
            None => (false, quoted),
        };
        let body = &body[1..body.len() - 1];
        let body = body.replace("''", "'");
        if escape {
            body.replace("\\\\", "\\")
        } else {
            body
        }
    }

    proptest! {
        /// Экранированный литерал всегда восстанавливается в исходную строку.
        #[test]
        fn prop_literal_is_reversible(value in "[^\\x00]{0,64}") {
            let quoted = quote_literal(&value).unwrap();
            prop_assert_eq!(unquote_literal(&quoted), value);
        }

        #[test]
        fn prop_ident_wraps_and_doubles_quotes(name in "[^\\x00]{1,20}") {
            prop_assume!(name.len() <= MAX_IDENTIFIER_BYTES);
            let quoted = quote_ident(&name).unwrap();
            prop_assert!(quoted.starts_with('"') && quoted.ends_with('"'));
            let body = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(body.replace("\"\"", "\""), name);
        }
    }
}
