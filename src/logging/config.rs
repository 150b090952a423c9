use std::{fmt, fs, io, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Формат вывода событий.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

/// Настройки логирования.
///
/// Читается из секции `[logging]` конфигурации; все поля необязательны.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Директива `EnvFilter`, например `info` или `streamrelay=debug,info`.
    pub level: String,
    pub format: LogFormat,
    pub console_enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub file_enabled: bool,
    pub log_dir: PathBuf,
    /// Префикс имени файла; к нему добавляется дата ротации.
    pub file_name: String,
}

impl LoggingConfig {
    /// Итоговая директива фильтра из конфигурации.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            "info".to_string()
        } else {
            level.to_string()
        }
    }

    /// Создаёт каталог логов, если файловый вывод включён.
    pub fn ensure_log_dir(&self) -> io::Result<()> {
        if self.file_enabled {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            console_enabled: true,
            with_ansi: true,
            with_target: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            file_name: "streamrelay.log".to_string(),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("pretty", LogFormat::Pretty)]
    #[case("JSON", LogFormat::Json)]
    #[case("Compact", LogFormat::Compact)]
    fn test_format_from_str(
        #[case] input: &str,
        #[case] expected: LogFormat,
    ) {
        assert_eq!(input.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!("xml".parse::<LogFormat>().is_err());
    }

    /// Тест проверяет, что пустой уровень превращается в `info`.
    #[test]
    fn test_empty_level_defaults_to_info() {
        let cfg = LoggingConfig {
            level: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.build_filter_directive(), "info");
    }

    #[test]
    fn test_ensure_log_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            file_enabled: true,
            log_dir: tmp.path().join("nested/logs"),
            ..Default::default()
        };
        cfg.ensure_log_dir().unwrap();
        assert!(cfg.log_dir.is_dir());
    }
}
