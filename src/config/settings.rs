use std::{path::Path, sync::Arc, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    backend::{Backend, MemoryBackend},
    logging::LoggingConfig,
    pubsub::{PublisherConfig, SubscriberConfig},
};

/// Имя файла конфигурации, который ищется в текущем каталоге.
pub const DEFAULT_CONFIG_FILE: &str = "streamrelay";
/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "STREAMRELAY";

/// Вид бэкенда вещания.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Postgres,
}

/// Настройки процесса.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub backend: BackendKind,
    pub database_url: Option<String>,
    pub pool_max_size: usize,
    pub channel_capacity: usize,
    pub idle_tick_ms: u64,
    pub pull_buffer_capacity: usize,
    pub pull_grace_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает настройки: значения по умолчанию, затем файл, затем
    /// переменные окружения `STREAMRELAY_*`.
    ///
    /// Без `path` используется необязательный `streamrelay.toml` из текущего
    /// каталога; явно указанный файл обязателен.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let cfg = Config::builder()
            .set_default("backend", "memory")?
            .set_default("pool_max_size", 20)?
            .set_default("channel_capacity", 1024)?
            .set_default("idle_tick_ms", 1000)?
            .set_default("pull_buffer_capacity", 1024)?
            .set_default("pull_grace_ms", 10_000)?
            .add_source(file)
            // STREAMRELAY_POOL_MAX_SIZE, STREAMRELAY_LOGGING__LEVEL
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_max_size == 0 {
            return Err(ConfigError::Message(
                "pool_max_size must be greater than zero".to_string(),
            ));
        }
        if self.idle_tick_ms == 0 {
            return Err(ConfigError::Message(
                "idle_tick_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            pool_max_size: self.pool_max_size,
        }
    }

    pub fn subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig {
            idle_tick: Duration::from_millis(self.idle_tick_ms),
            buffer_capacity: self.pull_buffer_capacity,
            stream_grace: Duration::from_millis(self.pull_grace_ms),
        }
    }

    /// Создаёт бэкенд по настройкам.
    pub fn build_backend(&self) -> Result<Arc<dyn Backend>, ConfigError> {
        match self.backend {
            BackendKind::Memory => Ok(Arc::new(MemoryBackend::new(self.channel_capacity))),
            BackendKind::Postgres => self.build_postgres(),
        }
    }

    #[cfg(feature = "postgres")]
    fn build_postgres(&self) -> Result<Arc<dyn Backend>, ConfigError> {
        let url = self.database_url.as_deref().ok_or_else(|| {
            ConfigError::Message("database_url is required for the postgres backend".to_string())
        })?;
        Ok(Arc::new(crate::backend::PostgresBackend::new(url)))
    }

    #[cfg(not(feature = "postgres"))]
    fn build_postgres(&self) -> Result<Arc<dyn Backend>, ConfigError> {
        Err(ConfigError::Message(
            "postgres backend requires the `postgres` feature".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;

    const VARS: &[&str] = &[
        "STREAMRELAY_BACKEND",
        "STREAMRELAY_POOL_MAX_SIZE",
        "STREAMRELAY_IDLE_TICK_MS",
        "STREAMRELAY_LOGGING__LEVEL",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let s = Settings::load(None).unwrap();
        assert_eq!(s.backend, BackendKind::Memory);
        assert_eq!(s.database_url, None);
        assert_eq!(s.publisher_config(), PublisherConfig::default());
        assert_eq!(s.subscriber_config(), SubscriberConfig::default());
        assert_eq!(s.logging, LoggingConfig::default());
    }

    /// Тест проверяет, что переменные окружения перекрывают умолчания,
    /// включая вложенную секцию `logging`.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("STREAMRELAY_POOL_MAX_SIZE", "5");
        env::set_var("STREAMRELAY_IDLE_TICK_MS", "250");
        env::set_var("STREAMRELAY_LOGGING__LEVEL", "debug");
        let s = Settings::load(None);
        clear_env();

        let s = s.unwrap();
        assert_eq!(s.pool_max_size, 5);
        assert_eq!(s.subscriber_config().idle_tick, Duration::from_millis(250));
        assert_eq!(s.logging.level, "debug");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "backend = \"postgres\"\n\
             database_url = \"postgres://u:p@localhost/db\"\n\
             pull_buffer_capacity = 8\n\
             pull_grace_ms = 500\n\
             [logging]\n\
             format = \"json\""
        )
        .unwrap();

        let s = Settings::load(Some(file.path())).unwrap();
        assert_eq!(s.backend, BackendKind::Postgres);
        assert_eq!(s.subscriber_config().buffer_capacity, 8);
        assert_eq!(
            s.subscriber_config().stream_grace,
            Duration::from_millis(500)
        );
        assert_eq!(s.logging.format, crate::logging::LogFormat::Json);
        assert_eq!(s.pool_max_size, 20);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_error() {
        clear_env();
        assert!(Settings::load(Some(Path::new("/nonexistent/streamrelay.toml"))).is_err());
    }

    #[test]
    #[serial]
    fn test_zero_pool_rejected() {
        clear_env();
        env::set_var("STREAMRELAY_POOL_MAX_SIZE", "0");
        let res = Settings::load(None);
        clear_env();
        assert!(res.is_err());
    }

    #[test]
    #[serial]
    fn test_postgres_without_url_fails() {
        clear_env();
        env::set_var("STREAMRELAY_BACKEND", "postgres");
        let s = Settings::load(None);
        clear_env();
        assert!(s.unwrap().build_backend().is_err());
    }

    #[test]
    #[serial]
    fn test_build_memory_backend() {
        clear_env();
        let backend = Settings::load(None).unwrap().build_backend().unwrap();
        assert_eq!(backend.describe(), "memory");
    }
}
