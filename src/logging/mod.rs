pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use self::config::{LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов возвращает ошибку.
pub fn init_logging(
    config: &LoggingConfig
) -> Result<LoggingHandle, Box<dyn std::error::Error + Send + Sync>> {
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter(config);
    let mut layers = Vec::new();

    if config.console_enabled {
        layers.push(sinks::console::layer(config));
    }

    let file_guard = if config.file_enabled {
        let (file_layer, guard) = sinks::file::layer(config);
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.build_filter_directive(),
        format = %config.format,
        console_enabled = config.console_enabled,
        file_enabled = config.file_enabled,
        log_dir = %config.log_dir.display(),
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
