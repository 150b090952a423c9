use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{
    config::LoggingConfig,
    formatter::{self, FormatOptions},
};

/// Файловый слой с ежедневной ротацией и неблокирующей записью.
///
/// `WorkerGuard` нужно держать до завершения программы: его drop
/// сбрасывает буфер на диск.
pub fn layer<S>(config: &LoggingConfig) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let appender = rolling::daily(&config.log_dir, &config.file_name);
    let (writer, guard) = non_blocking(appender);

    let layer = formatter::build_layer(
        FormatOptions {
            format: config.format,
            with_ansi: false,
            with_target: true,
        },
        writer,
    );
    (layer, guard)
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что после drop guard-а событие оказывается в файле.
    #[test]
    fn test_file_layer_writes_after_guard_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            file_enabled: true,
            log_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };

        let (layer, guard) = layer::<Registry>(&cfg);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("written to file");
        });
        drop(guard);

        let mut found = false;
        for entry in std::fs::read_dir(tmp.path()).unwrap() {
            let text = std::fs::read_to_string(entry.unwrap().path()).unwrap();
            found |= text.contains("written to file");
        }
        assert!(found);
    }
}
