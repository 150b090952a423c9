use tracing_subscriber::EnvFilter;

use super::config::LoggingConfig;

/// Фильтр событий: `RUST_LOG`, если задан, иначе директива из конфигурации.
/// Некорректная директива заменяется на `info`.
pub(crate) fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter directive '{directive}': {e}; falling back to 'info'");
        EnvFilter::new("info")
    })
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        io::Write,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn capture(filter: EnvFilter) -> String {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("info event");
            tracing::warn!("warn event");
        });
        buffer.contents()
    }

    /// Тест проверяет, что директива из конфигурации отсекает уровни ниже
    /// заданного.
    #[test]
    #[serial]
    fn test_config_directive_filters_levels() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        let out = capture(build_filter(&cfg));
        assert!(out.contains("warn event"));
        assert!(!out.contains("info event"));
    }

    /// Тест проверяет откат на `info` при некорректной директиве.
    #[test]
    #[serial]
    fn test_invalid_directive_falls_back_to_info() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "this_is_invalid_directive!!".to_string(),
            ..Default::default()
        };
        let out = capture(build_filter(&cfg));
        assert!(out.contains("info event"));
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        env::set_var("RUST_LOG", "error");
        let cfg = LoggingConfig {
            level: "info".to_string(),
            ..Default::default()
        };
        let out = capture(build_filter(&cfg));
        env::remove_var("RUST_LOG");
        assert!(!out.contains("warn event"));
    }
}
