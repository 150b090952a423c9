use std::io::{self, Stderr};

use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{
    config::LoggingConfig,
    formatter::{self, FormatOptions},
};

/// Консольный слой.
///
/// Пишет в stderr: stdout занят выводом конвертов в CLI.
pub fn layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let writer: fn() -> Stderr = io::stderr;
    formatter::build_layer(
        FormatOptions {
            format: config.format,
            with_ansi: config.with_ansi,
            with_target: config.with_target,
        },
        writer,
    )
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;
    use crate::logging::config::LogFormat;

    /// Тест проверяет, что слой строится и принимает события во всех
    /// форматах.
    #[test]
    fn test_layer_for_every_format() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            let cfg = LoggingConfig {
                format,
                with_ansi: false,
                ..Default::default()
            };
            let subscriber = Registry::default().with(layer::<Registry>(&cfg));
            tracing::subscriber::with_default(subscriber, || {
                info!(%format, "console layer smoke test");
            });
        }
    }
}
