use tracing_subscriber::{fmt, fmt::MakeWriter, layer::Layer, registry::LookupSpan};

use super::config::LogFormat;

/// Параметры форматирования одного приёмника.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FormatOptions {
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
}

/// Собирает fmt-слой в нужном формате поверх `writer`.
///
/// Конкретный тип формата стирается в `Box<dyn Layer>`.
pub(crate) fn build_layer<S, W>(
    options: FormatOptions,
    writer: W,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(options.with_ansi)
        .with_target(options.with_target);

    match options.format {
        LogFormat::Pretty => Box::new(layer.pretty()),
        LogFormat::Compact => Box::new(layer.compact()),
        LogFormat::Json => Box::new(layer.json().with_current_span(true)),
    }
}
