use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового приёмника; `shutdown` сбрасывает буфер.
#[must_use = "dropping the handle flushes and stops the file sink"]
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    pub(crate) fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self { file_guard }
    }

    /// Включён ли файловый приёмник.
    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Сбрасывает буферы и останавливает фоновую запись.
    pub fn shutdown(mut self) {
        tracing::debug!(file_sink = self.has_file_sink(), "Logging shutdown");
        drop(self.file_guard.take());
    }
}
