use std::sync::Arc;

use streamrelay_error::TransportError;

use super::Envelope;

/// Push-обработчик совпавших конвертов.
pub type UpdateHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;
/// Обработчик ошибок слушающего соединения.
pub type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Идентификатор зарегистрированного обработчика.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Упорядоченный список обработчиков одного подписчика.
///
/// Реестр только хранит обработчики: вызывающий код берёт снимок и вызывает
/// его уже без блокировки реестра. После `close` регистрация молча
/// отбрасывает обработчик, а снимки пусты.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: u64,
    updates: Vec<(HandlerId, UpdateHandler)>,
    callback: Option<UpdateHandler>,
    errors: Vec<(HandlerId, ErrorHandler)>,
    closed: bool,
}

impl HandlerRegistry {
    fn next_id(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    pub(crate) fn add_update(
        &mut self,
        handler: UpdateHandler,
    ) -> HandlerId {
        let id = self.next_id();
        if !self.closed {
            self.updates.push((id, handler));
        }
        id
    }

    pub(crate) fn set_callback(
        &mut self,
        handler: UpdateHandler,
    ) {
        if !self.closed {
            self.callback = Some(handler);
        }
    }

    pub(crate) fn add_error(
        &mut self,
        handler: ErrorHandler,
    ) -> HandlerId {
        let id = self.next_id();
        if !self.closed {
            self.errors.push((id, handler));
        }
        id
    }

    pub(crate) fn remove(
        &mut self,
        id: HandlerId,
    ) -> bool {
        let before = self.updates.len() + self.errors.len();
        self.updates.retain(|(h, _)| *h != id);
        self.errors.retain(|(h, _)| *h != id);
        before != self.updates.len() + self.errors.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Снимок обработчиков обновлений в порядке вызова: зарегистрированные
    /// по порядку, callback последним.
    pub(crate) fn update_handlers(&self) -> Vec<UpdateHandler> {
        self.updates
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .chain(self.callback.clone())
            .collect()
    }

    pub(crate) fn error_handlers(&self) -> Vec<ErrorHandler> {
        self.errors
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    /// Сбрасывает все обработчики; дальнейшие регистрации игнорируются.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.updates.clear();
        self.callback = None;
        self.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    fn emit(
        reg: &HandlerRegistry,
        envelope: &Envelope,
    ) {
        for handler in reg.update_handlers() {
            handler(envelope);
        }
    }

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    ) -> UpdateHandler {
        let log = Arc::clone(log);
        Arc::new(move |env: &Envelope| log.lock().push(format!("{tag}:{}", env.data)))
    }

    /// Тест проверяет порядок вызова: обработчики по порядку регистрации,
    /// callback последним.
    #[test]
    fn test_emit_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = HandlerRegistry::default();
        reg.set_callback(recorder(&log, "cb"));
        reg.add_update(recorder(&log, "first"));
        reg.add_update(recorder(&log, "second"));

        emit(&reg, &Envelope::new("u-s", "x"));
        assert_eq!(*log.lock(), vec!["first:x", "second:x", "cb:x"]);
    }

    #[test]
    fn test_set_callback_replaces_previous() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = HandlerRegistry::default();
        reg.set_callback(recorder(&log, "old"));
        reg.set_callback(recorder(&log, "new"));
        emit(&reg, &Envelope::new("u-s", "x"));
        assert_eq!(*log.lock(), vec!["new:x"]);
    }

    #[test]
    fn test_remove_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = HandlerRegistry::default();
        let id = reg.add_update(recorder(&log, "gone"));
        reg.add_update(recorder(&log, "kept"));

        assert!(reg.remove(id));
        assert!(!reg.remove(id));
        emit(&reg, &Envelope::new("u-s", "x"));
        assert_eq!(*log.lock(), vec!["kept:x"]);
    }

    /// Тест проверяет, что после закрытия обработчики сброшены и новые не
    /// принимаются.
    #[test]
    fn test_close_drops_everything() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = HandlerRegistry::default();
        reg.add_update(recorder(&log, "h"));
        reg.add_error(Arc::new(|_: &TransportError| {}));
        reg.close();

        reg.add_update(recorder(&log, "late"));
        emit(&reg, &Envelope::new("u-s", "x"));
        assert!(log.lock().is_empty());
        assert!(reg.is_closed());
        assert!(reg.update_handlers().is_empty());
        assert!(reg.error_handlers().is_empty());
    }
}
