use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use streamrelay_error::{SubscriberError, TransportError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::{
    bridge::{
        PullBridge, Pushed, DEFAULT_BUFFER_CAPACITY, DEFAULT_IDLE_TICK, DEFAULT_STREAM_GRACE,
    },
    handlers::{HandlerId, HandlerRegistry},
    Envelope, EnvelopeStream, Lifecycle, State,
};
use crate::backend::{Backend, Connected, Connection, ListenEvent, Notifications};

/// Параметры подписчика.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberConfig {
    /// Интервал холостой перепроверки закрытия в pull-итерации.
    pub idle_tick: Duration,
    /// Предел буфера pull-доставки.
    pub buffer_capacity: usize,
    /// Если за это время после `start` поток не взят, буферизация
    /// приостанавливается до вызова [`Subscriber::stream`].
    pub stream_grace: Duration,
}

/// Снимок счётчиков подписчика.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Совпавшие конверты, переданные обоим путям доставки.
    pub delivered: u64,
    /// Конверты с чужим `source`.
    pub filtered_out: u64,
    /// Payload, не разобранные как конверт.
    pub malformed: u64,
    /// Конверты, вытесненные из переполненного pull-буфера.
    pub overflowed: u64,
}

/// Состояние, разделяемое с задачей доставки.
struct Shared {
    channel: Arc<str>,
    subscription_id: String,
    handlers: RwLock<HandlerRegistry>,
    /// Диспетчеризация держит read, `close` берёт write: после закрытия ни
    /// один обработчик не вызывается и ни один конверт не буферизуется.
    gate: RwLock<()>,
    bridge: Arc<PullBridge>,
    delivered: AtomicU64,
    filtered_out: AtomicU64,
    malformed: AtomicU64,
}

#[derive(Default)]
struct Runtime {
    connection: Option<Box<dyn Connection>>,
    delivery: Option<JoinHandle<()>>,
}

/// Подписчик на один канал с фильтром по идентификатору подписки.
///
/// Совпавшие конверты доставляются одновременно двумя путями: синхронно
/// зарегистрированным обработчикам и в буфер pull-итерации
/// ([`Subscriber::stream`]). Конструктор не выполняет ввода-вывода;
/// соединение открывает [`Subscriber::start`].
///
/// Обработчики вызываются на задаче доставки вне блокировки реестра, поэтому
/// обработчик может снять сам себя или зарегистрировать новый. Изменения
/// реестра вступают в силу со следующего конверта.
pub struct Subscriber {
    backend: Arc<dyn Backend>,
    config: SubscriberConfig,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    /// Сериализует `start` и `close`.
    runtime: tokio::sync::Mutex<Runtime>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Subscriber {
    pub fn new(
        backend: Arc<dyn Backend>,
        channel: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self::with_config(backend, channel, subscription_id, SubscriberConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn Backend>,
        channel: impl Into<String>,
        subscription_id: impl Into<String>,
        config: SubscriberConfig,
    ) -> Self {
        let channel: String = channel.into();
        Self {
            backend,
            config,
            shared: Arc::new(Shared {
                channel: Arc::from(channel),
                subscription_id: subscription_id.into(),
                handlers: RwLock::new(HandlerRegistry::default()),
                gate: RwLock::new(()),
                bridge: Arc::new(PullBridge::new(config.buffer_capacity)),
                delivered: AtomicU64::new(0),
                filtered_out: AtomicU64::new(0),
                malformed: AtomicU64::new(0),
            }),
            lifecycle: Mutex::new(Lifecycle::new()),
            runtime: tokio::sync::Mutex::new(Runtime::default()),
        }
    }

    pub fn channel(&self) -> &str {
        &self.shared.channel
    }

    pub fn subscription_id(&self) -> &str {
        &self.shared.subscription_id
    }

    pub fn state(&self) -> State {
        self.lifecycle.lock().state()
    }

    /// Открывает выделенное соединение и начинает слушать канал.
    ///
    /// При ошибке транспорта экземпляр остаётся в `Idle`, и вызов можно
    /// повторить.
    pub async fn start(&self) -> Result<(), SubscriberError> {
        let mut runtime = self.runtime.lock().await;
        self.lifecycle.lock().check_start()?;

        let Connected {
            mut connection,
            notifications,
        } = self.backend.connect().await?;

        if let Err(err) = connection.listen(&self.shared.channel).await {
            if let Err(close_err) = connection.close().await {
                debug!(error = %close_err, "Failed to close connection after LISTEN error");
            }
            warn!(
                channel = %self.shared.channel,
                error = %err,
                "Subscriber failed to start"
            );
            return Err(err.into());
        }

        self.lifecycle.lock().mark_listening()?;
        self.shared.bridge.arm(self.config.stream_grace);
        runtime.connection = Some(connection);
        runtime.delivery = Some(tokio::spawn(deliver(
            Arc::clone(&self.shared),
            notifications,
        )));

        info!(
            channel = %self.shared.channel,
            subscription_id = %self.shared.subscription_id,
            backend = %self.backend.describe(),
            "Subscriber listening"
        );
        Ok(())
    }

    /// Регистрирует push-обработчик совпавших конвертов.
    pub fn register_handler<F>(
        &self,
        handler: F,
    ) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.shared.handlers.write().add_update(Arc::new(handler))
    }

    /// Устанавливает единственный callback, вызываемый после обработчиков.
    /// Предыдущий callback заменяется.
    pub fn set_update_callback<F>(
        &self,
        callback: F,
    ) where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.shared.handlers.write().set_callback(Arc::new(callback));
    }

    /// Регистрирует обработчик ошибок слушающего соединения.
    pub fn on_error<F>(
        &self,
        handler: F,
    ) -> HandlerId
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.shared.handlers.write().add_error(Arc::new(handler))
    }

    pub fn remove_handler(
        &self,
        id: HandlerId,
    ) -> bool {
        self.shared.handlers.write().remove(id)
    }

    /// Pull-последовательность совпавших конвертов.
    ///
    /// Выдаётся один раз на экземпляр; повторный вызов возвращает
    /// [`SubscriberError::StreamTaken`].
    pub fn stream(&self) -> Result<EnvelopeStream, SubscriberError> {
        self.shared.bridge.take(self.config.idle_tick)
    }

    /// Закрывает подписчика.
    ///
    /// После возврата ни один обработчик не будет вызван и ни один конверт
    /// не попадёт в буфер. Ошибки `UNLISTEN`/закрытия соединения
    /// логируются; экземпляр закрывается в любом случае.
    pub async fn close(&self) -> Result<(), SubscriberError> {
        let mut runtime = self.runtime.lock().await;
        let previous = self.lifecycle.lock().close()?;

        {
            // Ждёт текущую диспетчеризацию; новые после этого не начнутся.
            let _gate = self.shared.gate.write();
            self.shared.handlers.write().close();
            self.shared.bridge.close();
        }

        if let Some(mut connection) = runtime.connection.take() {
            if let Err(err) = connection.unlisten(&self.shared.channel).await {
                warn!(channel = %self.shared.channel, error = %err, "UNLISTEN failed during close");
            }
            if let Err(err) = connection.close().await {
                warn!(channel = %self.shared.channel, error = %err, "Connection close failed");
            }
        }
        if let Some(delivery) = runtime.delivery.take() {
            delivery.abort();
        }

        info!(
            channel = %self.shared.channel,
            subscription_id = %self.shared.subscription_id,
            from = %previous,
            "Subscriber closed"
        );
        Ok(())
    }

    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            filtered_out: self.shared.filtered_out.load(Ordering::Relaxed),
            malformed: self.shared.malformed.load(Ordering::Relaxed),
            overflowed: self.shared.bridge.overflowed(),
        }
    }
}

impl Shared {
    /// Фильтр: разбор, сравнение `source`, доставка обоим путям.
    fn dispatch(
        &self,
        raw: &str,
    ) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(channel = %self.channel, error = %err, "Dropping malformed envelope");
                return;
            }
        };

        if !envelope.is_from(&self.subscription_id) {
            self.filtered_out.fetch_add(1, Ordering::Relaxed);
            trace!(channel = %self.channel, source = %envelope.source, "Envelope filtered out");
            return;
        }

        let _gate = self.gate.read();
        let handlers = {
            let registry = self.handlers.read();
            if registry.is_closed() {
                return;
            }
            registry.update_handlers()
        };
        for handler in &handlers {
            handler(&envelope);
        }
        if self.bridge.push(envelope) == Pushed::Rejected {
            trace!(channel = %self.channel, "Pull path inactive, envelope not buffered");
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Сбой слушающего соединения.
    fn fail(
        &self,
        err: TransportError,
    ) {
        let _gate = self.gate.read();
        let handlers = {
            let registry = self.handlers.read();
            if registry.is_closed() {
                return;
            }
            registry.error_handlers()
        };
        if handlers.is_empty() {
            error!(
                channel = %self.channel,
                subscription_id = %self.subscription_id,
                error = %err,
                "Listening connection failed"
            );
        } else {
            for handler in &handlers {
                handler(&err);
            }
        }
        self.bridge.fail(err);
    }
}

/// Задача доставки: читает уведомления последовательно и запускает фильтр.
async fn deliver(
    shared: Arc<Shared>,
    mut notifications: Notifications,
) {
    while let Some(event) = notifications.recv().await {
        match event {
            ListenEvent::Payload { channel, payload } => {
                if channel != shared.channel {
                    continue;
                }
                shared.dispatch(&payload);
            }
            ListenEvent::Error(err) => {
                shared.fail(err);
                return;
            }
        }
    }
    // Собственный `close` уже закрыл реестр, и `fail` ничего не сделает.
    shared.fail(TransportError::ConnectionLost {
        reason: "notification stream ended".to_string(),
    });
}

////////////////////////////////////////////////////////////////////////////////
// Реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            idle_tick: DEFAULT_IDLE_TICK,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            stream_grace: DEFAULT_STREAM_GRACE,
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().is_closed() {
            return;
        }
        {
            let _gate = self.shared.gate.write();
            self.shared.handlers.write().close();
            self.shared.bridge.close();
        }
        if let Some(delivery) = self.runtime.get_mut().delivery.take() {
            delivery.abort();
        }
        debug!(channel = %self.shared.channel, "Subscriber dropped without close");
    }
}
