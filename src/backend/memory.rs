use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use streamrelay_error::TransportError;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::{
    ident::{validate_channel, validate_payload},
    Backend, Connected, Connection, ListenEvent, NotificationSender, Notifications,
};

type ChannelKey = Arc<str>;

/// Ёмкость буфера каждого канала по умолчанию.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Внутрипроцессный примитив вещания.
///
/// Каждый канал представлен `broadcast::Sender`; каждое слушающее соединение держит
/// свой `Receiver` и пересылает payload в очередь уведомлений. Сообщение,
/// отправленное в канал без слушателей, теряется, как и у `NOTIFY`.
///
/// Клонирование дёшево: клоны разделяют один хаб.
#[derive(Clone)]
pub struct MemoryBackend {
    hub: Arc<Hub>,
}

struct Hub {
    /// Каналы → `Sender`
    channels: DashMap<ChannelKey, broadcast::Sender<Arc<str>>>,
    /// Ёмкость буфера каждого `broadcast::channel`
    capacity: usize,
    /// Хаб остановлен: новые соединения и команды отвергаются
    shut_down: AtomicBool,
    /// Общее количество вызовов `notify`
    publish_count: AtomicUsize,
    /// Количество неудачных `send` (нет слушателей)
    send_error_count: AtomicUsize,
}

/// Соединение с внутрипроцессным хабом.
pub struct MemoryConnection {
    hub: Arc<Hub>,
    events: Option<NotificationSender>,
    listeners: HashMap<ChannelKey, JoinHandle<()>>,
    closed: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl MemoryBackend {
    /// Создаёт хаб с заданной ёмкостью буфера канала.
    pub fn new(capacity: usize) -> Self {
        Self {
            hub: Arc::new(Hub {
                channels: DashMap::new(),
                capacity: capacity.max(1),
                shut_down: AtomicBool::new(false),
                publish_count: AtomicUsize::new(0),
                send_error_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Количество вызовов `notify` за всё время.
    pub fn publish_count(&self) -> usize {
        self.hub.publish_count.load(Ordering::Relaxed)
    }

    /// Количество `notify` в канал, где не осталось слушателей.
    pub fn send_error_count(&self) -> usize {
        self.hub.send_error_count.load(Ordering::Relaxed)
    }

    /// Число слушателей канала.
    pub fn listener_count(
        &self,
        channel: &str,
    ) -> usize {
        self.hub
            .channels
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Останавливает хаб: все слушатели получают `ConnectionLost`, новые
    /// подключения и команды отвергаются.
    pub fn shutdown(&self) {
        self.hub.shut_down.store(true, Ordering::Release);
        // Drop всех `Sender` закрывает receivers после выдачи буфера.
        self.hub.channels.clear();
        debug!("Memory backend shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.hub.is_shut_down()
    }
}

impl Hub {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::ConnectionLost {
                reason: "memory backend shut down".to_string(),
            });
        }
        Ok(())
    }

    fn subscribe(
        &self,
        channel: &str,
    ) -> broadcast::Receiver<Arc<str>> {
        let key: ChannelKey = Arc::from(channel);
        self.channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Рассылает payload всем текущим слушателям канала.
    ///
    /// Канал без слушателей удаляется; следующая подписка создаст его заново.
    fn notify(
        &self,
        channel: &str,
        payload: &str,
    ) {
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        let Some(tx) = self.channels.get(channel).map(|entry| entry.value().clone()) else {
            return;
        };
        if tx.send(Arc::from(payload)).is_err() {
            self.send_error_count.fetch_add(1, Ordering::Relaxed);
            self.channels
                .remove_if(channel, |_, tx| tx.receiver_count() == 0);
        }
    }
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.hub.ensure_running()
    }

    fn stop_listeners(&mut self) {
        for (_, handle) in self.listeners.drain() {
            handle.abort();
        }
    }
}

/// Пересылает payload одного канала в очередь уведомлений соединения.
async fn forward(
    channel: ChannelKey,
    mut rx: broadcast::Receiver<Arc<str>>,
    events: NotificationSender,
) {
    loop {
        let event = match rx.recv().await {
            Ok(payload) => ListenEvent::Payload {
                channel: channel.clone(),
                payload: payload.to_string(),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(channel = %channel, skipped, "Memory listener lagged, notifications lost");
                continue;
            }
            Err(RecvError::Closed) => {
                let _ = events.send(ListenEvent::Error(TransportError::ConnectionLost {
                    reason: format!("channel '{channel}' closed by memory backend"),
                }));
                return;
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn connect(&self) -> Result<Connected, TransportError> {
        if self.hub.is_shut_down() {
            return Err(TransportError::ConnectionFailed {
                target: self.describe(),
                reason: "backend shut down".to_string(),
            });
        }
        let (events, notifications) = Notifications::channel();
        let connection = MemoryConnection {
            hub: Arc::clone(&self.hub),
            events: Some(events),
            listeners: HashMap::new(),
            closed: false,
        };
        Ok(Connected {
            connection: Box::new(connection),
            notifications,
        })
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn notify(
        &mut self,
        channel: &str,
        payload: &str,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        validate_channel(channel)?;
        validate_payload(payload)?;
        self.hub.notify(channel, payload);
        Ok(())
    }

    async fn listen(
        &mut self,
        channel: &str,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        validate_channel(channel)?;
        if self.listeners.contains_key(channel) {
            return Ok(());
        }
        let events = self.events.clone().ok_or(TransportError::Closed)?;
        let key: ChannelKey = Arc::from(channel);
        let rx = self.hub.subscribe(channel);
        let handle = tokio::spawn(forward(key.clone(), rx, events));
        self.listeners.insert(key, handle);
        Ok(())
    }

    async fn unlisten(
        &mut self,
        channel: &str,
    ) -> Result<(), TransportError> {
        validate_channel(channel)?;
        if let Some(handle) = self.listeners.remove(channel) {
            handle.abort();
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.stop_listeners();
        self.events = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed || self.hub.is_shut_down()
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.stop_listeners();
    }
}
