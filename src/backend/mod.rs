//! Примитив вещания: именованные каналы со строковым payload, без
//! персистентности и без гарантий доставки отключённым слушателям.
//!
//! - `memory`: внутрипроцессный хаб на `tokio::sync::broadcast`.
//! - `postgres` (feature `postgres`): `LISTEN`/`NOTIFY` PostgreSQL.
//! - `ident`: проверка и экранирование имён каналов и payload.

pub mod ident;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use streamrelay_error::TransportError;
use tokio::sync::mpsc;

pub use memory::MemoryBackend;
#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;

/// Событие слушающего соединения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenEvent {
    /// Сырой payload, пришедший по каналу.
    Payload { channel: Arc<str>, payload: String },
    /// Сигнал ошибки транспорта, отдельный от потока данных.
    Error(TransportError),
}

pub type NotificationSender = mpsc::UnboundedSender<ListenEvent>;

/// Очередь уведомлений одного соединения.
///
/// Транспорт пишет в неё последовательно, поэтому порядок чтения равен
/// порядку поступления. `recv` возвращает `None`, когда соединение закрыто
/// и все события прочитаны.
#[derive(Debug)]
pub struct Notifications {
    rx: mpsc::UnboundedReceiver<ListenEvent>,
}

impl Notifications {
    pub fn channel() -> (NotificationSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    pub async fn recv(&mut self) -> Option<ListenEvent> {
        self.rx.recv().await
    }
}

/// Результат подключения: командная часть и очередь уведомлений.
pub struct Connected {
    pub connection: Box<dyn Connection>,
    pub notifications: Notifications,
}

/// Цель подключения к примитиву вещания.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Описание цели для логов (без учётных данных).
    fn describe(&self) -> String;

    /// Открывает новое выделенное соединение.
    async fn connect(&self) -> Result<Connected, TransportError>;
}

/// Командная часть соединения.
#[async_trait]
pub trait Connection: Send {
    /// Fire-and-forget вещание `payload` всем текущим слушателям `channel`.
    async fn notify(
        &mut self,
        channel: &str,
        payload: &str,
    ) -> Result<(), TransportError>;

    /// Подписывает соединение на `channel`.
    async fn listen(
        &mut self,
        channel: &str,
    ) -> Result<(), TransportError>;

    /// Отписывает соединение от `channel`.
    async fn unlisten(
        &mut self,
        channel: &str,
    ) -> Result<(), TransportError>;

    /// Закрывает соединение; очередь уведомлений после этого завершается.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Соединение больше непригодно для команд.
    fn is_closed(&self) -> bool;
}
