//! Ретрансляция: фильтрованные упорядоченные потоки поверх общего канала
//! вещания.
//!
//! - `envelope`: единица обмена `{source, data, timestamp}`.
//! - `publisher`: издатель с пулом соединений.
//! - `subscriber`: подписчик с фильтром и двумя путями доставки.
//! - `lifecycle`: машина состояний подписчика.
//! - `bridge`: буфер и пробуждение для pull-итерации.
//! - `handlers` (приватный): реестр push-обработчиков.
//! - `pool` (приватный): ограниченный пул соединений издателя.

pub mod bridge;
pub mod envelope;
mod handlers;
pub mod lifecycle;
mod pool;
pub mod publisher;
pub mod subscriber;

pub use bridge::{EnvelopeStream, DEFAULT_BUFFER_CAPACITY, DEFAULT_IDLE_TICK};
pub use envelope::Envelope;
pub use handlers::{ErrorHandler, HandlerId, UpdateHandler};
pub use lifecycle::{Lifecycle, State};
pub use pool::DEFAULT_POOL_MAX_SIZE;
pub use publisher::{Publisher, PublisherConfig, PublisherStats};
pub use subscriber::{Subscriber, SubscriberConfig, SubscriberStats};
