//! Мост между событийной доставкой и pull-итерацией.
//!
//! Фильтр подписчика кладёт совпавшие конверты в FIFO-буфер и будит
//! ожидающего потребителя; `EnvelopeStream` забирает их в порядке
//! поступления. Буфер, флаг закрытия и ошибка транспорта живут под одним
//! мьютексом, а `Notify` хранит permit, если потребитель ещё не успел
//! заснуть, поэтому пробуждение между «добавить + разбудить» и
//! «проверить пусто + заснуть» не теряется.
//!
//! Если за `stream_grace` после старта поток так и не взят, буфер
//! очищается и перестаёт пополняться: подписчик, работающий только через
//! обработчики, не копит конверты, которые никто не прочитает. Взятие
//! потока возобновляет буферизацию.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures::Stream;
use parking_lot::Mutex;
use streamrelay_error::{SubscriberError, TransportError};
use tokio::{
    sync::Notify,
    time::{timeout, Instant},
};
use tracing::{debug, trace, warn};

use super::Envelope;

/// Интервал холостой перепроверки закрытия при отсутствии трафика.
pub const DEFAULT_IDLE_TICK: Duration = Duration::from_secs(1);
/// Ёмкость буфера pull-доставки по умолчанию.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;
/// Сколько буфер ждёт первого `stream()` после старта.
pub const DEFAULT_STREAM_GRACE: Duration = Duration::from_secs(10);

/// Итог попытки добавить конверт в буфер.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pushed {
    Appended,
    /// Добавлен, но самый старый конверт вытеснен.
    Overflowed,
    /// Мост закрыт, отсоединён или приостановлен.
    Rejected,
}

#[derive(Debug, Default)]
struct BridgeState {
    queue: VecDeque<Envelope>,
    closed: bool,
    detached: bool,
    taken: bool,
    /// Буферизация приостановлена: поток не взят вовремя.
    dormant: bool,
    claim_deadline: Option<Instant>,
    /// Идёт эпизод переполнения; предупреждение уже выдано.
    overflowing: bool,
    failure: Option<TransportError>,
    overflowed: u64,
}

impl BridgeState {
    fn claim_expired(&self) -> bool {
        !self.taken && self.claim_deadline.is_some_and(|d| Instant::now() >= d)
    }
}

enum Ready {
    Item(Envelope),
    Failed(TransportError),
    Ended,
    Empty,
}

#[derive(Debug)]
pub(crate) struct PullBridge {
    state: Mutex<BridgeState>,
    wake: Notify,
    capacity: usize,
}

impl PullBridge {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            wake: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(
        &self,
        envelope: Envelope,
    ) -> Pushed {
        let (outcome, episode_started) = {
            let mut st = self.state.lock();
            if st.closed || st.detached || st.dormant {
                return Pushed::Rejected;
            }
            if st.claim_expired() {
                st.dormant = true;
                let discarded = st.queue.len();
                st.queue.clear();
                st.overflowing = false;
                drop(st);
                debug!(discarded, "No stream taken in time, pull buffering suspended");
                return Pushed::Rejected;
            }
            let (outcome, episode_started) = if st.queue.len() >= self.capacity {
                st.queue.pop_front();
                st.overflowed += 1;
                let started = !st.overflowing;
                st.overflowing = true;
                (Pushed::Overflowed, started)
            } else {
                (Pushed::Appended, false)
            };
            st.queue.push_back(envelope);
            (outcome, episode_started)
        };

        if episode_started {
            warn!(
                capacity = self.capacity,
                "Pull buffer full, dropping oldest envelopes until it drains"
            );
        }
        self.wake.notify_one();
        outcome
    }

    /// Запускает отсчёт `grace`: не взятый к этому сроку поток приостановит
    /// буферизацию.
    pub(crate) fn arm(
        &self,
        grace: Duration,
    ) {
        let mut st = self.state.lock();
        if !st.taken {
            st.claim_deadline = Some(Instant::now() + grace);
        }
    }

    /// Закрывает мост: новые конверты не принимаются, поток завершится
    /// после выдачи уже буферизованных.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.wake.notify_one();
    }

    /// Сбой транспорта: поток выдаст буфер, затем ошибку, затем завершится.
    pub(crate) fn fail(
        &self,
        err: TransportError,
    ) {
        {
            let mut st = self.state.lock();
            if st.closed || st.failure.is_some() {
                return;
            }
            st.failure = Some(err);
        }
        self.wake.notify_one();
    }

    /// Отсоединяет pull-путь: буфер очищается, фильтр больше не пишет в него.
    pub(crate) fn detach(&self) {
        let mut st = self.state.lock();
        st.detached = true;
        st.overflowing = false;
        st.queue.clear();
    }

    pub(crate) fn take(
        self: &Arc<Self>,
        idle_tick: Duration,
    ) -> Result<EnvelopeStream, SubscriberError> {
        let mut st = self.state.lock();
        if st.taken {
            return Err(SubscriberError::StreamTaken);
        }
        st.taken = true;
        if st.dormant {
            st.dormant = false;
            debug!("Stream taken, pull buffering resumed");
        }
        Ok(EnvelopeStream {
            bridge: Arc::clone(self),
            idle_tick,
            finished: false,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn overflowed(&self) -> u64 {
        self.state.lock().overflowed
    }

    fn poll_ready(&self) -> Ready {
        let mut st = self.state.lock();
        if let Some(envelope) = st.queue.pop_front() {
            if st.queue.is_empty() {
                st.overflowing = false;
            }
            return Ready::Item(envelope);
        }
        if let Some(err) = st.failure.take() {
            return Ready::Failed(err);
        }
        if st.closed || st.detached {
            return Ready::Ended;
        }
        Ready::Empty
    }
}

/// Pull-последовательность конвертов одного подписчика.
///
/// Выдаёт конверты в порядке поступления, пока подписчик не закрыт.
/// Пустой буфер не завершает поток: итерация ждёт пробуждения или тика.
/// Drop отсоединяет pull-путь независимо от того, как закончилась
/// итерация.
#[derive(Debug)]
pub struct EnvelopeStream {
    bridge: Arc<PullBridge>,
    idle_tick: Duration,
    finished: bool,
}

impl EnvelopeStream {
    /// Следующий конверт.
    ///
    /// - `Some(Ok(envelope))`: очередной конверт;
    /// - `Some(Err(_))`: соединение подписчика оборвалось (выдаётся один раз
    ///   после буферизованных конвертов);
    /// - `None`: поток завершён.
    pub async fn next(&mut self) -> Option<Result<Envelope, SubscriberError>> {
        if self.finished {
            return None;
        }
        loop {
            match self.bridge.poll_ready() {
                Ready::Item(envelope) => return Some(Ok(envelope)),
                Ready::Failed(err) => {
                    self.finished = true;
                    return Some(Err(err.into()));
                }
                Ready::Ended => {
                    self.finished = true;
                    trace!("Envelope stream ended");
                    return None;
                }
                Ready::Empty => {}
            }
            // Явное пробуждение или холостой тик: в обоих случаях перепроверка.
            let _ = timeout(self.idle_tick, self.bridge.wake.notified()).await;
        }
    }

    /// Количество конвертов, ожидающих выдачи.
    pub fn buffered(&self) -> usize {
        self.bridge.len()
    }

    /// Адаптер к [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Envelope, SubscriberError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|item| (item, stream))
        })
    }
}

impl Drop for EnvelopeStream {
    fn drop(&mut self) {
        self.bridge.detach();
    }
}
