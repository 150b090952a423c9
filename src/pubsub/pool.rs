use std::sync::Arc;

use parking_lot::Mutex;
use streamrelay_error::{ErrorExt, TransportError};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

use crate::backend::{Backend, Connected, Connection};

/// Размер пула издателя по умолчанию.
pub const DEFAULT_POOL_MAX_SIZE: usize = 20;

/// Ограниченный пул командных соединений издателя.
///
/// Семафор ограничивает число одновременно выданных соединений;
/// свободные соединения переиспользуются, новые открываются лениво.
pub(crate) struct ConnectionPool {
    backend: Arc<dyn Backend>,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    permits: Semaphore,
    max_size: usize,
}

/// Соединение, взятое из пула.
///
/// При drop возвращается в пул, если не было помечено сломанным.
pub(crate) struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    connection: Option<Box<dyn Connection>>,
    broken: bool,
    _permit: SemaphorePermit<'a>,
}

impl ConnectionPool {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        max_size: usize,
    ) -> Self {
        let max_size = max_size.max(1);
        Self {
            backend,
            idle: Mutex::new(Vec::with_capacity(max_size)),
            permits: Semaphore::new(max_size),
            max_size,
        }
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn max_size(&self) -> usize {
        self.max_size
    }

    #[cfg(test)]
    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Берёт соединение, ожидая свободный слот.
    pub(crate) async fn get(&self) -> Result<PooledConnection<'_>, TransportError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransportError::Closed)?;

        let reused = loop {
            match self.idle.lock().pop() {
                Some(conn) if conn.is_closed() => {
                    debug!("Discarding closed pooled connection");
                }
                other => break other,
            }
        };

        let connection = match reused {
            Some(conn) => conn,
            None => {
                // Очередь уведомлений не нужна: издатель не слушает каналы.
                let Connected { connection, .. } = self.backend.connect().await?;
                debug!(backend = %self.backend.describe(), "Opened pooled connection");
                connection
            }
        };

        Ok(PooledConnection {
            pool: self,
            connection: Some(connection),
            broken: false,
            _permit: permit,
        })
    }

    fn release(
        &self,
        connection: Box<dyn Connection>,
    ) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_size {
            idle.push(connection);
        }
    }
}

impl PooledConnection<'_> {
    /// `notify` через взятое соединение. Транспортная ошибка помечает
    /// соединение сломанным; ошибки аргументов его не затрагивают.
    pub(crate) async fn notify(
        &mut self,
        channel: &str,
        payload: &str,
    ) -> Result<(), TransportError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(TransportError::Closed);
        };
        let result = connection.notify(channel, payload).await;
        if let Err(err) = &result {
            if err.status_code().is_transport_error() {
                self.broken = true;
            }
        }
        result
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.broken || connection.is_closed() {
            debug!("Dropping broken pooled connection");
            return;
        }
        self.pool.release(connection);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::MemoryBackend;

    fn pool(
        backend: &MemoryBackend,
        size: usize,
    ) -> ConnectionPool {
        ConnectionPool::new(Arc::new(backend.clone()), size)
    }

    /// Тест проверяет, что соединение возвращается в пул и переиспользуется.
    #[tokio::test]
    async fn test_connection_reused() {
        let backend = MemoryBackend::default();
        let pool = pool(&backend, 2);
        {
            let mut conn = pool.get().await.unwrap();
            conn.notify("c", "x").await.unwrap();
        }
        assert_eq!(pool.idle_count(), 1);
        {
            let _conn = pool.get().await.unwrap();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_caller_error_keeps_connection() {
        let backend = MemoryBackend::default();
        let pool = pool(&backend, 1);
        {
            let mut conn = pool.get().await.unwrap();
            assert!(conn.notify("", "x").await.is_err());
        }
        assert_eq!(pool.idle_count(), 1);
    }

    /// Тест проверяет, что сломанное соединение не возвращается в пул.
    #[tokio::test]
    async fn test_broken_connection_discarded() {
        let backend = MemoryBackend::default();
        let pool = pool(&backend, 1);
        {
            let mut conn = pool.get().await.unwrap();
            backend.shutdown();
            assert!(matches!(
                conn.notify("c", "x").await,
                Err(TransportError::ConnectionLost { .. })
            ));
        }
        assert_eq!(pool.idle_count(), 0);
    }

    /// Тест проверяет, что пул не выдаёт больше `max_size` соединений.
    #[tokio::test]
    async fn test_bounded_by_max_size() {
        let backend = MemoryBackend::default();
        let pool = pool(&backend, 1);
        let held = pool.get().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.get()).await;
        assert!(waiting.is_err(), "second checkout must wait");

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(500), pool.get()).await;
        assert!(matches!(again, Ok(Ok(_))));
        assert_eq!(pool.max_size(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        let backend = MemoryBackend::default();
        backend.shutdown();
        let pool = pool(&backend, 1);
        assert!(matches!(
            pool.get().await.map(|_| ()),
            Err(TransportError::ConnectionFailed { .. })
        ));
        assert_eq!(pool.backend().describe(), "memory");
    }
}
