use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use once_cell::sync::OnceCell;
use streamrelay_error::{ErrorExt, PublishError};
use tracing::{debug, info, warn};

use super::{
    pool::{ConnectionPool, DEFAULT_POOL_MAX_SIZE},
    Envelope,
};
use crate::backend::Backend;

/// Параметры издателя.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Максимум одновременно открытых командных соединений.
    pub pool_max_size: usize,
}

/// Снимок счётчиков издателя.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    pub failed: u64,
}

/// Издатель конвертов.
///
/// Пул соединений устанавливается один раз через [`Publisher::initialize`];
/// до этого `publish` возвращает [`PublishError::NotInitialized`].
/// Безопасен для конкурентного использования через `&self`.
pub struct Publisher {
    config: PublisherConfig,
    pool: OnceCell<ConnectionPool>,
    published: AtomicU64,
    failed: AtomicU64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Publisher {
    /// Создаёт издателя без подключения.
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
            published: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Устанавливает пул соединений к `backend`.
    ///
    /// Возвращает `true`, если пул установлен этим вызовом. Повторный вызов
    /// ничего не меняет: второй бэкенд игнорируется с предупреждением.
    pub fn initialize(
        &self,
        backend: Arc<dyn Backend>,
    ) -> bool {
        if let Some(existing) = self.pool.get() {
            warn!(
                current = %existing.backend().describe(),
                ignored = %backend.describe(),
                "Publisher already initialized; new backend ignored"
            );
            return false;
        }

        let target = backend.describe();
        match self
            .pool
            .set(ConnectionPool::new(backend, self.config.pool_max_size))
        {
            Ok(()) => {
                info!(
                    backend = %target,
                    pool_max_size = self.config.pool_max_size,
                    "Publisher initialized"
                );
                true
            }
            Err(_) => {
                warn!(ignored = %target, "Publisher initialized concurrently; new backend ignored");
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Публикует `data` от имени `subscription_id` в `channel`.
    ///
    /// - `Err(NotInitialized)` до `initialize`;
    /// - `Ok(false)` при любой ошибке сериализации или транспорта (ошибка
    ///   логируется);
    /// - `Ok(true)` после успешной отправки.
    pub async fn publish(
        &self,
        channel: &str,
        subscription_id: &str,
        data: &str,
    ) -> Result<bool, PublishError> {
        let pool = self.pool.get().ok_or(PublishError::NotInitialized)?;

        match Self::send(pool, channel, subscription_id, data).await {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                debug!(channel, subscription_id, "Envelope published");
                Ok(true)
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel,
                    subscription_id,
                    status = %err.status_code(),
                    error = %err,
                    "Publish failed"
                );
                Ok(false)
            }
        }
    }

    async fn send(
        pool: &ConnectionPool,
        channel: &str,
        subscription_id: &str,
        data: &str,
    ) -> Result<(), PublishError> {
        let payload = Envelope::new(subscription_id, data).to_json()?;
        let mut conn = pool.get().await?;
        conn.notify(channel, &payload).await?;
        Ok(())
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
        }
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(PublisherConfig::default())
    }
}
