use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use sqlx::any::AnyPoolOptions;
use sqlx::{AnyConnection, AnyPool};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::batch::WriteBatch;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// SQLite: BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE.
/// Postgres: serialization_failure, deadlock_detected, lock_not_available.
const BUSY_CODES: &[&str] = &["5", "6", "261", "517", "40001", "40P01", "55P03"];

const RETRY_BASE: Duration = Duration::from_millis(10);
const RETRY_CAP: Duration = Duration::from_millis(250);

/// How units of work may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// One unit of work at a time, serialized by a process-wide lock.
    SingleWriter,
    /// Units of work run concurrently on pooled connections.
    MultiWriter,
}

impl WriteMode {
    pub fn for_backend(backend: &StoreBackend) -> Self {
        match backend {
            StoreBackend::Sqlite { .. } => WriteMode::SingleWriter,
            StoreBackend::Postgres { .. } => WriteMode::MultiWriter,
        }
    }
}

/// The only way domain code reaches the store.
///
/// Every unit of work runs in its own transaction. In single-writer mode the
/// coordinator also holds its writer lock for the whole unit, so
/// multi-statement sequences never interleave. Busy conditions are retried
/// until `busy_timeout` elapses.
#[derive(Debug, Clone)]
pub struct Coordinator {
    pool: AnyPool,
    mode: WriteMode,
    writer: Arc<Mutex<()>>,
    inflight: Arc<Inflight>,
    /// Runtime that owns the pool; background writes are spawned here.
    runtime: Handle,
    busy_timeout: Duration,
    lock_timeout: Duration,
}

impl Coordinator {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();
        let mode = WriteMode::for_backend(&config.backend);
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.busy_timeout())
            .connect(&config.url())
            .await?;
        debug!(?mode, max_connections = config.max_connections, "store connected");
        Ok(Self {
            pool,
            mode,
            writer: Arc::new(Mutex::new(())),
            inflight: Arc::default(),
            runtime: Handle::current(),
            busy_timeout: config.busy_timeout(),
            lock_timeout: config.lock_timeout(),
        })
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// True while another unit of work holds the single-writer lock.
    pub fn is_busy(&self) -> bool {
        self.mode == WriteMode::SingleWriter && self.writer.try_lock().is_err()
    }

    /// Run `work` inside a transaction, retrying on transient busy errors.
    ///
    /// `work` may be invoked more than once, each time on a fresh
    /// transaction.
    #[tracing::instrument(skip(self, work), fields(mode = ?self.mode))]
    pub async fn unit_of_work<T, F>(&self, label: &'static str, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'c> Fn(&'c mut AnyConnection) -> BoxFuture<'c, Result<T, StoreError>> + Send + Sync,
    {
        let _guard = match self.mode {
            WriteMode::SingleWriter => {
                let waited = Instant::now();
                match tokio::time::timeout(self.lock_timeout, self.writer.lock()).await {
                    Ok(guard) => Some(guard),
                    Err(_) => {
                        let waited_ms = waited.elapsed().as_millis() as u64;
                        error!(label, waited_ms, "timed out waiting for the writer lock");
                        return Err(StoreError::LockTimeout { waited_ms });
                    }
                }
            }
            WriteMode::MultiWriter => None,
        };

        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.attempt(&work).await {
                Ok(value) => return Ok(value),
                Err(StoreError::Database(err)) if is_busy(&err) => {
                    if started.elapsed() >= self.busy_timeout {
                        error!(label, attempts, error = %err, "store stayed busy");
                        return Err(StoreError::Busy { attempts, last: err });
                    }
                    let delay = backoff(attempts);
                    warn!(label, attempts, ?delay, "store busy, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(label, error = %err, "unit of work failed");
                    return Err(err);
                }
            }
        }
    }

    async fn attempt<T, F>(&self, work: &F) -> Result<T, StoreError>
    where
        F: for<'c> Fn(&'c mut AnyConnection) -> BoxFuture<'c, Result<T, StoreError>>,
    {
        let mut tx = self.pool.begin().await?;
        let value = work(&mut *tx).await?;
        tx.commit().await?;
        Ok(value)
    }

    /// Apply a batch in one unit of work.
    pub async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch = Arc::new(batch);
        self.unit_of_work("commit", move |conn| {
            let batch = Arc::clone(&batch);
            Box::pin(async move { batch.apply(conn).await })
        })
        .await
    }

    /// Start committing a batch in the background on the runtime the store
    /// was opened on. Callable from any thread.
    pub fn dispatch(&self, batch: WriteBatch) -> PendingWrite {
        if batch.is_empty() {
            return PendingWrite::done();
        }
        let coordinator = self.clone();
        let writes = batch.len();
        self.inflight.count.fetch_add(1, Ordering::AcqRel);
        let handle = self.runtime.spawn(async move {
            let result = coordinator.commit(batch).await;
            if let Err(err) = &result {
                error!(writes, error = %err, "background write failed; memory is ahead of the store");
            }
            coordinator.inflight.finish();
            result
        });
        PendingWrite {
            handle: Some(handle),
        }
    }

    /// Wait until every dispatched batch has finished.
    pub async fn settle(&self) {
        loop {
            let idle = self.inflight.idle.notified();
            if self.inflight.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Let in-flight writes finish, then close the pool.
    pub async fn close(&self) {
        self.settle().await;
        self.pool.close().await;
    }
}

/// Count of dispatched batches not yet finished.
#[derive(Debug, Default)]
struct Inflight {
    count: AtomicUsize,
    idle: Notify,
}

impl Inflight {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| BUSY_CODES.contains(&code.as_ref())),
        _ => false,
    }
}

fn backoff(attempt: u32) -> Duration {
    RETRY_BASE
        .saturating_mul(1 << attempt.min(5))
        .min(RETRY_CAP)
}

/// A store write that is in flight.
///
/// Await [`PendingWrite::wait`] to learn the outcome, or drop it to let the
/// write finish on its own.
#[derive(Debug)]
pub struct PendingWrite {
    handle: Option<JoinHandle<Result<(), StoreError>>>,
}

impl PendingWrite {
    /// A write that had nothing to do.
    pub fn done() -> Self {
        Self { handle: None }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub async fn wait(self) -> Result<(), StoreError> {
        match self.handle {
            None => Ok(()),
            Some(handle) => handle
                .await
                .map_err(|err| StoreError::Aborted(err.to_string()))?,
        }
    }
}
