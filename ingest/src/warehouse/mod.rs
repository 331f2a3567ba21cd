use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use common::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One live warehouse session. Implementations wrap the actual wire client;
/// the loader only ever sees this trait.
#[async_trait]
pub trait WarehouseConnection: Send + Sync {
    async fn execute_ddl(&self, statement: &str) -> Result<()>;

    /// Bulk-write one batch into `table`, returning the number of rows written.
    async fn write_batch(&self, table: &str, batch: &RecordBatch) -> Result<u64>;

    async fn close(&self) -> Result<()>;
}

/// Produces authenticated connections. Supplied by the orchestrator from
/// resolved configuration; the loader never builds credentials itself.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn WarehouseConnection>>;
}

/// Scopes a connection to one logical operation. The connection opened by the
/// outermost `with_connection` frame is closed exactly once on every exit
/// path; nested frames on the same manager reuse it instead of opening a
/// second one. One manager per in-flight file, never shared across files.
pub struct ConnectionManager {
    factory: Arc<dyn ConnectionFactory>,
    active: Mutex<Option<Arc<dyn WarehouseConnection>>>,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            active: Mutex::new(None),
        }
    }

    pub async fn with_connection<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn WarehouseConnection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (connection, opened_here) = {
            let mut slot = self.active.lock().await;
            match slot.as_ref() {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let fresh = self.factory.connect().await?;
                    *slot = Some(Arc::clone(&fresh));
                    debug!("Opened warehouse connection");
                    (fresh, true)
                }
            }
        };

        let mut guard = SlotGuard {
            manager: self,
            armed: opened_here,
        };
        let result = operation(connection).await;
        guard.armed = false;
        drop(guard);

        if opened_here {
            self.release().await;
        }

        result
    }

    /// Open and cache a connection so later `with_connection` frames reuse it.
    /// Paired with `release`; used when one connection must span a whole
    /// file's batches.
    pub async fn acquire(&self) -> Result<()> {
        let mut slot = self.active.lock().await;
        if slot.is_none() {
            *slot = Some(self.factory.connect().await?);
            debug!("Opened warehouse connection");
        }
        Ok(())
    }

    /// Close the cached connection if one is open. Idempotent; a close
    /// failure is logged, never propagated over the operation's own result.
    pub async fn release(&self) {
        let connection = self.active.lock().await.take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                warn!(error = %e, "Failed to close warehouse connection");
            } else {
                debug!("Closed warehouse connection");
            }
        }
    }
}

/// Evicts the cached connection when the owning frame's operation never
/// completes (panic, or the future dropped mid-flight). `close` cannot be
/// awaited here, so the session is abandoned rather than reused.
struct SlotGuard<'a> {
    manager: &'a ConnectionManager,
    armed: bool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut slot) = self.manager.active.try_lock() {
            if slot.take().is_some() {
                warn!("Evicted warehouse connection after interrupted operation");
            }
        }
    }
}

/// Connection that validates and counts but persists nothing. Backs the
/// CLI's dry-run mode.
#[derive(Default)]
pub struct DryRunConnection {
    rows_written: AtomicU64,
    ddl_statements: AtomicU64,
}

#[async_trait]
impl WarehouseConnection for DryRunConnection {
    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        debug!(statement, "Dry-run DDL");
        self.ddl_statements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write_batch(&self, table: &str, batch: &RecordBatch) -> Result<u64> {
        let rows = batch.num_rows() as u64;
        debug!(table, rows, "Dry-run write");
        self.rows_written.fetch_add(rows, Ordering::SeqCst);
        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct DryRunFactory;

#[async_trait]
impl ConnectionFactory for DryRunFactory {
    async fn connect(&self) -> Result<Arc<dyn WarehouseConnection>> {
        Ok(Arc::new(DryRunConnection::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;
    use std::sync::atomic::AtomicU32;

    struct CountingConnection {
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl WarehouseConnection for CountingConnection {
        async fn execute_ddl(&self, _statement: &str) -> Result<()> {
            Ok(())
        }

        async fn write_batch(&self, _table: &str, batch: &RecordBatch) -> Result<u64> {
            Ok(batch.num_rows() as u64)
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingFactory {
        connects: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ConnectionFactory for CountingFactory {
        async fn connect(&self) -> Result<Arc<dyn WarehouseConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingConnection {
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    fn counting_manager() -> (ConnectionManager, Arc<AtomicU32>, Arc<AtomicU32>) {
        let connects = Arc::new(AtomicU32::new(0));
        let closes = Arc::new(AtomicU32::new(0));
        let manager = ConnectionManager::new(Arc::new(CountingFactory {
            connects: Arc::clone(&connects),
            closes: Arc::clone(&closes),
        }));
        (manager, connects, closes)
    }

    #[tokio::test]
    async fn test_release_exactly_once_on_success() {
        let (manager, connects, closes) = counting_manager();

        let value = manager
            .with_connection(|conn| async move { conn.execute_ddl("SELECT 1").await.map(|_| 7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_exactly_once_on_operation_error() {
        let (manager, connects, closes) = counting_manager();

        let result: Result<()> = manager
            .with_connection(|_conn| async move { Err(Error::Write("bulk load failed".into())) })
            .await;

        assert!(result.is_err());
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nested_frames_reuse_one_connection() {
        let (manager, connects, closes) = counting_manager();

        manager
            .with_connection(|outer| {
                let manager = &manager;
                async move {
                    outer.execute_ddl("CREATE TABLE IF NOT EXISTS t (x INTEGER)").await?;
                    manager
                        .with_connection(|inner| async move { inner.execute_ddl("SELECT 1").await })
                        .await
                }
            })
            .await
            .unwrap();

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_release_spans_multiple_frames() {
        let (manager, connects, closes) = counting_manager();

        manager.acquire().await.unwrap();
        for _ in 0..3 {
            manager
                .with_connection(|conn| async move { conn.execute_ddl("SELECT 1").await })
                .await
                .unwrap();
        }
        manager.release().await;
        // release is idempotent
        manager.release().await;

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicked_operation_evicts_connection() {
        use futures::FutureExt;

        let (manager, connects, closes) = counting_manager();

        let panicked = std::panic::AssertUnwindSafe(manager.with_connection(|_conn| async {
            if true {
                panic!("operation blew up");
            }
            Ok(())
        }))
        .catch_unwind()
        .await;
        assert!(panicked.is_err());

        // the interrupted session was evicted, so the next frame gets a
        // fresh connection instead of the abandoned one
        manager
            .with_connection(|conn| async move { conn.execute_ddl("SELECT 1").await })
            .await
            .unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_as_connection_error() {
        struct FailingFactory;

        #[async_trait]
        impl ConnectionFactory for FailingFactory {
            async fn connect(&self) -> Result<Arc<dyn WarehouseConnection>> {
                Err(Error::Connection("warehouse unreachable".into()))
            }
        }

        let manager = ConnectionManager::new(Arc::new(FailingFactory));
        let result: Result<()> = manager
            .with_connection(|_conn| async move { Ok(()) })
            .await;

        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
