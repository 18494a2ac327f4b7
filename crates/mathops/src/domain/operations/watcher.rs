use super::{compute, OperationStore};
use log::{debug, error, info};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// The background worker: drains pending operations on an interval and
/// records each result or failure. Runs until the cancellation token fires.
pub struct OperationWatcher {
    store: OperationStore,
    poll_interval: Duration,
    cancel_token: CancellationToken,
    batch_size: u32,
}

impl OperationWatcher {
    pub fn new(
        store: OperationStore,
        cancel_token: CancellationToken,
        poll_interval: Duration,
        batch_size: u32,
    ) -> Self {
        Self {
            store,
            poll_interval,
            cancel_token,
            batch_size,
        }
    }

    pub async fn watch(&self) -> Result<(), anyhow::Error> {
        info!("Starting operation watcher");

        loop {
            if self.cancel_token.is_cancelled() {
                info!("Operation watcher received cancellation");
                break;
            }

            match self.process_pending().await {
                Ok(0) => debug!("No pending operations"),
                Ok(count) => info!("Processed {} operation(s)", count),
                Err(e) => error!("Error processing pending operations: {}", e),
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => continue,
                _ = self.cancel_token.cancelled() => {
                    info!("Operation watcher cancelled during sleep");
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn process_pending(&self) -> Result<usize, anyhow::Error> {
        let pending = self.store.get_pending_operations(self.batch_size).await?;
        let count = pending.len();

        for operation in pending {
            match compute(operation.kind, operation.operand_a, operation.operand_b) {
                Ok(value) => {
                    self.store.complete_operation(operation.id, value).await?;
                    debug!(
                        "Completed operation {} ({} {} {}) = {}",
                        operation.id,
                        operation.operand_a,
                        operation.kind.as_str(),
                        operation.operand_b,
                        value
                    );
                }
                Err(e) => {
                    self.store
                        .fail_operation(operation.id, &e.to_string())
                        .await?;
                    debug!("Failed operation {}: {}", operation.id, e);
                }
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{OperationKind, OperationStatus, SubmitOperation},
        infra::db::DBConnection,
    };
    use sqlx::SqlitePool;

    fn create_watcher(pool: SqlitePool, cancel_token: CancellationToken) -> OperationWatcher {
        let db = DBConnection::new_with_pools(
            "test".to_string(),
            ":memory:".to_string(),
            pool.clone(),
            pool,
        );
        OperationWatcher::new(
            OperationStore::new(db),
            cancel_token,
            Duration::from_millis(10),
            50,
        )
    }

    #[sqlx::test(migrations = "./migrations/operations")]
    async fn test_process_pending_resolves_operations(pool: SqlitePool) {
        let watcher = create_watcher(pool, CancellationToken::new());

        let good = watcher
            .store
            .add_operation(SubmitOperation {
                kind: OperationKind::Add,
                operand_a: 2.0,
                operand_b: 3.0,
            })
            .await
            .unwrap();
        let bad = watcher
            .store
            .add_operation(SubmitOperation {
                kind: OperationKind::Divide,
                operand_a: 1.0,
                operand_b: 0.0,
            })
            .await
            .unwrap();

        let count = watcher.process_pending().await.unwrap();
        assert_eq!(count, 2);

        let good = watcher.store.get_operation(good.id).await.unwrap();
        assert_eq!(good.status, OperationStatus::Completed);
        assert_eq!(good.result, Some(5.0));

        let bad = watcher.store.get_operation(bad.id).await.unwrap();
        assert_eq!(bad.status, OperationStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("cannot divide by zero"));

        assert!(watcher
            .store
            .get_pending_operations(50)
            .await
            .unwrap()
            .is_empty());
    }

    #[sqlx::test(migrations = "./migrations/operations")]
    async fn test_watch_stops_on_cancellation(pool: SqlitePool) {
        let cancel_token = CancellationToken::new();
        let watcher = create_watcher(pool, cancel_token.clone());

        let handle = tokio::spawn(async move { watcher.watch().await });

        cancel_token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher did not stop after cancellation")
            .unwrap();
        assert!(result.is_ok());
    }
}
