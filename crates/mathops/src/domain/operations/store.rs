use super::{Operation, OperationStatus, SubmitOperation};
use crate::{domain::Error, infra::db::DBConnection};
use time::OffsetDateTime;
use uuid::Uuid;

/// Persistence for submitted operations. Shared between the request handlers
/// and the background watcher; sqlite WAL plus the read/write pool split is
/// what arbitrates that sharing.
#[derive(Debug, Clone)]
pub struct OperationStore {
    db_connection: DBConnection,
}

impl OperationStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    pub async fn add_operation(&self, submit: SubmitOperation) -> Result<Operation, Error> {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::now_v7();

        let operation = sqlx::query_as::<_, Operation>(
            "INSERT INTO operations (
                id,
                kind,
                operand_a,
                operand_b,
                status,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, kind, operand_a, operand_b, status, result, error, created_at, updated_at",
        )
        .bind(id.to_string())
        .bind(submit.kind.as_str())
        .bind(submit.operand_a)
        .bind(submit.operand_b)
        .bind(OperationStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(self.db_connection.write())
        .await?;

        Ok(operation)
    }

    pub async fn get_operation(&self, id: Uuid) -> Result<Operation, Error> {
        let operation = sqlx::query_as::<_, Operation>(
            "SELECT id, kind, operand_a, operand_b, status, result, error, created_at, updated_at
            FROM operations
            WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        operation.ok_or_else(|| Error::NotFound(format!("operation not found: {}", id)))
    }

    pub async fn get_operations(
        &self,
        status: Option<OperationStatus>,
    ) -> Result<Vec<Operation>, Error> {
        let operations = match status {
            Some(status) => {
                sqlx::query_as::<_, Operation>(
                    "SELECT id, kind, operand_a, operand_b, status, result, error, created_at, updated_at
                    FROM operations
                    WHERE status = ?
                    ORDER BY id",
                )
                .bind(status.as_str())
                .fetch_all(self.db_connection.read())
                .await?
            }
            None => {
                sqlx::query_as::<_, Operation>(
                    "SELECT id, kind, operand_a, operand_b, status, result, error, created_at, updated_at
                    FROM operations
                    ORDER BY id",
                )
                .fetch_all(self.db_connection.read())
                .await?
            }
        };

        Ok(operations)
    }

    /// Oldest pending operations first; uuid v7 ids sort by creation time.
    pub async fn get_pending_operations(&self, limit: u32) -> Result<Vec<Operation>, Error> {
        let operations = sqlx::query_as::<_, Operation>(
            "SELECT id, kind, operand_a, operand_b, status, result, error, created_at, updated_at
            FROM operations
            WHERE status = ?
            ORDER BY id
            LIMIT ?",
        )
        .bind(OperationStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(operations)
    }

    pub async fn complete_operation(&self, id: Uuid, result: f64) -> Result<Operation, Error> {
        let now = OffsetDateTime::now_utc();

        let operation = sqlx::query_as::<_, Operation>(
            "UPDATE operations
            SET status = ?, result = ?, error = NULL, updated_at = ?
            WHERE id = ?
            RETURNING id, kind, operand_a, operand_b, status, result, error, created_at, updated_at",
        )
        .bind(OperationStatus::Completed.as_str())
        .bind(result)
        .bind(now)
        .bind(id.to_string())
        .fetch_optional(self.db_connection.write())
        .await?;

        operation.ok_or_else(|| Error::NotFound(format!("operation not found: {}", id)))
    }

    pub async fn fail_operation(&self, id: Uuid, reason: &str) -> Result<Operation, Error> {
        let now = OffsetDateTime::now_utc();

        let operation = sqlx::query_as::<_, Operation>(
            "UPDATE operations
            SET status = ?, error = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, kind, operand_a, operand_b, status, result, error, created_at, updated_at",
        )
        .bind(OperationStatus::Failed.as_str())
        .bind(reason)
        .bind(now)
        .bind(id.to_string())
        .fetch_optional(self.db_connection.write())
        .await?;

        operation.ok_or_else(|| Error::NotFound(format!("operation not found: {}", id)))
    }
}
