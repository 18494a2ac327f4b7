mod engine;
mod store;
mod watcher;

use crate::infra::db::{parse_required_datetime, parse_required_uuid};
pub use engine::compute;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
pub use store::OperationStore;
use time::OffsetDateTime;
use uuid::Uuid;
pub use watcher::OperationWatcher;

use super::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Subtract => "subtract",
            OperationKind::Multiply => "multiply",
            OperationKind::Divide => "divide",
            OperationKind::Power => "power",
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(OperationKind::Add),
            "subtract" => Ok(OperationKind::Subtract),
            "multiply" => Ok(OperationKind::Multiply),
            "divide" => Ok(OperationKind::Divide),
            "power" => Ok(OperationKind::Power),
            other => Err(Error::BadRequest(format!(
                "unknown operation kind: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            other => Err(Error::BadRequest(format!("unknown status: {}", other))),
        }
    }
}

/// A single math request as stored. Submitted through the API as `pending`,
/// picked up and resolved by the background watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub operand_a: f64,
    pub operand_b: f64,
    pub status: OperationStatus,
    pub result: Option<f64>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Operation {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.get("kind");
        let status: String = row.get("status");

        Ok(Operation {
            id: parse_required_uuid(row, "id")?,
            kind: kind.parse().map_err(|e: Error| sqlx::Error::ColumnDecode {
                index: "kind".to_string(),
                source: Box::new(e),
            })?,
            operand_a: row.get("operand_a"),
            operand_b: row.get("operand_b"),
            status: status
                .parse()
                .map_err(|e: Error| sqlx::Error::ColumnDecode {
                    index: "status".to_string(),
                    source: Box::new(e),
                })?,
            result: row.get("result"),
            error: row.get("error"),
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOperation {
    pub kind: OperationKind,
    pub operand_a: f64,
    pub operand_b: f64,
}
