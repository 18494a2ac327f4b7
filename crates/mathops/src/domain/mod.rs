mod operations;

pub use operations::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("background task died: {0}")]
    Task(String),
    #[error("cannot divide by zero")]
    DivideByZero,
    #[error("operation did not produce a finite number")]
    NotFinite,
}
