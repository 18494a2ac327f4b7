pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use api::routes::*;
pub use config::*;
pub use domain::{
    compute, Error as DomainError, Operation, OperationKind, OperationStatus, OperationStore,
    OperationWatcher, SubmitOperation,
};
pub use infra::db::*;
pub use startup::*;
