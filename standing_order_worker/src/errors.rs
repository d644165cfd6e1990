use standing_order_engine::SelectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Could not connect to the database. {0}")]
    DatabaseError(String),
    #[error("Database migrations failed. {0}")]
    MigrationError(String),
    #[error("The placement job failed. {0}")]
    PlacementJobFailed(#[from] SelectionError),
    #[error("Could not list the order cycles awaiting placement. {0}")]
    CycleLookupFailed(String),
}
