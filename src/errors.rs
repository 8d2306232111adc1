use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::season::SeasonStatus;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Error type covering every failure the lifecycle and settlement engines
/// report to callers. Nothing here is retried internally; retry is always an
/// explicit caller operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Season number already exists: {0}")]
    DuplicateSeason(String),
    #[error("Vehicle {plate} already holds an overlapping active season {season_no}")]
    OverlappingWindow { plate: String, season_no: String },
    #[error("Season {season_no} is not active (status: {status:?})")]
    NotActive {
        season_no: String,
        status: SeasonStatus,
    },
    #[error("New vehicle {plate} already holds an overlapping active season {season_no}")]
    VehicleConflict { plate: String, season_no: String },
    #[error("Termination requires a non-empty reason")]
    MissingReason,
    #[error("Season not eligible for GIRO batching: {0}")]
    IneligibleSeason(String),
    #[error("GIRO item {0} is already settled")]
    AlreadySettled(Uuid),
    #[error("Concurrent modification on season {0}")]
    ConcurrentModification(String),
    #[error("Invalid date range: {from} > {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    /// Money moved but the dependent season update failed; the caller must
    /// reconcile manually rather than retry.
    #[error("Settlement of item {item_id} succeeded but renewal of season {season_no} failed: {source}")]
    InconsistentSettlement {
        item_id: Uuid,
        season_no: String,
        #[source]
        source: Box<EngineError>,
    },
    #[error("Season not found: {0}")]
    SeasonNotFound(String),
    #[error("GIRO item not found: {0}")]
    ItemNotFound(Uuid),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
