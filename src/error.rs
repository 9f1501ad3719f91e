use crate::compute::error::ComputeError;
use crate::export::error::ExportError;
use crate::types::frequency::Frequency;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeSeriesError {
    #[error("Image '{image_id}' has no 'system:time_start' property")]
    MissingTimestamp { image_id: String },

    #[error("Image '{image_id}' has a non-integer 'system:time_start' value: {value}")]
    InvalidTimestamp { image_id: String, value: String },

    #[error("The collection contains no images")]
    EmptyCollection,

    #[error("Gap filling needs at least one non-empty image")]
    InsufficientNeighbors,

    #[error("Standard deviation climatology needs at least 2 distinct years, found {found}")]
    InsufficientYears { found: usize },

    #[error("Climatology has no '{dimension}' bucket for key {key}")]
    NoMatchingBucket { dimension: String, key: u32 },

    #[error("Frequency must be one of {options:?}, not '{given}'")]
    InvalidFrequency {
        given: String,
        options: Vec<&'static str>,
    },

    #[error("Key range {start}..={end} is outside the '{dimension}' domain")]
    InvalidKeyRange {
        dimension: String,
        start: u32,
        end: u32,
    },

    #[error("Requested time {requested} is outside the collection range {start} to {end}")]
    OutOfRange {
        requested: String,
        start: String,
        end: String,
    },

    #[error("Rolling window must be a positive duration, got {0}")]
    InvalidWindow(chrono::Duration),

    #[error("Unit '{0}' has no fixed length")]
    UnsupportedUnit(Frequency),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
