use polars::error::PolarsError;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to create output directory '{0}'")]
    OutputDirCreation(PathBuf, #[source] std::io::Error),

    // Errors during parquet writing (inside blocking task)
    #[error("I/O error writing parquet file '{0}'")]
    ParquetWriteIo(PathBuf, #[source] std::io::Error),
    #[error("Encoding error writing parquet file '{0}'")]
    ParquetWritePolars(PathBuf, #[source] PolarsError),

    #[error("I/O error during export")]
    Io(#[from] std::io::Error),

    #[error("Failed building DataFrame: {0}")]
    Polars(#[from] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Transient export failure: {0}")]
    Transient(String),

    #[error("Invalid export configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot parse export file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: String },

    #[error("Image '{image_id}' has neither a timestamp nor a climatology coordinate")]
    MissingCoordinate { image_id: String },

    #[error("Exporting image '{image_id}' failed after {attempts} attempt(s)")]
    DownloadError {
        image_id: String,
        attempts: u32,
        #[source]
        source: Box<ExportError>,
    },
}

impl ExportError {
    /// Whether retrying the same unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ExportError::Transient(_) => true,
            ExportError::Io(e)
            | ExportError::ParquetWriteIo(_, e)
            | ExportError::OutputDirCreation(_, e) => matches!(
                e.kind(),
                ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
