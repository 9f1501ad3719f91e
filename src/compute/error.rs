use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Cannot reduce an empty set of images")]
    EmptyInput,

    #[error("Image '{image_id}' has {found} pixels per band, expected {expected}")]
    ShapeMismatch {
        image_id: String,
        expected: usize,
        found: usize,
    },

    #[error("Image '{image_id}' has {found} bands, expected {expected}")]
    BandCountMismatch {
        image_id: String,
        expected: usize,
        found: usize,
    },

    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("Compute backend failed: {0}")]
    Backend(String),
}
