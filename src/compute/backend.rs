use crate::compute::error::ComputeError;
use crate::types::collection::ImageCollection;
use crate::types::image::Image;
use crate::types::reducer::Reducer;

/// The compute service that stores collections and evaluates image math.
///
/// The temporal engine only decides *which* images go together and *how* the
/// result is tagged; every pixel operation is delegated here. Calls may be
/// slow and are never retried by the engine.
///
/// Implementations must be pure with respect to their inputs: the same images
/// and reducer always give the same result, and inputs are never mutated.
pub trait ComputeBackend: Send + Sync {
    /// Reduces `images` band-by-band into a single image.
    ///
    /// The output keeps the band names, shape and id of the first input; the
    /// caller re-tags it.
    fn reduce(&self, images: &[&Image], reducer: &Reducer) -> Result<Image, ComputeError>;

    /// Computes `sum(weight * image)` band-by-band.
    ///
    /// The output keeps the band names, shape and id of the first term.
    fn weighted_sum(&self, terms: &[(&Image, f64)]) -> Result<Image, ComputeError>;

    /// Resolves a stored collection by id.
    fn load_collection(&self, id: &str) -> Result<ImageCollection, ComputeError> {
        Err(ComputeError::UnknownCollection(id.to_string()))
    }
}
