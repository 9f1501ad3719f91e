use crate::compute::backend::ComputeBackend;
use crate::error::TimeSeriesError;
use crate::types::collection::ImageCollection;
use crate::types::image::{Image, SOURCE_COUNT};
use crate::types::policy::RollingAlignment;
use crate::types::reducer::Reducer;
use chrono::Duration;
use log::debug;

/// Reduces a moving window around every non-empty image in `collection`.
///
/// Each output keeps the id, timestamp, properties and band names of its
/// anchor image. Empty markers neither anchor nor join a window.
pub fn rolling(
    backend: &dyn ComputeBackend,
    collection: &ImageCollection,
    window: Duration,
    reducer: &Reducer,
    alignment: RollingAlignment,
) -> Result<ImageCollection, TimeSeriesError> {
    if window <= Duration::zero() {
        return Err(TimeSeriesError::InvalidWindow(window));
    }
    let timed: Vec<(i64, &Image)> = collection
        .sorted_by_time()?
        .into_iter()
        .filter(|(_, img)| !img.is_empty_marker())
        .collect();
    if timed.is_empty() {
        return Err(TimeSeriesError::EmptyCollection);
    }

    let width = window.num_milliseconds();
    let half = width / 2;
    debug!(
        "Rolling {} over {} images with a {}ms {:?} window",
        reducer,
        timed.len(),
        width,
        alignment
    );

    let mut images = Vec::with_capacity(timed.len());
    for &(t, anchor) in &timed {
        let (from, to) = match alignment {
            RollingAlignment::Trailing => (
                timed.partition_point(|(x, _)| *x <= t.saturating_sub(width)),
                timed.partition_point(|(x, _)| *x <= t),
            ),
            RollingAlignment::Centered => (
                timed.partition_point(|(x, _)| *x < t.saturating_sub(half)),
                timed.partition_point(|(x, _)| *x <= t.saturating_add(half)),
            ),
        };
        let members: Vec<&Image> = timed[from..to].iter().map(|(_, img)| *img).collect();
        let reduced = backend.reduce(&members, reducer)?;

        let names: Vec<String> = anchor.bands.iter().map(|b| b.name.clone()).collect();
        let mut properties = anchor.properties.clone();
        properties.insert(SOURCE_COUNT.into(), members.len().into());
        images.push(
            reduced
                .with_id(anchor.id.clone())
                .with_properties(properties)
                .with_band_names(&names),
        );
    }

    Ok(collection.with_images(images))
}
