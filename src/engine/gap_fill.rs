use crate::compute::backend::ComputeBackend;
use crate::engine::metadata::{format_time, millis_to_datetime};
use crate::error::TimeSeriesError;
use crate::types::collection::ImageCollection;
use crate::types::frequency::Frequency;
use crate::types::image::{Image, EMPTY_FLAG, FILLED_FLAG, SOURCE_COUNT, TIME_END, TIME_START};
use crate::types::policy::GapPolicy;
use crate::types::window::generate_windows;
use chrono::{DateTime, Utc};
use log::{debug, warn};

/// A fully masked placeholder shaped like `template`, stamped at `time`.
pub(crate) fn empty_marker(template: &Image, time: DateTime<Utc>) -> Image {
    let mut properties = template.properties.clone();
    properties.remove(TIME_END);
    properties.remove(FILLED_FLAG);
    properties.insert(TIME_START.into(), time.timestamp_millis().into());
    properties.insert(EMPTY_FLAG.into(), true.into());
    properties.insert(SOURCE_COUNT.into(), 0.into());
    Image::masked_like(format_time(time), template).with_properties(properties)
}

/// Inserts an empty marker for every `frequency` window of the collection's
/// span that holds no image.
///
/// Windows are anchored at the earliest timestamp. The result is sorted.
pub fn mark_missing_windows(
    collection: &ImageCollection,
    frequency: Frequency,
) -> Result<ImageCollection, TimeSeriesError> {
    let timed = collection.sorted_by_time()?;
    let (Some(&(first_ms, _)), Some(&(last_ms, _))) = (timed.first(), timed.last()) else {
        return Err(TimeSeriesError::EmptyCollection);
    };
    let Some(template) = timed
        .iter()
        .map(|(_, img)| *img)
        .find(|img| !img.is_empty_marker())
    else {
        return collection.sorted();
    };
    let (Some(start), Some(end)) = (
        millis_to_datetime(first_ms),
        millis_to_datetime(last_ms.saturating_add(1)),
    ) else {
        return collection.sorted();
    };

    let mut images = Vec::with_capacity(timed.len());
    let mut cursor = 0;
    for window in generate_windows(start, end, frequency).iter() {
        let lo = cursor;
        let window_end = window.end.timestamp_millis();
        while cursor < timed.len() && timed[cursor].0 < window_end {
            images.push(timed[cursor].1.clone());
            cursor += 1;
        }
        if lo == cursor {
            debug!("No image in {}, inserting marker", window);
            images.push(empty_marker(template, window.representative()));
        }
    }
    Ok(collection.with_images(images))
}

/// Resolves empty markers in `collection` according to `policy`.
///
/// With [`GapPolicy::InterpolateLinear`] each marker is replaced by a
/// time-weighted blend of the nearest non-empty images before and after it.
/// Markers with a neighbour on one side only copy that neighbour.
///
/// # Errors
///
/// [`TimeSeriesError::InsufficientNeighbors`] when interpolating a collection
/// without a single non-empty image.
pub fn fill_gaps(
    backend: &dyn ComputeBackend,
    collection: &ImageCollection,
    policy: GapPolicy,
) -> Result<ImageCollection, TimeSeriesError> {
    let timed = collection.sorted_by_time()?;
    match policy {
        GapPolicy::Drop => Ok(collection.with_images(
            timed
                .into_iter()
                .filter(|(_, img)| !img.is_empty_marker())
                .map(|(_, img)| img.clone())
                .collect(),
        )),
        GapPolicy::NullImage => Ok(collection.with_images(
            timed.into_iter().map(|(_, img)| img.clone()).collect(),
        )),
        GapPolicy::InterpolateLinear => interpolate_gaps(backend, collection, &timed),
    }
}

fn interpolate_gaps(
    backend: &dyn ComputeBackend,
    collection: &ImageCollection,
    timed: &[(i64, &Image)],
) -> Result<ImageCollection, TimeSeriesError> {
    if timed.iter().all(|(_, img)| img.is_empty_marker()) {
        return Err(TimeSeriesError::InsufficientNeighbors);
    }

    let mut previous = vec![None; timed.len()];
    let mut last_seen = None;
    for (i, (_, img)) in timed.iter().enumerate() {
        previous[i] = last_seen;
        if !img.is_empty_marker() {
            last_seen = Some(i);
        }
    }
    let mut next = vec![None; timed.len()];
    last_seen = None;
    for (i, (_, img)) in timed.iter().enumerate().rev() {
        next[i] = last_seen;
        if !img.is_empty_marker() {
            last_seen = Some(i);
        }
    }

    let mut filled = 0;
    let mut images = Vec::with_capacity(timed.len());
    for (i, &(t, img)) in timed.iter().enumerate() {
        if !img.is_empty_marker() {
            images.push(img.clone());
            continue;
        }
        let pixels = match (previous[i], next[i]) {
            (Some(p), Some(n)) => {
                let (t0, before) = timed[p];
                let (t1, after) = timed[n];
                let w = if t1 == t0 {
                    0.0
                } else {
                    (t - t0) as f64 / (t1 - t0) as f64
                };
                backend.weighted_sum(&[(before, 1.0 - w), (after, w)])?
            }
            (Some(only), None) | (None, Some(only)) => timed[only].1.clone(),
            (None, None) => return Err(TimeSeriesError::InsufficientNeighbors),
        };
        filled += 1;
        images.push(retag_filled(pixels, img));
    }

    if filled > 0 {
        debug!("Interpolated {} of {} images", filled, timed.len());
    } else {
        warn!("fill_gaps found no empty images to interpolate");
    }
    Ok(collection.with_images(images))
}

fn retag_filled(pixels: Image, marker: &Image) -> Image {
    let mut properties = marker.properties.clone();
    properties.remove(EMPTY_FLAG);
    properties.insert(FILLED_FLAG.into(), true.into());
    let names: Vec<String> = marker.bands.iter().map(|b| b.name.clone()).collect();
    pixels
        .with_id(marker.id.clone())
        .with_properties(properties)
        .with_band_names(&names)
}
