use crate::compute::backend::ComputeBackend;
use crate::engine::metadata::{format_time, millis_to_datetime};
use crate::error::TimeSeriesError;
use crate::types::collection::ImageCollection;
use crate::types::image::{Image, TIME_END, TIME_START};
use crate::types::policy::InterpolationMethod;
use chrono::{DateTime, Utc};
use log::debug;

/// Resamples `collection` at each of `targets`.
///
/// Every target must fall within the span of the non-empty images. A target
/// that coincides with an image timestamp returns a copy of that image;
/// otherwise the bracketing images (and, for cubic, their outer neighbours)
/// are blended through [`ComputeBackend::weighted_sum`].
pub fn interpolate_at(
    backend: &dyn ComputeBackend,
    collection: &ImageCollection,
    targets: &[DateTime<Utc>],
    method: InterpolationMethod,
) -> Result<ImageCollection, TimeSeriesError> {
    let timed: Vec<(i64, &Image)> = collection
        .sorted_by_time()?
        .into_iter()
        .filter(|(_, img)| !img.is_empty_marker())
        .collect();
    let (Some(&(lo, _)), Some(&(hi, _))) = (timed.first(), timed.last()) else {
        return Err(TimeSeriesError::EmptyCollection);
    };

    let mut images = Vec::with_capacity(targets.len());
    for &target in targets {
        let t = target.timestamp_millis();
        if t < lo || t > hi {
            return Err(out_of_range(target, lo, hi));
        }

        // Number of images at or before t; at least one since t >= lo.
        let after = timed.partition_point(|(x, _)| *x <= t);
        let i1 = after - 1;
        let (t1, y1) = timed[i1];
        if t1 == t {
            images.push(retag(y1.clone(), y1, target));
            continue;
        }

        let i2 = after;
        let (t2, y2) = timed[i2];
        let y0 = timed[i1.saturating_sub(1)].1;
        let y3 = timed[(i2 + 1).min(timed.len() - 1)].1;
        let mu = (t - t1) as f64 / (t2 - t1) as f64;
        let [w0, w1, w2, w3] = method.weights(mu);

        let terms: Vec<(&Image, f64)> = [(y1, w1), (y2, w2), (y0, w0), (y3, w3)]
            .into_iter()
            .filter(|(_, w)| *w != 0.0)
            .collect();
        debug!(
            "Interpolating {} between '{}' and '{}' at mu={:.3}",
            target, y1.id, y2.id, mu
        );
        let blended = backend.weighted_sum(&terms)?;
        images.push(retag(blended, y1, target));
    }

    Ok(collection.with_images(images))
}

fn out_of_range(target: DateTime<Utc>, lo: i64, hi: i64) -> TimeSeriesError {
    let show = |ms: i64| {
        millis_to_datetime(ms)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| ms.to_string())
    };
    TimeSeriesError::OutOfRange {
        requested: target.to_rfc3339(),
        start: show(lo),
        end: show(hi),
    }
}

fn retag(pixels: Image, source: &Image, target: DateTime<Utc>) -> Image {
    let mut properties = source.properties.clone();
    properties.remove(TIME_END);
    properties.insert(TIME_START.into(), target.timestamp_millis().into());
    let names: Vec<String> = source.bands.iter().map(|b| b.name.clone()).collect();
    pixels
        .with_id(format_time(target))
        .with_properties(properties)
        .with_band_names(&names)
}
