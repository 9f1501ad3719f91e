use crate::error::TimeSeriesError;
use crate::types::collection::ImageCollection;
use crate::types::image::{Image, TIME_END, TIME_START};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// The `system:time_start` of `image` in UTC milliseconds.
///
/// # Errors
///
/// [`TimeSeriesError::MissingTimestamp`] when the property is absent and
/// [`TimeSeriesError::InvalidTimestamp`] when it is not an integer.
pub fn timestamp_of(image: &Image) -> Result<i64, TimeSeriesError> {
    match image.property(TIME_START) {
        None | Some(Value::Null) => Err(TimeSeriesError::MissingTimestamp {
            image_id: image.id.clone(),
        }),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| TimeSeriesError::InvalidTimestamp {
                image_id: image.id.clone(),
                value: value.to_string(),
            }),
    }
}

/// The `system:time_start` of `image` as a UTC datetime.
pub fn datetime_of(image: &Image) -> Result<DateTime<Utc>, TimeSeriesError> {
    let millis = timestamp_of(image)?;
    millis_to_datetime(millis).ok_or_else(|| TimeSeriesError::InvalidTimestamp {
        image_id: image.id.clone(),
        value: millis.to_string(),
    })
}

/// The `system:time_end` of `image`, falling back to its start time.
pub(crate) fn end_timestamp_of(image: &Image) -> Result<i64, TimeSeriesError> {
    match image.property(TIME_END).and_then(Value::as_i64) {
        Some(end) => Ok(end),
        None => timestamp_of(image),
    }
}

/// Earliest and latest `system:time_start` in `collection`, in milliseconds.
///
/// # Errors
///
/// [`TimeSeriesError::EmptyCollection`] for an empty collection, or the first
/// timestamp error encountered.
pub fn time_range(collection: &ImageCollection) -> Result<(i64, i64), TimeSeriesError> {
    let mut range: Option<(i64, i64)> = None;
    for img in collection.images() {
        let t = timestamp_of(img)?;
        range = Some(match range {
            None => (t, t),
            Some((lo, hi)) => (lo.min(t), hi.max(t)),
        });
    }
    range.ok_or(TimeSeriesError::EmptyCollection)
}

pub(crate) fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Formats a time the way image ids and export file names expect it.
pub(crate) fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%S").to_string()
}
