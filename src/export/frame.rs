//! Conversion of image collections into long-format polars frames.

use crate::export::error::ExportError;
use crate::types::collection::ImageCollection;
use crate::types::image::COORDINATE;
use polars::prelude::*;
use serde_json::Value;

/// Flattens `collection` into one row per image, band and pixel.
///
/// Columns:
///
/// * `id` (`String`): image id.
/// * `time` (`Datetime(ms)`, nullable): `system:time_start`, null for
///   climatology images.
/// * `coordinate` (`Int64`, nullable): `wx:coordinate` of climatology images.
/// * `band` (`String`), `pixel` (`UInt32`, row-major index), `value` (`Float64`,
///   `NaN` where masked).
///
/// Rows follow the collection's image order.
pub fn collection_to_frame(collection: &ImageCollection) -> Result<DataFrame, ExportError> {
    let rows: usize = collection
        .images()
        .iter()
        .map(|img| img.bands.len() * img.pixel_count())
        .sum();
    let mut ids = Vec::with_capacity(rows);
    let mut times: Vec<Option<i64>> = Vec::with_capacity(rows);
    let mut coordinates: Vec<Option<i64>> = Vec::with_capacity(rows);
    let mut bands = Vec::with_capacity(rows);
    let mut pixels: Vec<u32> = Vec::with_capacity(rows);
    let mut values: Vec<f64> = Vec::with_capacity(rows);

    for img in collection.images() {
        let time = img.time_start_millis();
        let coordinate = img.property(COORDINATE).and_then(Value::as_i64);
        for band in &img.bands {
            for (px, value) in band.values.iter().enumerate() {
                ids.push(img.id.clone());
                times.push(time);
                coordinates.push(coordinate);
                bands.push(band.name.clone());
                pixels.push(px as u32);
                values.push(*value);
            }
        }
    }

    let df = df!(
        "id" => ids,
        "time" => times,
        "coordinate" => coordinates,
        "band" => bands,
        "pixel" => pixels,
        "value" => values,
    )?;

    Ok(df
        .lazy()
        .with_column(col("time").cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
        .collect()?)
}
