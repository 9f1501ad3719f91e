//! File names of exported images: `{prefix}{id}.{dimension}.{coordinate}.{variable}.{ext}`.
//!
//! Time-indexed images use dimension `time` and a `%Y%m%dT%H%M%S` coordinate;
//! climatology images use their `wx:dimension` and integer `wx:coordinate`.
//! The variable is a band name, or `all` for multi-band files.

use crate::export::error::ExportError;
use crate::types::image::{Image, COORDINATE, DIMENSION};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use serde_json::Value;
use std::path::Path;

const TIME_DIMENSION: &str = "time";
const TIME_FORMAT: &str = "%Y%m%dT%H%M%S";
/// Variable name used for files that hold every band.
pub const ALL_BANDS: &str = "all";

/// Position of an exported image along its dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coordinate {
    Time(DateTime<Utc>),
    Index(i64),
    /// A coordinate that could not be parsed, kept verbatim.
    Raw(String),
}

/// The parts of a parsed export file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportName {
    pub id: String,
    pub dimension: String,
    pub coordinate: Coordinate,
    pub variable: String,
}

/// Replaces every character other than ASCII letters, digits, `-` and `_`.
///
/// Dots separate name fields, so they are replaced as well.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The file name for `image`, or for one of its bands when `band` is set.
///
/// # Errors
///
/// [`ExportError::MissingCoordinate`] when the image has neither a timestamp
/// nor a climatology coordinate.
pub fn file_name(
    image: &Image,
    band: Option<&str>,
    prefix: Option<&str>,
    extension: &str,
) -> Result<String, ExportError> {
    let (dimension, coordinate) = match image.property(DIMENSION).and_then(Value::as_str) {
        Some(dimension) => {
            let coordinate = image
                .property(COORDINATE)
                .and_then(Value::as_i64)
                .ok_or_else(|| ExportError::MissingCoordinate {
                    image_id: image.id.clone(),
                })?;
            (sanitize(dimension), coordinate.to_string())
        }
        None => {
            let time = image
                .time_start_millis()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .ok_or_else(|| ExportError::MissingCoordinate {
                    image_id: image.id.clone(),
                })?;
            (
                TIME_DIMENSION.to_string(),
                time.format(TIME_FORMAT).to_string(),
            )
        }
    };

    Ok(format!(
        "{}{}.{}.{}.{}.{}",
        prefix.map(sanitize).unwrap_or_default(),
        sanitize(&image.id),
        dimension,
        coordinate,
        band.map(sanitize).unwrap_or_else(|| ALL_BANDS.to_string()),
        extension
    ))
}

/// Parses a path produced by [`file_name`]. A prefix, if any, stays part of the id.
///
/// Unparseable time coordinates are kept as [`Coordinate::Raw`] with a warning.
///
/// # Errors
///
/// [`ExportError::InvalidFileName`] when the name does not have five
/// dot-separated fields or a non-time coordinate is not an integer.
pub fn parse_file_name(path: &Path) -> Result<ExportName, ExportError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExportError::InvalidFileName {
            name: path.display().to_string(),
            reason: "not a valid UTF-8 file name".to_string(),
        })?;
    let invalid = |reason: &str| ExportError::InvalidFileName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = name.split('.').collect();
    let [id, dimension, coordinate, variable, _extension] = parts.as_slice() else {
        return Err(invalid("expected id.dimension.coordinate.variable.extension"));
    };

    let coordinate = if *dimension == TIME_DIMENSION {
        match NaiveDateTime::parse_from_str(coordinate, TIME_FORMAT) {
            Ok(time) => Coordinate::Time(time.and_utc()),
            Err(e) => {
                warn!("Unable to parse time coordinate '{}' of {}: {}", coordinate, name, e);
                Coordinate::Raw(coordinate.to_string())
            }
        }
    } else {
        Coordinate::Index(
            coordinate
                .parse()
                .map_err(|_| invalid("coordinate is not an integer"))?,
        )
    };

    Ok(ExportName {
        id: id.to_string(),
        dimension: dimension.to_string(),
        coordinate,
        variable: variable.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    #[test]
    fn test_time_indexed_name() -> Result<(), ExportError> {
        let time = Utc.with_ymd_and_hms(2020, 9, 8, 6, 30, 0).unwrap();
        let image = Image::constant("IDAHO_EPSCOR/GRIDMET/20200908", "tmmx", 1, 1, 0.0).with_time(time);

        let name = file_name(&image, Some("tmmx"), Some("gm_"), "parquet")?;
        assert_eq!(name, "gm_IDAHO_EPSCOR_GRIDMET_20200908.time.20200908T063000.tmmx.parquet");

        let parsed = parse_file_name(&PathBuf::from("/tmp/out").join(&name))?;
        assert_eq!(parsed.id, "gm_IDAHO_EPSCOR_GRIDMET_20200908");
        assert_eq!(parsed.dimension, "time");
        assert_eq!(parsed.coordinate, Coordinate::Time(time));
        assert_eq!(parsed.variable, "tmmx");
        Ok(())
    }

    #[test]
    fn test_climatology_name() -> Result<(), ExportError> {
        let image = Image::constant("mean_month_7", "pr", 1, 1, 0.0)
            .with_property(DIMENSION, "month")
            .with_property(COORDINATE, 7);
        let name = file_name(&image, None, None, "parquet")?;
        assert_eq!(name, "mean_month_7.month.7.all.parquet");

        let parsed = parse_file_name(Path::new(&name))?;
        assert_eq!(parsed.coordinate, Coordinate::Index(7));
        assert_eq!(parsed.variable, ALL_BANDS);
        Ok(())
    }

    #[test]
    fn test_untimed_image_has_no_name() {
        let err = file_name(&Image::constant("x", "v", 1, 1, 0.0), None, None, "parquet").unwrap_err();
        assert!(matches!(err, ExportError::MissingCoordinate { .. }));
    }

    #[test]
    fn test_malformed_names() {
        for name in ["only.three.parts", "a.month.seven.all.parquet"] {
            assert!(matches!(
                parse_file_name(Path::new(name)),
                Err(ExportError::InvalidFileName { .. })
            ));
        }
        let raw = parse_file_name(Path::new("a.time.yesterday.all.parquet")).unwrap();
        assert_eq!(raw.coordinate, Coordinate::Raw("yesterday".to_string()));
    }
}
