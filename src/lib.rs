//! Temporal aggregation, gap filling and climatology for collections of
//! timestamped images.
//!
//! A [`TimeSeries`] wraps an [`ImageCollection`] together with a
//! [`ComputeBackend`] that performs the pixel math. The crate decides which
//! images belong together (windows, buckets, neighbours) and how results are
//! tagged; the backend reduces and blends them. [`LocalBackend`] evaluates
//! everything in-process.
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use wxts::{ClimatologyFrequency, Frequency, Image, Reducer, TimeSeries, TimeSeriesError};
//!
//! # fn main() -> Result<(), TimeSeriesError> {
//! let start = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
//! let hourly = TimeSeries::from_images(
//!     (0..24 * 365 * 2)
//!         .map(|h| {
//!             Image::constant(format!("h{h}"), "tmmx", 1, 1, (h % 24) as f64)
//!                 .with_time(start + Duration::hours(h))
//!         })
//!         .collect(),
//! );
//!
//! let daily_max = hourly
//!     .aggregate_time()
//!     .frequency(Frequency::Day)
//!     .reducer(Reducer::Max)
//!     .keep_bandnames(true)
//!     .call()?;
//! let normals = daily_max
//!     .climatology_mean()
//!     .frequency(ClimatologyFrequency::Month)
//!     .keep_bandnames(true)
//!     .call()?;
//! let anomalies = daily_max.climatology_anomaly(&normals)?;
//!
//! assert_eq!(daily_max.len(), 730);
//! assert_eq!(normals.len(), 12);
//! assert!(anomalies.images().iter().all(|img| img.bands[0].values[0] == 0.0));
//! # Ok(())
//! # }
//! ```

mod compute;
mod engine;
mod error;
mod export;
mod series;
mod types;

pub use error::TimeSeriesError;

pub use types::collection::ImageCollection;
pub use types::frequency::{ClimatologyFrequency, Frequency};
pub use types::image::{
    Band, Image, COORDINATE, DIMENSION, EMPTY_FLAG, FILLED_FLAG, SOURCE_COUNT, TIME_END,
    TIME_START,
};
pub use types::policy::{GapPolicy, InterpolationMethod, RollingAlignment};
pub use types::reducer::{CustomReducer, Reducer};
pub use types::window::{generate_windows, TimeWindow, WindowIter, Windows};

pub use compute::backend::ComputeBackend;
pub use compute::error::ComputeError;
pub use compute::local::LocalBackend;

pub use engine::aggregate::{aggregate, AggregationSpec};
pub use engine::climatology::{ClimatologyEntry, ClimatologySpec, Statistic, YEAR_COUNT};
pub use engine::gap_fill::{fill_gaps, mark_missing_windows};
pub use engine::interpolate::interpolate_at;
pub use engine::metadata::{datetime_of, time_range, timestamp_of};
pub use engine::rolling::rolling;

pub use series::climatology::{Climatology, ClimatologyDescription};
pub use series::time_series::{Description, TimeSeries};

pub use export::error::ExportError;
pub use export::frame::collection_to_frame;
pub use export::naming::{file_name, parse_file_name, sanitize, Coordinate, ExportName, ALL_BANDS};
pub use export::pool::{export_collection, ExportConfig, ExportReport, UnitOutcome, UnitStatus};
pub use export::sink::{ImageSink, ParquetSink};
