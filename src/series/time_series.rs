//! The [`TimeSeries`] facade: an image collection plus the backend that does
//! its pixel math, with every temporal operation available as a method.

use crate::compute::backend::ComputeBackend;
use crate::compute::local::LocalBackend;
use crate::engine::aggregate::{self, AggregationSpec};
use crate::engine::climatology::{self, ClimatologySpec, Statistic};
use crate::engine::gap_fill;
use crate::engine::interpolate;
use crate::engine::metadata::{millis_to_datetime, time_range};
use crate::engine::rolling;
use crate::error::TimeSeriesError;
use crate::export::frame::collection_to_frame;
use crate::export::pool::{export_collection, ExportConfig, ExportReport};
use crate::export::sink::ParquetSink;
use crate::series::climatology::Climatology;
use crate::types::collection::ImageCollection;
use crate::types::frequency::{ClimatologyFrequency, Frequency};
use crate::types::image::Image;
use crate::types::policy::{GapPolicy, InterpolationMethod, RollingAlignment};
use crate::types::reducer::Reducer;
use bon::bon;
use chrono::{DateTime, Duration, Utc};
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A collection of timestamped images with temporal operations.
///
/// `TimeSeries` never mutates: every transformation returns a new series that
/// shares the same [`ComputeBackend`]. Images are kept in the order they were
/// given, and each operation sorts by `system:time_start` where order matters.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use wxts::{Image, TimeSeries, TimeSeriesError};
///
/// # fn main() -> Result<(), TimeSeriesError> {
/// let start = Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap();
/// let ts = TimeSeries::from_images(
///     (0..3)
///         .map(|d| Image::constant(format!("d{d}"), "pr", 2, 2, 1.0).with_time(start + Duration::days(d)))
///         .collect(),
/// );
///
/// assert_eq!(ts.len(), 3);
/// assert_eq!(ts.start_time()?, start);
/// assert_eq!(ts.interval()?, Some(Duration::days(1)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TimeSeries {
    collection: ImageCollection,
    backend: Arc<dyn ComputeBackend>,
}

impl fmt::Debug for TimeSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSeries")
            .field("id", &self.collection.id)
            .field("images", &self.collection.len())
            .finish_non_exhaustive()
    }
}

#[bon]
impl TimeSeries {
    /// Wraps an existing collection, computing with `backend`.
    pub fn from_collection(collection: ImageCollection, backend: Arc<dyn ComputeBackend>) -> Self {
        Self {
            collection,
            backend,
        }
    }

    /// Builds a series from in-memory images, computed by a [`LocalBackend`].
    pub fn from_images(images: Vec<Image>) -> Self {
        Self::from_collection(ImageCollection::new(images), Arc::new(LocalBackend::new()))
    }

    /// Opens the collection stored under `id` in `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeSeriesError::Compute`] when the backend does not know `id`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use wxts::{Image, ImageCollection, LocalBackend, TimeSeries, TimeSeriesError};
    ///
    /// # fn main() -> Result<(), TimeSeriesError> {
    /// let backend = LocalBackend::new().with_collection(
    ///     "IDAHO_EPSCOR/GRIDMET",
    ///     ImageCollection::new(vec![Image::constant("a", "tmmx", 1, 1, 290.0).with_time_millis(0)]),
    /// );
    /// let ts = TimeSeries::load("IDAHO_EPSCOR/GRIDMET", Arc::new(backend))?;
    /// assert_eq!(ts.collection().id.as_deref(), Some("IDAHO_EPSCOR/GRIDMET"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn load(id: &str, backend: Arc<dyn ComputeBackend>) -> Result<Self, TimeSeriesError> {
        let collection = backend.load_collection(id)?;
        Ok(Self::from_collection(collection, backend))
    }

    /// The same images computed with a different backend.
    pub fn with_backend(self, backend: Arc<dyn ComputeBackend>) -> Self {
        Self { backend, ..self }
    }

    pub fn collection(&self) -> &ImageCollection {
        &self.collection
    }

    pub fn into_collection(self) -> ImageCollection {
        self.collection
    }

    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn images(&self) -> &[Image] {
        self.collection.images()
    }

    fn derive(&self, collection: ImageCollection) -> Self {
        Self {
            collection,
            backend: Arc::clone(&self.backend),
        }
    }

    /// Timestamp of the earliest image.
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::EmptyCollection`] for an empty series, or a timestamp
    /// error if any image lacks `system:time_start`.
    pub fn start_time(&self) -> Result<DateTime<Utc>, TimeSeriesError> {
        let (start, _) = time_range(&self.collection)?;
        to_datetime(start)
    }

    /// Timestamp of the latest image.
    ///
    /// # Errors
    ///
    /// Same as [`TimeSeries::start_time`].
    pub fn end_time(&self) -> Result<DateTime<Utc>, TimeSeriesError> {
        let (_, end) = time_range(&self.collection)?;
        to_datetime(end)
    }

    fn spacings(&self) -> Result<Vec<i64>, TimeSeriesError> {
        let timed = self.collection.sorted_by_time()?;
        Ok(timed.windows(2).map(|w| w[1].0 - w[0].0).collect())
    }

    /// The most common spacing between consecutive images.
    ///
    /// Ties go to the shorter spacing. Returns `None` with fewer than two images.
    pub fn interval(&self) -> Result<Option<Duration>, TimeSeriesError> {
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for gap in self.spacings()? {
            *counts.entry(gap).or_default() += 1;
        }
        let modal = counts
            .into_iter()
            .fold(None, |best: Option<(i64, usize)>, (gap, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((gap, n)),
            });
        Ok(modal.map(|(gap, _)| Duration::milliseconds(gap)))
    }

    /// Reduces the spacings between consecutive images, expressed in `unit`.
    ///
    /// # Arguments
    ///
    /// * `.unit(Frequency)`: **Required.** A fixed-length unit (minute, hour, day or week).
    /// * `.reducer(Reducer)`: Optional. Defaults to [`Reducer::Mean`].
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::UnsupportedUnit`] for month and year, which have no
    /// fixed length.
    ///
    /// # Examples
    ///
    /// ```
    /// use wxts::{Frequency, Image, Reducer, TimeSeries, TimeSeriesError};
    ///
    /// # fn main() -> Result<(), TimeSeriesError> {
    /// let hour = 3_600_000;
    /// let ts = TimeSeries::from_images(vec![
    ///     Image::constant("a", "v", 1, 1, 0.0).with_time_millis(0),
    ///     Image::constant("b", "v", 1, 1, 0.0).with_time_millis(hour),
    ///     Image::constant("c", "v", 1, 1, 0.0).with_time_millis(4 * hour),
    /// ]);
    /// let longest = ts.interval_in().unit(Frequency::Hour).reducer(Reducer::Max).call()?;
    /// assert_eq!(longest, Some(3.0));
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn interval_in(
        &self,
        unit: Frequency,
        reducer: Option<Reducer>,
    ) -> Result<Option<f64>, TimeSeriesError> {
        let unit_ms = unit
            .fixed_duration()
            .map(|d| d.num_milliseconds())
            .ok_or(TimeSeriesError::UnsupportedUnit(unit))?;
        let spacings: Vec<f64> = self
            .spacings()?
            .into_iter()
            .map(|gap| gap as f64 / unit_ms as f64)
            .collect();
        if spacings.is_empty() {
            return Ok(None);
        }
        Ok(Some(reducer.unwrap_or_default().apply(&spacings)))
    }

    /// Summarises the series: id, image count, time range and modal interval.
    pub fn describe(&self) -> Result<Description, TimeSeriesError> {
        Ok(Description {
            id: self.collection.id.clone(),
            images: self.len(),
            start: self.start_time()?,
            end: self.end_time()?,
            interval: self.interval()?,
        })
    }

    /// Aggregates the series into fixed time windows.
    ///
    /// Windows start at the first image (or at the calendar start of its unit
    /// when `calendar_aligned` is set) and each window is reduced into one
    /// image stamped with the window start.
    ///
    /// # Arguments
    ///
    /// * `.frequency(Frequency)`: **Required.** Window length.
    /// * `.reducer(Reducer)`: Optional. Defaults to [`Reducer::Mean`].
    /// * `.keep_bandnames(bool)`: Optional. Defaults to `false`, which renames
    ///   `band` to `band_{reducer}`.
    /// * `.gap_policy(GapPolicy)`: Optional. Handling of windows without images.
    ///   Defaults to [`GapPolicy::Drop`].
    /// * `.calendar_aligned(bool)`: Optional. Defaults to `false`.
    ///
    /// # Errors
    ///
    /// Timestamp errors, [`TimeSeriesError::EmptyCollection`], or a
    /// [`TimeSeriesError::Compute`] error from the backend.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, TimeZone, Utc};
    /// use wxts::{Frequency, Image, Reducer, TimeSeries, TimeSeriesError};
    ///
    /// # fn main() -> Result<(), TimeSeriesError> {
    /// let start = Utc.with_ymd_and_hms(2020, 9, 8, 0, 0, 0).unwrap();
    /// let hourly = TimeSeries::from_images(
    ///     (0..48)
    ///         .map(|h| {
    ///             Image::constant(format!("h{h}"), "temp", 1, 1, h as f64)
    ///                 .with_time(start + Duration::hours(h))
    ///         })
    ///         .collect(),
    /// );
    ///
    /// let daily_max = hourly
    ///     .aggregate_time()
    ///     .frequency(Frequency::Day)
    ///     .reducer(Reducer::Max)
    ///     .call()?;
    ///
    /// assert_eq!(daily_max.len(), 2);
    /// assert_eq!(daily_max.images()[1].band_names(), vec!["temp_max"]);
    /// assert_eq!(daily_max.images()[1].bands[0].values, vec![47.0]);
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn aggregate_time(
        &self,
        frequency: Frequency,
        reducer: Option<Reducer>,
        keep_bandnames: Option<bool>,
        gap_policy: Option<GapPolicy>,
        calendar_aligned: Option<bool>,
    ) -> Result<TimeSeries, TimeSeriesError> {
        let spec = AggregationSpec::builder()
            .frequency(frequency)
            .reducer(reducer.unwrap_or_default())
            .keep_bandnames(keep_bandnames.unwrap_or(false))
            .gap_policy(gap_policy.unwrap_or_default())
            .calendar_aligned(calendar_aligned.unwrap_or(false))
            .build();
        let aggregated = aggregate::aggregate(self.backend.as_ref(), &self.collection, &spec)?;
        Ok(self.derive(aggregated))
    }

    /// Long-term mean per month or per day of year.
    ///
    /// The series is first aggregated to the climatology's base unit with
    /// `reducer`, then every bucket is averaged across years.
    ///
    /// # Arguments
    ///
    /// * `.frequency(ClimatologyFrequency)`: **Required.** Month or day of year.
    /// * `.reducer(Reducer)`: Optional. Pre-aggregation reducer, defaults to [`Reducer::Mean`].
    /// * `.start(u32)` / `.end(u32)`: Optional. Inclusive key range, defaults to the whole domain.
    /// * `.keep_bandnames(bool)`: Optional. Defaults to `false`, which renames `band` to `band_mean`.
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::InvalidKeyRange`] when `start`/`end` fall outside the
    /// frequency's domain, plus the errors of [`TimeSeries::aggregate_time`].
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, TimeZone, Utc};
    /// use wxts::{ClimatologyFrequency, Image, Reducer, TimeSeries, TimeSeriesError};
    ///
    /// # fn main() -> Result<(), TimeSeriesError> {
    /// let start = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
    /// let daily = TimeSeries::from_images(
    ///     (0..730)
    ///         .map(|d| Image::constant("d", "pr", 1, 1, 1.0).with_time(start + Duration::days(d)))
    ///         .collect(),
    /// );
    ///
    /// let normals = daily
    ///     .climatology_mean()
    ///     .frequency(ClimatologyFrequency::Month)
    ///     .reducer(Reducer::Sum)
    ///     .call()?;
    ///
    /// assert_eq!(normals.len(), 12);
    /// assert_eq!(normals.get(2).unwrap().image.bands[0].values, vec![28.0]);
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn climatology_mean(
        &self,
        frequency: ClimatologyFrequency,
        reducer: Option<Reducer>,
        start: Option<u32>,
        end: Option<u32>,
        keep_bandnames: Option<bool>,
    ) -> Result<Climatology, TimeSeriesError> {
        self.climatology(
            Statistic::Mean,
            frequency,
            reducer,
            start,
            end,
            keep_bandnames,
        )
    }

    /// Long-term population standard deviation per month or per day of year.
    ///
    /// Takes the same arguments as [`TimeSeries::climatology_mean`].
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::InsufficientYears`] when a populated bucket in the
    /// requested key range holds data from fewer than two calendar years, plus
    /// the errors of [`TimeSeries::climatology_mean`].
    #[builder]
    pub fn climatology_std(
        &self,
        frequency: ClimatologyFrequency,
        reducer: Option<Reducer>,
        start: Option<u32>,
        end: Option<u32>,
        keep_bandnames: Option<bool>,
    ) -> Result<Climatology, TimeSeriesError> {
        self.climatology(
            Statistic::StdDev,
            frequency,
            reducer,
            start,
            end,
            keep_bandnames,
        )
    }

    fn climatology(
        &self,
        statistic: Statistic,
        frequency: ClimatologyFrequency,
        reducer: Option<Reducer>,
        start: Option<u32>,
        end: Option<u32>,
        keep_bandnames: Option<bool>,
    ) -> Result<Climatology, TimeSeriesError> {
        let spec = ClimatologySpec::builder()
            .frequency(frequency)
            .statistic(statistic)
            .reducer(reducer.unwrap_or_default())
            .maybe_start(start)
            .maybe_end(end)
            .keep_bandnames(keep_bandnames.unwrap_or(false))
            .build();
        let (start, end) = spec.key_range()?;
        let entries =
            climatology::build_climatology(self.backend.as_ref(), &self.collection, &spec)?;
        Ok(Climatology::new(
            frequency,
            statistic,
            (start, end),
            entries,
            Arc::clone(&self.backend),
        ))
    }

    /// Departure of every image from its climatological normal.
    ///
    /// Each image is matched to the climatology bucket of its own month or day
    /// of year and the bucket is subtracted band by band. Observed band names,
    /// ids and timestamps are kept.
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::NoMatchingBucket`] when an image falls in a bucket
    /// the climatology does not have.
    pub fn climatology_anomaly(
        &self,
        climatology: &Climatology,
    ) -> Result<TimeSeries, TimeSeriesError> {
        let anomalies = climatology::anomaly(
            self.backend.as_ref(),
            &self.collection,
            climatology.frequency(),
            climatology.entries(),
        )?;
        Ok(self.derive(anomalies))
    }

    /// Resamples the series at arbitrary times.
    ///
    /// # Arguments
    ///
    /// * `.times(Vec<DateTime<Utc>>)`: **Required.** Target times, returned in the given order.
    /// * `.method(InterpolationMethod)`: Optional. Defaults to [`InterpolationMethod::Linear`].
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::OutOfRange`] for a target before the first or after
    /// the last image.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use wxts::{Image, InterpolationMethod, TimeSeries, TimeSeriesError};
    ///
    /// # fn main() -> Result<(), TimeSeriesError> {
    /// let day = 86_400_000;
    /// let ts = TimeSeries::from_images(vec![
    ///     Image::constant("a", "v", 1, 1, 0.0).with_time_millis(0),
    ///     Image::constant("b", "v", 1, 1, 10.0).with_time_millis(day),
    /// ]);
    /// let noon = Utc.with_ymd_and_hms(1970, 1, 1, 12, 0, 0).unwrap();
    ///
    /// let resampled = ts.interpolate_time().times(vec![noon]).call()?;
    /// assert_eq!(resampled.images()[0].bands[0].values, vec![5.0]);
    ///
    /// let nearest = ts
    ///     .interpolate_time()
    ///     .times(vec![noon])
    ///     .method(InterpolationMethod::Nearest)
    ///     .call()?;
    /// assert_eq!(nearest.images()[0].bands[0].values, vec![10.0]);
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn interpolate_time(
        &self,
        times: Vec<DateTime<Utc>>,
        method: Option<InterpolationMethod>,
    ) -> Result<TimeSeries, TimeSeriesError> {
        let resampled = interpolate::interpolate_at(
            self.backend.as_ref(),
            &self.collection,
            &times,
            method.unwrap_or_default(),
        )?;
        Ok(self.derive(resampled))
    }

    /// Reduces a moving time window around every image.
    ///
    /// # Arguments
    ///
    /// * `.window(Duration)`: **Required.** Window width, must be positive.
    /// * `.reducer(Reducer)`: Optional. Defaults to [`Reducer::Mean`].
    /// * `.alignment(RollingAlignment)`: Optional. Defaults to [`RollingAlignment::Trailing`].
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::InvalidWindow`] for a zero or negative window.
    #[builder]
    pub fn rolling_time(
        &self,
        window: Duration,
        reducer: Option<Reducer>,
        alignment: Option<RollingAlignment>,
    ) -> Result<TimeSeries, TimeSeriesError> {
        let rolled = rolling::rolling(
            self.backend.as_ref(),
            &self.collection,
            window,
            &reducer.unwrap_or_default(),
            alignment.unwrap_or_default(),
        )?;
        Ok(self.derive(rolled))
    }

    /// Resolves empty images (flagged `wx:empty`) with `policy`.
    ///
    /// # Arguments
    ///
    /// * `.policy(GapPolicy)`: **Required.**
    /// * `.frequency(Frequency)`: Optional. When set, every window of this
    ///   length without an image is first filled with an empty marker.
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::InsufficientNeighbors`] when interpolating a series
    /// that holds no data at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use wxts::{Frequency, GapPolicy, Image, TimeSeries, TimeSeriesError};
    ///
    /// # fn main() -> Result<(), TimeSeriesError> {
    /// let day = 86_400_000;
    /// let ts = TimeSeries::from_images(vec![
    ///     Image::constant("a", "tmin", 1, 1, 2.0).with_time_millis(0),
    ///     Image::constant("c", "tmin", 1, 1, 6.0).with_time_millis(2 * day),
    /// ]);
    ///
    /// let filled = ts
    ///     .fill_gaps()
    ///     .policy(GapPolicy::InterpolateLinear)
    ///     .frequency(Frequency::Day)
    ///     .call()?;
    /// assert_eq!(filled.len(), 3);
    /// assert_eq!(filled.images()[1].bands[0].values, vec![4.0]);
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn fill_gaps(
        &self,
        policy: GapPolicy,
        frequency: Option<Frequency>,
    ) -> Result<TimeSeries, TimeSeriesError> {
        let marked = match frequency {
            Some(frequency) => gap_fill::mark_missing_windows(&self.collection, frequency)?,
            None => self.collection.clone(),
        };
        let filled = gap_fill::fill_gaps(self.backend.as_ref(), &marked, policy)?;
        Ok(self.derive(filled))
    }

    /// A new series with `image` added.
    ///
    /// # Errors
    ///
    /// A timestamp error when `image` has no usable `system:time_start`.
    pub fn insert_image(&self, image: Image) -> Result<TimeSeries, TimeSeriesError> {
        crate::engine::metadata::timestamp_of(&image)?;
        Ok(self.derive(self.collection.insert(image)))
    }

    /// Images with a timestamp in `[start, end)`, sorted by time.
    pub fn filter_date(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, TimeSeriesError> {
        Ok(self.derive(self.collection.filter_date(start, end)?))
    }

    /// The series as a long-format polars `DataFrame` with one row per pixel
    /// and band. See [`collection_to_frame`] for the columns.
    pub fn to_frame(&self) -> Result<DataFrame, TimeSeriesError> {
        Ok(collection_to_frame(&self.collection)?)
    }

    /// Writes every image as parquet into `config.out_dir`.
    ///
    /// Images are written concurrently; a failing image does not stop the
    /// others. Inspect the returned [`ExportReport`] for per-image outcomes.
    ///
    /// # Errors
    ///
    /// [`TimeSeriesError::Export`] when `config` is invalid.
    pub async fn to_parquet(&self, config: &ExportConfig) -> Result<ExportReport, TimeSeriesError> {
        let sink = Arc::new(ParquetSink::new());
        let report =
            export_collection(&self.collection, sink, config, CancellationToken::new()).await?;
        Ok(report)
    }
}

fn to_datetime(millis: i64) -> Result<DateTime<Utc>, TimeSeriesError> {
    millis_to_datetime(millis).ok_or_else(|| TimeSeriesError::InvalidTimestamp {
        image_id: String::from("<collection>"),
        value: millis.to_string(),
    })
}

/// Summary returned by [`TimeSeries::describe`].
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub id: Option<String>,
    pub images: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: Option<Duration>,
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.id.as_deref().unwrap_or("<unnamed collection>"))?;
        writeln!(f, "\tImages: {}", self.images)?;
        writeln!(f, "\tStart date: {}", self.start.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "\tEnd date: {}", self.end.format("%Y-%m-%d %H:%M:%S UTC"))?;
        match self.interval {
            Some(interval) => write!(f, "\tModal interval: {}", format_duration(interval)),
            None => write!(f, "\tModal interval: n/a"),
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds();
    let (n, unit) = if secs != 0 && secs % 86_400 == 0 {
        (secs / 86_400, "day")
    } else if secs != 0 && secs % 3_600 == 0 {
        (secs / 3_600, "hour")
    } else if secs != 0 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        return format!("{} ms", d.num_milliseconds());
    };
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
