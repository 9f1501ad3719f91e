use crate::compute::backend::ComputeBackend;
use crate::engine::aggregate::{aggregate, AggregationSpec};
use crate::engine::metadata::datetime_of;
use crate::error::TimeSeriesError;
use crate::types::collection::ImageCollection;
use crate::types::frequency::ClimatologyFrequency;
use crate::types::image::{Image, COORDINATE, DIMENSION, SOURCE_COUNT};
use crate::types::reducer::Reducer;
use bon::Builder;
use chrono::Datelike;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Property holding the number of distinct years behind a climatology image.
pub const YEAR_COUNT: &str = "wx:years";

/// The long-term statistic a climatology reports per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    #[default]
    Mean,
    /// Population standard deviation across years.
    #[serde(rename = "std")]
    StdDev,
}

impl Statistic {
    pub fn reducer(&self) -> Reducer {
        match self {
            Statistic::Mean => Reducer::Mean,
            Statistic::StdDev => Reducer::StdDev,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::StdDev => "stdDev",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One populated bucket of a climatology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimatologyEntry {
    /// Cyclical key: a month `1..=12` or a day of year `1..=366`.
    pub key: u32,
    pub image: Image,
    /// Distinct calendar years that contributed to the bucket.
    pub years: usize,
}

/// Parameters of a climatology computation.
#[derive(Debug, Clone, Builder)]
pub struct ClimatologySpec {
    pub frequency: ClimatologyFrequency,
    #[builder(default)]
    pub statistic: Statistic,
    /// Reducer used when pre-aggregating to the base frequency.
    #[builder(default)]
    pub reducer: Reducer,
    /// First key, defaults to the start of the frequency's domain.
    pub start: Option<u32>,
    /// Last key (inclusive), defaults to the end of the frequency's domain.
    pub end: Option<u32>,
    #[builder(default)]
    pub keep_bandnames: bool,
}

impl ClimatologySpec {
    /// The inclusive key range, validated against the frequency's domain.
    pub fn key_range(&self) -> Result<(u32, u32), TimeSeriesError> {
        let start = self.start.unwrap_or(self.frequency.default_start());
        let end = self.end.unwrap_or(self.frequency.default_end());
        if start > end || !self.frequency.contains_key(start) || !self.frequency.contains_key(end) {
            return Err(TimeSeriesError::InvalidKeyRange {
                dimension: self.frequency.name().to_string(),
                start,
                end,
            });
        }
        Ok((start, end))
    }
}

/// Reduces `collection` into one image per populated cyclical key.
///
/// The collection is first aggregated to the frequency's base unit with
/// calendar-aligned windows, so a monthly climatology of daily data with
/// [`Reducer::Sum`] reports the mean monthly total. Empty markers never
/// contribute to a bucket.
///
/// A standard deviation needs every populated bucket in `start..=end` to
/// span at least two calendar years; otherwise the call fails with
/// [`TimeSeriesError::InsufficientYears`] carrying the smallest year count.
pub fn build_climatology(
    backend: &dyn ComputeBackend,
    collection: &ImageCollection,
    spec: &ClimatologySpec,
) -> Result<Vec<ClimatologyEntry>, TimeSeriesError> {
    let (start, end) = spec.key_range()?;

    let base = aggregate(
        backend,
        collection,
        &AggregationSpec::builder()
            .frequency(spec.frequency.base_frequency())
            .reducer(spec.reducer.clone())
            .keep_bandnames(true)
            .calendar_aligned(true)
            .build(),
    )?;

    let mut buckets: BTreeMap<u32, Vec<(i32, &Image)>> = BTreeMap::new();
    for img in base.images().iter().filter(|img| !img.is_empty_marker()) {
        let time = datetime_of(img)?;
        buckets
            .entry(spec.frequency.key_of(time))
            .or_default()
            .push((time.year(), img));
    }

    if spec.statistic == Statistic::StdDev {
        let fewest = buckets
            .range(start..=end)
            .map(|(_, members)| distinct_years(members))
            .min()
            .unwrap_or(0);
        if fewest < 2 {
            return Err(TimeSeriesError::InsufficientYears { found: fewest });
        }
    }

    let reducer = spec.statistic.reducer();
    let mut entries = Vec::new();
    for (&key, members) in buckets.range(start..=end) {
        let images: Vec<&Image> = members.iter().map(|(_, img)| *img).collect();
        let years = distinct_years(members);
        debug!(
            "{} {} {}: reducing {} images from {} years",
            spec.statistic,
            spec.frequency,
            key,
            images.len(),
            years
        );

        let reduced = backend.reduce(&images, &reducer)?;
        let mut properties = Map::new();
        properties.insert(DIMENSION.into(), spec.frequency.name().into());
        properties.insert(COORDINATE.into(), key.into());
        properties.insert(SOURCE_COUNT.into(), images.len().into());
        properties.insert(YEAR_COUNT.into(), years.into());

        let image = reduced
            .with_id(format!("{}_{}_{}", spec.statistic, spec.frequency, key))
            .with_properties(properties)
            .with_band_names(&images[0].band_names());
        let image = if spec.keep_bandnames {
            image
        } else {
            let suffix = spec.statistic.name();
            image.rename_bands(|name| format!("{}_{}", name, suffix))
        };
        entries.push(ClimatologyEntry { key, image, years });
    }

    info!(
        "Built {} climatology with {} of {} {} buckets populated",
        spec.statistic,
        entries.len(),
        end - start + 1,
        spec.frequency
    );
    Ok(entries)
}

fn distinct_years(members: &[(i32, &Image)]) -> usize {
    members.iter().map(|(y, _)| *y).collect::<BTreeSet<_>>().len()
}

/// Subtracts the matching climatology bucket from every observed image.
///
/// `entries` must be sorted by key. Observed ids, timestamps, properties and
/// band names are kept.
///
/// # Errors
///
/// [`TimeSeriesError::NoMatchingBucket`] when an observed image's key has no
/// entry.
pub fn anomaly(
    backend: &dyn ComputeBackend,
    observed: &ImageCollection,
    frequency: ClimatologyFrequency,
    entries: &[ClimatologyEntry],
) -> Result<ImageCollection, TimeSeriesError> {
    let timed = observed.sorted_by_time()?;
    let mut images = Vec::with_capacity(timed.len());
    for (_, img) in timed {
        let key = frequency.key_of(datetime_of(img)?);
        let entry = entries
            .binary_search_by_key(&key, |e| e.key)
            .map(|i| &entries[i])
            .map_err(|_| TimeSeriesError::NoMatchingBucket {
                dimension: frequency.name().to_string(),
                key,
            })?;

        let diff = backend.weighted_sum(&[(img, 1.0), (&entry.image, -1.0)])?;
        let names: Vec<&str> = img.band_names();
        images.push(
            diff.with_id(img.id.clone())
                .with_properties(img.properties.clone())
                .with_band_names(&names),
        );
    }
    Ok(observed.with_images(images))
}
