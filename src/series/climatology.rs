use crate::compute::backend::ComputeBackend;
use crate::engine::climatology::{ClimatologyEntry, Statistic};
use crate::series::time_series::TimeSeries;
use crate::types::collection::ImageCollection;
use crate::types::frequency::ClimatologyFrequency;
use std::fmt;
use std::sync::Arc;

/// Long-term normals of a series, one image per month or day of year.
///
/// Created by [`TimeSeries::climatology_mean`] or
/// [`TimeSeries::climatology_std`]. Only buckets with data are present and
/// entries are ordered by key.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use wxts::{ClimatologyFrequency, Image, TimeSeries, TimeSeriesError};
///
/// # fn main() -> Result<(), TimeSeriesError> {
/// let start = Utc.with_ymd_and_hms(2010, 6, 1, 0, 0, 0).unwrap();
/// let summer = TimeSeries::from_images(
///     (0..92)
///         .map(|d| Image::constant("d", "tmmx", 1, 1, 300.0).with_time(start + Duration::days(d)))
///         .collect(),
/// );
/// let normals = summer
///     .climatology_mean()
///     .frequency(ClimatologyFrequency::Month)
///     .call()?;
///
/// assert_eq!(normals.keys(), vec![6, 7, 8]);
/// assert!(normals.get(1).is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Climatology {
    frequency: ClimatologyFrequency,
    statistic: Statistic,
    key_range: (u32, u32),
    entries: Vec<ClimatologyEntry>,
    backend: Arc<dyn ComputeBackend>,
}

impl fmt::Debug for Climatology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Climatology")
            .field("frequency", &self.frequency)
            .field("statistic", &self.statistic)
            .field("key_range", &self.key_range)
            .field("keys", &self.keys())
            .finish_non_exhaustive()
    }
}

impl Climatology {
    pub(crate) fn new(
        frequency: ClimatologyFrequency,
        statistic: Statistic,
        key_range: (u32, u32),
        entries: Vec<ClimatologyEntry>,
        backend: Arc<dyn ComputeBackend>,
    ) -> Self {
        Self {
            frequency,
            statistic,
            key_range,
            entries,
            backend,
        }
    }

    pub fn frequency(&self) -> ClimatologyFrequency {
        self.frequency
    }

    pub fn statistic(&self) -> Statistic {
        self.statistic
    }

    /// The inclusive key range that was requested.
    pub fn key_range(&self) -> (u32, u32) {
        self.key_range
    }

    /// Populated buckets, ordered by key.
    pub fn entries(&self) -> &[ClimatologyEntry] {
        &self.entries
    }

    pub fn get(&self, key: u32) -> Option<&ClimatologyEntry> {
        self.entries
            .binary_search_by_key(&key, |e| e.key)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn keys(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The climatology images as a collection, in key order.
    pub fn to_collection(&self) -> ImageCollection {
        self.entries.iter().map(|e| e.image.clone()).collect()
    }

    /// The climatology images as a [`TimeSeries`] sharing this backend.
    ///
    /// The images carry no timestamps, so only operations that do not need
    /// time (export, frames) apply.
    pub fn to_series(&self) -> TimeSeries {
        TimeSeries::from_collection(self.to_collection(), Arc::clone(&self.backend))
    }

    pub fn describe(&self) -> ClimatologyDescription {
        ClimatologyDescription {
            frequency: self.frequency,
            statistic: self.statistic,
            key_range: self.key_range,
            populated: self.len(),
            min_years: self.entries.iter().map(|e| e.years).min(),
            max_years: self.entries.iter().map(|e| e.years).max(),
        }
    }
}

/// Summary returned by [`Climatology::describe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimatologyDescription {
    pub frequency: ClimatologyFrequency,
    pub statistic: Statistic,
    pub key_range: (u32, u32),
    pub populated: usize,
    pub min_years: Option<usize>,
    pub max_years: Option<usize>,
}

impl fmt::Display for ClimatologyDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.key_range;
        writeln!(f, "{} climatology by {}", self.statistic, self.frequency)?;
        writeln!(
            f,
            "\tBuckets: {} of {} ({}..={})",
            self.populated,
            end - start + 1,
            start,
            end
        )?;
        match (self.min_years, self.max_years) {
            (Some(lo), Some(hi)) if lo == hi => write!(f, "\tYears per bucket: {}", lo),
            (Some(lo), Some(hi)) => write!(f, "\tYears per bucket: {} to {}", lo, hi),
            _ => write!(f, "\tYears per bucket: n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TimeSeriesError;
    use crate::types::frequency::ClimatologyFrequency;
    use crate::types::image::{Image, COORDINATE};
    use crate::TimeSeries;
    use chrono::{Duration, TimeZone, Utc};

    fn two_years() -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        TimeSeries::from_images(
            (0..730)
                .map(|d| {
                    Image::constant("d", "etr", 1, 1, if d < 365 { 2.0 } else { 4.0 })
                        .with_time(start + Duration::days(d))
                })
                .collect(),
        )
    }

    #[test]
    fn test_accessors_and_description() -> Result<(), TimeSeriesError> {
        let clim = two_years()
            .climatology_mean()
            .frequency(ClimatologyFrequency::Month)
            .start(3)
            .end(5)
            .call()?;

        assert_eq!(clim.keys(), vec![3, 4, 5]);
        assert_eq!(clim.key_range(), (3, 5));
        assert_eq!(clim.get(4).unwrap().image.bands[0].values, vec![3.0]);
        assert!(clim.get(6).is_none());

        let text = clim.describe().to_string();
        assert!(text.contains("Buckets: 3 of 3 (3..=5)"));
        assert!(text.contains("Years per bucket: 2"));
        Ok(())
    }

    #[test]
    fn test_std_and_collection() -> Result<(), TimeSeriesError> {
        let clim = two_years()
            .climatology_std()
            .frequency(ClimatologyFrequency::Month)
            .call()?;
        assert_eq!(clim.len(), 12);
        assert!(clim
            .entries()
            .iter()
            .all(|e| e.image.bands[0].values == vec![1.0]));

        let col = clim.to_collection();
        let coords: Vec<_> = col
            .images()
            .iter()
            .filter_map(|img| img.property(COORDINATE)?.as_u64())
            .collect();
        assert_eq!(coords, (1..=12).collect::<Vec<u64>>());
        assert_eq!(clim.to_series().len(), 12);
        Ok(())
    }
}
