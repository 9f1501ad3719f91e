use crate::compute::backend::ComputeBackend;
use crate::engine::gap_fill::{empty_marker, fill_gaps};
use crate::engine::metadata::{end_timestamp_of, format_time, millis_to_datetime};
use crate::error::TimeSeriesError;
use crate::types::collection::ImageCollection;
use crate::types::frequency::Frequency;
use crate::types::image::{Image, EMPTY_FLAG, SOURCE_COUNT, TIME_END, TIME_START};
use crate::types::policy::GapPolicy;
use crate::types::reducer::Reducer;
use crate::types::window::{generate_windows, TimeWindow};
use bon::Builder;
use log::{debug, info};

/// Parameters of a fixed-bucket temporal aggregation.
#[derive(Debug, Clone, Builder)]
pub struct AggregationSpec {
    pub frequency: Frequency,
    /// Defaults to [`Reducer::Mean`].
    #[builder(default)]
    pub reducer: Reducer,
    /// Keep source band names instead of suffixing them with the reducer name.
    #[builder(default)]
    pub keep_bandnames: bool,
    #[builder(default)]
    pub gap_policy: GapPolicy,
    /// Anchor windows at the calendar start of the first image's unit instead
    /// of at the first image's timestamp.
    #[builder(default)]
    pub calendar_aligned: bool,
}

/// Buckets `collection` into windows of `spec.frequency` and reduces each one.
///
/// Windows start at the earliest timestamp (or its calendar floor) and cover
/// every image. Output images are tagged with their window start and are
/// returned in window order.
pub fn aggregate(
    backend: &dyn ComputeBackend,
    collection: &ImageCollection,
    spec: &AggregationSpec,
) -> Result<ImageCollection, TimeSeriesError> {
    let timed = collection.sorted_by_time()?;
    let (Some(&(first_ms, _)), Some(&(last_ms, _))) = (timed.first(), timed.last()) else {
        return Err(TimeSeriesError::EmptyCollection);
    };
    let first = to_datetime(first_ms)?;
    let end = to_datetime(last_ms.saturating_add(1))?;
    let anchor = if spec.calendar_aligned {
        spec.frequency.truncate(first)
    } else {
        first
    };

    let mut slots: Vec<(TimeWindow, Option<Image>)> = Vec::new();
    let mut cursor = 0;
    for window in generate_windows(anchor, end, spec.frequency).iter() {
        let window_end = window.end.timestamp_millis();
        let mut members: Vec<(i64, &Image)> = Vec::new();
        while cursor < timed.len() && timed[cursor].0 < window_end {
            // markers of earlier gaps carry no data
            if !timed[cursor].1.is_empty_marker() {
                members.push(timed[cursor]);
            }
            cursor += 1;
        }
        if members.is_empty() {
            slots.push((window, None));
            continue;
        }

        let images: Vec<&Image> = members.iter().map(|(_, img)| *img).collect();
        let reduced = backend.reduce(&images, &spec.reducer)?;
        let tagged = tag_window_output(reduced, &window, &members, spec)?;
        slots.push((window, Some(tagged)));
    }

    let empty = slots.iter().filter(|(_, img)| img.is_none()).count();
    info!(
        "Aggregated {} images into {} {} windows ({} empty, gap policy {})",
        timed.len(),
        slots.len(),
        spec.frequency,
        empty,
        spec.gap_policy
    );

    // Template for placeholders when every input image is a marker.
    let fallback = timed
        .first()
        .map(|&(_, img)| rename_output_bands(img.clone(), img, spec));
    let aggregated =
        collection.with_images(resolve_empty_windows(slots, spec.gap_policy, fallback));

    match spec.gap_policy {
        GapPolicy::InterpolateLinear if empty > 0 => {
            fill_gaps(backend, &aggregated, GapPolicy::InterpolateLinear)
        }
        _ => Ok(aggregated),
    }
}

fn to_datetime(millis: i64) -> Result<chrono::DateTime<chrono::Utc>, TimeSeriesError> {
    millis_to_datetime(millis).ok_or_else(|| TimeSeriesError::InvalidTimestamp {
        image_id: String::from("<window boundary>"),
        value: millis.to_string(),
    })
}

fn tag_window_output(
    reduced: Image,
    window: &TimeWindow,
    members: &[(i64, &Image)],
    spec: &AggregationSpec,
) -> Result<Image, TimeSeriesError> {
    let source = members[0].1;
    let mut time_end = i64::MIN;
    for (_, img) in members {
        time_end = time_end.max(end_timestamp_of(img)?);
    }

    let mut properties = source.properties.clone();
    properties.remove(EMPTY_FLAG);
    properties.insert(TIME_START.into(), window.start.timestamp_millis().into());
    properties.insert(TIME_END.into(), time_end.into());
    properties.insert(SOURCE_COUNT.into(), members.len().into());

    let image = reduced
        .with_id(format_time(window.representative()))
        .with_properties(properties);

    Ok(rename_output_bands(image, source, spec))
}

fn rename_output_bands(image: Image, source: &Image, spec: &AggregationSpec) -> Image {
    if spec.keep_bandnames {
        image.with_band_names(&source.band_names())
    } else {
        let suffix = spec.reducer.name();
        image.rename_bands(|name| format!("{}_{}", name, suffix))
    }
}

fn resolve_empty_windows(
    slots: Vec<(TimeWindow, Option<Image>)>,
    policy: GapPolicy,
    fallback: Option<Image>,
) -> Vec<Image> {
    if policy == GapPolicy::Drop {
        return slots.into_iter().filter_map(|(_, img)| img).collect();
    }

    let Some(template) = slots.iter().find_map(|(_, img)| img.clone()).or(fallback) else {
        return Vec::new();
    };
    slots
        .into_iter()
        .map(|(window, img)| {
            img.unwrap_or_else(|| {
                debug!("Marking empty window {}", window);
                empty_marker(&template, window.representative())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::local::LocalBackend;
    use crate::engine::metadata::datetime_of;
    use crate::types::image::Band;
    use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};

    fn hourly_series(start: DateTime<Utc>, hours: i64) -> ImageCollection {
        (0..hours)
            .map(|h| {
                // values rise through each day and differ per day
                let value = (h % 24) as f64 + (h / 24) as f64 * 100.0;
                Image::constant(format!("h{h}"), "temp", 2, 2, value)
                    .with_time(start + Duration::hours(h))
            })
            .collect()
    }

    #[test]
    fn test_hourly_to_daily_max() -> Result<(), TimeSeriesError> {
        let start = Utc.with_ymd_and_hms(2020, 9, 8, 0, 0, 0).unwrap();
        let source = hourly_series(start, 168);
        let spec = AggregationSpec::builder()
            .frequency(Frequency::Day)
            .reducer(Reducer::Max)
            .build();

        let daily = aggregate(&LocalBackend::new(), &source, &spec)?;

        assert_eq!(daily.len(), 7);
        for (day, img) in daily.images().iter().enumerate() {
            let t = datetime_of(img)?;
            assert_eq!(t, start + Duration::days(day as i64));
            assert_eq!((t.hour(), t.minute()), (0, 0));
            assert_eq!(img.property(SOURCE_COUNT), Some(&24.into()));
            let expected = 23.0 + day as f64 * 100.0;
            assert!(img.bands[0].values.iter().all(|v| *v == expected));
        }
        Ok(())
    }

    #[test]
    fn test_hourly_to_daily_count() -> Result<(), TimeSeriesError> {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let spec = AggregationSpec::builder().frequency(Frequency::Day).build();
        let daily = aggregate(&LocalBackend::new(), &hourly_series(start, 48), &spec)?;
        assert_eq!(daily.len(), 2);
        Ok(())
    }

    #[test]
    fn test_daily_to_monthly_count() -> Result<(), TimeSeriesError> {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let source: ImageCollection = (0..350)
            .map(|d| Image::constant("d", "v", 1, 1, 0.0).with_time(start + Duration::days(d)))
            .collect();
        let spec = AggregationSpec::builder().frequency(Frequency::Month).build();
        let monthly = aggregate(&LocalBackend::new(), &source, &spec)?;
        assert_eq!(monthly.len(), 12);
        Ok(())
    }

    #[test]
    fn test_finer_frequency_returns_source_images() -> Result<(), TimeSeriesError> {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let source: ImageCollection = (0..17)
            .map(|d| Image::constant("d", "v", 1, 1, d as f64).with_time(start + Duration::days(d)))
            .collect();
        let backend = LocalBackend::new();

        let by_day = aggregate(&backend, &source, &AggregationSpec::builder().frequency(Frequency::Day).build())?;
        let by_hour = aggregate(&backend, &source, &AggregationSpec::builder().frequency(Frequency::Hour).build())?;
        assert_eq!(by_day.len(), 17);
        assert_eq!(by_hour.len(), 17);
        Ok(())
    }

    #[test]
    fn test_band_names() -> Result<(), TimeSeriesError> {
        let source = ImageCollection::new(vec![Image::constant("a", "test_band", 1, 1, 0.0)
            .with_time_millis(0)]);
        let backend = LocalBackend::new();

        let renamed = aggregate(
            &backend,
            &source,
            &AggregationSpec::builder().frequency(Frequency::Day).build(),
        )?;
        assert_eq!(renamed.images()[0].band_names(), vec!["test_band_mean"]);

        let kept = aggregate(
            &backend,
            &source,
            &AggregationSpec::builder()
                .frequency(Frequency::Day)
                .keep_bandnames(true)
                .build(),
        )?;
        assert_eq!(kept.images()[0].band_names(), vec!["test_band"]);
        Ok(())
    }

    #[test]
    fn test_reaggregation_is_idempotent() -> Result<(), TimeSeriesError> {
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let source = hourly_series(start, 24 * 40);
        let backend = LocalBackend::new();
        let spec = AggregationSpec::builder()
            .frequency(Frequency::Week)
            .keep_bandnames(true)
            .build();

        let once = aggregate(&backend, &source, &spec)?;
        let twice = aggregate(&backend, &once, &spec)?;

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.images().iter().zip(twice.images()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.bands, b.bands);
            assert_eq!(a.property(TIME_START), b.property(TIME_START));
        }
        Ok(())
    }

    #[test]
    fn test_unsorted_input_is_sorted_defensively() -> Result<(), TimeSeriesError> {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut images = hourly_series(start, 72).into_images();
        images.reverse();
        let spec = AggregationSpec::builder()
            .frequency(Frequency::Day)
            .reducer(Reducer::Min)
            .build();

        let daily = aggregate(&LocalBackend::new(), &ImageCollection::new(images), &spec)?;
        let mins: Vec<f64> = daily.images().iter().map(|i| i.bands[0].values[0]).collect();
        assert_eq!(mins, vec![0.0, 100.0, 200.0]);
        Ok(())
    }

    #[test]
    fn test_time_end_tracks_last_member() -> Result<(), TimeSeriesError> {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let spec = AggregationSpec::builder().frequency(Frequency::Day).build();
        let daily = aggregate(&LocalBackend::new(), &hourly_series(start, 24), &spec)?;
        let expected = (start + Duration::hours(23)).timestamp_millis();
        assert_eq!(daily.images()[0].property(TIME_END), Some(&expected.into()));
        Ok(())
    }

    fn daily_with_gap() -> ImageCollection {
        let start = Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap();
        [0, 1, 3, 4]
            .into_iter()
            .map(|d| {
                Image::new("d", 1, 1, vec![Band::new("v", vec![d as f64 * 10.0])])
                    .with_time(start + Duration::days(d))
            })
            .collect()
    }

    #[test]
    fn test_gap_policies() -> Result<(), TimeSeriesError> {
        let backend = LocalBackend::new();
        let spec = |policy| {
            AggregationSpec::builder()
                .frequency(Frequency::Day)
                .keep_bandnames(true)
                .gap_policy(policy)
                .build()
        };

        let dropped = aggregate(&backend, &daily_with_gap(), &spec(GapPolicy::Drop))?;
        assert_eq!(dropped.len(), 4);

        let nulled = aggregate(&backend, &daily_with_gap(), &spec(GapPolicy::NullImage))?;
        assert_eq!(nulled.len(), 5);
        assert!(nulled.images()[2].is_empty_marker());
        assert!(nulled.images()[2].bands[0].values[0].is_nan());
        assert_eq!(nulled.images()[2].band_names(), vec!["v"]);

        let filled = aggregate(&backend, &daily_with_gap(), &spec(GapPolicy::InterpolateLinear))?;
        assert_eq!(filled.len(), 5);
        assert!(!filled.images()[2].is_empty_marker());
        assert_eq!(filled.images()[2].bands[0].values[0], 20.0);
        Ok(())
    }

    #[test]
    fn test_markers_stay_empty_when_reaggregated() -> Result<(), TimeSeriesError> {
        let backend = LocalBackend::new();
        let spec = |policy| {
            AggregationSpec::builder()
                .frequency(Frequency::Day)
                .keep_bandnames(true)
                .gap_policy(policy)
                .build()
        };
        let nulled = aggregate(&backend, &daily_with_gap(), &spec(GapPolicy::NullImage))?;

        let twice = aggregate(&backend, &nulled, &spec(GapPolicy::NullImage))?;
        assert_eq!(twice.len(), 5);
        let gap = &twice.images()[2];
        assert!(gap.is_empty_marker());
        assert_eq!(gap.property(SOURCE_COUNT), Some(&0.into()));
        assert!(gap.bands[0].values[0].is_nan());
        assert_eq!(twice.images()[1].property(SOURCE_COUNT), Some(&1.into()));

        let dropped = aggregate(&backend, &nulled, &spec(GapPolicy::Drop))?;
        assert_eq!(dropped.len(), 4);
        assert!(dropped.images().iter().all(|img| !img.is_empty_marker()));

        let filled = fill_gaps(&backend, &twice, GapPolicy::InterpolateLinear)?;
        assert_eq!(filled.images()[2].bands[0].values[0], 20.0);
        Ok(())
    }

    #[test]
    fn test_marker_and_data_in_one_window() -> Result<(), TimeSeriesError> {
        let backend = LocalBackend::new();
        let nulled = aggregate(
            &backend,
            &daily_with_gap(),
            &AggregationSpec::builder()
                .frequency(Frequency::Day)
                .keep_bandnames(true)
                .gap_policy(GapPolicy::NullImage)
                .build(),
        )?;

        // one week holds the marker and the four real days
        let weekly = aggregate(
            &backend,
            &nulled,
            &AggregationSpec::builder().frequency(Frequency::Week).build(),
        )?;
        assert_eq!(weekly.len(), 1);
        let img = &weekly.images()[0];
        assert_eq!(img.property(SOURCE_COUNT), Some(&4.into()));
        assert_eq!(img.bands[0].values[0], 20.0);
        assert_eq!(img.band_names(), vec!["v_mean"]);
        Ok(())
    }

    #[test]
    fn test_only_markers() -> Result<(), TimeSeriesError> {
        let start = Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap();
        let template = Image::constant("t", "v", 1, 1, 1.0);
        let markers: ImageCollection = (0..3)
            .map(|d| empty_marker(&template, start + Duration::days(d)))
            .collect();
        let backend = LocalBackend::new();

        let spec = AggregationSpec::builder()
            .frequency(Frequency::Day)
            .gap_policy(GapPolicy::NullImage)
            .build();
        let out = aggregate(&backend, &markers, &spec)?;
        assert_eq!(out.len(), 3);
        assert!(out.images().iter().all(|img| img.is_empty_marker()));
        assert_eq!(out.images()[0].band_names(), vec!["v_mean"]);

        let dropped = aggregate(
            &backend,
            &markers,
            &AggregationSpec::builder().frequency(Frequency::Day).build(),
        )?;
        assert!(dropped.is_empty());
        Ok(())
    }

    #[test]
    fn test_empty_collection() {
        let spec = AggregationSpec::builder().frequency(Frequency::Day).build();
        let err = aggregate(&LocalBackend::new(), &ImageCollection::default(), &spec).unwrap_err();
        assert!(matches!(err, TimeSeriesError::EmptyCollection));
    }
}
