use chrono::{Datelike, Duration, TimeZone, Utc};
use std::env;
use wxts::{
    Band, ClimatologyFrequency, ExportConfig, Frequency, GapPolicy, Image, Reducer, TimeSeries,
    TimeSeriesError,
};

#[tokio::main]
async fn main() -> Result<(), TimeSeriesError> {
    configure_polars_display();
    let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();

    // Ten years of synthetic 2x2 daily temperatures with a seasonal cycle.
    let images: Vec<Image> = (0..3653)
        .filter(|d| d % 97 != 0)
        .map(|d| {
            let time = start + Duration::days(d);
            let season = (time.ordinal() as f64 / 365.25 * std::f64::consts::TAU).cos();
            let values = (0..4).map(|px| 283.0 - 12.0 * season + px as f64).collect();
            Image::new(format!("day{d}"), 2, 2, vec![Band::new("tmmx", values)]).with_time(time)
        })
        .collect();
    let daily = TimeSeries::from_images(images);
    println!("{}", daily.describe()?);

    let filled = daily
        .fill_gaps()
        .policy(GapPolicy::InterpolateLinear)
        .frequency(Frequency::Day)
        .call()?;
    println!("{}", filled.describe()?);

    let monthly = filled
        .aggregate_time()
        .frequency(Frequency::Month)
        .reducer(Reducer::Max)
        .keep_bandnames(true)
        .calendar_aligned(true)
        .call()?;

    let normals = monthly
        .climatology_mean()
        .frequency(ClimatologyFrequency::Month)
        .keep_bandnames(true)
        .call()?;
    println!("{}", normals.describe());

    let anomalies = monthly.climatology_anomaly(&normals)?;
    println!("{:#?}", anomalies.to_frame()?);

    let config = ExportConfig::builder()
        .out_dir(env::temp_dir().join("wxts-demo"))
        .prefix("normals_")
        .build();
    let report = normals.to_series().to_parquet(&config).await?;
    for path in report.paths() {
        println!("wrote {}", path.display());
    }

    Ok(())
}

fn configure_polars_display() {
    // show every column
    env::set_var("POLARS_FMT_MAX_COLS", "-1");
    // show 20 rows
    env::set_var("POLARS_FMT_MAX_ROWS", "20");
}
