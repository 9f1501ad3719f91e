//! Concurrent export of a collection, one unit of work per image.

use crate::export::error::ExportError;
use crate::export::sink::ImageSink;
use crate::types::collection::ImageCollection;
use crate::types::image::Image;
use bon::Builder;
use futures_util::stream::{self, StreamExt};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Settings for [`export_collection`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use wxts::ExportConfig;
///
/// let config = ExportConfig::builder()
///     .out_dir("/tmp/gridmet")
///     .file_per_band(true)
///     .max_attempts(3)
///     .retry_backoff(Duration::from_millis(250))
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Builder)]
pub struct ExportConfig {
    /// Directory receiving the files; created when missing.
    #[builder(into)]
    pub out_dir: PathBuf,
    /// Prepended to every file name.
    #[builder(into)]
    pub prefix: Option<String>,
    /// Write one file per band instead of one file per image.
    #[builder(default)]
    pub file_per_band: bool,
    /// Value written in place of masked pixels.
    pub nodata: Option<f64>,
    /// Images exported at the same time. Defaults to the available parallelism.
    #[builder(default = default_workers())]
    pub max_workers: usize,
    /// Attempts per image, `1..=99`. Defaults to 10.
    #[builder(default = 10)]
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on each further retry.
    #[builder(default = Duration::from_millis(100))]
    pub retry_backoff: Duration,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), ExportError> {
        if !(1..=99).contains(&self.max_attempts) {
            return Err(ExportError::InvalidConfig(format!(
                "max_attempts must be between 1 and 99, got {}",
                self.max_attempts
            )));
        }
        if self.max_workers == 0 {
            return Err(ExportError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// What happened to one image.
#[derive(Debug)]
pub enum UnitStatus {
    Exported(Vec<PathBuf>),
    Failed(ExportError),
    /// Cancelled before the unit started.
    Skipped,
}

#[derive(Debug)]
pub struct UnitOutcome {
    pub image_id: String,
    pub status: UnitStatus,
}

/// Per-image outcomes of an export, in collection order.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub outcomes: Vec<UnitOutcome>,
}

impl ExportReport {
    /// Every file written, in collection order.
    pub fn paths(&self) -> Vec<&PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                UnitStatus::Exported(paths) => Some(paths),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn failures(&self) -> Vec<(&str, &ExportError)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                UnitStatus::Failed(e) => Some((o.image_id.as_str(), e)),
                _ => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, UnitStatus::Skipped))
            .count()
    }

    /// Whether every image was exported.
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, UnitStatus::Exported(_)))
    }

    /// All written paths, or the first failure.
    pub fn into_result(self) -> Result<Vec<PathBuf>, ExportError> {
        let mut paths = Vec::new();
        for outcome in self.outcomes {
            match outcome.status {
                UnitStatus::Exported(p) => paths.extend(p),
                UnitStatus::Failed(e) => return Err(e),
                UnitStatus::Skipped => {}
            }
        }
        Ok(paths)
    }
}

/// Exports every image of `collection` through `sink`.
///
/// At most `config.max_workers` images are in flight. Each image is written on
/// a blocking thread and retried with exponential backoff while the error is
/// transient, up to `config.max_attempts` attempts. A failing image never
/// stops the others. Once `cancel` fires, images that have not started yet
/// are reported as [`UnitStatus::Skipped`]; images already running finish.
///
/// # Errors
///
/// [`ExportError::InvalidConfig`] when `config` fails validation. Per-image
/// failures are reported in the [`ExportReport`] instead.
pub async fn export_collection(
    collection: &ImageCollection,
    sink: Arc<dyn ImageSink>,
    config: &ExportConfig,
    cancel: CancellationToken,
) -> Result<ExportReport, ExportError> {
    config.validate()?;
    let workers = config.max_workers;
    let config = Arc::new(config.clone());

    let mut outcomes: Vec<(usize, UnitOutcome)> =
        stream::iter(collection.images().iter().cloned().enumerate())
            .map(|(index, image)| {
                let sink = Arc::clone(&sink);
                let config = Arc::clone(&config);
                let cancel = cancel.clone();
                async move { (index, export_unit(image, sink, config, cancel).await) }
            })
            .buffer_unordered(workers)
            .collect()
            .await;
    outcomes.sort_by_key(|(index, _)| *index);

    let report = ExportReport {
        outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
    };
    info!(
        "Exported {} of {} images ({} failed, {} skipped)",
        report
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, UnitStatus::Exported(_)))
            .count(),
        report.outcomes.len(),
        report.failures().len(),
        report.skipped()
    );
    Ok(report)
}

async fn export_unit(
    image: Image,
    sink: Arc<dyn ImageSink>,
    config: Arc<ExportConfig>,
    cancel: CancellationToken,
) -> UnitOutcome {
    let image_id = image.id.clone();
    if cancel.is_cancelled() {
        return UnitOutcome {
            image_id,
            status: UnitStatus::Skipped,
        };
    }

    let image = Arc::new(image);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = {
            let sink = Arc::clone(&sink);
            let image = Arc::clone(&image);
            let config = Arc::clone(&config);
            task::spawn_blocking(move || sink.write(&image, &config))
                .await
                .map_err(ExportError::from)
                .and_then(|written| written)
        };

        let status = match result {
            Ok(paths) => UnitStatus::Exported(paths),
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                let delay = config.backoff(attempt);
                warn!(
                    "Attempt {} of {} for image '{}' failed, retrying in {:?}: {}",
                    attempt, config.max_attempts, image_id, delay, e
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(e) => {
                warn!("Giving up on image '{}' after {} attempt(s): {}", image_id, attempt, e);
                UnitStatus::Failed(ExportError::DownloadError {
                    image_id: image_id.clone(),
                    attempts: attempt,
                    source: Box::new(e),
                })
            }
        };
        return UnitOutcome { image_id, status };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sink::ParquetSink;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    fn collection(n: usize) -> ImageCollection {
        (0..n)
            .map(|i| Image::constant(format!("img{i}"), "v", 1, 1, i as f64).with_time_millis(i as i64 * 86_400_000))
            .collect()
    }

    fn config(dir: &Path) -> ExportConfig {
        ExportConfig::builder()
            .out_dir(dir)
            .max_workers(3)
            .retry_backoff(Duration::from_millis(1))
            .build()
    }

    /// Fails transiently a fixed number of times per image before succeeding.
    struct FlakySink {
        failures: u32,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl ImageSink for FlakySink {
        fn write(&self, image: &Image, _: &ExportConfig) -> Result<Vec<PathBuf>, ExportError> {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(image.id.clone()).or_default();
            *n += 1;
            if *n <= self.failures {
                Err(ExportError::Transient(format!("attempt {n}")))
            } else {
                Ok(vec![PathBuf::from(&image.id)])
            }
        }
    }

    /// Rejects one image permanently.
    struct RejectingSink(&'static str);

    impl ImageSink for RejectingSink {
        fn write(&self, image: &Image, _: &ExportConfig) -> Result<Vec<PathBuf>, ExportError> {
            if image.id == self.0 {
                Err(ExportError::InvalidConfig("rejected".into()))
            } else {
                Ok(vec![PathBuf::from(&image.id)])
            }
        }
    }

    #[tokio::test]
    async fn test_parquet_export_of_collection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let report = export_collection(
            &collection(5),
            Arc::new(ParquetSink::new()),
            &config(dir.path()),
            CancellationToken::new(),
        )
        .await?;

        assert!(report.is_complete());
        let paths = report.into_result()?;
        assert_eq!(paths.len(), 5);
        assert!(paths.iter().all(|p| p.exists()));
        assert!(paths[1].ends_with("img1.time.19700102T000000.all.parquet"));
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() -> Result<(), ExportError> {
        let sink = Arc::new(FlakySink {
            failures: 2,
            calls: Mutex::new(HashMap::new()),
        });
        let report = export_collection(
            &collection(4),
            sink.clone(),
            &config(Path::new("unused")),
            CancellationToken::new(),
        )
        .await?;

        assert!(report.is_complete());
        let ids: Vec<&str> = report.outcomes.iter().map(|o| o.image_id.as_str()).collect();
        assert_eq!(ids, vec!["img0", "img1", "img2", "img3"]);
        assert!(sink.calls.lock().unwrap().values().all(|n| *n == 3));
        Ok(())
    }

    #[tokio::test]
    async fn test_retries_stop_at_max_attempts() -> Result<(), ExportError> {
        let sink = Arc::new(FlakySink {
            failures: 100,
            calls: Mutex::new(HashMap::new()),
        });
        let config = ExportConfig::builder()
            .out_dir("unused")
            .max_attempts(3)
            .retry_backoff(Duration::from_millis(1))
            .build();
        let report =
            export_collection(&collection(2), sink.clone(), &config, CancellationToken::new()).await?;

        let failures = report.failures();
        assert_eq!(failures.len(), 2);
        assert!(matches!(
            failures[0].1,
            ExportError::DownloadError { attempts: 3, .. }
        ));
        assert!(sink.calls.lock().unwrap().values().all(|n| *n == 3));
        Ok(())
    }

    #[tokio::test]
    async fn test_permanent_failure_is_isolated() -> Result<(), ExportError> {
        let report = export_collection(
            &collection(5),
            Arc::new(RejectingSink("img2")),
            &config(Path::new("unused")),
            CancellationToken::new(),
        )
        .await?;

        assert!(!report.is_complete());
        assert_eq!(report.paths().len(), 4);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "img2");
        assert!(matches!(
            failures[0].1,
            ExportError::DownloadError { attempts: 1, .. }
        ));
        assert!(report.into_result().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_batch_skips_everything() -> Result<(), ExportError> {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = export_collection(
            &collection(3),
            Arc::new(RejectingSink("none")),
            &config(Path::new("unused")),
            cancel,
        )
        .await?;

        assert_eq!(report.skipped(), 3);
        assert!(report.paths().is_empty());
        Ok(())
    }

    #[test]
    fn test_config_validation_and_backoff() {
        let base = ExportConfig::builder().out_dir("out").build();
        assert_eq!(base.max_attempts, 10);
        assert_eq!(base.retry_backoff, Duration::from_millis(100));
        assert!(base.max_workers >= 1);
        assert_eq!(base.backoff(1), Duration::from_millis(100));
        assert_eq!(base.backoff(3), Duration::from_millis(400));

        for attempts in [0, 100] {
            let config = ExportConfig::builder().out_dir("out").max_attempts(attempts).build();
            assert!(matches!(config.validate(), Err(ExportError::InvalidConfig(_))));
        }
        let config = ExportConfig::builder().out_dir("out").max_workers(0).build();
        assert!(config.validate().is_err());
    }
}
