use crate::export::error::ExportError;
use crate::export::naming::file_name;
use crate::export::pool::ExportConfig;
use crate::types::image::Image;
use log::debug;
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Destination for exported images.
///
/// `write` is called from a blocking worker thread and may be retried, so it
/// must tolerate being called again for the same image.
pub trait ImageSink: Send + Sync {
    /// Writes `image` and returns every file created.
    fn write(&self, image: &Image, config: &ExportConfig) -> Result<Vec<PathBuf>, ExportError>;
}

/// Writes images as Snappy-compressed parquet files.
///
/// Every file holds `x` and `y` pixel coordinates plus one column per band.
/// With `file_per_band` each band gets its own file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetSink;

impl ParquetSink {
    pub fn new() -> Self {
        Self
    }

    fn frame(image: &Image, bands: &[usize], nodata: Option<f64>) -> Result<DataFrame, ExportError> {
        let n = image.pixel_count();
        let xs: Vec<u32> = (0..n).map(|px| (px % image.width.max(1)) as u32).collect();
        let ys: Vec<u32> = (0..n).map(|px| (px / image.width.max(1)) as u32).collect();

        let mut columns = vec![Column::new("x".into(), xs), Column::new("y".into(), ys)];
        for &b in bands {
            let band = &image.bands[b];
            let values: Vec<f64> = match nodata {
                Some(fill) => band
                    .values
                    .iter()
                    .map(|v| if v.is_nan() { fill } else { *v })
                    .collect(),
                None => band.values.clone(),
            };
            columns.push(Column::new(band.name.as_str().into(), values));
        }
        Ok(DataFrame::new(columns)?)
    }
}

impl ImageSink for ParquetSink {
    fn write(&self, image: &Image, config: &ExportConfig) -> Result<Vec<PathBuf>, ExportError> {
        std::fs::create_dir_all(&config.out_dir)
            .map_err(|e| ExportError::OutputDirCreation(config.out_dir.clone(), e))?;
        let prefix = config.prefix.as_deref();

        let groups: Vec<(Option<&str>, Vec<usize>)> = if config.file_per_band {
            image
                .bands
                .iter()
                .enumerate()
                .map(|(b, band)| (Some(band.name.as_str()), vec![b]))
                .collect()
        } else {
            vec![(None, (0..image.bands.len()).collect())]
        };

        let mut written = Vec::with_capacity(groups.len());
        for (band, indices) in groups {
            let path = config
                .out_dir
                .join(file_name(image, band, prefix, "parquet")?);
            let df = Self::frame(image, &indices, config.nodata)?;
            write_parquet(df, &path)?;
            debug!("Wrote {} to {:?}", image.id, path);
            written.push(path);
        }
        Ok(written)
    }
}

fn write_parquet(mut df: DataFrame, path: &Path) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)
        .map_err(|e| ExportError::ParquetWriteIo(path.to_path_buf(), e))?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(&mut df)
        .map_err(|e| ExportError::ParquetWritePolars(path.to_path_buf(), e))?;
    Ok(())
}
