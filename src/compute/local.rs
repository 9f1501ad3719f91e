use crate::compute::backend::ComputeBackend;
use crate::compute::error::ComputeError;
use crate::types::collection::ImageCollection;
use crate::types::image::{Band, Image};
use crate::types::reducer::Reducer;
use log::debug;
use std::collections::HashMap;

/// An in-process [`ComputeBackend`] evaluating reducers pixel by pixel.
///
/// Collections registered with [`LocalBackend::with_collection`] can be opened
/// by id through [`crate::TimeSeries::load`].
#[derive(Debug, Default, Clone)]
pub struct LocalBackend {
    catalog: HashMap<String, ImageCollection>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, id: impl Into<String>, collection: ImageCollection) -> Self {
        let id = id.into();
        self.catalog.insert(id.clone(), collection.with_id(id));
        self
    }
}

impl ComputeBackend for LocalBackend {
    fn reduce(&self, images: &[&Image], reducer: &Reducer) -> Result<Image, ComputeError> {
        let first = *images.first().ok_or(ComputeError::EmptyInput)?;
        check_compatible(first, images.iter().copied())?;
        debug!(
            "Reducing {} images with {} bands using {}",
            images.len(),
            first.bands.len(),
            reducer
        );

        let mut scratch = Vec::with_capacity(images.len());
        let bands = first
            .bands
            .iter()
            .enumerate()
            .map(|(b, band)| {
                let values = (0..first.pixel_count())
                    .map(|px| {
                        scratch.clear();
                        scratch.extend(
                            images
                                .iter()
                                .map(|img| img.bands[b].values[px])
                                .filter(|v| !v.is_nan()),
                        );
                        reducer.apply(&scratch)
                    })
                    .collect();
                Band::new(band.name.clone(), values)
            })
            .collect();

        Ok(Image::new(first.id.clone(), first.width, first.height, bands))
    }

    fn weighted_sum(&self, terms: &[(&Image, f64)]) -> Result<Image, ComputeError> {
        let (first, _) = *terms.first().ok_or(ComputeError::EmptyInput)?;
        check_compatible(first, terms.iter().map(|(img, _)| *img))?;

        let bands = first
            .bands
            .iter()
            .enumerate()
            .map(|(b, band)| {
                let values = (0..first.pixel_count())
                    .map(|px| {
                        terms
                            .iter()
                            .filter(|(_, w)| *w != 0.0)
                            .map(|(img, w)| w * img.bands[b].values[px])
                            .sum()
                    })
                    .collect();
                Band::new(band.name.clone(), values)
            })
            .collect();

        Ok(Image::new(first.id.clone(), first.width, first.height, bands))
    }

    fn load_collection(&self, id: &str) -> Result<ImageCollection, ComputeError> {
        self.catalog
            .get(id)
            .cloned()
            .ok_or_else(|| ComputeError::UnknownCollection(id.to_string()))
    }
}

/// Every image must share the first image's band count and pixel count.
fn check_compatible<'a>(
    first: &Image,
    images: impl IntoIterator<Item = &'a Image>,
) -> Result<(), ComputeError> {
    for img in images {
        if img.bands.len() != first.bands.len() {
            return Err(ComputeError::BandCountMismatch {
                image_id: img.id.clone(),
                expected: first.bands.len(),
                found: img.bands.len(),
            });
        }
        let expected = first.pixel_count();
        if let Some(band) = img.bands.iter().find(|b| b.values.len() != expected) {
            return Err(ComputeError::ShapeMismatch {
                image_id: img.id.clone(),
                expected,
                found: band.values.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(id: &str, a: Vec<f64>, b: Vec<f64>) -> Image {
        Image::new(id, 2, 1, vec![Band::new("a", a), Band::new("b", b)])
    }

    #[test]
    fn test_reduce_is_pixelwise_per_band() -> Result<(), ComputeError> {
        let backend = LocalBackend::new();
        let x = img("x", vec![1.0, 10.0], vec![0.0, 0.0]);
        let y = img("y", vec![3.0, 20.0], vec![2.0, 4.0]);

        let out = backend.reduce(&[&x, &y], &Reducer::Max)?;
        assert_eq!(out.id, "x");
        assert_eq!(out.band("a").unwrap().values, vec![3.0, 20.0]);
        assert_eq!(out.band("b").unwrap().values, vec![2.0, 4.0]);

        let out = backend.reduce(&[&x, &y], &Reducer::Mean)?;
        assert_eq!(out.band("a").unwrap().values, vec![2.0, 15.0]);
        Ok(())
    }

    #[test]
    fn test_reduce_ignores_masked_pixels() -> Result<(), ComputeError> {
        let backend = LocalBackend::new();
        let x = img("x", vec![f64::NAN, f64::NAN], vec![1.0, 1.0]);
        let y = img("y", vec![4.0, f64::NAN], vec![3.0, 3.0]);

        let out = backend.reduce(&[&x, &y], &Reducer::Mean)?;
        let a = &out.band("a").unwrap().values;
        assert_eq!(a[0], 4.0);
        assert!(a[1].is_nan());

        let counts = backend.reduce(&[&x, &y], &Reducer::Count)?;
        assert_eq!(counts.band("a").unwrap().values, vec![1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_weighted_sum() -> Result<(), ComputeError> {
        let backend = LocalBackend::new();
        let x = img("x", vec![0.0, 10.0], vec![1.0, 1.0]);
        let y = img("y", vec![10.0, 20.0], vec![3.0, 5.0]);

        let out = backend.weighted_sum(&[(&x, 0.25), (&y, 0.75)])?;
        assert_eq!(out.band("a").unwrap().values, vec![7.5, 17.5]);

        let diff = backend.weighted_sum(&[(&y, 1.0), (&x, -1.0)])?;
        assert_eq!(diff.band("b").unwrap().values, vec![2.0, 4.0]);
        assert_eq!(diff.id, "y");
        Ok(())
    }

    #[test]
    fn test_mismatched_shapes_are_rejected() {
        let backend = LocalBackend::new();
        let x = img("x", vec![0.0, 1.0], vec![0.0, 1.0]);
        let small = Image::constant("small", "a", 1, 1, 0.0);

        let err = backend.reduce(&[&x, &small], &Reducer::Sum).unwrap_err();
        assert!(matches!(err, ComputeError::BandCountMismatch { .. }));

        let wide = Image::new("wide", 3, 1, vec![Band::new("a", vec![0.0; 3]), Band::new("b", vec![0.0; 3])]);
        let err = backend.reduce(&[&x, &wide], &Reducer::Sum).unwrap_err();
        assert!(matches!(err, ComputeError::ShapeMismatch { expected: 2, found: 3, .. }));

        assert!(matches!(
            backend.reduce(&[], &Reducer::Sum),
            Err(ComputeError::EmptyInput)
        ));
    }

    #[test]
    fn test_load_collection_from_catalog() {
        let backend = LocalBackend::new().with_collection(
            "GRIDMET",
            ImageCollection::new(vec![Image::constant("a", "v", 1, 1, 0.0)]),
        );
        let col = backend.load_collection("GRIDMET").unwrap();
        assert_eq!(col.id.as_deref(), Some("GRIDMET"));
        assert!(matches!(
            backend.load_collection("nope"),
            Err(ComputeError::UnknownCollection(_))
        ));
    }
}
