use crate::engine::metadata::{datetime_of, timestamp_of};
use crate::error::TimeSeriesError;
use crate::types::image::Image;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A set of images, ordered by time whenever order matters.
///
/// Members are stored in insertion order; every operation that depends on
/// chronology sorts a copy by `system:time_start` first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageCollection {
    pub id: Option<String>,
    images: Vec<Image>,
}

impl ImageCollection {
    pub fn new(images: Vec<Image>) -> Self {
        Self { id: None, images }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn into_images(self) -> Vec<Image> {
        self.images
    }

    /// The image at `index`; negative indexes count back from the end.
    pub fn get(&self, index: isize) -> Option<&Image> {
        let idx = if index < 0 {
            self.images.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.images.get(idx)
    }

    pub fn first(&self) -> Option<&Image> {
        self.images.first()
    }

    pub fn last(&self) -> Option<&Image> {
        self.images.last()
    }

    /// A collection with the same id holding `images`.
    pub fn with_images(&self, images: Vec<Image>) -> Self {
        Self {
            id: self.id.clone(),
            images,
        }
    }

    /// Returns a new collection with `image` added.
    pub fn insert(&self, image: Image) -> Self {
        let mut images = self.images.clone();
        images.push(image);
        Self {
            id: self.id.clone(),
            images,
        }
    }

    /// Images paired with their timestamps, sorted ascending.
    ///
    /// The sort is stable, so images sharing a timestamp keep insertion order.
    /// Fails on the first image without a usable timestamp.
    pub fn sorted_by_time(&self) -> Result<Vec<(i64, &Image)>, TimeSeriesError> {
        let mut timed = self
            .images
            .iter()
            .map(|img| timestamp_of(img).map(|t| (t, img)))
            .collect::<Result<Vec<_>, _>>()?;
        timed.sort_by_key(|(t, _)| *t);
        Ok(timed)
    }

    /// A chronologically sorted copy of this collection.
    pub fn sorted(&self) -> Result<Self, TimeSeriesError> {
        let images = self
            .sorted_by_time()?
            .into_iter()
            .map(|(_, img)| img.clone())
            .collect();
        Ok(Self {
            id: self.id.clone(),
            images,
        })
    }

    /// Images with a timestamp in `[start, end)`, chronologically sorted.
    pub fn filter_date(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, TimeSeriesError> {
        let mut images = Vec::new();
        for img in &self.images {
            let t = datetime_of(img)?;
            if start <= t && t < end {
                images.push(img.clone());
            }
        }
        Self {
            id: self.id.clone(),
            images,
        }
        .sorted()
    }
}

impl From<Vec<Image>> for ImageCollection {
    fn from(images: Vec<Image>) -> Self {
        Self::new(images)
    }
}

impl FromIterator<Image> for ImageCollection {
    fn from_iter<T: IntoIterator<Item = Image>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
