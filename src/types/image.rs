//! The in-memory image model: a grid of named bands plus a JSON property map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property holding the image timestamp in UTC milliseconds since the epoch.
pub const TIME_START: &str = "system:time_start";
/// Property holding the end of the period an image represents, in UTC milliseconds.
pub const TIME_END: &str = "system:time_end";
/// Set to `true` on placeholder images emitted for windows without source data.
pub const EMPTY_FLAG: &str = "wx:empty";
/// Set to `true` on images whose pixels were interpolated from neighbours.
pub const FILLED_FLAG: &str = "wx:filled";
/// Number of source images reduced into an aggregated image.
pub const SOURCE_COUNT: &str = "wx:count";
/// Name of the non-temporal dimension a climatology image is indexed by.
pub const DIMENSION: &str = "wx:dimension";
/// Coordinate of a climatology image along [`DIMENSION`].
pub const COORDINATE: &str = "wx:coordinate";

/// A single named band of pixel values, stored row-major.
///
/// Masked pixels are stored as `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub values: Vec<f64>,
}

impl Band {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Mean of the unmasked pixels, `None` when every pixel is masked.
    pub fn mean(&self) -> Option<f64> {
        let (sum, n) = self
            .values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}

/// A raster snapshot: a fixed `width * height` grid shared by all bands, plus
/// arbitrary properties.
///
/// Images are treated as immutable values. The `with_*` methods consume the
/// image and return an updated copy, so an image handed to a collection is
/// never changed in place.
///
/// # Examples
///
/// ```
/// use wxts::{Band, Image};
///
/// let img = Image::new("a", 2, 1, vec![Band::new("tmax", vec![1.0, 2.0])])
///     .with_time_millis(1_600_000_000_000);
/// assert_eq!(img.time_start_millis(), Some(1_600_000_000_000));
/// assert_eq!(img.band_names(), vec!["tmax"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub width: usize,
    pub height: usize,
    pub bands: Vec<Band>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Image {
    pub fn new(id: impl Into<String>, width: usize, height: usize, bands: Vec<Band>) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            bands,
            properties: Map::new(),
        }
    }

    /// A single-band image with every pixel set to `value`.
    pub fn constant(
        id: impl Into<String>,
        band: impl Into<String>,
        width: usize,
        height: usize,
        value: f64,
    ) -> Self {
        Self::new(
            id,
            width,
            height,
            vec![Band::new(band, vec![value; width * height])],
        )
    }

    /// A fully masked image with the same shape and band names as `template`.
    pub fn masked_like(id: impl Into<String>, template: &Image) -> Self {
        let bands = template
            .bands
            .iter()
            .map(|b| Band::new(b.name.clone(), vec![f64::NAN; b.values.len()]))
            .collect();
        Self::new(id, template.width, template.height, bands)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    /// Looks up a property by key.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Raw `system:time_start` value, if it is an integer.
    ///
    /// Use [`crate::timestamp_of`] when a missing timestamp should be an error.
    pub fn time_start_millis(&self) -> Option<i64> {
        self.property(TIME_START).and_then(Value::as_i64)
    }

    pub fn is_empty_marker(&self) -> bool {
        self.property(EMPTY_FLAG)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_time_millis(self, millis: i64) -> Self {
        self.with_property(TIME_START, millis)
    }

    pub fn with_time(self, time: DateTime<Utc>) -> Self {
        self.with_time_millis(time.timestamp_millis())
    }

    /// Renames every band with `f(old_name)`.
    pub fn rename_bands(mut self, f: impl Fn(&str) -> String) -> Self {
        for band in &mut self.bands {
            band.name = f(&band.name);
        }
        self
    }

    /// Replaces band names positionally with `names`. Extra names are ignored.
    pub fn with_band_names<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        for (band, name) in self.bands.iter_mut().zip(names) {
            band.name = name.as_ref().to_string();
        }
        self
    }
}
