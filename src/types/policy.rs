use serde::{Deserialize, Serialize};
use std::fmt;

/// How a window without any source image is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// The window contributes no output.
    #[default]
    Drop,
    /// The window is kept as a fully masked image flagged `wx:empty`.
    NullImage,
    /// The window is filled by time-weighted linear interpolation between its
    /// nearest non-empty neighbours, or holds the single neighbour at the edges.
    InterpolateLinear,
}

impl fmt::Display for GapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GapPolicy::Drop => "drop",
            GapPolicy::NullImage => "null_image",
            GapPolicy::InterpolateLinear => "interpolate_linear",
        };
        write!(f, "{}", name)
    }
}

/// Interpolation used when resampling a series at arbitrary times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// The closer of the two bracketing images (ties go to the later one).
    Nearest,
    #[default]
    Linear,
    /// Four-point cubic through the bracketing images and their outer neighbours.
    Cubic,
}

impl InterpolationMethod {
    /// Weights applied to `(y0, y1, y2, y3)` at fractional position `mu`
    /// between `y1` and `y2`.
    pub(crate) fn weights(&self, mu: f64) -> [f64; 4] {
        match self {
            InterpolationMethod::Nearest => {
                if mu < 0.5 {
                    [0.0, 1.0, 0.0, 0.0]
                } else {
                    [0.0, 0.0, 1.0, 0.0]
                }
            }
            InterpolationMethod::Linear => [0.0, 1.0 - mu, mu, 0.0],
            InterpolationMethod::Cubic => {
                let mu2 = mu * mu;
                let mu3 = mu2 * mu;
                [
                    -mu3 + 2.0 * mu2 - mu,
                    mu3 - 2.0 * mu2 + 1.0,
                    -mu3 + mu2 + mu,
                    mu3 - mu2,
                ]
            }
        }
    }
}

/// Where a rolling window sits relative to its anchor image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollingAlignment {
    /// `(t - window, t]`
    #[default]
    Trailing,
    /// `[t - window / 2, t + window / 2]`
    Centered,
}
