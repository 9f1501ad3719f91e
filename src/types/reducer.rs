use ordered_float::OrderedFloat;
use std::fmt;
use std::sync::Arc;

/// A function collapsing many pixel values into one, for example a daily maximum.
///
/// Built-in reducers are plain variants. [`Reducer::Custom`] wraps an arbitrary
/// function for statistics the crate does not provide. Reducers never see
/// masked (`NaN`) inputs; a pixel masked in every input stays masked.
#[derive(Clone, Default)]
pub enum Reducer {
    #[default]
    Mean,
    Sum,
    Min,
    Max,
    Median,
    /// Population standard deviation.
    StdDev,
    Count,
    Custom(CustomReducer),
}

/// A named user-supplied reduction function.
#[derive(Clone)]
pub struct CustomReducer {
    name: String,
    func: Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>,
}

impl Reducer {
    /// Wraps `func` as a reducer. `name` is used when band names are suffixed.
    pub fn custom(
        name: impl Into<String>,
        func: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Reducer::Custom(CustomReducer {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Sum => "sum",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Median => "median",
            Reducer::StdDev => "stdDev",
            Reducer::Count => "count",
            Reducer::Custom(c) => &c.name,
        }
    }

    /// Reduces a slice of unmasked values. Empty input yields `NaN` (`0` for `Count`).
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return match self {
                Reducer::Count => 0.0,
                _ => f64::NAN,
            };
        }
        let n = values.len() as f64;
        match self {
            Reducer::Mean => values.iter().sum::<f64>() / n,
            Reducer::Sum => values.iter().sum(),
            Reducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Median => {
                let mut sorted: Vec<OrderedFloat<f64>> =
                    values.iter().copied().map(OrderedFloat).collect();
                sorted.sort_unstable();
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1].0 + sorted[mid].0) / 2.0
                } else {
                    sorted[mid].0
                }
            }
            Reducer::StdDev => {
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                var.sqrt()
            }
            Reducer::Count => n,
            Reducer::Custom(c) => (c.func)(values),
        }
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Custom(c) => write!(f, "Custom({:?})", c.name),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
