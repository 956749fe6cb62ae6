//! Descriptive statistics over one batch of index values.

use serde::{Deserialize, Serialize};

use crate::ExportError;

/// Count, central tendency and spread of a batch.
///
/// `std_dev` is the sample standard deviation (n - 1 denominator);
/// it and `sem` are `None` for a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: Option<f64>,
    /// Standard error of the mean.
    pub sem: Option<f64>,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl BatchSummary {
    /// Summarize `values`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::NoValues`] for an empty slice.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[f64]) -> Result<Self, ExportError> {
        if values.is_empty() {
            return Err(ExportError::NoValues);
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let (std_dev, sem) = if values.len() > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            let sd = (ss / (n - 1.0)).sqrt();
            (Some(sd), Some(sd / n.sqrt()))
        } else {
            (None, None)
        };

        Ok(Self {
            count: values.len(),
            mean,
            std_dev,
            sem,
            min,
            max,
        })
    }

    /// One-line human-readable form.
    #[must_use]
    pub fn report(&self) -> String {
        let spread = match (self.std_dev, self.sem) {
            (Some(sd), Some(sem)) => format!("sd={sd:.6} sem={sem:.6}"),
            _ => "sd=n/a sem=n/a".to_owned(),
        };
        format!(
            "n={} mean={:.6} {spread} min={:.6} max={:.6}",
            self.count, self.mean, self.min, self.max,
        )
    }
}
