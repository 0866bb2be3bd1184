use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Share of total deaths above which a group counts as high mortality
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// `1` when `rate` is strictly above `threshold`, else `0`.
pub fn binarize(rate: f64, threshold: f64) -> u8 {
    u8::from(rate > threshold)
}

/// Configured high/low mortality cutoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binarizer {
    threshold: f64,
}

impl Binarizer {
    pub fn new(threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || !(0.0..1.0).contains(&threshold) {
            return Err(PipelineError::Config(format!(
                "binarization threshold must be a fraction in [0, 1), got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn label(&self, rate: f64) -> u8 {
        binarize(rate, self.threshold)
    }
}

impl Default for Binarizer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}
