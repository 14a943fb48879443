//! Image quality signals: sharpness and noise.
//!
//! Synthetic images tend to be over-smoothed. Sharpness is measured as the
//! variance of a 3×3 Laplacian response over the grayscale image (low
//! variance = blurred), noise as the raw grayscale pixel variance. Both are
//! stateless pure functions of pixel data on the 0–255 intensity scale.
//!
//! Normalization into `[0, 1]` divides by a calibration scale and clamps.
//! The default scales (4000 for sharpness, 6000 for noise) are empirically
//! chosen calibration points, carried as configuration rather than
//! constants.

use authentrace_core::{AuthentraceError, Result};
use image::{DynamicImage, ImageBuffer, Luma};
use imageproc::filter::filter3x3;
use serde::{Deserialize, Serialize};

/// 4-connected Laplacian kernel.
const LAPLACIAN_KERNEL: [f32; 9] = [0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0];

/// Sharpness of an image: variance of the Laplacian edge response.
#[must_use]
pub fn sharpness(image: &DynamicImage) -> f64 {
    let gray = image.to_luma8();
    let response: ImageBuffer<Luma<f32>, Vec<f32>> = filter3x3(&gray, &LAPLACIAN_KERNEL);
    variance(response.pixels().map(|p| f64::from(p.0[0])))
}

/// Noise estimate of an image: raw grayscale pixel variance.
#[must_use]
pub fn noise(image: &DynamicImage) -> f64 {
    let gray = image.to_luma8();
    variance(gray.pixels().map(|p| f64::from(p.0[0])))
}

/// Population variance of a value stream.
fn variance(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn default_sharpness_scale() -> f64 {
    4000.0
}

fn default_noise_scale() -> f64 {
    6000.0
}

/// Calibration scales mapping raw quality statistics into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityCalibration {
    /// Raw sharpness value that maps to 1.0.
    #[serde(default = "default_sharpness_scale")]
    pub sharpness_scale: f64,
    /// Raw noise value that maps to 1.0.
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f64,
}

impl Default for QualityCalibration {
    fn default() -> Self {
        Self {
            sharpness_scale: default_sharpness_scale(),
            noise_scale: default_noise_scale(),
        }
    }
}

impl QualityCalibration {
    /// Check that both scales are strictly positive finite numbers.
    ///
    /// # Errors
    ///
    /// Returns [`AuthentraceError::Config`] otherwise.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sharpness_scale", self.sharpness_scale),
            ("noise_scale", self.noise_scale),
        ] {
            if value <= 0.0 || !value.is_finite() {
                return Err(AuthentraceError::Config(format!(
                    "quality calibration '{name}' must be a positive finite number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Normalize a raw sharpness value: `min(1, v / sharpness_scale)`.
    #[must_use]
    pub fn normalize_sharpness(&self, value: f64) -> f64 {
        (value / self.sharpness_scale).clamp(0.0, 1.0)
    }

    /// Normalize a raw noise value: `min(1, v / noise_scale)`.
    #[must_use]
    pub fn normalize_noise(&self, value: f64) -> f64 {
        (value / self.noise_scale).clamp(0.0, 1.0)
    }
}
