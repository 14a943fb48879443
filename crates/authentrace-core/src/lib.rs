//! Core types, traits, and errors for Authentrace
//!
//! This crate contains the foundational types shared across all Authentrace
//! components: the verdict record produced by a detection call, the delegate
//! trait for external image classifiers, fusion-weight configuration, and the
//! error taxonomy used throughout the workspace.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Once;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Verdict types
// ---------------------------------------------------------------------------

/// Decision threshold for the final fused score.
///
/// A verdict is FAKE only when the final score is strictly greater than this
/// value; a score of exactly 0.5 is labeled REAL.
pub const FAKE_THRESHOLD: f64 = 0.5;

/// Binary authenticity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    /// The image is considered authentic.
    Real,
    /// The image is considered synthetically generated or manipulated.
    Fake,
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "REAL"),
            Self::Fake => write!(f, "FAKE"),
        }
    }
}

impl std::str::FromStr for Prediction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "real" => Ok(Self::Real),
            "fake" => Ok(Self::Fake),
            _ => Err(format!("unknown prediction: {s}")),
        }
    }
}

/// Round a score to four decimal places for reporting.
#[must_use]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Per-signal component scores feeding the fused decision.
///
/// All values are expected to lie in `[0, 1]` after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    /// Fake-probability reported by the classification delegate.
    pub classifier: f64,
    /// Contextual evidence score from URL/page-text indicators.
    pub contextual: f64,
    /// Normalized sharpness (Laplacian-variance) score.
    pub sharpness: f64,
    /// Normalized noise (pixel-variance) score.
    pub noise: f64,
}

impl SignalScores {
    /// Create a new score set.
    #[must_use]
    pub fn new(classifier: f64, contextual: f64, sharpness: f64, noise: f64) -> Self {
        Self {
            classifier,
            contextual,
            sharpness,
            noise,
        }
    }

    /// Return a copy with every component rounded to four decimal places.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            classifier: round4(self.classifier),
            contextual: round4(self.contextual),
            sharpness: round4(self.sharpness),
            noise: round4(self.noise),
        }
    }
}

/// The complete output record of a single detection call.
///
/// Constructed once per classification, immutable afterwards. Component
/// scores are rounded to four decimal places for auditability; the final
/// score is stored unrounded and the label is derived from it with a strict
/// `>` comparison against [`FAKE_THRESHOLD`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Unique identifier for this verdict.
    pub id: Uuid,
    /// Per-signal component scores, rounded to four decimals.
    pub scores: SignalScores,
    /// Weighted fusion of the component scores, in `[0, 1]`.
    pub final_score: f64,
    /// Binary authenticity label.
    pub prediction: Prediction,
    /// When the detection ran.
    pub detected_at: DateTime<Utc>,
}

impl Verdict {
    /// Build a verdict from raw component scores and the fused final score.
    #[must_use]
    pub fn new(scores: SignalScores, final_score: f64) -> Self {
        let prediction = if final_score > FAKE_THRESHOLD {
            Prediction::Fake
        } else {
            Prediction::Real
        };
        Self {
            id: Uuid::new_v4(),
            scores: scores.rounded(),
            final_score,
            prediction,
            detected_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification delegate
// ---------------------------------------------------------------------------

/// One class-probability row reported by a classification delegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelScore {
    /// Class label from the delegate's vocabulary.
    pub label: String,
    /// Probability assigned to this class, in `[0, 1]`.
    pub probability: f64,
}

impl LabelScore {
    /// Create a new label/probability pair.
    #[must_use]
    pub fn new(label: impl Into<String>, probability: f64) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Trait for external image classification delegates.
///
/// A delegate exposes a fixed label vocabulary and, per image, one
/// probability per vocabulary entry, aligned by index. The heuristic fusion
/// engine resolves which vocabulary index represents the "fake" class once
/// at construction time.
pub trait ImageClassifier: Send + Sync {
    /// The delegate's label vocabulary, index-aligned with [`classify`]
    /// output.
    ///
    /// [`classify`]: ImageClassifier::classify
    fn label_vocabulary(&self) -> Result<Vec<String>>;

    /// Classify an image, returning one [`LabelScore`] per vocabulary entry.
    fn classify(&self, image: &DynamicImage) -> Result<Vec<LabelScore>>;

    /// Get the delegate name, used in logs and error messages.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Fusion configuration
// ---------------------------------------------------------------------------

/// Tolerance when checking that fusion weights sum to 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Per-signal weights for the heuristic fusion engine.
///
/// The defaults come from the original calibration and keep the fused score
/// in `[0, 1]` whenever every input signal is in `[0, 1]`. They are tunable
/// configuration, not invariants; [`FusionWeights::validate`] enforces the
/// structural requirements (non-negative, summing to 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Weight of the delegate's fake-probability.
    pub classifier: f64,
    /// Weight of the contextual evidence score.
    pub contextual: f64,
    /// Weight of the normalized sharpness score.
    pub sharpness: f64,
    /// Weight of the normalized noise score.
    pub noise: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            classifier: 0.50,
            contextual: 0.25,
            sharpness: 0.15,
            noise: 0.10,
        }
    }
}

impl FusionWeights {
    /// Check that all weights are non-negative and sum to 1.0.
    ///
    /// # Errors
    ///
    /// Returns [`AuthentraceError::Config`] when a weight is negative or the
    /// sum differs from 1.0 by more than a small tolerance.
    pub fn validate(&self) -> Result<()> {
        let entries = [
            ("classifier", self.classifier),
            ("contextual", self.contextual),
            ("sharpness", self.sharpness),
            ("noise", self.noise),
        ];
        for (name, value) in entries {
            if value < 0.0 || !value.is_finite() {
                return Err(AuthentraceError::Config(format!(
                    "fusion weight '{name}' must be a non-negative finite number, got {value}"
                )));
            }
        }
        let sum = self.classifier + self.contextual + self.sharpness + self.noise;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AuthentraceError::Config(format!(
                "fusion weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }

    /// Apply the weights to a score set, producing the fused final score.
    #[must_use]
    pub fn combine(&self, scores: &SignalScores) -> f64 {
        self.classifier * scores.classifier
            + self.contextual * scores.contextual
            + self.sharpness * scores.sharpness
            + self.noise * scores.noise
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter when `RUST_LOG` is unset (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Initialize the global tracing subscriber.
///
/// Should be called once at program startup; subsequent calls are ignored.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

        if config.format == "json" {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }

        tracing::info!("authentrace tracing initialized");
    });
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Core error types.
#[derive(thiserror::Error, Debug)]
pub enum AuthentraceError {
    /// Bad input: undecodable image, missing file, missing dataset partition.
    #[error("Input error: {0}")]
    Input(String),

    /// Invalid configuration: malformed weights, missing "fake" label,
    /// unreadable checkpoint. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Numeric or tensor computation failure, tagged with the stage that
    /// produced it.
    #[error("Computation error ({stage}): {message}")]
    Computation {
        /// Pipeline stage that failed (e.g. `"frequency"`, `"fusion_head"`).
        stage: String,
        /// Underlying failure description.
        message: String,
    },

    /// Serialization / deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthentraceError {
    /// Build an [`AuthentraceError::Input`].
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Build an [`AuthentraceError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Build an [`AuthentraceError::Computation`] for the given stage.
    pub fn computation(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Computation {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias for `std::result::Result<T, AuthentraceError>`.
pub type Result<T> = std::result::Result<T, AuthentraceError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
