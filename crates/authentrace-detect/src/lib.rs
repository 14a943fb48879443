//! Multi-signal synthetic-image detection for Authentrace
//!
//! This crate implements both detection paths over a shared set of signal
//! extractors:
//!
//! - **Dual-branch classifier** ([`DualBranchClassifier`]): a learned model
//!   fusing a ResNet-18 spatial embedding with a frequency-spectrum
//!   fingerprint, trained with [`trainer::train`] and driven at inference
//!   time through `predict_path`.
//! - **Heuristic fusion engine** ([`EnsembleDetector`]): a weighted
//!   combination of any [`ImageClassifier`] delegate's fake-probability with
//!   image-quality statistics and URL/page-text context evidence, producing
//!   a [`Verdict`].
//!
//! Both are instances of the same pattern: extract independent signals,
//! normalize each into `[0, 1]`, combine with fixed or learned weights, and
//! threshold into a label.
//!
//! [`ImageClassifier`]: authentrace_core::ImageClassifier
//! [`Verdict`]: authentrace_core::Verdict

pub mod classifier;
pub mod context;
pub mod dataset;
pub mod detector;
pub mod frequency;
pub mod image_io;
pub mod metrics;
pub mod quality;
pub mod trainer;

pub use classifier::{select_device, DualBranchClassifier};
pub use context::{ContextEvidence, ContextScorer, IndicatorHit};
pub use dataset::{BatchIterator, DataSplit, DatasetManifest, ImageDataset};
pub use detector::EnsembleDetector;
pub use frequency::{FINGERPRINT_DIM, FINGERPRINT_SIDE};
pub use metrics::ValidationMetrics;
pub use quality::QualityCalibration;
pub use trainer::{train, EpochSummary, TrainConfig, TrainedModel};
