//! Training driver for the dual-branch classifier.
//!
//! Runs mini-batch gradient descent over an eagerly loaded
//! [`ImageDataset`]: shuffled batches each epoch, binary cross-entropy
//! against the real/fake labels, joint updates of both branches and the
//! fusion head. Loss accumulation within an epoch is strictly sequential;
//! there is no mid-batch cancellation. Per-epoch aggregate loss is emitted
//! as observability output, and the checkpoint is written at training
//! completion.

use authentrace_core::{AuthentraceError, Result, FAKE_THRESHOLD};
use candle_core::Device;
use candle_nn::{Optimizer, VarMap};
use std::path::PathBuf;

use crate::classifier::DualBranchClassifier;
use crate::dataset::{BatchIterator, ImageDataset, TensorTriple};
use crate::metrics::{compute_validation_metrics, ValidationMetrics};

/// Training configuration.
///
/// Defaults mirror the original calibration run: 10 epochs of batch-16
/// updates at a learning rate of 1e-4.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Number of passes over the training data.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Optimizer weight decay.
    pub weight_decay: f64,
    /// Fraction of samples held out for validation (0 disables validation).
    pub val_ratio: f64,
    /// Base seed for shuffling and splitting.
    pub seed: u64,
    /// Where to write the safetensors checkpoint after the final epoch.
    /// `None` skips saving.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 16,
            learning_rate: 1e-4,
            weight_decay: 0.0,
            val_ratio: 0.0,
            seed: 42,
            checkpoint_path: None,
        }
    }
}

impl TrainConfig {
    /// Check that the configuration is runnable.
    ///
    /// # Errors
    ///
    /// Returns [`AuthentraceError::Config`] for zero epochs/batch size, a
    /// non-positive learning rate, or a validation ratio outside `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(AuthentraceError::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(AuthentraceError::config("batch_size must be at least 1"));
        }
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(AuthentraceError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.val_ratio) {
            return Err(AuthentraceError::Config(format!(
                "val_ratio must be in [0, 1), got {}",
                self.val_ratio
            )));
        }
        Ok(())
    }
}

/// Aggregate numbers for one completed epoch.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    /// 1-based epoch index.
    pub epoch: usize,
    /// Mean training loss over the epoch's batches.
    pub train_loss: f64,
    /// Validation metrics, when a validation split is configured.
    pub val_metrics: Option<ValidationMetrics>,
}

/// A trained classifier together with its parameter map and history.
pub struct TrainedModel {
    /// The trained classifier, ready for inference.
    pub classifier: DualBranchClassifier,
    /// Parameter map owning the trained weights; needed to re-save or
    /// continue training.
    pub varmap: VarMap,
    /// Per-epoch summaries in order.
    pub history: Vec<EpochSummary>,
}

/// Train a dual-branch classifier on the given dataset.
///
/// # Errors
///
/// Fails fast with [`AuthentraceError::Config`] on an invalid configuration
/// and propagates any tensor failure as
/// [`AuthentraceError::Computation`] with its stage.
pub fn train(
    dataset: &ImageDataset,
    config: &TrainConfig,
    device: &Device,
) -> Result<TrainedModel> {
    config.validate()?;

    let split = dataset.stratified_split(config.val_ratio, config.seed)?;
    tracing::info!(
        train = split.train.len(),
        val = split.val.len(),
        epochs = config.epochs,
        batch_size = config.batch_size,
        learning_rate = config.learning_rate,
        "starting training"
    );

    let varmap = VarMap::new();
    let classifier = DualBranchClassifier::new_trainable(&varmap, device)?;
    let mut optimizer = candle_nn::AdamW::new(
        varmap.all_vars(),
        candle_nn::ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: config.weight_decay,
            ..Default::default()
        },
    )
    .map_err(|e| AuthentraceError::Config(format!("failed to create optimizer: {e}")))?;

    let mut batches = BatchIterator::new(split.train, config.batch_size);
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        batches.reshuffle(config.seed, epoch);

        let mut epoch_loss = 0.0;
        let mut batch_count = 0usize;
        while let Some((images, fingerprints, labels)) = batches.next_batch()? {
            let logits = classifier.forward_t(&images, &fingerprints, true)?;
            let loss = candle_nn::loss::binary_cross_entropy_with_logit(&logits, &labels)
                .map_err(|e| AuthentraceError::computation("loss", e.to_string()))?;
            optimizer
                .backward_step(&loss)
                .map_err(|e| AuthentraceError::computation("backward_step", e.to_string()))?;

            let loss_value = loss
                .to_scalar::<f32>()
                .map_err(|e| AuthentraceError::computation("loss_scalar", e.to_string()))?;
            epoch_loss += f64::from(loss_value);
            batch_count += 1;
        }

        let train_loss = if batch_count > 0 {
            epoch_loss / batch_count as f64
        } else {
            0.0
        };

        let val_metrics = if split.val.is_empty() {
            None
        } else {
            Some(validate(&classifier, &split.val)?)
        };

        match &val_metrics {
            Some(metrics) => tracing::info!(
                epoch = epoch + 1,
                train_loss,
                %metrics,
                "epoch complete"
            ),
            None => tracing::info!(epoch = epoch + 1, train_loss, "epoch complete"),
        }

        history.push(EpochSummary {
            epoch: epoch + 1,
            train_loss,
            val_metrics,
        });
    }

    if let Some(path) = &config.checkpoint_path {
        DualBranchClassifier::save(&varmap, path)?;
        tracing::info!(checkpoint = %path.display(), "saved trained classifier");
    }

    Ok(TrainedModel {
        classifier,
        varmap,
        history,
    })
}

/// Run the classifier over a validation subset and score its predictions.
fn validate(classifier: &DualBranchClassifier, val: &TensorTriple) -> Result<ValidationMetrics> {
    if val.is_empty() {
        return Ok(ValidationMetrics::empty());
    }
    let probabilities: Vec<f32> = classifier
        .forward(&val.images, &val.fingerprints)?
        .flatten_all()
        .and_then(|t| t.to_vec1())
        .map_err(|e| AuthentraceError::computation("validation_forward", e.to_string()))?;
    let labels: Vec<f32> = val
        .labels
        .flatten_all()
        .and_then(|t| t.to_vec1())
        .map_err(|e| AuthentraceError::computation("validation_labels", e.to_string()))?;

    let predictions: Vec<i64> = probabilities
        .iter()
        .map(|&p| i64::from(f64::from(p) > FAKE_THRESHOLD))
        .collect();
    let labels: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
    Ok(compute_validation_metrics(&predictions, &labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    #[test]
    fn test_train_config_default() {
        let config = TrainConfig::default();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 16);
        assert!((config.learning_rate - 1e-4).abs() < 1e-12);
        assert_eq!(config.seed, 42);
        assert!(config.checkpoint_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_train_config_rejects_bad_values() {
        let mut config = TrainConfig {
            epochs: 0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());

        config = TrainConfig {
            batch_size: 0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());

        config = TrainConfig {
            learning_rate: 0.0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());

        config = TrainConfig {
            val_ratio: 1.0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[ignore = "exercises the full training loop; slow without optimizations"]
    fn test_training_smoke_run_saves_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        for (partition, intensity) in [("real", 30u8), ("fake", 220u8)] {
            let sub = dir.path().join(partition);
            std::fs::create_dir_all(&sub).unwrap();
            for i in 0..2 {
                let img =
                    DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([intensity + i])));
                img.save(sub.join(format!("{i}.png"))).unwrap();
            }
        }

        let device = Device::Cpu;
        let dataset = ImageDataset::load(dir.path(), &device).unwrap();
        let checkpoint = dir.path().join("weights").join("model.safetensors");
        let config = TrainConfig {
            epochs: 1,
            batch_size: 2,
            checkpoint_path: Some(checkpoint.clone()),
            ..TrainConfig::default()
        };

        let trained = train(&dataset, &config, &device).unwrap();
        assert_eq!(trained.history.len(), 1);
        assert!(trained.history[0].train_loss.is_finite());
        assert!(checkpoint.exists());

        let (_restored, _map) = DualBranchClassifier::load(&checkpoint, &device).unwrap();
    }
}
