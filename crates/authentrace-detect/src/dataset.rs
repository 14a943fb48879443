//! Dataset loading and batch iteration for dual-branch training.
//!
//! A training dataset is a directory with two partitions: `real/` (label 0)
//! and `fake/` (label 1). Loading is eager: every file is decoded and its
//! frequency fingerprint computed up front, in parallel, before any training
//! step runs. An undecodable entry fails the whole load with its path — a
//! lazily surfaced decode failure would corrupt a mid-epoch batch.

use authentrace_core::{AuthentraceError, Result};
use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::{preprocess_image, IMAGE_SIDE};
use crate::frequency::{self, FINGERPRINT_DIM};
use crate::image_io;

/// Partition names and their labels, in load order.
const PARTITIONS: [(&str, f32); 2] = [("real", 0.0), ("fake", 1.0)];

/// Counts describing a loaded dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Total number of samples.
    pub total: usize,
    /// Samples from the `real/` partition.
    pub real: usize,
    /// Samples from the `fake/` partition.
    pub fake: usize,
}

/// An eagerly materialized dataset: image tensors, fingerprints, and labels.
pub struct ImageDataset {
    images: Tensor,
    fingerprints: Tensor,
    labels: Tensor,
    manifest: DatasetManifest,
}

impl ImageDataset {
    /// Load the dataset rooted at `root`, decoding every image up front.
    ///
    /// # Errors
    ///
    /// Returns [`AuthentraceError::Input`] when a partition directory is
    /// missing or empty, or when any entry fails to decode (the error names
    /// the offending path).
    pub fn load(root: &Path, device: &Device) -> Result<Self> {
        let mut entries: Vec<(PathBuf, f32)> = Vec::new();
        let mut per_partition = [0usize; 2];

        for (idx, (partition, label)) in PARTITIONS.into_iter().enumerate() {
            let dir = root.join(partition);
            let reader = std::fs::read_dir(&dir).map_err(|e| {
                AuthentraceError::input(format!(
                    "cannot read dataset partition {}: {e}",
                    dir.display()
                ))
            })?;
            for entry in reader {
                let entry = entry.map_err(|e| {
                    AuthentraceError::input(format!(
                        "cannot enumerate dataset partition {}: {e}",
                        dir.display()
                    ))
                })?;
                if entry.path().is_file() {
                    entries.push((entry.path(), label));
                    per_partition[idx] += 1;
                }
            }
        }

        if entries.is_empty() {
            return Err(AuthentraceError::input(format!(
                "dataset at {} contains no samples",
                root.display()
            )));
        }
        // Directory enumeration order is filesystem-dependent; sort so two
        // loads of the same tree produce the same sample order.
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let samples: Vec<(Tensor, Vec<f32>, f32)> = entries
            .par_iter()
            .map(|(path, label)| -> Result<(Tensor, Vec<f32>, f32)> {
                let img = image_io::decode_path(path)?;
                let fingerprint = frequency::extract(&img)?;
                let pixels = preprocess_image(&img, device)?;
                Ok((pixels, fingerprint, *label))
            })
            .collect::<Result<Vec<_>>>()?;

        let n = samples.len();
        let image_refs: Vec<&Tensor> = samples.iter().map(|(t, _, _)| t).collect();
        let images = Tensor::stack(&image_refs, 0)
            .map_err(|e| AuthentraceError::computation("dataset_stack", e.to_string()))?;

        let mut flat_fingerprints = Vec::with_capacity(n * FINGERPRINT_DIM);
        let mut labels = Vec::with_capacity(n);
        for (_, fingerprint, label) in &samples {
            flat_fingerprints.extend_from_slice(fingerprint);
            labels.push(*label);
        }
        let fingerprints = Tensor::from_vec(flat_fingerprints, (n, FINGERPRINT_DIM), device)
            .map_err(|e| AuthentraceError::computation("dataset_fingerprints", e.to_string()))?;
        let labels = Tensor::from_vec(labels, (n, 1), device)
            .map_err(|e| AuthentraceError::computation("dataset_labels", e.to_string()))?;

        let manifest = DatasetManifest {
            total: n,
            real: per_partition[0],
            fake: per_partition[1],
        };
        tracing::info!(
            root = %root.display(),
            total = manifest.total,
            real = manifest.real,
            fake = manifest.fake,
            "dataset loaded"
        );

        Ok(Self {
            images,
            fingerprints,
            labels,
            manifest,
        })
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.manifest.total
    }

    /// Whether the dataset holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifest.total == 0
    }

    /// Partition counts.
    #[must_use]
    pub fn manifest(&self) -> &DatasetManifest {
        &self.manifest
    }

    /// Image tensor of shape `[N, 3, 224, 224]`.
    #[must_use]
    pub fn images(&self) -> &Tensor {
        &self.images
    }

    /// Fingerprint tensor of shape `[N, 1024]`.
    #[must_use]
    pub fn fingerprints(&self) -> &Tensor {
        &self.fingerprints
    }

    /// Label tensor of shape `[N, 1]` (0.0 = real, 1.0 = fake).
    #[must_use]
    pub fn labels(&self) -> &Tensor {
        &self.labels
    }

    /// Split into train and validation subsets, preserving the real/fake
    /// ratio in both.
    pub fn stratified_split(&self, val_ratio: f64, seed: u64) -> Result<DataSplit> {
        let labels: Vec<f32> = self
            .labels
            .flatten_all()
            .and_then(|t| t.to_vec1())
            .map_err(|e| AuthentraceError::computation("split_labels", e.to_string()))?;

        let mut real_idx: Vec<usize> = Vec::new();
        let mut fake_idx: Vec<usize> = Vec::new();
        for (i, &label) in labels.iter().enumerate() {
            if label == 0.0 {
                real_idx.push(i);
            } else {
                fake_idx.push(i);
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        real_idx.shuffle(&mut rng);
        fake_idx.shuffle(&mut rng);

        let val_real = (real_idx.len() as f64 * val_ratio).round() as usize;
        let val_fake = (fake_idx.len() as f64 * val_ratio).round() as usize;

        let val_indices: Vec<usize> = real_idx[..val_real]
            .iter()
            .chain(fake_idx[..val_fake].iter())
            .copied()
            .collect();
        let train_indices: Vec<usize> = real_idx[val_real..]
            .iter()
            .chain(fake_idx[val_fake..].iter())
            .copied()
            .collect();

        Ok(DataSplit {
            train: self.gather(&train_indices)?,
            val: self.gather(&val_indices)?,
        })
    }

    /// Gather a subset of rows across all three tensors.
    fn gather(&self, indices: &[usize]) -> Result<TensorTriple> {
        let device = self.images.device().clone();
        if indices.is_empty() {
            let zeros = |dims: &[usize], what: &'static str| {
                Tensor::zeros(dims, candle_core::DType::F32, &device)
                    .map_err(|e| AuthentraceError::computation(what, e.to_string()))
            };
            return Ok(TensorTriple {
                images: zeros(&[0, 3, IMAGE_SIDE, IMAGE_SIDE], "gather_images")?,
                fingerprints: zeros(&[0, FINGERPRINT_DIM], "gather_fingerprints")?,
                labels: zeros(&[0, 1], "gather_labels")?,
            });
        }
        let idx: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
        let idx = Tensor::new(idx.as_slice(), &device)
            .map_err(|e| AuthentraceError::computation("gather_indices", e.to_string()))?;
        let select = |t: &Tensor, what: &'static str| {
            t.index_select(&idx, 0)
                .map_err(|e| AuthentraceError::computation(what, e.to_string()))
        };
        Ok(TensorTriple {
            images: select(&self.images, "gather_images")?,
            fingerprints: select(&self.fingerprints, "gather_fingerprints")?,
            labels: select(&self.labels, "gather_labels")?,
        })
    }
}

/// Train/validation split of a dataset.
pub struct DataSplit {
    /// Training subset.
    pub train: TensorTriple,
    /// Validation subset (empty when `val_ratio` is 0).
    pub val: TensorTriple,
}

/// One subset of the dataset as aligned tensors.
pub struct TensorTriple {
    /// Image tensor `[M, 3, 224, 224]`.
    pub images: Tensor,
    /// Fingerprint tensor `[M, 1024]`.
    pub fingerprints: Tensor,
    /// Label tensor `[M, 1]`.
    pub labels: Tensor,
}

impl TensorTriple {
    /// Number of rows in this subset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.dims().first().copied().unwrap_or(0)
    }

    /// Whether the subset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mini-batch iterator over a [`TensorTriple`], reshuffled each epoch with a
/// seeded RNG so runs are reproducible.
pub struct BatchIterator {
    data: TensorTriple,
    indices: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl BatchIterator {
    /// Create an iterator over `data` with the given batch size.
    #[must_use]
    pub fn new(data: TensorTriple, batch_size: usize) -> Self {
        let n = data.len();
        Self {
            data,
            indices: (0..n).collect(),
            batch_size: batch_size.max(1),
            pos: 0,
        }
    }

    /// Reshuffle for a new epoch using a RNG derived from base seed + epoch.
    pub fn reshuffle(&mut self, seed: u64, epoch: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
        self.indices.shuffle(&mut rng);
        self.pos = 0;
    }

    /// Next mini-batch of (images, fingerprints, labels), or `None` when the
    /// epoch is exhausted.
    pub fn next_batch(&mut self) -> Result<Option<(Tensor, Tensor, Tensor)>> {
        let n = self.indices.len();
        if self.pos >= n {
            return Ok(None);
        }
        let end = (self.pos + self.batch_size).min(n);
        let batch_idx: Vec<u32> = self.indices[self.pos..end]
            .iter()
            .map(|&i| i as u32)
            .collect();
        self.pos = end;

        let device = self.data.images.device().clone();
        let idx = Tensor::new(batch_idx.as_slice(), &device)
            .map_err(|e| AuthentraceError::computation("batch_indices", e.to_string()))?;
        let select = |t: &Tensor| {
            t.index_select(&idx, 0)
                .map_err(|e| AuthentraceError::computation("batch_select", e.to_string()))
        };
        Ok(Some((
            select(&self.data.images)?,
            select(&self.data.fingerprints)?,
            select(&self.data.labels)?,
        )))
    }
}
