//! Dual-branch classifier fusing spatial appearance with frequency artifacts.
//!
//! # Architecture
//!
//! ```text
//! image [N,3,224,224] ──► ResNet-18 backbone ──► 512 ──► Linear ──► 128 ─┐
//!                                                                       ├─ concat(256) ─► Linear(64) ─► ReLU ─► Linear(1) ─► sigmoid
//! fingerprint [N,1024] ─► Linear(256) ─► ReLU ─► Linear(128) ───────────┘
//! ```
//!
//! The spatial backbone is the standard ResNet-18 basic-block topology with
//! its classification layer replaced by a 128-dimensional head; the
//! frequency branch embeds the 1024-length spectrum fingerprint into the
//! same space. Both branches and the fusion head train jointly. Inference
//! runs the graph in eval mode (batch-norm running statistics, no dropout),
//! so two forward passes over identical inputs produce identical output.
//!
//! Checkpoints are safetensors blobs written and read through the model's
//! [`VarMap`], keyed by layer name.

use authentrace_core::{AuthentraceError, ImageClassifier, LabelScore, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{
    batch_norm, conv2d_no_bias, linear, BatchNorm, Conv2d, Conv2dConfig, Module, VarBuilder,
    VarMap,
};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

use crate::frequency::{self, FINGERPRINT_DIM};

/// Input image side length expected by the spatial branch.
pub const IMAGE_SIDE: usize = 224;

/// Feature width emitted by the backbone before the replacement head.
pub const SPATIAL_FEATURE_DIM: usize = 512;

/// Embedding width of each branch.
pub const EMBED_DIM: usize = 128;

/// Hidden width of the frequency branch.
pub const FREQ_HIDDEN_DIM: usize = 256;

/// Width of the concatenated embedding pair.
pub const FUSED_DIM: usize = 2 * EMBED_DIM;

/// Hidden width of the fusion head.
pub const FUSION_HIDDEN_DIM: usize = 64;

/// Select the best available compute device: CUDA, then Metal, then CPU.
pub fn select_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            tracing::info!("using CUDA device 0");
            return device;
        }
        tracing::warn!("cuda feature enabled but no GPU available, falling back");
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            tracing::info!("using Metal device 0");
            return device;
        }
        tracing::warn!("metal feature enabled but no device available, falling back");
    }

    Device::Cpu
}

/// Convert an image into a `[3, 224, 224]` float tensor scaled to `[0, 1]`.
pub fn preprocess_image(image: &DynamicImage, device: &Device) -> Result<Tensor> {
    let resized = image.resize_exact(IMAGE_SIDE as u32, IMAGE_SIDE as u32, FilterType::Triangle);
    let rgb = resized.to_rgb8();
    let data = rgb.into_raw();
    Tensor::from_vec(data, (IMAGE_SIDE, IMAGE_SIDE, 3), device)
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.affine(1.0 / 255.0, 0.0))
        .map_err(|e| AuthentraceError::computation("preprocess", e.to_string()))
}

// ---------------------------------------------------------------------------
// Spatial backbone (ResNet-18 basic blocks)
// ---------------------------------------------------------------------------

fn conv3x3(c_in: usize, c_out: usize, stride: usize, vb: VarBuilder) -> candle_core::Result<Conv2d> {
    let cfg = Conv2dConfig {
        padding: 1,
        stride,
        ..Default::default()
    };
    conv2d_no_bias(c_in, c_out, 3, cfg, vb)
}

fn conv1x1(c_in: usize, c_out: usize, stride: usize, vb: VarBuilder) -> candle_core::Result<Conv2d> {
    let cfg = Conv2dConfig {
        stride,
        ..Default::default()
    };
    conv2d_no_bias(c_in, c_out, 1, cfg, vb)
}

/// One residual basic block: two 3×3 conv/bn pairs plus an identity (or
/// 1×1-projected) skip connection.
struct BasicBlock {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    downsample: Option<(Conv2d, BatchNorm)>,
}

impl BasicBlock {
    fn new(c_in: usize, c_out: usize, stride: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv1 = conv3x3(c_in, c_out, stride, vb.pp("conv1"))?;
        let bn1 = batch_norm(c_out, 1e-5, vb.pp("bn1"))?;
        let conv2 = conv3x3(c_out, c_out, 1, vb.pp("conv2"))?;
        let bn2 = batch_norm(c_out, 1e-5, vb.pp("bn2"))?;
        let downsample = if stride != 1 || c_in != c_out {
            let conv = conv1x1(c_in, c_out, stride, vb.pp("downsample").pp("conv"))?;
            let bn = batch_norm(c_out, 1e-5, vb.pp("downsample").pp("bn"))?;
            Some((conv, bn))
        } else {
            None
        };
        Ok(Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample,
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let ys = xs
            .apply(&self.conv1)?
            .apply_t(&self.bn1, train)?
            .relu()?
            .apply(&self.conv2)?
            .apply_t(&self.bn2, train)?;
        let residual = match &self.downsample {
            Some((conv, bn)) => xs.apply(conv)?.apply_t(bn, train)?,
            None => xs.clone(),
        };
        (ys + residual)?.relu()
    }
}

/// ResNet-18 feature extractor: stem plus four stages of two basic blocks,
/// global-average-pooled to [`SPATIAL_FEATURE_DIM`] features.
struct SpatialBackbone {
    stem_conv: Conv2d,
    stem_bn: BatchNorm,
    blocks: Vec<BasicBlock>,
}

impl SpatialBackbone {
    fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        let stem_cfg = Conv2dConfig {
            padding: 3,
            stride: 2,
            ..Default::default()
        };
        let stem_conv = conv2d_no_bias(3, 64, 7, stem_cfg, vb.pp("conv1"))?;
        let stem_bn = batch_norm(64, 1e-5, vb.pp("bn1"))?;

        // (c_in, c_out, stride) per block, torchvision layer order.
        let plan = [
            (64, 64, 1),
            (64, 64, 1),
            (64, 128, 2),
            (128, 128, 1),
            (128, 256, 2),
            (256, 256, 1),
            (256, 512, 2),
            (512, 512, 1),
        ];
        let mut blocks = Vec::with_capacity(plan.len());
        for (idx, (c_in, c_out, stride)) in plan.into_iter().enumerate() {
            let stage = idx / 2 + 1;
            let slot = idx % 2;
            let block_vb = vb.pp(format!("layer{stage}")).pp(slot.to_string());
            blocks.push(BasicBlock::new(c_in, c_out, stride, block_vb)?);
        }
        Ok(Self {
            stem_conv,
            stem_bn,
            blocks,
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut xs = xs
            .apply(&self.stem_conv)?
            .apply_t(&self.stem_bn, train)?
            .relu()?
            // 3x3/2 max pool with padding 1 (candle pooling has no pad arg).
            .pad_with_zeros(D::Minus1, 1, 1)?
            .pad_with_zeros(D::Minus2, 1, 1)?
            .max_pool2d_with_stride(3, 2)?;
        for block in &self.blocks {
            xs = block.forward_t(&xs, train)?;
        }
        // Global average pool over the spatial dims.
        xs.mean(D::Minus1)?.mean(D::Minus1)
    }
}

// ---------------------------------------------------------------------------
// Dual-branch classifier
// ---------------------------------------------------------------------------

/// The dual-branch fake-image classifier.
pub struct DualBranchClassifier {
    backbone: SpatialBackbone,
    spatial_head: candle_nn::Linear,
    freq_fc1: candle_nn::Linear,
    freq_fc2: candle_nn::Linear,
    fuse_fc1: candle_nn::Linear,
    fuse_fc2: candle_nn::Linear,
    device: Device,
}

impl DualBranchClassifier {
    fn build(vb: VarBuilder, device: &Device) -> Result<Self> {
        let err = |stage: &str| {
            let stage = stage.to_string();
            move |e: candle_core::Error| {
                AuthentraceError::Config(format!("failed to build {stage}: {e}"))
            }
        };
        let backbone = SpatialBackbone::new(vb.pp("backbone")).map_err(err("spatial backbone"))?;
        let spatial_head = linear(SPATIAL_FEATURE_DIM, EMBED_DIM, vb.pp("spatial_head"))
            .map_err(err("spatial head"))?;
        let freq_fc1 =
            linear(FINGERPRINT_DIM, FREQ_HIDDEN_DIM, vb.pp("freq_fc1")).map_err(err("freq_fc1"))?;
        let freq_fc2 =
            linear(FREQ_HIDDEN_DIM, EMBED_DIM, vb.pp("freq_fc2")).map_err(err("freq_fc2"))?;
        let fuse_fc1 =
            linear(FUSED_DIM, FUSION_HIDDEN_DIM, vb.pp("fuse_fc1")).map_err(err("fuse_fc1"))?;
        let fuse_fc2 = linear(FUSION_HIDDEN_DIM, 1, vb.pp("fuse_fc2")).map_err(err("fuse_fc2"))?;
        Ok(Self {
            backbone,
            spatial_head,
            freq_fc1,
            freq_fc2,
            fuse_fc1,
            fuse_fc2,
            device: device.clone(),
        })
    }

    /// Create a classifier with randomly initialized, trainable parameters
    /// registered in `varmap`.
    pub fn new_trainable(varmap: &VarMap, device: &Device) -> Result<Self> {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        Self::build(vb, device)
    }

    /// Load a classifier from a safetensors checkpoint.
    ///
    /// The checkpoint must contain every parameter of the dual-branch
    /// topology; a missing or incompatible blob is a configuration error.
    /// The returned [`VarMap`] owns the parameters and is needed again only
    /// to continue training or re-save.
    pub fn load(path: &Path, device: &Device) -> Result<(Self, VarMap)> {
        let mut varmap = VarMap::new();
        let model = Self::new_trainable(&varmap, device)?;
        varmap.load(path).map_err(|e| {
            AuthentraceError::Config(format!(
                "failed to load checkpoint {}: {e}",
                path.display()
            ))
        })?;
        tracing::info!(checkpoint = %path.display(), "loaded dual-branch classifier");
        Ok((model, varmap))
    }

    /// Save the classifier parameters to a safetensors checkpoint.
    pub fn save(varmap: &VarMap, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthentraceError::input(format!(
                    "failed to create checkpoint directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        varmap.save(path).map_err(|e| {
            AuthentraceError::Config(format!(
                "failed to save checkpoint {}: {e}",
                path.display()
            ))
        })
    }

    /// The device this classifier runs on.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Forward pass producing raw logits of shape `[N, 1]`.
    ///
    /// `train` selects batch-norm behavior; inference callers should use
    /// [`forward`](Self::forward) instead.
    pub fn forward_t(
        &self,
        images: &Tensor,
        fingerprints: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let err = |stage: &'static str| {
            move |e: candle_core::Error| AuthentraceError::computation(stage, e.to_string())
        };
        let spatial = self
            .backbone
            .forward_t(images, train)
            .map_err(err("spatial_backbone"))?;
        let spatial = self
            .spatial_head
            .forward(&spatial)
            .map_err(err("spatial_head"))?;

        let freq = self
            .freq_fc1
            .forward(fingerprints)
            .and_then(|t| t.relu())
            .map_err(err("freq_branch"))?;
        let freq = self.freq_fc2.forward(&freq).map_err(err("freq_branch"))?;

        let fused = Tensor::cat(&[&spatial, &freq], 1).map_err(err("fusion_concat"))?;
        let hidden = self
            .fuse_fc1
            .forward(&fused)
            .and_then(|t| t.relu())
            .map_err(err("fusion_head"))?;
        self.fuse_fc2.forward(&hidden).map_err(err("fusion_head"))
    }

    /// Forward pass in eval mode producing fake-probabilities in `[0, 1]`,
    /// shape `[N, 1]`.
    pub fn forward(&self, images: &Tensor, fingerprints: &Tensor) -> Result<Tensor> {
        let logits = self.forward_t(images, fingerprints, false)?;
        candle_nn::ops::sigmoid(&logits)
            .map_err(|e| AuthentraceError::computation("sigmoid", e.to_string()))
    }

    /// Fake-probability of a single image given its frequency fingerprint.
    pub fn predict(&self, image: &DynamicImage, fingerprint: &[f32]) -> Result<f64> {
        if fingerprint.len() != FINGERPRINT_DIM {
            return Err(AuthentraceError::input(format!(
                "fingerprint must have {FINGERPRINT_DIM} entries, got {}",
                fingerprint.len()
            )));
        }
        let err = |stage: &'static str| {
            move |e: candle_core::Error| AuthentraceError::computation(stage, e.to_string())
        };
        let images = preprocess_image(image, &self.device)?
            .unsqueeze(0)
            .map_err(err("preprocess"))?;
        let fingerprints = Tensor::new(fingerprint, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(err("fingerprint_tensor"))?;
        let probability = self
            .forward(&images, &fingerprints)?
            .squeeze(1)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_scalar::<f32>())
            .map_err(err("probability"))?;
        Ok(f64::from(probability))
    }

    /// Fake-probability of a single image file.
    ///
    /// This is the inference entry point: decodes the image, extracts the
    /// frequency fingerprint, and runs the dual-branch forward pass.
    pub fn predict_path(&self, path: &Path) -> Result<f64> {
        let image = crate::image_io::decode_path(path)?;
        let fingerprint = frequency::extract(&image)?;
        self.predict(&image, &fingerprint)
    }
}

/// The dual-branch classifier doubles as a classification delegate with the
/// fixed vocabulary `["real", "fake"]`, so the heuristic fusion engine can
/// use it directly.
impl ImageClassifier for DualBranchClassifier {
    fn label_vocabulary(&self) -> Result<Vec<String>> {
        Ok(vec!["real".to_string(), "fake".to_string()])
    }

    fn classify(&self, image: &DynamicImage) -> Result<Vec<LabelScore>> {
        let fingerprint = frequency::extract(image)?;
        let fake = self.predict(image, &fingerprint)?;
        Ok(vec![
            LabelScore::new("real", 1.0 - fake),
            LabelScore::new("fake", fake),
        ])
    }

    fn name(&self) -> &'static str {
        "DualBranchClassifier"
    }
}
