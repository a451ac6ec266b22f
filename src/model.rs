// src/model.rs - Learned-model adapter with explicit heuristic fallback

use std::path::Path;
use image::RgbImage;
use log::{debug, info, warn};

use crate::classifier::{Classification, SeverityStage};
use crate::errors::{RetinopathyError, Result};
use crate::image_utils::resize_image;

/// ImageNet channel statistics the classifier was trained with
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized `1 x 3 x size x size` input tensor in CHW order
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub size: u32,
    pub data: Vec<f32>,
}

/// Forward pass of a 5-class stage classifier. Implementations hold read-only
/// weights and may be shared across threads.
pub trait InferenceBackend: Send + Sync {
    /// Raw logits, one per severity stage
    fn forward(&self, input: &ModelInput) -> Result<Vec<f32>>;
}

/// What the adapter produced for one image
#[derive(Debug)]
pub enum ModelOutcome {
    /// The model graded the image
    Classified(Classification),
    /// No learned model is configured; use the heuristic
    Skipped,
    /// The model was configured but could not produce a grade; use the heuristic
    FallbackRequested(RetinopathyError),
}

enum BackendState {
    Disabled,
    Ready(Box<dyn InferenceBackend>),
    /// Configured weights that could not be loaded
    Failed(String),
}

/// Learned-model path. Availability is resolved once, at construction.
pub struct LearnedModelAdapter {
    state: BackendState,
    input_size: u32,
}

impl LearnedModelAdapter {
    /// Heuristic-only adapter
    pub fn disabled() -> Self {
        Self { state: BackendState::Disabled, input_size: 224 }
    }

    /// Adapter around an already constructed backend
    pub fn with_backend(backend: Box<dyn InferenceBackend>, input_size: u32) -> Self {
        Self { state: BackendState::Ready(backend), input_size }
    }

    /// Resolve the learned model from an optional weights path.
    ///
    /// No path or a path that does not exist yields a disabled adapter. A
    /// weights file that fails to load, or a build without the inference
    /// runtime, yields an adapter that always requests the fallback.
    pub fn from_weights(weights_path: Option<&Path>, input_size: u32) -> Self {
        let Some(path) = weights_path else {
            debug!("No learned-model weights configured, using heuristic grading");
            return Self::disabled();
        };

        if !path.is_file() {
            info!("Learned-model weights not found at {}, using heuristic grading", path.display());
            return Self::disabled();
        }

        let state = match load_backend(path, input_size) {
            Ok(backend) => {
                info!("Loaded learned model from {}", path.display());
                BackendState::Ready(backend)
            }
            Err(e) => {
                warn!("Learned model unavailable ({}), heuristic grading will be used", e);
                BackendState::Failed(e.to_string())
            }
        };

        Self { state, input_size }
    }

    /// True when a backend loaded successfully
    pub fn is_ready(&self) -> bool {
        matches!(self.state, BackendState::Ready(_))
    }

    /// Grade `image` with the learned model. Never fails: every error is
    /// turned into [`ModelOutcome::FallbackRequested`].
    pub fn classify(&self, image: &RgbImage) -> ModelOutcome {
        let backend = match &self.state {
            BackendState::Disabled => return ModelOutcome::Skipped,
            BackendState::Failed(reason) => {
                return ModelOutcome::FallbackRequested(RetinopathyError::ModelInferenceFailed(
                    reason.clone(),
                ));
            }
            BackendState::Ready(backend) => backend,
        };

        let input = preprocess(image, self.input_size);
        match backend.forward(&input).and_then(|logits| classification_from_logits(&logits)) {
            Ok(classification) => ModelOutcome::Classified(classification),
            Err(e @ RetinopathyError::ModelInferenceFailed(_)) => ModelOutcome::FallbackRequested(e),
            Err(other) => ModelOutcome::FallbackRequested(RetinopathyError::ModelInferenceFailed(
                other.to_string(),
            )),
        }
    }
}

/// Resize to `size` x `size` and normalize each channel with ImageNet statistics
pub fn preprocess(image: &RgbImage, size: u32) -> ModelInput {
    let resized = resize_image(image, [size, size]);
    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y * size + x) as usize;
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            data[c * plane + offset] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    ModelInput { size, data }
}

/// Convert logits to probabilities
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_values: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum: f32 = exp_values.iter().sum();
    exp_values.iter().map(|&x| x / sum).collect()
}

/// Arg-max stage with its softmax probability as confidence
pub fn classification_from_logits(logits: &[f32]) -> Result<Classification> {
    if logits.len() != SeverityStage::COUNT {
        return Err(RetinopathyError::ModelInferenceFailed(format!(
            "expected {} logits, model produced {}",
            SeverityStage::COUNT,
            logits.len()
        )));
    }
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(RetinopathyError::ModelInferenceFailed(
            "model produced non-finite logits".to_string(),
        ));
    }

    let probabilities = softmax(logits);
    let (index, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    let stage = SeverityStage::from_index(index).ok_or_else(|| {
        RetinopathyError::ModelInferenceFailed(format!("class index {} out of range", index))
    })?;

    Ok(Classification {
        stage,
        confidence: (probability as f64).clamp(0.0, 1.0),
        detail: format!("Learned model prediction (class probability {:.1}%).", probability * 100.0),
    })
}

#[cfg(feature = "learned-model")]
fn load_backend(path: &Path, input_size: u32) -> Result<Box<dyn InferenceBackend>> {
    Ok(Box::new(onnx::OnnxBackend::load(path, input_size)?))
}

#[cfg(not(feature = "learned-model"))]
fn load_backend(_path: &Path, _input_size: u32) -> Result<Box<dyn InferenceBackend>> {
    Err(RetinopathyError::ModelInferenceFailed(
        "built without the learned-model inference runtime".to_string(),
    ))
}

#[cfg(feature = "learned-model")]
mod onnx {
    use std::path::Path;
    use tract_onnx::prelude::*;

    use super::{InferenceBackend, ModelInput};
    use crate::errors::{RetinopathyError, Result};

    type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

    /// ONNX classifier executed with tract
    pub struct OnnxBackend {
        plan: OnnxPlan,
        input_size: u32,
    }

    fn inference_error<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> RetinopathyError + '_ {
        move |e| RetinopathyError::ModelInferenceFailed(format!("{}: {}", context, e))
    }

    impl OnnxBackend {
        pub fn load(path: &Path, input_size: u32) -> Result<Self> {
            let size = input_size as usize;
            let plan = tract_onnx::onnx()
                .model_for_path(path)
                .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
                .and_then(|model| model.into_optimized())
                .and_then(|model| model.into_runnable())
                .map_err(inference_error("failed to load ONNX weights"))?;

            Ok(Self { plan, input_size })
        }
    }

    impl InferenceBackend for OnnxBackend {
        fn forward(&self, input: &ModelInput) -> Result<Vec<f32>> {
            if input.size != self.input_size {
                return Err(RetinopathyError::ModelInferenceFailed(format!(
                    "input size {} does not match model input {}",
                    input.size, self.input_size
                )));
            }

            let size = input.size as usize;
            let tensor: Tensor = tract_ndarray::Array4::from_shape_vec((1, 3, size, size), input.data.clone())
                .map_err(inference_error("bad input tensor shape"))?
                .into();

            let outputs = self
                .plan
                .run(tvec!(tensor.into()))
                .map_err(inference_error("forward pass failed"))?;

            let logits = outputs
                .first()
                .ok_or_else(|| RetinopathyError::ModelInferenceFailed("model has no outputs".to_string()))?
                .to_array_view::<f32>()
                .map_err(inference_error("unexpected output type"))?
                .iter()
                .copied()
                .collect();

            Ok(logits)
        }
    }
}
