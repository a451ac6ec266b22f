// src/pipeline.rs - Diagnosis orchestration: load, segment, grade, annotate, persist

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use serde::Serialize;

use crate::annotation::{generate_annotations, Annotation, AnnotationLimits};
use crate::classifier::{classify_heuristic, Classification, SeverityStage};
use crate::config::{AnalysisMode, Config};
use crate::errors::{RetinopathyError, Result};
use crate::image_io::{load_image, overlay_path_for, save_gray_image, InputImage};
use crate::lesions::{detect_lesions, LesionCounts, LesionThresholds};
use crate::model::{LearnedModelAdapter, ModelOutcome};
use crate::segmentation::{segment_vessels, SegmentationParams};
use crate::simulation::simulate_diagnosis;

/// Which path produced the stage and confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisSource {
    Heuristic,
    LearnedModel,
    Simulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Structured diagnosis for one fundus photograph
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisResult {
    pub stage: SeverityStage,
    /// Display label of `stage`
    pub diagnosis: String,
    /// Always within [0, 1]
    pub confidence: f64,
    pub details: String,
    pub source: DiagnosisSource,
    /// Raw counts at the counting area cutoff; absent for simulated results
    pub lesion_counts: Option<LesionCounts>,
    /// Vessel mask written next to the source image; absent for simulated results
    pub segmentation_path: Option<PathBuf>,
    pub annotations: Vec<Annotation>,
    pub image_dimensions: Option<ImageDimensions>,
}

impl DiagnosisResult {
    fn from_classification(classification: Classification, source: DiagnosisSource) -> Self {
        Self {
            stage: classification.stage,
            diagnosis: classification.stage.display_name().to_string(),
            confidence: classification.confidence.clamp(0.0, 1.0),
            details: classification.detail,
            source,
            lesion_counts: None,
            segmentation_path: None,
            annotations: Vec::new(),
            image_dimensions: None,
        }
    }
}

/// Tracks the optional per-request processing budget
struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    fn new(limit_ms: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            limit: limit_ms.map(Duration::from_millis),
        }
    }

    fn check(&self, stage: &'static str) -> Result<()> {
        let elapsed = self.started.elapsed();
        debug!("{} finished after {} ms", stage, elapsed.as_millis());
        match self.limit {
            Some(limit) if elapsed >= limit => Err(RetinopathyError::DeadlineExceeded {
                stage,
                elapsed_ms: elapsed.as_millis(),
            }),
            _ => Ok(()),
        }
    }
}

/// Diagnoses fundus photographs. Holds only read-only state, so one analyzer
/// can serve many images concurrently.
pub struct Analyzer {
    config: Config,
    model: LearnedModelAdapter,
}

impl Analyzer {
    /// Validate `config` and resolve the learned model from `weights_path`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let weights = config.weights_path.as_deref().map(Path::new);
        let model = LearnedModelAdapter::from_weights(weights, config.model_input_size);
        Ok(Self { config, model })
    }

    /// Use an explicitly constructed learned-model adapter
    pub fn with_model(config: Config, model: LearnedModelAdapter) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, model })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Diagnose the image at `path`
    pub fn diagnose<P: AsRef<Path>>(&self, path: P) -> Result<DiagnosisResult> {
        self.diagnose_with_debug(path, None)
    }

    /// Diagnose the image at `path`, saving intermediate buffers to `debug_dir`
    /// when given
    pub fn diagnose_with_debug<P: AsRef<Path>>(
        &self,
        path: P,
        debug_dir: Option<&Path>,
    ) -> Result<DiagnosisResult> {
        let path = path.as_ref();

        if self.config.mode == AnalysisMode::Simulation {
            let result = DiagnosisResult::from_classification(
                simulate_diagnosis(path),
                DiagnosisSource::Simulation,
            );
            info!("{}: {} ({:.1}%, simulated)", path.display(), result.diagnosis, result.confidence * 100.0);
            return Ok(result);
        }

        let deadline = Deadline::new(self.config.max_processing_ms);
        let input_image = load_image(path)?;
        deadline.check("image loading")?;

        self.run_stages(input_image, debug_dir, &deadline)
    }

    /// Run the full pipeline on an already loaded image. The processing budget
    /// starts now, so decoding time is not counted.
    pub fn process_image(&self, input_image: InputImage, debug_dir: Option<&Path>) -> Result<DiagnosisResult> {
        let deadline = Deadline::new(self.config.max_processing_ms);
        self.run_stages(input_image, debug_dir, &deadline)
    }

    fn run_stages(
        &self,
        input_image: InputImage,
        debug_dir: Option<&Path>,
        deadline: &Deadline,
    ) -> Result<DiagnosisResult> {
        let (width, height) = input_image.dimensions();
        let InputImage { image, path, filename } = input_image;

        // Step 1: vessel segmentation
        let segmentation = segment_vessels(&image, &SegmentationParams::from(&self.config))?;
        deadline.check("vessel segmentation")?;

        // Step 2: lesion blobs, extracted once for counting and annotation
        let thresholds = LesionThresholds {
            dark: self.config.dark_lesion_threshold,
            bright: self.config.bright_lesion_threshold,
        };
        let (masks, blobs) = detect_lesions(&segmentation.enhanced, &segmentation.vessel_mask, thresholds);
        let counts = blobs.counts(self.config.count_min_area);
        deadline.check("lesion detection")?;

        // Step 3: learned model first, heuristic otherwise
        let (classification, source) = match self.model.classify(&image) {
            ModelOutcome::Classified(c) => (c, DiagnosisSource::LearnedModel),
            ModelOutcome::Skipped => (classify_heuristic(counts), DiagnosisSource::Heuristic),
            ModelOutcome::FallbackRequested(e) => {
                warn!("{}: {}; falling back to heuristic grading", filename, e);
                (classify_heuristic(counts), DiagnosisSource::Heuristic)
            }
        };
        deadline.check("classification")?;

        // Step 4: annotations
        let annotations = generate_annotations(
            &blobs,
            AnnotationLimits {
                min_area: self.config.annotation_min_area,
                max_hemorrhages: self.config.max_hemorrhage_annotations,
                max_exudates: self.config.max_exudate_annotations,
            },
        );

        if let Some(dir) = debug_dir {
            save_debug_images(dir, &path, &segmentation.enhanced, &masks.dark, &masks.bright)?;
        }

        // Step 5: persist the vessel mask next to the source
        let overlay_path = overlay_path_for(&path, &self.config.overlay_prefix)?;
        save_gray_image(&segmentation.vessel_mask, &overlay_path)?;

        let mut result = DiagnosisResult::from_classification(classification, source);
        result.lesion_counts = Some(counts);
        result.segmentation_path = Some(overlay_path);
        result.annotations = annotations;
        result.image_dimensions = Some(ImageDimensions { width, height });

        info!(
            "{}: {} ({:.1}%, {:?}, H={}, E={})",
            filename,
            result.diagnosis,
            result.confidence * 100.0,
            result.source,
            counts.hemorrhages,
            counts.exudates
        );

        Ok(result)
    }
}

fn save_debug_images(
    dir: &Path,
    source: &Path,
    enhanced: &image::GrayImage,
    dark: &image::GrayImage,
    bright: &image::GrayImage,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("image");

    save_gray_image(enhanced, dir.join(format!("{}_enhanced.png", stem)))?;
    save_gray_image(dark, dir.join(format!("{}_dark_lesions.png", stem)))?;
    save_gray_image(bright, dir.join(format!("{}_bright_lesions.png", stem)))?;

    Ok(())
}
