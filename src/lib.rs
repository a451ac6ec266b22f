// src/lib.rs - Library interface for the retinopathy analyzer

pub mod annotation;
pub mod blobs;
pub mod classifier;
pub mod config;
pub mod contrast;
pub mod errors;
pub mod image_io;
pub mod image_utils;
pub mod lesions;
pub mod model;
pub mod morphology;
pub mod output;
pub mod pipeline;
pub mod segmentation;
pub mod simulation;

// Re-export commonly used types and functions
pub use errors::{RetinopathyError, Result};
pub use config::{AnalysisMode, Config};
pub use pipeline::{Analyzer, DiagnosisResult, DiagnosisSource, ImageDimensions};
pub use image_io::{InputImage, load_image, overlay_path_for};

pub use annotation::{generate_annotations, Annotation, AnnotationLimits, LesionLabel};
pub use classifier::{classify_heuristic, Classification, SeverityStage};
pub use lesions::{detect_lesions, LesionBlobs, LesionCounts, LesionThresholds};
pub use model::{InferenceBackend, LearnedModelAdapter, ModelInput, ModelOutcome};
pub use segmentation::{segment_vessels, SegmentationParams, VesselSegmentation};
pub use simulation::simulate_diagnosis;
