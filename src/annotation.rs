// src/annotation.rs - Bounding-box annotations for the lesion overlay

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::blobs::{filter_by_area, Blob};
use crate::lesions::LesionBlobs;

/// Lesion type shown on an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LesionLabel {
    Hemorrhage,
    Exudate,
}

impl fmt::Display for LesionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LesionLabel::Hemorrhage => f.write_str("Hemorrhage"),
            LesionLabel::Exudate => f.write_str("Exudate"),
        }
    }
}

/// A labeled bounding rectangle for overlay rendering
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub label: LesionLabel,
}

impl Annotation {
    fn from_blob(blob: &Blob, label: LesionLabel) -> Self {
        Self {
            x: blob.x,
            y: blob.y,
            width: blob.width,
            height: blob.height,
            label,
        }
    }
}

/// Limits applied when turning blobs into annotations
#[derive(Debug, Clone, Copy)]
pub struct AnnotationLimits {
    pub min_area: f64,
    pub max_hemorrhages: usize,
    pub max_exudates: usize,
}

impl Default for AnnotationLimits {
    fn default() -> Self {
        Self {
            min_area: 10.0,
            max_hemorrhages: 15,
            max_exudates: 10,
        }
    }
}

/// Hemorrhage annotations first, then exudates, each in discovery order and
/// capped independently. No sorting by size or position.
pub fn generate_annotations(blobs: &LesionBlobs, limits: AnnotationLimits) -> Vec<Annotation> {
    let hemorrhages = filter_by_area(&blobs.dark, limits.min_area)
        .take(limits.max_hemorrhages)
        .map(|b| Annotation::from_blob(b, LesionLabel::Hemorrhage));

    let exudates = filter_by_area(&blobs.bright, limits.min_area)
        .take(limits.max_exudates)
        .map(|b| Annotation::from_blob(b, LesionLabel::Exudate));

    hemorrhages.chain(exudates).collect()
}
