// src/lesions.rs - Dark (hemorrhage) and bright (exudate) lesion detection

use image::GrayImage;
use log::debug;
use serde::Serialize;

use crate::blobs::{extract_external_blobs, filter_by_area, Blob};
use crate::image_utils::{subtract_saturating, threshold_above, threshold_below};

/// Intensity cutoffs for lesion masks
#[derive(Debug, Clone, Copy)]
pub struct LesionThresholds {
    /// Enhanced intensity at or below which a pixel is a dark-lesion candidate
    pub dark: u8,
    /// Enhanced intensity at or above which a pixel is a bright-lesion candidate
    pub bright: u8,
}

impl Default for LesionThresholds {
    fn default() -> Self {
        Self { dark: 20, bright: 220 }
    }
}

/// Binary lesion masks, kept for debug output
pub struct LesionMasks {
    pub dark: GrayImage,
    pub bright: GrayImage,
}

/// All external blobs found in the lesion masks, unfiltered.
///
/// Extracted once per image; counting and annotation each apply their own
/// area cutoff on top.
#[derive(Debug, Clone, Default)]
pub struct LesionBlobs {
    /// Dark blobs (hemorrhages / microaneurysms) in discovery order
    pub dark: Vec<Blob>,
    /// Bright blobs (exudates) in discovery order
    pub bright: Vec<Blob>,
}

/// Hemorrhage and exudate counts fed to the heuristic classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LesionCounts {
    pub hemorrhages: usize,
    pub exudates: usize,
}

impl LesionBlobs {
    /// Count blobs whose area strictly exceeds `min_area`
    pub fn counts(&self, min_area: f64) -> LesionCounts {
        LesionCounts {
            hemorrhages: filter_by_area(&self.dark, min_area).count(),
            exudates: filter_by_area(&self.bright, min_area).count(),
        }
    }
}

/// Build the dark and bright lesion masks.
///
/// Vessels are subtracted from the dark mask so that they are not counted as
/// hemorrhages.
pub fn build_lesion_masks(
    enhanced: &GrayImage,
    vessel_mask: &GrayImage,
    thresholds: LesionThresholds,
) -> LesionMasks {
    let (dark, bright) = rayon::join(
        || subtract_saturating(&threshold_below(enhanced, thresholds.dark), vessel_mask),
        || threshold_above(enhanced, thresholds.bright),
    );

    LesionMasks { dark, bright }
}

/// Extract the unfiltered lesion blobs from both masks
pub fn extract_lesion_blobs(masks: &LesionMasks) -> LesionBlobs {
    let (dark, bright) = rayon::join(
        || extract_external_blobs(&masks.dark),
        || extract_external_blobs(&masks.bright),
    );

    debug!("Lesion blobs: {} dark, {} bright (before area filter)", dark.len(), bright.len());

    LesionBlobs { dark, bright }
}

/// Masks and blobs in one call
pub fn detect_lesions(
    enhanced: &GrayImage,
    vessel_mask: &GrayImage,
    thresholds: LesionThresholds,
) -> (LesionMasks, LesionBlobs) {
    let masks = build_lesion_masks(enhanced, vessel_mask, thresholds);
    let blobs = extract_lesion_blobs(&masks);
    (masks, blobs)
}
