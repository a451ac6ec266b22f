// src/segmentation.rs - Retinal vessel segmentation

use image::{GrayImage, RgbImage};
use log::debug;

use crate::config::Config;
use crate::contrast::{adaptive_threshold_inv, clahe};
use crate::errors::Result;
use crate::image_utils::{count_foreground, extract_channel, GREEN_CHANNEL};
use crate::morphology::apply_opening;

/// Parameters of the vessel segmenter
#[derive(Debug, Clone, Copy)]
pub struct SegmentationParams {
    pub tile_grid: [u32; 2],
    pub clip_limit: f64,
    pub block_size: u32,
    pub offset: i32,
    pub opening_kernel_size: u32,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            tile_grid: [8, 8],
            clip_limit: 2.0,
            block_size: 11,
            offset: 2,
            opening_kernel_size: 2,
        }
    }
}

impl From<&Config> for SegmentationParams {
    fn from(config: &Config) -> Self {
        Self {
            tile_grid: config.clahe_tile_grid,
            clip_limit: config.clahe_clip_limit,
            block_size: config.adaptive_block_size,
            offset: config.adaptive_offset,
            opening_kernel_size: config.opening_kernel_size,
        }
    }
}

/// Output of the vessel segmenter. Both buffers share the source dimensions.
pub struct VesselSegmentation {
    /// CLAHE-enhanced green channel
    pub enhanced: GrayImage,
    /// Binary vessel mask (255 = vessel)
    pub vessel_mask: GrayImage,
}

/// Segment retinal vessels from a fundus photograph
pub fn segment_vessels(image: &RgbImage, params: &SegmentationParams) -> Result<VesselSegmentation> {
    // Step 1: green channel
    let green = extract_channel(image, GREEN_CHANNEL);

    // Step 2: local contrast normalization
    let enhanced = clahe(&green, params.tile_grid, params.clip_limit)?;

    // Step 3: vessels are darker than their neighborhood
    let candidates = adaptive_threshold_inv(&enhanced, params.block_size, params.offset)?;

    // Step 4: drop isolated noise pixels
    let vessel_mask = apply_opening(&candidates, params.opening_kernel_size)?;

    debug!(
        "Vessel segmentation: {} candidate pixels -> {} after opening",
        count_foreground(&candidates),
        count_foreground(&vessel_mask)
    );

    Ok(VesselSegmentation { enhanced, vessel_mask })
}
