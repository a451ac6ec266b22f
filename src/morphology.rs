use image::{GrayImage, Luma};

use crate::errors::{RetinopathyError, Result};
use crate::image_utils::{in_bounds, MASK_ON};

/// Square structuring element stored as pixel offsets around its anchor.
///
/// The anchor sits at `size / 2`, so an even element reaches one pixel
/// further up/left than down/right.
struct StructuringElement {
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    fn square(size: u32) -> Self {
        let anchor = (size / 2) as i32;
        let mut offsets = Vec::with_capacity((size * size) as usize);
        for ky in 0..size as i32 {
            for kx in 0..size as i32 {
                offsets.push((kx - anchor, ky - anchor));
            }
        }
        Self { offsets }
    }

    /// Point reflection, used by dilation so that opening stays anti-extensive
    fn reflected(&self) -> Self {
        Self {
            offsets: self.offsets.iter().map(|&(dx, dy)| (-dx, -dy)).collect(),
        }
    }
}

/// Binary erosion. Kernel pixels falling outside the image are ignored.
fn erode(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let keep = element.offsets.iter().all(|&(dx, dy)| {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            !in_bounds(nx, ny, width, height) || mask.get_pixel(nx as u32, ny as u32)[0] > 0
        });
        Luma([if keep { MASK_ON } else { 0 }])
    })
}

/// Binary dilation. Kernel pixels falling outside the image are ignored.
fn dilate(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let hit = element.offsets.iter().any(|&(dx, dy)| {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            in_bounds(nx, ny, width, height) && mask.get_pixel(nx as u32, ny as u32)[0] > 0
        });
        Luma([if hit { MASK_ON } else { 0 }])
    })
}

/// Apply morphological opening (erosion followed by dilation) with a square
/// `kernel_size` x `kernel_size` element. Removes foreground specks smaller
/// than the element and never adds foreground.
pub fn apply_opening(mask: &GrayImage, kernel_size: u32) -> Result<GrayImage> {
    if kernel_size == 0 {
        return Err(RetinopathyError::Pipeline(
            "Opening kernel size must be greater than 0".to_string()
        ));
    }

    let element = StructuringElement::square(kernel_size);
    let eroded = erode(mask, &element);
    Ok(dilate(&eroded, &element.reflected()))
}
