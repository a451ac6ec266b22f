// src/contrast.rs - Local contrast enhancement and adaptive binarization

use image::{GrayImage, Luma};
use rayon::prelude::*;

use crate::errors::{RetinopathyError, Result};
use crate::image_utils::{reflect_101, MASK_ON};

const HIST_BINS: usize = 256;

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into `tile_grid[0]` x `tile_grid[1]` tiles (padded by
/// reflection when the size does not divide evenly). Each tile gets a clipped
/// histogram whose excess is spread back over all bins, and every output
/// pixel is bilinearly interpolated between the four nearest tile mappings.
pub fn clahe(channel: &GrayImage, tile_grid: [u32; 2], clip_limit: f64) -> Result<GrayImage> {
    let (width, height) = channel.dimensions();
    let [tiles_x, tiles_y] = tile_grid;

    if tiles_x == 0 || tiles_y == 0 {
        return Err(RetinopathyError::Pipeline(
            "CLAHE tile grid must be non-zero".to_string(),
        ));
    }
    if width == 0 || height == 0 {
        return Ok(channel.clone());
    }

    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);
    let tile_area = (tile_w * tile_h) as f64;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area / HIST_BINS as f64) as u32).max(1)
    } else {
        u32::MAX
    };
    let lut_scale = (HIST_BINS - 1) as f64 / tile_area;

    // One lookup table per tile, row-major
    let luts: Vec<[u8; HIST_BINS]> = (0..tiles_x * tiles_y)
        .into_par_iter()
        .map(|tile| {
            let tx = tile % tiles_x;
            let ty = tile / tiles_x;
            let mut hist = [0u32; HIST_BINS];

            for y in 0..tile_h {
                let sy = reflect_101((ty * tile_h + y) as i64, height);
                for x in 0..tile_w {
                    let sx = reflect_101((tx * tile_w + x) as i64, width);
                    hist[channel.get_pixel(sx, sy)[0] as usize] += 1;
                }
            }

            clip_histogram(&mut hist, clip);
            build_lut(&hist, lut_scale)
        })
        .collect();

    let inv_tile_w = 1.0 / tile_w as f64;
    let inv_tile_h = 1.0 / tile_h as f64;
    let mut enhanced = GrayImage::new(width, height);

    for (x, y, pixel) in enhanced.enumerate_pixels_mut() {
        let value = channel.get_pixel(x, y)[0] as usize;

        let txf = x as f64 * inv_tile_w - 0.5;
        let tx1 = txf.floor() as i64;
        let xa = txf - tx1 as f64;
        let tx2 = (tx1 + 1).min(tiles_x as i64 - 1) as u32;
        let tx1 = tx1.max(0) as u32;

        let tyf = y as f64 * inv_tile_h - 0.5;
        let ty1 = tyf.floor() as i64;
        let ya = tyf - ty1 as f64;
        let ty2 = (ty1 + 1).min(tiles_y as i64 - 1) as u32;
        let ty1 = ty1.max(0) as u32;

        let lut = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][value] as f64;

        let top = lut(tx1, ty1) * (1.0 - xa) + lut(tx2, ty1) * xa;
        let bottom = lut(tx1, ty2) * (1.0 - xa) + lut(tx2, ty2) * xa;
        let res = top * (1.0 - ya) + bottom * ya;

        *pixel = Luma([res.round().clamp(0.0, 255.0) as u8]);
    }

    Ok(enhanced)
}

fn clip_histogram(hist: &mut [u32; HIST_BINS], clip: u32) {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let redistributed = excess / HIST_BINS as u32;
    let mut residual = excess - redistributed * HIST_BINS as u32;
    for bin in hist.iter_mut() {
        *bin += redistributed;
    }

    if residual > 0 {
        let step = (HIST_BINS / residual as usize).max(1);
        let mut i = 0;
        while i < HIST_BINS && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

fn build_lut(hist: &[u32; HIST_BINS], lut_scale: f64) -> [u8; HIST_BINS] {
    let mut lut = [0u8; HIST_BINS];
    let mut sum = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        sum += count;
        lut[i] = (sum as f64 * lut_scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Inverted mean adaptive threshold.
///
/// A pixel becomes foreground when it is at least `offset` darker than the
/// rounded mean of its `block_size` x `block_size` neighborhood. Borders
/// replicate the edge pixels.
pub fn adaptive_threshold_inv(channel: &GrayImage, block_size: u32, offset: i32) -> Result<GrayImage> {
    if block_size < 3 || block_size % 2 == 0 {
        return Err(RetinopathyError::Pipeline(format!(
            "adaptive threshold block size must be odd and >= 3, got {}",
            block_size
        )));
    }

    let (width, height) = channel.dimensions();
    if width == 0 || height == 0 {
        return Ok(GrayImage::new(width, height));
    }

    let radius = (block_size / 2) as i64;
    let area = block_size * block_size;
    let w = width as usize;
    let src = channel.as_raw();

    let clamp_x = |x: i64| x.clamp(0, width as i64 - 1) as usize;
    let clamp_y = |y: i64| y.clamp(0, height as i64 - 1) as usize;

    // Horizontal box sums
    let mut horizontal = vec![0u32; w * height as usize];
    horizontal
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            let line = &src[y * w..(y + 1) * w];
            for (x, out) in row.iter_mut().enumerate() {
                *out = (-radius..=radius)
                    .map(|dx| line[clamp_x(x as i64 + dx)] as u32)
                    .sum();
            }
        });

    // Vertical pass produces the mask directly
    let mut mask = vec![0u8; w * height as usize];
    mask.par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let sum: u32 = (-radius..=radius)
                    .map(|dy| horizontal[clamp_y(y as i64 + dy) * w + x])
                    .sum();
                let mean = ((sum + area / 2) / area) as i32;
                let value = src[y * w + x] as i32;
                if value - mean <= -offset {
                    *out = MASK_ON;
                }
            }
        });

    GrayImage::from_raw(width, height, mask).ok_or_else(|| {
        RetinopathyError::Pipeline("adaptive threshold buffer size mismatch".to_string())
    })
}
