use image::{GrayImage, Luma, RgbImage};

/// Foreground value in every binary mask
pub const MASK_ON: u8 = 255;

/// Green is the fundus channel with the highest vessel contrast
pub const GREEN_CHANNEL: usize = 1;

/// Resize an image to the specified dimensions
pub fn resize_image(image: &RgbImage, dimensions: [u32; 2]) -> RgbImage {
    let (width, height) = (dimensions[0], dimensions[1]);
    image::imageops::resize(
        image,
        width,
        height,
        image::imageops::FilterType::Triangle,
    )
}

/// Extract one color plane as a single-channel buffer
pub fn extract_channel(image: &RgbImage, channel: usize) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| Luma([image.get_pixel(x, y)[channel]]))
}

/// Binarize with `value <= threshold` as foreground
pub fn threshold_below(channel: &GrayImage, threshold: u8) -> GrayImage {
    map_mask(channel, |v| v <= threshold)
}

/// Binarize with `value >= threshold` as foreground
pub fn threshold_above(channel: &GrayImage, threshold: u8) -> GrayImage {
    map_mask(channel, |v| v >= threshold)
}

fn map_mask<F: Fn(u8) -> bool>(channel: &GrayImage, predicate: F) -> GrayImage {
    let (width, height) = channel.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if predicate(channel.get_pixel(x, y)[0]) {
            Luma([MASK_ON])
        } else {
            Luma([0])
        }
    })
}

/// Pixel-wise `a - b`, floored at 0
pub fn subtract_saturating(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (width, height) = a.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([a.get_pixel(x, y)[0].saturating_sub(b.get_pixel(x, y)[0])])
    })
}

/// Number of foreground pixels in a mask
pub fn count_foreground(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] > 0).count()
}

/// Check if a point is inside the image bounds
#[inline]
pub fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge
/// sample (`gfedcb|abcdefgh|gfedcba`)
#[inline]
pub fn reflect_101(index: i64, len: u32) -> u32 {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as u32
}
