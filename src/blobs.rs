// src/blobs.rs - Connected regions of binary masks via external contours

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;
use serde::Serialize;

/// A connected foreground region with its bounding rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Blob {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Polygon area enclosed by the outer contour, in square pixels.
    /// A single pixel or a one-pixel-wide line encloses zero area.
    pub area: f64,
}

impl Blob {
    fn from_contour(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Some(Self {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
            area: polygon_area(points),
        })
    }
}

/// Shoelace area of a closed contour
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let mut twice_area = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }

    twice_area.abs() as f64 / 2.0
}

/// Extract blobs from the outermost contours of `mask`, in raster discovery
/// order. Regions nested inside holes of other regions are not reported.
pub fn extract_external_blobs(mask: &GrayImage) -> Vec<Blob> {
    let contours: Vec<Contour<i32>> = find_contours(mask);

    contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| Blob::from_contour(&c.points))
        .collect()
}

/// Blobs whose area strictly exceeds `min_area`, original order kept
pub fn filter_by_area(blobs: &[Blob], min_area: f64) -> impl Iterator<Item = &Blob> {
    blobs.iter().filter(move |b| b.area > min_area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use image::Luma;

    fn fill_rect(mask: &mut GrayImage, x: u32, y: u32, w: u32, h: u32) {
        for yy in y..y + h {
            for xx in x..x + w {
                mask.put_pixel(xx, yy, Luma([255]));
            }
        }
    }

    #[test]
    fn rectangle_area_counts_enclosed_polygon() {
        let mut mask = GrayImage::new(20, 20);
        fill_rect(&mut mask, 2, 3, 5, 4);

        let blobs = extract_external_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        let blob = blobs[0];
        assert_eq!((blob.x, blob.y, blob.width, blob.height), (2, 3, 5, 4));
        // Contour runs through pixel centers: (5-1) x (4-1)
        assert_approx_eq!(blob.area, 12.0);
    }

    #[test]
    fn single_pixel_has_zero_area() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(2, 2, Luma([255]));

        let blobs = extract_external_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 0.0);
        assert_eq!((blobs[0].width, blobs[0].height), (1, 1));
    }

    #[test]
    fn blob_inside_a_ring_hole_is_not_external() {
        let mut mask = GrayImage::new(20, 20);
        fill_rect(&mut mask, 2, 2, 15, 15);
        // Punch a hole, then put an island inside it
        for y in 5..14 {
            for x in 5..14 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        fill_rect(&mut mask, 8, 8, 3, 3);

        let blobs = extract_external_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        assert_eq!((blobs[0].x, blobs[0].y), (2, 2));
    }

    #[test]
    fn blobs_come_back_in_raster_order() {
        let mut mask = GrayImage::new(30, 30);
        fill_rect(&mut mask, 20, 2, 3, 3);
        fill_rect(&mut mask, 2, 10, 3, 3);
        fill_rect(&mut mask, 10, 2, 3, 3);

        let xs: Vec<u32> = extract_external_blobs(&mask).iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![10, 20, 2]);
    }

    #[test]
    fn area_filter_is_strict() {
        let blobs = vec![
            Blob { x: 0, y: 0, width: 3, height: 4, area: 5.0 },
            Blob { x: 5, y: 0, width: 4, height: 4, area: 9.0 },
            Blob { x: 9, y: 0, width: 4, height: 5, area: 12.0 },
        ];
        assert_eq!(filter_by_area(&blobs, 5.0).count(), 2);
        assert_eq!(filter_by_area(&blobs, 10.0).count(), 1);
    }
}
