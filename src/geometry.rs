// src/geometry.rs
//
// Pixel-space helpers shared by the resolver, the occupancy machine and the
// zone loader. Boxes and rectangles are [x1, y1, x2, y2] with x1 < x2, y1 < y2.

use serde::{Deserialize, Serialize};

pub type Point = (f32, f32);

/// Axis-aligned rectangle in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_coords(coords: [f32; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    pub fn coords(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Finite corners with strictly positive width and height.
    pub fn is_well_formed(&self) -> bool {
        self.coords().iter().all(|v| v.is_finite()) && self.x1 < self.x2 && self.y1 < self.y2
    }

    /// Rescale by independent x/y ratios, truncating to whole pixels the way
    /// zone files are authored.
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
        Self {
            x1: (self.x1 * scale_x).trunc(),
            y1: (self.y1 * scale_y).trunc(),
            x2: (self.x2 * scale_x).trunc(),
            y2: (self.y2 * scale_y).trunc(),
        }
    }
}

/// Arithmetic mean of the two box corners.
pub fn center(bbox: &[f32; 4]) -> Point {
    ((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0)
}

/// Strict interior test. A point lying exactly on an edge is outside.
pub fn contains(point: Point, rect: &Rect) -> bool {
    let (x, y) = point;
    rect.x1 < x && x < rect.x2 && rect.y1 < y && y < rect.y2
}

pub fn distance(a: Point, b: Point) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_is_corner_mean() {
        assert_eq!(center(&[100.0, 100.0, 300.0, 200.0]), (200.0, 150.0));
    }

    #[test]
    fn test_contains_interior_point() {
        let rect = Rect::new(100.0, 100.0, 300.0, 300.0);
        assert!(contains((200.0, 200.0), &rect));
        assert!(contains((100.5, 299.5), &rect));
    }

    #[test]
    fn test_contains_is_boundary_exclusive() {
        let rect = Rect::new(100.0, 100.0, 300.0, 300.0);
        for point in [
            (100.0, 200.0),
            (300.0, 200.0),
            (200.0, 100.0),
            (200.0, 300.0),
            (100.0, 100.0),
            (300.0, 300.0),
        ] {
            assert!(
                !contains(point, &rect),
                "edge point {:?} must be outside",
                point
            );
        }
    }

    #[test]
    fn test_distance() {
        assert!((distance((0.0, 0.0), (3.0, 4.0)) - 5.0).abs() < 1e-6);
        assert_eq!(distance((7.0, 7.0), (7.0, 7.0)), 0.0);
    }

    #[test]
    fn test_scaled_truncates() {
        let rect = Rect::new(100.0, 100.0, 300.0, 300.0).scaled(1.5, 0.333);
        assert_eq!(rect, Rect::new(150.0, 33.0, 450.0, 99.0));
    }

    #[test]
    fn test_well_formed() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).is_well_formed());
        assert!(!Rect::new(5.0, 0.0, 5.0, 1.0).is_well_formed());
        assert!(!Rect::new(0.0, 3.0, 1.0, 1.0).is_well_formed());
        assert!(!Rect::new(0.0, 0.0, f32::NAN, 1.0).is_well_formed());
    }
}
