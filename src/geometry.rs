//! Plane geometry shared by the tiling, tile provider and scene.
//!
//! Integer rectangles (`Rect`) address data-space pixels, float rectangles
//! (`RectF`) address display space. Both are half-open: a rectangle covers
//! `[x, x + width) x [y, y + height)`.

/// Integer point in data space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Floating point position in display space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl std::ops::Sub for PointF {
    type Output = PointF;

    fn sub(self, rhs: PointF) -> PointF {
        PointF::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Axis-aligned integer rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersected(other).is_empty()
    }

    /// Overlapping part of both rectangles; empty when they are disjoint.
    pub fn intersected(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    pub fn to_rect_f(self) -> RectF {
        RectF::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

/// Axis-aligned rectangle in display space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanning two corner points, in any order.
    pub fn from_corners(a: PointF, b: PointF) -> Self {
        let x0 = a.x.min(b.x);
        let y0 = a.y.min(b.y);
        RectF::new(x0, y0, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn top_left(&self) -> PointF {
        PointF::new(self.x, self.y)
    }

    pub fn center(&self) -> PointF {
        PointF::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, p: PointF) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    pub fn intersects(&self, other: &RectF) -> bool {
        !self.intersected(other).is_empty()
    }

    pub fn intersected(&self, other: &RectF) -> RectF {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        RectF::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }

    /// Smallest rectangle containing both. Empty operands are ignored.
    pub fn united(&self, other: &RectF) -> RectF {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        RectF::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Smallest integer rectangle covering this one.
    pub fn to_aligned_rect(self) -> Rect {
        let x0 = self.x.floor() as i32;
        let y0 = self.y.floor() as i32;
        let x1 = self.right().ceil() as i32;
        let y1 = self.bottom().ceil() as i32;
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// 2D affine transform between data space and display space.
///
/// Maps `(x, y)` to `(m11 * x + m21 * y + dx, m12 * x + m22 * y + dy)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m11: f32,
    pub m12: f32,
    pub m21: f32,
    pub m22: f32,
    pub dx: f32,
    pub dy: f32,
}

impl Transform {
    pub fn new(m11: f32, m12: f32, m21: f32, m22: f32, dx: f32, dy: f32) -> Self {
        Self {
            m11,
            m12,
            m21,
            m22,
            dx,
            dy,
        }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    /// Swaps the x and y axes. Data x points down, data y points right.
    pub fn transposition() -> Self {
        Self::new(0.0, 1.0, 1.0, 0.0, 0.0, 0.0)
    }

    pub fn map(&self, p: PointF) -> PointF {
        PointF::new(
            self.m11 * p.x + self.m21 * p.y + self.dx,
            self.m12 * p.x + self.m22 * p.y + self.dy,
        )
    }

    /// Bounding box of the four mapped corners.
    pub fn map_rect(&self, r: RectF) -> RectF {
        let corners = [
            self.map(PointF::new(r.x, r.y)),
            self.map(PointF::new(r.right(), r.y)),
            self.map(PointF::new(r.x, r.bottom())),
            self.map(PointF::new(r.right(), r.bottom())),
        ];
        let min_x = corners.iter().map(|c| c.x).fold(f32::INFINITY, f32::min);
        let min_y = corners.iter().map(|c| c.y).fold(f32::INFINITY, f32::min);
        let max_x = corners
            .iter()
            .map(|c| c.x)
            .fold(f32::NEG_INFINITY, f32::max);
        let max_y = corners
            .iter()
            .map(|c| c.y)
            .fold(f32::NEG_INFINITY, f32::max);
        RectF::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn determinant(&self) -> f32 {
        self.m11 * self.m22 - self.m12 * self.m21
    }

    /// Inverse transform, or `None` when the matrix is singular.
    pub fn inverted(&self) -> Option<Transform> {
        let det = self.determinant();
        if det.abs() < f32::EPSILON {
            return None;
        }
        let m11 = self.m22 / det;
        let m12 = -self.m12 / det;
        let m21 = -self.m21 / det;
        let m22 = self.m11 / det;
        let dx = -(m11 * self.dx + m21 * self.dy);
        let dy = -(m12 * self.dx + m22 * self.dy);
        Some(Transform::new(m11, m12, m21, m22, dx, dy))
    }

    /// Transposed linear part; the translation is kept.
    pub fn transposed(&self) -> Transform {
        Transform::new(self.m11, self.m21, self.m12, self.m22, self.dx, self.dy)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_half_open_contains() {
        let r = Rect::new(0, 0, 64, 64);
        assert!(r.contains(Point::new(0, 0)));
        assert!(r.contains(Point::new(63, 63)));
        assert!(!r.contains(Point::new(64, 0)));
        assert!(!r.contains(Point::new(0, 64)));
    }

    #[test]
    fn test_adjacent_rects_do_not_intersect() {
        let a = Rect::new(0, 0, 64, 64);
        let b = Rect::new(64, 0, 64, 64);
        assert!(!a.intersects(&b));
        assert_eq!(a.intersected(&b).area(), 0);

        let af = a.to_rect_f();
        let bf = b.to_rect_f();
        assert!(!af.intersects(&bf));
    }

    #[test]
    fn test_united_ignores_empty() {
        let a = RectF::new(10.0, 10.0, 5.0, 5.0);
        assert_eq!(a.united(&RectF::default()), a);
        assert_eq!(RectF::default().united(&a), a);
        let b = RectF::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(a.united(&b), RectF::new(0.0, 0.0, 15.0, 15.0));
    }

    #[test]
    fn test_transposition_maps_rect() {
        let t = Transform::transposition();
        let r = t.map_rect(RectF::new(0.0, 10.0, 100.0, 20.0));
        assert_eq!(r, RectF::new(10.0, 0.0, 20.0, 100.0));
        assert_eq!(t.inverted(), Some(t));
        assert_eq!(t.transposed(), t);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Transform::new(2.0, 0.0, 0.0, 4.0, 3.0, -1.0);
        let inv = t.inverted().unwrap();
        let p = PointF::new(7.0, 5.0);
        let back = inv.map(t.map(p));
        assert!((back.x - p.x).abs() < 1e-5);
        assert!((back.y - p.y).abs() < 1e-5);
    }

    #[test]
    fn test_singular_transform_has_no_inverse() {
        let t = Transform::new(0.0, 0.0, 0.0, 0.0, 1.0, 1.0);
        assert!(t.inverted().is_none());
    }
}
