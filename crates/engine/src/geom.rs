//! Geometry primitives shared across the viewer core
//!
//! Points, sizes and rectangles in f32, plus the page-to-device transform
//! used by layout, rendering and selection. Page space has its origin at the
//! top-left of the page mediabox with y growing downward; device space is
//! the zoomed, rotated pixel space a page is rendered into.

/// A point in page or device coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A width/height pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Scale both dimensions, rounding to the nearest whole pixel.
    ///
    /// Layout sizes pages with `round(size × zoom)` so that two pages of
    /// equal width stay equal after zooming; truncation would let them
    /// drift apart by a pixel.
    pub fn scaled_round(&self, factor: f32) -> Size {
        Size::new((self.width * factor).round(), (self.height * factor).round())
    }

    /// Swap width and height (used for 90/270 degree rotations)
    pub fn transposed(&self) -> Size {
        Size::new(self.height, self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// An axis-aligned rectangle, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn from_points(a: Point, b: Point) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self::new(x, y, a.x.max(b.x) - x, a.y.max(b.y) - y)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Area in float, so large page rectangles cannot overflow the way
    /// integer pixel math would.
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width as f64 * self.height as f64
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Intersection of two rectangles; empty rect at origin if disjoint
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= x || bottom <= y {
            Rect::default()
        } else {
            Rect::new(x, y, right - x, bottom - y)
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Smallest rectangle containing both; an empty side is ignored
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Normalize a rotation in degrees to one of 0, 90, 180, 270
pub fn normalize_rotation(rotation: i32) -> i32 {
    let r = rotation.rem_euclid(360);
    r - r % 90
}

/// Maps page user space to device space for one page.
///
/// The page is rotated clockwise by `rotation` degrees around the mediabox
/// and scaled by `zoom`; the result's top-left corner lands at the device
/// origin. `inverse` maps device coordinates back into the page.
#[derive(Debug, Clone, Copy)]
pub struct PageTransform {
    mediabox: Rect,
    zoom: f32,
    rotation: i32,
}

impl PageTransform {
    pub fn new(mediabox: Rect, zoom: f32, rotation: i32) -> Self {
        Self { mediabox, zoom, rotation: normalize_rotation(rotation) }
    }

    /// Size of the page in device pixels after rotation and zoom
    pub fn target_size(&self) -> Size {
        let size = self.mediabox.size();
        let size = if self.rotation % 180 == 90 { size.transposed() } else { size };
        size.scaled_round(self.zoom)
    }

    pub fn apply(&self, p: Point) -> Point {
        let u = p.x - self.mediabox.x;
        let v = p.y - self.mediabox.y;
        let w = self.mediabox.width;
        let h = self.mediabox.height;

        let (x, y) = match self.rotation {
            90 => (h - v, u),
            180 => (w - u, h - v),
            270 => (v, w - u),
            _ => (u, v),
        };

        Point::new(x * self.zoom, y * self.zoom)
    }

    pub fn apply_rect(&self, r: Rect) -> Rect {
        let a = self.apply(Point::new(r.x, r.y));
        let b = self.apply(Point::new(r.right(), r.bottom()));
        Rect::from_points(a, b)
    }

    pub fn inverse(&self, p: Point) -> Point {
        let x = p.x / self.zoom;
        let y = p.y / self.zoom;
        let w = self.mediabox.width;
        let h = self.mediabox.height;

        let (u, v) = match self.rotation {
            90 => (y, h - x),
            180 => (w - x, h - y),
            270 => (w - y, x),
            _ => (x, y),
        };

        Point::new(u + self.mediabox.x, v + self.mediabox.y)
    }

    pub fn inverse_rect(&self, r: Rect) -> Rect {
        let a = self.inverse(Point::new(r.x, r.y));
        let b = self.inverse(Point::new(r.right(), r.bottom()));
        Rect::from_points(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersect_and_union() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);

        let isect = a.intersect(&b);
        assert_eq!(isect, Rect::new(5.0, 5.0, 5.0, 5.0));

        let union = a.union(&b);
        assert_eq!(union, Rect::new(0.0, 0.0, 15.0, 15.0));

        let disjoint = Rect::new(100.0, 100.0, 1.0, 1.0);
        assert!(a.intersect(&disjoint).is_empty());
        assert!(!a.intersects(&disjoint));
    }

    #[test]
    fn test_union_ignores_empty_side() {
        let a = Rect::new(3.0, 4.0, 5.0, 6.0);
        assert_eq!(Rect::default().union(&a), a);
        assert_eq!(a.union(&Rect::default()), a);
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(90), 90);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(95), 90);
    }

    #[test]
    fn test_scaled_round_keeps_equal_sizes_equal() {
        let a = Size::new(612.0, 792.0);
        let b = Size::new(612.0, 792.0);
        assert_eq!(a.scaled_round(1.337), b.scaled_round(1.337));
        assert_eq!(a.scaled_round(1.5), Size::new(918.0, 1188.0));
    }

    #[test]
    fn test_transform_identity() {
        let tx = PageTransform::new(Rect::new(0.0, 0.0, 600.0, 800.0), 1.0, 0);
        let p = Point::new(100.0, 200.0);
        assert_eq!(tx.apply(p), p);
        assert_eq!(tx.inverse(p), p);
        assert_eq!(tx.target_size(), Size::new(600.0, 800.0));
    }

    #[test]
    fn test_transform_rotation_90_swaps_axes() {
        let tx = PageTransform::new(Rect::new(0.0, 0.0, 600.0, 800.0), 1.0, 90);
        assert_eq!(tx.target_size(), Size::new(800.0, 600.0));

        // Top-left corner of the page ends up at the top-right in device space.
        let p = tx.apply(Point::new(0.0, 0.0));
        assert_eq!(p, Point::new(800.0, 0.0));

        let back = tx.inverse(p);
        assert!((back.x - 0.0).abs() < 1e-4);
        assert!((back.y - 0.0).abs() < 1e-4);
    }

    #[test]
    fn test_transform_round_trips_under_zoom() {
        for rotation in [0, 90, 180, 270] {
            let tx = PageTransform::new(Rect::new(10.0, 20.0, 600.0, 800.0), 2.5, rotation);
            let p = Point::new(123.0, 456.0);
            let back = tx.inverse(tx.apply(p));
            assert!((back.x - p.x).abs() < 1e-3, "rotation {rotation}");
            assert!((back.y - p.y).abs() < 1e-3, "rotation {rotation}");
        }
    }

    #[test]
    fn test_apply_rect_stays_normalized() {
        let tx = PageTransform::new(Rect::new(0.0, 0.0, 600.0, 800.0), 1.0, 180);
        let r = tx.apply_rect(Rect::new(0.0, 0.0, 100.0, 50.0));
        assert!(r.width > 0.0 && r.height > 0.0);
        assert_eq!(r, Rect::new(500.0, 750.0, 100.0, 50.0));
    }
}
