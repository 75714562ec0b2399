//! Coordinate mapping between document space and device pixels.
//!
//! Document space is measured in PDF points with the origin at the top-left of
//! the unrotated page and y growing downwards. Device space is pixels of a
//! rendered page image.

use crate::error::{EngineError, EngineResult};

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

/// Axis-aligned rectangle in document space, `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0: x0.min(x1), y0: y0.min(y1), x1: x0.max(x1), y1: y0.max(y1) }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x0 && point.x <= self.x1 && point.y >= self.y0 && point.y <= self.y1
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1 && self.y0 <= other.y1 && other.y0 <= self.y1
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Grows the rectangle horizontally by `margin` on both sides.
    pub fn pad_x(&self, margin: f32) -> Rect {
        Rect { x0: self.x0 - margin, x1: self.x1 + margin, ..*self }
    }

    pub(crate) fn bounding(points: &[Point]) -> Rect {
        let mut rect = Rect {
            x0: f32::INFINITY,
            y0: f32::INFINITY,
            x1: f32::NEG_INFINITY,
            y1: f32::NEG_INFINITY,
        };
        for p in points {
            rect.x0 = rect.x0.min(p.x);
            rect.y0 = rect.y0.min(p.y);
            rect.x1 = rect.x1.max(p.x);
            rect.y1 = rect.y1.max(p.y);
        }
        rect
    }
}

/// Unrotated page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Size of a rendered page as laid out on screen, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedSize {
    pub width_px: f32,
    pub height_px: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Zoom(f32);

impl Zoom {
    pub const ACTUAL_SIZE: Zoom = Zoom(1.0);

    pub fn new(value: f32) -> EngineResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(EngineError::InvalidGeometry(format!("zoom must be positive, got {value}")));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn scaled_by(self, factor: f32) -> EngineResult<Self> {
        Self::new(self.0 * factor)
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Self::ACTUAL_SIZE
    }
}

pub fn to_device_space(point: Point, zoom: Zoom) -> Point {
    Point::new(point.x * zoom.value(), point.y * zoom.value())
}

/// Maps a device point back into document space.
///
/// Each axis is scaled on its own: the widget a page is shown in may be a few
/// pixels off the nominal zoomed size after layout rounding or a resize.
pub fn to_document_space(
    device: Point,
    rendered: RenderedSize,
    page: PageSize,
) -> EngineResult<Point> {
    let dims = [rendered.width_px, rendered.height_px, page.width_pt, page.height_pt];
    if dims.iter().any(|d| !d.is_finite() || *d <= 0.0) {
        return Err(EngineError::InvalidGeometry(format!(
            "degenerate mapping from {}x{} px to {}x{} pt",
            rendered.width_px, rendered.height_px, page.width_pt, page.height_pt
        )));
    }

    Ok(Point::new(
        device.x * (page.width_pt / rendered.width_px),
        device.y * (page.height_pt / rendered.height_px),
    ))
}

/// Device size of a page at `zoom`, at least one pixel per side.
pub fn device_size(page: PageSize, zoom: Zoom) -> (u32, u32) {
    let corner = to_device_space(Point::new(page.width_pt, page.height_pt), zoom);
    (corner.x.round().max(1.0) as u32, corner.y.round().max(1.0) as u32)
}

/// PDF affine matrix `[a b c d e f]`, applied to row vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self { e: tx, f: ty, ..Self::IDENTITY }
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.a + y * self.c + self.e, x * self.b + y * self.d + self.f)
    }

    /// Length of the transformed unit y vector.
    pub fn vertical_scale(&self) -> f32 {
        self.c.hypot(self.d)
    }
}
