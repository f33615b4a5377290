// ============================================================================
// TRANSFORM OPERATIONS — rect scaling and affine mapping of frame buffers
// ============================================================================

use image::{Rgba, RgbaImage, imageops};

use crate::canvas::{RasterBuffer, Rect, TRANSPARENT};

/// Resampling used by scaling / affine transforms.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

impl Interpolation {
    pub fn from_smooth(smooth: bool) -> Self {
        if smooth { Interpolation::Bilinear } else { Interpolation::Nearest }
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
        }
    }
}

// ---------------------------------------------------------------------------
//  Affine matrix
// ---------------------------------------------------------------------------

/// 2-D affine map in shared-space coordinates:
/// `x' = a·x + b·y + tx`, `y' = c·x + d·y + ty`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: 0.0, ty: 0.0 };

    pub fn translation(tx: f32, ty: f32) -> Self {
        Affine { tx, ty, ..Self::IDENTITY }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Affine { a: sx, d: sy, ..Self::IDENTITY }
    }

    /// Rotation about the origin; positive angles turn clockwise on screen (y down).
    pub fn rotation(degrees: f32) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Affine { a: c, b: -s, c: s, d: c, tx: 0.0, ty: 0.0 }
    }

    pub fn rotation_about(cx: f32, cy: f32, degrees: f32) -> Self {
        Affine::translation(-cx, -cy)
            .then(&Affine::rotation(degrees))
            .then(&Affine::translation(cx, cy))
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.b * self.c,
            b: next.a * self.b + next.b * self.d,
            c: next.c * self.a + next.d * self.c,
            d: next.c * self.b + next.d * self.d,
            tx: next.a * self.tx + next.b * self.ty + next.tx,
            ty: next.c * self.tx + next.d * self.ty + next.ty,
        }
    }

    #[inline]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.b * y + self.tx, self.c * x + self.d * y + self.ty)
    }

    /// `None` for singular maps.
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        let a = self.d * inv;
        let b = -self.b * inv;
        let c = -self.c * inv;
        let d = self.a * inv;
        Some(Affine {
            a,
            b,
            c,
            d,
            tx: -(a * self.tx + b * self.ty),
            ty: -(c * self.tx + d * self.ty),
        })
    }

    /// Integer bounding box of the mapped rectangle.
    pub fn map_rect(&self, rect: Rect) -> Rect {
        if rect.is_empty() {
            return Rect::default();
        }
        let (l, t) = (rect.left() as f32, rect.top() as f32);
        let (r, b) = (rect.right() as f32, rect.bottom() as f32);
        let corners = [self.apply(l, t), self.apply(r, t), self.apply(l, b), self.apply(r, b)];
        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        // Absorb float noise so exact quarter turns do not grow by a pixel.
        const EPS: f32 = 1e-3;
        let x0 = (min_x + EPS).floor() as i32;
        let y0 = (min_y + EPS).floor() as i32;
        let x1 = (max_x - EPS).ceil() as i32;
        let y1 = (max_y - EPS).ceil() as i32;
        Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }
}

// ---------------------------------------------------------------------------
//  Buffer transforms
// ---------------------------------------------------------------------------

impl RasterBuffer {
    /// Rescale the whole grid to fill `rect` (position and size).
    pub fn transform(&mut self, rect: Rect, smooth: bool) {
        if rect.is_empty() {
            self.clear();
            return;
        }
        if !self.ensure_loaded() {
            return;
        }
        let filter = Interpolation::from_smooth(smooth).to_filter();
        let scaled = match self.image.as_ref() {
            Some(img) if img.width() > 0 && img.height() > 0 => {
                imageops::resize(img, rect.width as u32, rect.height as u32, filter)
            }
            _ => RgbaImage::new(rect.width as u32, rect.height as u32),
        };
        self.image = Some(scaled);
        self.bounds = rect;
        self.hint = crate::canvas::CropHint::Unknown;
        self.touch();
        if self.enable_auto_crop {
            self.auto_crop();
        }
    }

    /// Rescaled copy filling `rect`; `self` is untouched.
    pub fn transformed(&self, rect: Rect, smooth: bool) -> RasterBuffer {
        let mut out = self.clone();
        out.transform(rect, smooth);
        out
    }

    /// Copy of `selection` mapped through `affine`.  The result covers the
    /// bounding box of the mapped selection; each destination pixel samples
    /// the source at its inverse-mapped centre.
    pub fn transformed_by(&self, selection: Rect, affine: &Affine, smooth: bool) -> RasterBuffer {
        let Some(inverse) = affine.inverse() else {
            log_warn!("Affine transform skipped: matrix is not invertible");
            return RasterBuffer::new();
        };
        let dest = affine.map_rect(selection);
        if selection.is_empty() || dest.is_empty() {
            return RasterBuffer::new();
        }
        let part = self.copy_rect(selection);
        let Some(src) = part.image() else {
            return RasterBuffer::new();
        };

        let mut out = RgbaImage::new(dest.width as u32, dest.height as u32);
        let row_bytes = dest.width as usize * 4;
        let raw: &mut [u8] = &mut out;
        let interp = Interpolation::from_smooth(smooth);
        let (src_w, src_h) = (src.width() as i32, src.height() as i32);

        for (dy, row) in raw.chunks_mut(row_bytes).enumerate() {
            let cy = (dest.y + dy as i32) as f32 + 0.5;
            for dx in 0..dest.width as usize {
                let cx = (dest.x + dx as i32) as f32 + 0.5;
                let (sx, sy) = inverse.apply(cx, cy);
                let lx = sx - selection.x as f32;
                let ly = sy - selection.y as f32;
                let px = match interp {
                    Interpolation::Nearest => {
                        let (ix, iy) = (lx.floor() as i32, ly.floor() as i32);
                        if ix < 0 || iy < 0 || ix >= src_w || iy >= src_h {
                            continue;
                        }
                        *src.get_pixel(ix as u32, iy as u32)
                    }
                    Interpolation::Bilinear => bilinear_sample(src, lx - 0.5, ly - 0.5),
                };
                row[dx * 4..dx * 4 + 4].copy_from_slice(&px.0);
            }
        }

        let mut result = RasterBuffer::from_image(dest.top_left(), out);
        result.set_threshold(self.threshold());
        result.set_spot_area(self.spot_area());
        result.set_opacity(self.opacity());
        result
    }
}

/// Bilinear sample at `(x, y)` in pixel-center coordinates.  Taps are
/// weighted by their alpha, so color never bleeds in from transparent
/// neighbours; taps outside `img` count as transparent.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let (left, top) = (x.floor(), y.floor());
    let (fx, fy) = (x - left, y - top);
    let (left, top) = (left as i32, top as i32);
    let taps = [
        (left, top, (1.0 - fx) * (1.0 - fy)),
        (left + 1, top, fx * (1.0 - fy)),
        (left, top + 1, (1.0 - fx) * fy),
        (left + 1, top + 1, fx * fy),
    ];

    let mut rgb = [0.0f32; 3];
    let mut coverage = 0.0f32;
    for (sx, sy, weight) in taps {
        if weight <= 0.0 || sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            continue;
        }
        let p = img.get_pixel(sx as u32, sy as u32);
        let a = weight * p[3] as f32 / 255.0;
        for c in 0..3 {
            rgb[c] += p[c] as f32 * a;
        }
        coverage += a;
    }

    let alpha = (coverage * 255.0).round();
    if alpha < 1.0 {
        return TRANSPARENT;
    }
    let channel = |v: f32| (v / coverage).round().clamp(0.0, 255.0) as u8;
    Rgba([channel(rgb[0]), channel(rgb[1]), channel(rgb[2]), alpha.min(255.0) as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Point;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    #[test]
    fn transform_scales_into_rect() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 2, 2), RED);
        buf.transform(Rect::new(10, 10, 6, 4), false);
        assert_eq!(buf.bounds(), Rect::new(10, 10, 6, 4));
        assert_eq!(buf.pixel(15, 13), RED);
        assert_eq!(buf.pixel(9, 9), TRANSPARENT);
    }

    #[test]
    fn transformed_leaves_source_alone() {
        let buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), RED);
        let small = buf.transformed(Rect::new(0, 0, 2, 2), true);
        assert_eq!(small.bounds(), Rect::new(0, 0, 2, 2));
        assert_eq!(buf.bounds(), Rect::new(0, 0, 4, 4));
    }

    #[test]
    fn transform_to_empty_rect_clears() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), RED);
        buf.transform(Rect::default(), false);
        assert!(buf.is_empty());
    }

    #[test]
    fn inverse_round_trips() {
        let m = Affine::rotation_about(3.0, 4.0, 30.0).then(&Affine::scale(2.0, 0.5));
        let inv = m.inverse().expect("invertible");
        let (x, y) = m.apply(7.0, -2.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 7.0).abs() < 1e-3 && (by + 2.0).abs() < 1e-3);
        assert!(Affine::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn translation_moves_selection() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), GREEN);
        buf.set_pixel(0, 0, RED);
        let moved = buf.transformed_by(Rect::new(0, 0, 4, 4), &Affine::translation(5.0, 3.0), false);
        assert_eq!(moved.bounds(), Rect::new(5, 3, 4, 4));
        assert_eq!(moved.pixel(5, 3), RED);
        assert_eq!(moved.pixel(8, 6), GREEN);
    }

    #[test]
    fn quarter_turn_keeps_size_and_moves_corner() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), GREEN);
        buf.set_pixel(0, 0, RED);
        let turned = buf.transformed_by(Rect::new(0, 0, 4, 4), &Affine::rotation_about(2.0, 2.0, 90.0), false);
        assert_eq!(turned.bounds(), Rect::new(0, 0, 4, 4));
        assert_eq!(turned.pixel_at(Point::new(3, 0)), RED);
        assert_eq!(turned.pixel(0, 0), GREEN);
    }

    #[test]
    fn smooth_sampling_does_not_darken_toward_transparency() {
        let mut img = RgbaImage::from_pixel(2, 1, TRANSPARENT);
        img.put_pixel(0, 0, RED);
        assert_eq!(bilinear_sample(&img, 0.5, 0.0), Rgba([255, 0, 0, 128]));
        assert_eq!(bilinear_sample(&img, 0.0, 0.0), RED);
        assert_eq!(bilinear_sample(&img, 1.0, 0.0), TRANSPARENT);
        // Half a pixel outside the left edge.
        assert_eq!(bilinear_sample(&img, -0.5, 0.0), Rgba([255, 0, 0, 128]));
    }

    #[test]
    fn smooth_shift_keeps_edge_color() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), TRANSPARENT);
        for y in 0..4 {
            buf.set_pixel(0, y, RED);
            buf.set_pixel(1, y, RED);
        }
        let moved = buf.transformed_by(Rect::new(0, 0, 4, 4), &Affine::translation(0.5, 0.0), true);
        for x in moved.bounds().left()..moved.bounds().right() {
            let p = moved.pixel(x, 1);
            if p[3] > 0 {
                assert_eq!(&p.0[..3], &[255, 0, 0], "x {x}: {p:?}");
            }
        }
        assert!((moved.bounds().left()..moved.bounds().right()).any(|x| {
            let a = moved.pixel(x, 1)[3];
            a > 0 && a < 255
        }));
    }

    #[test]
    fn singular_affine_gives_empty_buffer() {
        let buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), GREEN);
        let out = buf.transformed_by(Rect::new(0, 0, 4, 4), &Affine::scale(0.0, 0.0), true);
        assert!(out.is_empty());
    }
}
