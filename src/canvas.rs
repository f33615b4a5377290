use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage, imageops};

use crate::io::{self, FileError, Status};

/// Fully transparent pixel, returned for every read outside the buffer.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Default luminance cut-off for the line-art pipeline.
pub const DEFAULT_THRESHOLD: i32 = 200;

/// Default enclosed-area size (in pixels) below which holes are filled.
pub const DEFAULT_SPOT_AREA: i32 = 6;

// ============================================================================
// GEOMETRY
// ============================================================================

/// Integer point in the shared frame coordinate space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned integer rectangle.  `right()` / `bottom()` are exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest rectangle containing both corner pixels (inclusive, any order).
    pub fn from_points(a: Point, b: Point) -> Self {
        let (l, r) = (a.x.min(b.x), a.x.max(b.x));
        let (t, bt) = (a.y.min(b.y), a.y.max(b.y));
        Self::new(l, t, r - l + 1, bt - t + 1)
    }

    #[inline]
    pub fn left(&self) -> i32 { self.x }
    #[inline]
    pub fn top(&self) -> i32 { self.y }
    #[inline]
    pub fn right(&self) -> i32 { self.x + self.width }
    #[inline]
    pub fn bottom(&self) -> i32 { self.y + self.height }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Number of pixels covered (0 for empty rectangles).
    pub fn area(&self) -> i64 {
        if self.is_empty() { 0 } else { self.width as i64 * self.height as i64 }
    }

    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        !self.is_empty()
            && p.x >= self.x
            && p.y >= self.y
            && p.x < self.right()
            && p.y < self.bottom()
    }

    /// True if `other` lies completely inside `self` (empty rects are always contained).
    pub fn contains_rect(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        !self.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Bounding rectangle of both; empty operands are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let l = self.x.min(other.x);
        let t = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        Rect::new(l, t, r - l, b - t)
    }

    /// Overlap of both rectangles, `Rect::default()` when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let l = self.x.max(other.x);
        let t = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        if self.is_empty() || other.is_empty() || r <= l || b <= t {
            return Rect::default();
        }
        Rect::new(l, t, r - l, b - t)
    }

    /// Move each edge independently (positive values move right / down).
    pub fn adjusted(&self, dl: i32, dt: i32, dr: i32, db: i32) -> Rect {
        Rect::new(
            self.x + dl,
            self.y + dt,
            self.width - dl + dr,
            self.height - dt + db,
        )
    }
}

// ============================================================================
// RASTER BUFFER
// ============================================================================

/// What `auto_crop` still has to verify before the bounds are minimal again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CropHint {
    /// Every edge row/column holds at least one pixel with alpha > 0.
    Minimal,
    /// Bounds were minimal, then pixels inside this rectangle lost their alpha.
    /// Only the edges it touches need re-scanning.
    Erased(Rect),
    /// Nothing known; scan all four edges inward.
    Unknown,
}

impl CropHint {
    pub(crate) fn erase(self, rect: Rect) -> CropHint {
        match self {
            CropHint::Minimal => CropHint::Erased(rect),
            CropHint::Erased(prev) => CropHint::Erased(prev.union(&rect)),
            CropHint::Unknown => CropHint::Unknown,
        }
    }
}

/// Pixel grid of one animation frame, placed at `bounds.top_left()` in the
/// shared coordinate space.
///
/// The grid is exactly `bounds.width × bounds.height`.  Pixel access uses
/// shared-space coordinates; reads outside the bounds return [`TRANSPARENT`]
/// and plain scan-line writes outside the bounds are dropped.
///
/// Cloning is a deep copy.  A buffer backed by a file can be unloaded (pixel
/// storage dropped) and reloaded later, see [`crate::project::TimedContent`].
#[derive(Clone, Debug)]
pub struct RasterBuffer {
    /// `None` only while unloaded.
    pub(crate) image: Option<RgbaImage>,
    pub(crate) bounds: Rect,
    pub(crate) hint: CropHint,
    pub(crate) enable_auto_crop: bool,
    opacity: f32,
    threshold: i32,
    spot_area: i32,
    file_path: Option<PathBuf>,
    modified: bool,
}

impl Default for RasterBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBuffer {
    // ---- construction -------------------------------------------------------

    /// Empty buffer (no pixels, minimally bounded).
    pub fn new() -> Self {
        Self {
            image: Some(RgbaImage::new(0, 0)),
            bounds: Rect::default(),
            hint: CropHint::Minimal,
            enable_auto_crop: false,
            opacity: 1.0,
            threshold: DEFAULT_THRESHOLD,
            spot_area: DEFAULT_SPOT_AREA,
            file_path: None,
            modified: false,
        }
    }

    /// Buffer covering `rect`, every pixel set to `color`.
    pub fn filled(rect: Rect, color: Rgba<u8>) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        let image = RgbaImage::from_pixel(rect.width as u32, rect.height as u32, color);
        Self {
            image: Some(image),
            bounds: rect,
            hint: if color[3] > 0 { CropHint::Minimal } else { CropHint::Unknown },
            ..Self::new()
        }
    }

    /// Wrap an existing image placed at `top_left`.
    pub fn from_image(top_left: Point, image: RgbaImage) -> Self {
        let bounds = Rect::new(
            top_left.x,
            top_left.y,
            image.width() as i32,
            image.height() as i32,
        );
        Self {
            image: Some(image),
            bounds,
            hint: CropHint::Unknown,
            ..Self::new()
        }
    }

    /// Buffer backed by an image file; pixels are decoded on `load()`.
    pub fn from_file(top_left: Point, path: impl Into<PathBuf>) -> Self {
        Self {
            image: None,
            bounds: Rect::new(top_left.x, top_left.y, 0, 0),
            hint: CropHint::Unknown,
            file_path: Some(path.into()),
            ..Self::new()
        }
    }

    /// Deep copy of the whole buffer.
    pub fn copy(&self) -> RasterBuffer {
        self.clone()
    }

    /// Deep copy of `rect`; areas of `rect` outside the bounds come back transparent.
    pub fn copy_rect(&self, rect: Rect) -> RasterBuffer {
        if rect.is_empty() || self.bounds.is_empty() {
            return RasterBuffer::new();
        }
        let mut result = RasterBuffer::filled(rect, TRANSPARENT);
        result.threshold = self.threshold;
        result.spot_area = self.spot_area;
        result.opacity = self.opacity;
        if let (Some(src), Some(dst)) = (self.image.as_ref(), result.image.as_mut()) {
            copy_overlap(src, self.bounds, dst, rect);
        }
        result.hint = CropHint::Unknown;
        result
    }

    /// Same bounds and settings, every pixel passed through `f(x, y, pixel)`.
    pub fn map_pixels(&self, mut f: impl FnMut(i32, i32, Rgba<u8>) -> Rgba<u8>) -> RasterBuffer {
        let mut out = self.clone();
        let (bx, by) = (self.bounds.x, self.bounds.y);
        if let Some(image) = out.image.as_mut() {
            for (x, y, px) in image.enumerate_pixels_mut() {
                *px = f(bx + x as i32, by + y as i32, *px);
            }
        }
        out.hint = CropHint::Unknown;
        out.modified = true;
        out
    }

    // ---- accessors ----------------------------------------------------------

    /// Tracked bounds.  Not guaranteed minimal; see [`Self::minimal_bounds`].
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Auto-crop, then return the (now minimal) bounds.
    pub fn minimal_bounds(&mut self) -> Rect {
        self.auto_crop();
        self.bounds
    }

    pub fn top_left(&self) -> Point {
        self.bounds.top_left()
    }

    pub fn width(&self) -> i32 {
        self.bounds.width.max(0)
    }

    pub fn height(&self) -> i32 {
        self.bounds.height.max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn contains(&self, p: Point) -> bool {
        self.bounds.contains(p)
    }

    /// Read-only access to the pixel grid (`None` while unloaded).
    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    /// True if every edge row/column holds a pixel with alpha > 0.
    pub fn is_minimally_bounded(&self) -> bool {
        self.hint == CropHint::Minimal
    }

    pub fn enable_auto_crop(&mut self, enabled: bool) {
        self.enable_auto_crop = enabled;
    }

    pub fn auto_crop_enabled(&self) -> bool {
        self.enable_auto_crop
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: i32) {
        self.threshold = threshold;
    }

    pub fn spot_area(&self) -> i32 {
        self.spot_area
    }

    pub fn set_spot_area(&mut self, spot_area: i32) {
        self.spot_area = spot_area;
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// True if pixels changed since the last load / successful write.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    // ---- pixel access -------------------------------------------------------

    /// Pixel at shared-space `(x, y)`; [`TRANSPARENT`] outside the bounds or while unloaded.
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> Rgba<u8> {
        self.scan_line(x, y)
    }

    #[inline]
    pub fn pixel_at(&self, p: Point) -> Rgba<u8> {
        self.scan_line(p.x, p.y)
    }

    /// Raw read used by the pixel loops.  Same contract as [`Self::pixel`].
    #[inline(always)]
    pub fn scan_line(&self, x: i32, y: i32) -> Rgba<u8> {
        let lx = x - self.bounds.x;
        let ly = y - self.bounds.y;
        if lx < 0 || ly < 0 || lx >= self.bounds.width || ly >= self.bounds.height {
            return TRANSPARENT;
        }
        match self.image.as_ref() {
            Some(image) => *image.get_pixel(lx as u32, ly as u32),
            None => TRANSPARENT,
        }
    }

    /// Write a pixel, growing the bounds first when a visible pixel lands outside them.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        let p = Point::new(x, y);
        if !self.bounds.contains(p) {
            if color[3] == 0 {
                return;
            }
            // The new pixel sits on the grown edges, so what was minimal stays minimal.
            let hint = self.hint;
            self.extend(p);
            self.hint = if self.bounds.area() == 1 { CropHint::Minimal } else { hint };
        }
        self.set_scan_line(x, y, color);
    }

    pub fn set_pixel_at(&mut self, p: Point, color: Rgba<u8>) {
        self.set_pixel(p.x, p.y, color);
    }

    /// Raw write used by the pixel loops: never grows the bounds, ignores
    /// coordinates outside them.  Erasing an edge pixel marks the bounds as
    /// possibly non-minimal; the rescan is deferred to the next `auto_crop`.
    #[inline]
    pub fn set_scan_line(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        let b = self.bounds;
        let lx = x - b.x;
        let ly = y - b.y;
        if lx < 0 || ly < 0 || lx >= b.width || ly >= b.height {
            return;
        }
        if !self.ensure_loaded() {
            return;
        }
        let Some(image) = self.image.as_mut() else { return };
        let px = image.get_pixel_mut(lx as u32, ly as u32);
        let was_visible = px[3] > 0;
        *px = color;
        self.modified = true;

        let on_edge = lx == 0 || ly == 0 || lx == b.width - 1 || ly == b.height - 1;
        if was_visible && color[3] == 0 && on_edge {
            self.hint = self.hint.erase(Rect::new(x, y, 1, 1));
        }
    }

    /// Recolor every pixel that has alpha > 0, keeping its coverage.
    pub fn fill_non_alpha_pixels(&mut self, color: Rgba<u8>) {
        if self.bounds.is_empty() {
            return;
        }
        let fill = RasterBuffer::filled(self.bounds, color);
        self.paste(&fill, crate::ops::composite::CompositionMode::SourceIn);
    }

    // ---- clearing -----------------------------------------------------------

    /// Drop every pixel; bounds become empty (and trivially minimal).
    pub fn clear(&mut self) {
        self.image = Some(RgbaImage::new(0, 0));
        self.bounds = Rect::default();
        self.hint = CropHint::Minimal;
        self.modified = true;
    }

    /// Zero every pixel of `rect` that lies inside the bounds.
    pub fn clear_rect(&mut self, rect: Rect) {
        let clip = rect.intersect(&self.bounds);
        if clip.is_empty() || !self.ensure_loaded() {
            return;
        }
        let b = self.bounds;
        if let Some(image) = self.image.as_mut() {
            for y in clip.top()..clip.bottom() {
                for x in clip.left()..clip.right() {
                    image.put_pixel((x - b.x) as u32, (y - b.y) as u32, TRANSPARENT);
                }
            }
        }
        self.hint = self.hint.erase(clip);
        self.modified = true;
        if self.enable_auto_crop {
            self.auto_crop();
        }
    }

    // ---- bounds management --------------------------------------------------

    /// Shrink the bounds (and grid) to the smallest rectangle holding every
    /// pixel with alpha > 0.  Only edges that may have lost pixels since the
    /// bounds were last minimal are re-scanned.  Idempotent.
    pub fn auto_crop(&mut self) {
        if self.hint == CropHint::Minimal {
            return;
        }
        if self.bounds.is_empty() {
            self.hint = CropHint::Minimal;
            return;
        }
        if !self.ensure_loaded() {
            return;
        }
        let b = self.bounds;
        let (check_top, check_bottom, check_left, check_right) = match self.hint {
            CropHint::Erased(r) => (
                r.top() <= b.top(),
                r.bottom() >= b.bottom(),
                r.left() <= b.left(),
                r.right() >= b.right(),
            ),
            _ => (true, true, true, true),
        };

        let Some(image) = self.image.as_ref() else { return };
        let w = b.width as u32;
        let h = b.height as u32;

        let mut top = 0u32;
        if check_top {
            while top < h && row_is_clear(image, top, 0, w) {
                top += 1;
            }
        }
        if top == h {
            self.clear();
            return;
        }
        let mut bottom = h;
        if check_bottom {
            while bottom > top && row_is_clear(image, bottom - 1, 0, w) {
                bottom -= 1;
            }
        }
        let mut left = 0u32;
        if check_left {
            while left < w && column_is_clear(image, left, top, bottom) {
                left += 1;
            }
        }
        let mut right = w;
        if check_right {
            while right > left && column_is_clear(image, right - 1, top, bottom) {
                right -= 1;
            }
        }

        if (left, top, right, bottom) != (0, 0, w, h) {
            let cropped = imageops::crop_imm(image, left, top, right - left, bottom - top).to_image();
            self.image = Some(cropped);
            self.bounds = Rect::new(
                b.x + left as i32,
                b.y + top as i32,
                (right - left) as i32,
                (bottom - top) as i32,
            );
        }
        self.hint = CropHint::Minimal;
    }

    /// Translate the buffer; pixel data is untouched.
    pub fn move_top_left(&mut self, p: Point) {
        self.bounds.x = p.x;
        self.bounds.y = p.y;
    }

    /// Grow the bounds to include `p` (new area is transparent).
    pub fn extend(&mut self, p: Point) {
        self.extend_rect(Rect::new(p.x, p.y, 1, 1));
    }

    /// Grow the bounds to include `rect` (new area is transparent).
    pub fn extend_rect(&mut self, rect: Rect) {
        if rect.is_empty() || self.bounds.contains_rect(&rect) {
            return;
        }
        let grown = self.bounds.union(&rect);
        self.regrid(grown);
    }

    /// Force the bounds to `rect`: pixels outside are discarded, new area is
    /// transparent.  The result is not assumed minimal.
    pub fn set_bounds(&mut self, rect: Rect) {
        if rect == self.bounds {
            return;
        }
        self.regrid(rect);
    }

    /// Re-allocate the grid for `new_bounds`, keeping the overlapping pixels.
    pub(crate) fn regrid(&mut self, new_bounds: Rect) {
        if !self.ensure_loaded() {
            return;
        }
        let (w, h) = if new_bounds.is_empty() {
            (0, 0)
        } else {
            (new_bounds.width as u32, new_bounds.height as u32)
        };
        let mut grid = RgbaImage::new(w, h);
        if let Some(old) = self.image.as_ref() {
            copy_overlap(old, self.bounds, &mut grid, new_bounds);
        }
        self.image = Some(grid);
        self.bounds = if new_bounds.is_empty() { Rect::default() } else { new_bounds };
        self.hint = CropHint::Unknown;
        self.modified = true;
    }

    // ---- file backing -------------------------------------------------------

    /// Decode the backing file if the grid is not resident.
    pub fn load_file(&mut self) -> Status {
        if self.image.is_some() {
            return Ok(());
        }
        let path = self.file_path.clone().ok_or(FileError::NoBackingFile)?;
        let image = io::decode_rgba(&path)?;
        self.bounds.width = image.width() as i32;
        self.bounds.height = image.height() as i32;
        self.image = Some(image);
        self.hint = CropHint::Unknown;
        self.modified = false;
        Ok(())
    }

    /// Drop the grid if it can be restored from the backing file.
    pub fn unload_file(&mut self) {
        if self.file_path.is_some() && !self.modified {
            self.image = None;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    /// Resident pixel bytes.
    pub fn memory_usage(&self) -> u64 {
        self.image.as_ref().map_or(0, |img| img.as_raw().len() as u64)
    }

    pub(crate) fn ensure_loaded(&mut self) -> bool {
        if self.image.is_some() {
            return true;
        }
        match self.load_file() {
            Ok(()) => true,
            Err(e) => {
                log_err!("Could not load frame image: {}", e);
                false
            }
        }
    }

    pub(crate) fn touch(&mut self) {
        self.modified = true;
    }

    /// Record that the grid now matches the file at `path`.
    pub(crate) fn mark_saved(&mut self, path: &Path) {
        self.file_path = Some(path.to_path_buf());
        self.modified = false;
    }
}

// ============================================================================
// GRID HELPERS
// ============================================================================

/// Copy the part of `src` (placed at `src_rect`) that overlaps `dst_rect` into `dst`.
pub(crate) fn copy_overlap(src: &RgbaImage, src_rect: Rect, dst: &mut RgbaImage, dst_rect: Rect) {
    let overlap = src_rect.intersect(&dst_rect);
    if overlap.is_empty() {
        return;
    }
    let src_stride = src_rect.width as usize * 4;
    let dst_stride = dst_rect.width as usize * 4;
    let run = overlap.width as usize * 4;
    let src_raw = src.as_raw();
    let dst_raw: &mut [u8] = &mut *dst;
    for y in overlap.top()..overlap.bottom() {
        let s = (y - src_rect.y) as usize * src_stride + (overlap.x - src_rect.x) as usize * 4;
        let d = (y - dst_rect.y) as usize * dst_stride + (overlap.x - dst_rect.x) as usize * 4;
        dst_raw[d..d + run].copy_from_slice(&src_raw[s..s + run]);
    }
}

#[inline]
fn row_is_clear(image: &RgbaImage, y: u32, x0: u32, x1: u32) -> bool {
    let stride = image.width() as usize * 4;
    let start = y as usize * stride + x0 as usize * 4;
    let end = y as usize * stride + x1 as usize * 4;
    image.as_raw()[start..end].chunks_exact(4).all(|px| px[3] == 0)
}

#[inline]
fn column_is_clear(image: &RgbaImage, x: u32, y0: u32, y1: u32) -> bool {
    (y0..y1).all(|y| image.get_pixel(x, y)[3] == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INK: Rgba<u8> = Rgba([10, 20, 30, 255]);

    fn edges_have_ink(buf: &RasterBuffer) -> bool {
        let b = buf.bounds();
        let row = |y: i32| (b.left()..b.right()).any(|x| buf.pixel(x, y)[3] > 0);
        let col = |x: i32| (b.top()..b.bottom()).any(|y| buf.pixel(x, y)[3] > 0);
        row(b.top()) && row(b.bottom() - 1) && col(b.left()) && col(b.right() - 1)
    }

    #[test]
    fn rect_union_ignores_empty() {
        let r = Rect::new(2, 3, 4, 5);
        assert_eq!(Rect::default().union(&r), r);
        assert_eq!(r.union(&Rect::new(9, 9, 0, 0)), r);
        assert_eq!(r.union(&Rect::new(0, 0, 1, 1)), Rect::new(0, 0, 6, 8));
    }

    #[test]
    fn rect_intersect_and_contains() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Rect::new(5, 5, 5, 5));
        assert!(a.intersect(&Rect::new(20, 20, 2, 2)).is_empty());
        assert!(a.contains(Point::new(9, 9)));
        assert!(!a.contains(Point::new(10, 9)));
        assert_eq!(Rect::from_points(Point::new(4, 1), Point::new(2, 3)), Rect::new(2, 1, 3, 3));
    }

    #[test]
    fn pixel_outside_bounds_is_transparent() {
        let buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), INK);
        assert_eq!(buf.pixel(3, 3), INK);
        assert_eq!(buf.pixel(4, 0), TRANSPARENT);
        assert_eq!(buf.pixel(-1, 0), TRANSPARENT);
    }

    #[test]
    fn set_pixel_extends_and_stays_minimal() {
        let mut buf = RasterBuffer::new();
        buf.set_pixel(5, 5, INK);
        assert_eq!(buf.bounds(), Rect::new(5, 5, 1, 1));
        assert!(buf.is_minimally_bounded());

        buf.set_pixel(8, 2, INK);
        assert_eq!(buf.bounds(), Rect::new(5, 2, 4, 4));
        assert!(buf.is_minimally_bounded());
        assert_eq!(buf.pixel(8, 2), INK);
        assert_eq!(buf.pixel(6, 3), TRANSPARENT);
    }

    #[test]
    fn transparent_write_outside_is_ignored() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 2, 2), INK);
        buf.set_pixel(10, 10, TRANSPARENT);
        assert_eq!(buf.bounds(), Rect::new(0, 0, 2, 2));
    }

    #[test]
    fn clearing_interior_pixel_keeps_minimal_bounds() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 5, 5), INK);
        buf.set_pixel(2, 2, TRANSPARENT);
        assert!(buf.is_minimally_bounded());
    }

    #[test]
    fn clearing_edge_column_invalidates_then_crops() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 5, 5), INK);
        for y in 0..5 {
            buf.set_pixel(4, y, TRANSPARENT);
        }
        assert!(!buf.is_minimally_bounded());
        buf.auto_crop();
        assert!(buf.is_minimally_bounded());
        assert_eq!(buf.bounds(), Rect::new(0, 0, 4, 5));
    }

    #[test]
    fn auto_crop_finds_minimal_rect_and_is_idempotent() {
        let mut buf = RasterBuffer::filled(Rect::new(-3, -3, 20, 20), TRANSPARENT);
        buf.set_pixel(2, 4, INK);
        buf.set_pixel(6, 9, INK);
        buf.auto_crop();
        assert_eq!(buf.bounds(), Rect::new(2, 4, 5, 6));
        assert!(buf.is_minimally_bounded());
        assert!(edges_have_ink(&buf));

        let once = buf.clone();
        buf.auto_crop();
        assert_eq!(buf.bounds(), once.bounds());
        assert_eq!(buf.image().map(|i| i.as_raw().clone()), once.image().map(|i| i.as_raw().clone()));
    }

    #[test]
    fn auto_crop_of_blank_buffer_is_empty() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 8, 8), TRANSPARENT);
        buf.auto_crop();
        assert!(buf.is_empty());
        assert!(buf.is_minimally_bounded());
    }

    #[test]
    fn clear_rect_with_auto_crop_enabled_shrinks() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 6, 6), INK);
        buf.enable_auto_crop(true);
        buf.clear_rect(Rect::new(0, 0, 6, 2));
        assert_eq!(buf.bounds(), Rect::new(0, 2, 6, 4));
        assert!(buf.is_minimally_bounded());
    }

    #[test]
    fn clear_rect_without_auto_crop_defers() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 6, 6), INK);
        buf.clear_rect(Rect::new(0, 0, 2, 6));
        assert_eq!(buf.bounds(), Rect::new(0, 0, 6, 6));
        assert!(!buf.is_minimally_bounded());
        assert_eq!(buf.minimal_bounds(), Rect::new(2, 0, 4, 6));
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 3, 3), INK);
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.is_minimally_bounded());
        assert_eq!(buf.pixel(1, 1), TRANSPARENT);
    }

    #[test]
    fn set_bounds_crops_and_zero_fills() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), INK);
        buf.set_bounds(Rect::new(2, 2, 4, 4));
        assert_eq!(buf.bounds(), Rect::new(2, 2, 4, 4));
        assert_eq!(buf.pixel(3, 3), INK);
        assert_eq!(buf.pixel(5, 5), TRANSPARENT);
        assert_eq!(buf.pixel(1, 1), TRANSPARENT);
        assert!(!buf.is_minimally_bounded());
    }

    #[test]
    fn move_top_left_keeps_pixels() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 2, 2), INK);
        buf.move_top_left(Point::new(10, 20));
        assert_eq!(buf.bounds(), Rect::new(10, 20, 2, 2));
        assert_eq!(buf.pixel(11, 21), INK);
        assert_eq!(buf.pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn copy_rect_is_deep_and_padded() {
        let src = RasterBuffer::filled(Rect::new(0, 0, 4, 4), INK);
        let mut part = src.copy_rect(Rect::new(2, 2, 4, 4));
        assert_eq!(part.bounds(), Rect::new(2, 2, 4, 4));
        assert_eq!(part.pixel(3, 3), INK);
        assert_eq!(part.pixel(5, 5), TRANSPARENT);
        part.set_pixel(2, 2, TRANSPARENT);
        assert_eq!(src.pixel(2, 2), INK);
    }

    #[test]
    fn fill_non_alpha_pixels_recolors_only_visible() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 3, 1), TRANSPARENT);
        buf.set_pixel(1, 0, INK);
        buf.fill_non_alpha_pixels(Rgba([255, 0, 0, 255]));
        assert_eq!(buf.pixel(1, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(buf.pixel(0, 0)[3], 0);
    }

    #[test]
    fn opacity_is_clamped() {
        let mut buf = RasterBuffer::new();
        buf.set_opacity(1.5);
        assert_eq!(buf.opacity(), 1.0);
        buf.set_opacity(-0.2);
        assert_eq!(buf.opacity(), 0.0);
    }
}
