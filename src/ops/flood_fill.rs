use std::collections::HashMap;
use std::fmt;

use image::Rgba;

use crate::canvas::{Point, RasterBuffer, Rect, TRANSPARENT};
use crate::ops::composite::CompositionMode;

// ============================================================================
// ERRORS
// ============================================================================

/// Why a flood fill did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillError {
    SeedOutsideRegion,
    SeedOutsideSource,
    AlreadyFilled,
}

impl fmt::Display for FillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillError::SeedOutsideRegion => write!(f, "Seed point lies outside the fill region"),
            FillError::SeedOutsideSource => write!(f, "Seed point lies outside the source image"),
            FillError::AlreadyFilled => write!(f, "Seed pixel already has the fill color"),
        }
    }
}

impl std::error::Error for FillError {}

// ============================================================================
// COLOR MATCHING
// ============================================================================

/// True if `candidate` is within `tolerance_sq` (squared RGBA distance) of `seed`.
/// Decisions are memoized in `cache` when one is supplied.
pub fn compare_color(
    candidate: Rgba<u8>,
    seed: Rgba<u8>,
    tolerance_sq: i32,
    cache: Option<&mut HashMap<[u8; 4], bool>>,
) -> bool {
    if candidate == seed {
        return true;
    }
    if let Some(cache) = cache {
        if let Some(&hit) = cache.get(&candidate.0) {
            return hit;
        }
        let result = color_distance_sq(candidate, seed) <= tolerance_sq;
        cache.insert(candidate.0, result);
        return result;
    }
    color_distance_sq(candidate, seed) <= tolerance_sq
}

#[inline]
fn color_distance_sq(a: Rgba<u8>, b: Rgba<u8>) -> i32 {
    (0..4)
        .map(|c| {
            let d = a[c] as i32 - b[c] as i32;
            d * d
        })
        .sum()
}

/// State for one flood-fill call.  Owns its color memo so concurrent fills
/// on different frames never share anything.
#[derive(Debug)]
pub struct FillContext {
    pub seed: Point,
    pub region: Rect,
    pub fill_color: Rgba<u8>,
    pub tolerance: i32,
    seed_color: Rgba<u8>,
    cache: HashMap<[u8; 4], bool>,
}

impl FillContext {
    pub fn new(seed: Point, region: Rect, seed_color: Rgba<u8>, fill_color: Rgba<u8>, tolerance: i32) -> Self {
        Self {
            seed,
            region,
            fill_color,
            tolerance,
            seed_color,
            cache: HashMap::new(),
        }
    }

    #[inline]
    pub fn matches(&mut self, candidate: Rgba<u8>) -> bool {
        let tol_sq = self.tolerance.saturating_mul(self.tolerance);
        compare_color(candidate, self.seed_color, tol_sq, Some(&mut self.cache))
    }

    /// Distinct colors decided so far.
    pub fn cached_colors(&self) -> usize {
        self.cache.len()
    }
}

// ============================================================================
// FLOOD FILL
// ============================================================================

/// Fill the 4-connected area around `seed` whose `source` colors are within
/// `tolerance` of the seed color, restricted to `region`.  The fill is
/// composited onto `target`; the filled rectangle is returned.
pub fn flood_fill(
    source: &RasterBuffer,
    target: &mut RasterBuffer,
    region: Rect,
    seed: Point,
    fill_color: Rgba<u8>,
    tolerance: i32,
) -> Result<Rect, FillError> {
    if !region.contains(seed) {
        return Err(FillError::SeedOutsideRegion);
    }
    if !source.contains(seed) {
        return Err(FillError::SeedOutsideSource);
    }
    let seed_color = source.pixel_at(seed);
    if seed_color == fill_color {
        return Err(FillError::AlreadyFilled);
    }

    let area = region.intersect(&source.bounds());
    let mut ctx = FillContext::new(seed, area, seed_color, fill_color, tolerance);
    let (mask, filled) = fill_mask(source, &mut ctx);

    let mut replace = RasterBuffer::filled(filled, TRANSPARENT);
    for y in filled.top()..filled.bottom() {
        for x in filled.left()..filled.right() {
            let idx = (y - area.y) as usize * area.width as usize + (x - area.x) as usize;
            if mask[idx] {
                replace.set_scan_line(x, y, fill_color);
            }
        }
    }
    target.paste(&replace, CompositionMode::SourceOver);
    Ok(filled)
}

/// DFS over `ctx.region`; returns the visited mask (region-sized) and its bounding box.
fn fill_mask(source: &RasterBuffer, ctx: &mut FillContext) -> (Vec<bool>, Rect) {
    let area = ctx.region;
    let w = area.width as usize;
    let h = area.height as usize;
    let mut mask = vec![false; w * h];

    let sx = (ctx.seed.x - area.x) as usize;
    let sy = (ctx.seed.y - area.y) as usize;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);

    // Packed flat indices keep the stack small.
    let mut stack: Vec<u32> = Vec::with_capacity(1024);
    let seed_idx = sy * w + sx;
    mask[seed_idx] = true;
    stack.push(seed_idx as u32);

    while let Some(idx) = stack.pop() {
        let idx = idx as usize;
        let (x, y) = (idx % w, idx / w);
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        let mut visit = |nx: usize, ny: usize, stack: &mut Vec<u32>| {
            let n = ny * w + nx;
            if mask[n] {
                return;
            }
            let color = source.scan_line(area.x + nx as i32, area.y + ny as i32);
            if ctx.matches(color) {
                mask[n] = true;
                stack.push(n as u32);
            }
        };
        if x > 0 {
            visit(x - 1, y, &mut stack);
        }
        if x + 1 < w {
            visit(x + 1, y, &mut stack);
        }
        if y > 0 {
            visit(x, y - 1, &mut stack);
        }
        if y + 1 < h {
            visit(x, y + 1, &mut stack);
        }
    }

    let filled = Rect::new(
        area.x + min_x as i32,
        area.y + min_y as i32,
        (max_x - min_x + 1) as i32,
        (max_y - min_y + 1) as i32,
    );
    (mask, filled)
}

// ============================================================================
// DISTANCE MAP / EXPANSION
// ============================================================================

/// Per-pixel Manhattan distance to the nearest pixel of one color.
/// Pixels with no match anywhere hold `width + height`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistanceMap {
    origin: Point,
    width: i32,
    height: i32,
    data: Vec<u32>,
}

impl DistanceMap {
    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.origin.x, self.origin.y, self.width, self.height)
    }

    /// Distance at shared-space `(x, y)`; `None` outside the map.
    pub fn get(&self, x: i32, y: i32) -> Option<u32> {
        let lx = x - self.origin.x;
        let ly = y - self.origin.y;
        if lx < 0 || ly < 0 || lx >= self.width || ly >= self.height {
            return None;
        }
        Some(self.data[ly as usize * self.width as usize + lx as usize])
    }

    /// Value used for "no match in the whole buffer".
    pub fn unreachable(&self) -> u32 {
        (self.width + self.height) as u32
    }
}

/// Two-pass (forward then backward) city-block distance transform.
pub fn manhattan_distance(buffer: &RasterBuffer, search_color: Rgba<u8>) -> DistanceMap {
    let b = buffer.bounds();
    let (w, h) = (b.width.max(0) as usize, b.height.max(0) as usize);
    let far = (w + h) as u32;
    let mut data = vec![far; w * h];

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if buffer.scan_line(b.x + x as i32, b.y + y as i32) == search_color {
                data[i] = 0;
                continue;
            }
            if y > 0 {
                data[i] = data[i].min(data[i - w] + 1);
            }
            if x > 0 {
                data[i] = data[i].min(data[i - 1] + 1);
            }
        }
    }
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let i = y * w + x;
            if y + 1 < h {
                data[i] = data[i].min(data[i + w] + 1);
            }
            if x + 1 < w {
                data[i] = data[i].min(data[i + 1] + 1);
            }
        }
    }

    DistanceMap {
        origin: b.top_left(),
        width: w as i32,
        height: h as i32,
        data,
    }
}

/// Dilate every region of `fill_color` by `expand` pixels (city-block metric).
/// The buffer grows so dilation at the edges is not clipped.
pub fn expand_fill(buffer: &mut RasterBuffer, fill_color: Rgba<u8>, expand: i32) {
    if expand <= 0 || buffer.is_empty() {
        return;
    }
    let grown = buffer.bounds().adjusted(-expand, -expand, expand, expand);
    buffer.extend_rect(grown);

    let dist = manhattan_distance(buffer, fill_color);
    if dist.data.iter().all(|&d| d == dist.unreachable()) {
        return;
    }
    let b = buffer.bounds();
    for y in b.top()..b.bottom() {
        for x in b.left()..b.right() {
            if let Some(d) = dist.get(x, y)
                && d > 0
                && d <= expand as u32
            {
                buffer.set_scan_line(x, y, fill_color);
            }
        }
    }
    if buffer.auto_crop_enabled() {
        buffer.auto_crop();
    }
}
