//! Scanned-drawing cleanup: turns a flattened scan of pencil line art on
//! white paper into transparent, single-pixel ink lines.
//!
//! Every stage borrows its input and returns a fresh buffer with the same
//! bounds, so intermediate results can be inspected or reused.  Only the
//! final step of [`LineArtProcessor::scan_to_transparent`] crops.

use std::collections::VecDeque;

use image::Rgba;

use crate::canvas::{Point, RasterBuffer, TRANSPARENT};
use crate::ops::flood_fill::{DistanceMap, manhattan_distance};

/// Below this gray level a pixel is solid ink.
pub const LOW_THRESHOLD: i32 = 30;
/// Per-component slack when matching the line marker colors.
pub const COLOR_DIFF: i32 = 5;
/// Minimum alpha for a pixel to be traced as line (softer pixels are fringe).
pub const TRANSP_THRESHOLD: u8 = 60;

pub const BLACK_LINE: Rgba<u8> = Rgba([1, 1, 1, 255]);
pub const RED_LINE: Rgba<u8> = Rgba([254, 0, 0, 255]);
pub const GREEN_LINE: Rgba<u8> = Rgba([0, 254, 0, 255]);
pub const BLUE_LINE: Rgba<u8> = Rgba([0, 0, 254, 255]);

// ============================================================================
// CHANNELS
// ============================================================================

/// Ink channel of a scanned drawing: black line art or a colored guide line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Black,
    Red,
    Green,
    Blue,
}

impl Channel {
    /// Tie-break order when two channels are equally close.
    pub const ALL: [Channel; 4] = [Channel::Black, Channel::Red, Channel::Green, Channel::Blue];

    /// Marker color used while tracing.
    pub fn line_color(self) -> Rgba<u8> {
        match self {
            Channel::Black => BLACK_LINE,
            Channel::Red => RED_LINE,
            Channel::Green => GREEN_LINE,
            Channel::Blue => BLUE_LINE,
        }
    }

    /// Color written to the final output for this channel.
    pub fn ink_color(self) -> Rgba<u8> {
        match self {
            Channel::Black => Rgba([0, 0, 0, 255]),
            other => other.line_color(),
        }
    }

    /// Visible pixel whose RGB is within [`COLOR_DIFF`] of the marker.
    #[inline]
    pub fn matches(self, p: Rgba<u8>) -> bool {
        let m = self.line_color();
        p[3] > 0 && (0..3).all(|c| (p[c] as i32 - m[c] as i32).abs() <= COLOR_DIFF)
    }
}

/// Which channels a stage works on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelFlags {
    pub black: bool,
    pub red: bool,
    pub green: bool,
    pub blue: bool,
}

impl ChannelFlags {
    /// Black line art plus the given guide colors.
    pub fn guides(red: bool, green: bool, blue: bool) -> Self {
        Self { black: true, red, green, blue }
    }

    pub fn contains(&self, channel: Channel) -> bool {
        match channel {
            Channel::Black => self.black,
            Channel::Red => self.red,
            Channel::Green => self.green,
            Channel::Blue => self.blue,
        }
    }

    /// Enabled channels in tie-break order.
    pub fn iter(&self) -> impl Iterator<Item = Channel> {
        let flags = *self;
        Channel::ALL.into_iter().filter(move |c| flags.contains(*c))
    }

    /// Enabled guide channels (never black).
    pub fn guide_channels(&self) -> impl Iterator<Item = Channel> {
        self.iter().filter(|c| *c != Channel::Black)
    }

    /// First enabled channel whose marker matches `p`.
    pub fn channel_of(&self, p: Rgba<u8>) -> Option<Channel> {
        self.iter().find(|c| c.matches(p))
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Settings for one run of the scan-cleanup pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineArtProcessor {
    pub threshold: i32,
    pub spot_area: i32,
    pub channels: ChannelFlags,
}

impl LineArtProcessor {
    pub fn new(threshold: i32, spot_area: i32, channels: ChannelFlags) -> Self {
        Self { threshold, spot_area, channels }
    }

    /// Processor using the buffer's own threshold / spot-area settings.
    pub fn for_buffer(buffer: &RasterBuffer, red: bool, green: bool, blue: bool) -> Self {
        Self::new(buffer.threshold(), buffer.spot_area(), ChannelFlags::guides(red, green, blue))
    }

    // ---- full pipeline ------------------------------------------------------

    /// Classify → trace → thin → fill spots → blend → drop guide lines → crop.
    /// `input` is not modified; a zero-size input yields an empty buffer.
    pub fn scan_to_transparent(&self, input: &RasterBuffer) -> RasterBuffer {
        if input.is_empty() || !input.is_loaded() {
            log_warn!("Scan skipped: frame has no pixels");
            let mut empty = RasterBuffer::new();
            empty.set_threshold(self.threshold);
            empty.set_spot_area(self.spot_area);
            empty.enable_auto_crop(input.auto_crop_enabled());
            return empty;
        }

        let classified = self.classify(input);
        let traced = self.trace_line(&classified);
        let thinned = self.to_thin_line(&traced, self.channels);
        let spotted = self.fill_spot_areas(&thinned);
        let blended = self.blend_lines(&spotted, &classified);
        let mut result = self.erase_red_green_blue_lines(&blended);

        result.set_threshold(self.threshold);
        result.set_spot_area(self.spot_area);
        result.auto_crop();
        result
    }

    // ---- stage 1: classification --------------------------------------------

    /// Background → transparent, enabled guide colors → their marker,
    /// everything else → black ink whose alpha follows the gray level.
    /// Pencil tint is discarded, so warm or cool scans still trace as black.
    pub fn classify(&self, input: &RasterBuffer) -> RasterBuffer {
        input.map_pixels(|_, _, p| self.classify_pixel(p))
    }

    fn classify_pixel(&self, p: Rgba<u8>) -> Rgba<u8> {
        if p[3] == 0 {
            return TRANSPARENT;
        }
        let (r, g, b) = (p[0] as i32, p[1] as i32, p[2] as i32);
        let gray = gray_level(r, g, b);
        if gray >= self.threshold {
            return TRANSPARENT;
        }
        if self.channels.blue && b - 50 > r && b - 50 > g {
            return BLUE_LINE;
        }
        if self.channels.green && g - 50 > r && g - 50 > b {
            return GREEN_LINE;
        }
        if self.channels.red && r - 80 > g && r - 80 > b {
            return RED_LINE;
        }
        let alpha = self.ink_alpha(gray) * p[3] as i32 / 255;
        if alpha <= 0 {
            return TRANSPARENT;
        }
        Rgba([0, 0, 0, alpha as u8])
    }

    fn ink_alpha(&self, gray: i32) -> i32 {
        if gray < LOW_THRESHOLD || self.threshold <= LOW_THRESHOLD {
            return 255;
        }
        ((self.threshold - gray) * 255 / (self.threshold - LOW_THRESHOLD)).clamp(1, 255)
    }

    // ---- stage 2: tracing ---------------------------------------------------

    /// Solid pixels of each enabled channel become that channel's marker.
    /// Fringe (alpha below [`TRANSP_THRESHOLD`]) is left out.
    pub fn trace_line(&self, classified: &RasterBuffer) -> RasterBuffer {
        classified.map_pixels(|_, _, p| self.trace_pixel(p))
    }

    fn trace_pixel(&self, p: Rgba<u8>) -> Rgba<u8> {
        if p[3] < TRANSP_THRESHOLD {
            return TRANSPARENT;
        }
        match self.channels.channel_of(p) {
            Some(channel) => channel.line_color(),
            None => TRANSPARENT,
        }
    }

    // ---- stage 3: thinning --------------------------------------------------

    /// Erode each channel's strokes to one-pixel centerlines.  Runs until
    /// nothing more can go, so thinning a thinned buffer changes nothing.
    pub fn to_thin_line(&self, traced: &RasterBuffer, channels: ChannelFlags) -> RasterBuffer {
        let mut out = traced.copy();
        let b = traced.bounds();
        if b.is_empty() {
            return out;
        }
        let (w, h) = (b.width as usize, b.height as usize);
        for channel in channels.iter() {
            let before: Vec<bool> = (0..w * h)
                .map(|i| channel.matches(traced.scan_line(b.x + (i % w) as i32, b.y + (i / w) as i32)))
                .collect();
            if !before.iter().any(|&m| m) {
                continue;
            }
            let mut mask = before.clone();
            thin_mask(&mut mask, w, h);
            for (i, (&was, &now)) in before.iter().zip(mask.iter()).enumerate() {
                if was && !now {
                    out.set_scan_line(b.x + (i % w) as i32, b.y + (i / w) as i32, TRANSPARENT);
                }
            }
        }
        out
    }

    // ---- stage 4: spot areas ------------------------------------------------

    /// Fill enclosed transparent holes smaller than `spot_area` with the
    /// color of the ink around them.  Holes touching the buffer edge are
    /// never filled.
    pub fn fill_spot_areas(&self, thinned: &RasterBuffer) -> RasterBuffer {
        let mut out = thinned.copy();
        let b = thinned.bounds();
        if b.is_empty() || self.spot_area <= 0 {
            return out;
        }
        let w = b.width as usize;
        let mut visited = vec![false; w * b.height as usize];

        for y in b.top()..b.bottom() {
            for x in b.left()..b.right() {
                let idx = (y - b.y) as usize * w + (x - b.x) as usize;
                if visited[idx] {
                    continue;
                }
                if thinned.scan_line(x, y) != TRANSPARENT {
                    visited[idx] = true;
                    continue;
                }
                let start = Point::new(x, y);
                let region = collect_region(thinned, start, TRANSPARENT, &mut visited);
                if region.touches_edge || region.pixels.len() >= self.spot_area as usize {
                    continue;
                }
                if let Some(color) = border_color(thinned, &region.pixels) {
                    fill_with_color(&mut out, start, TRANSPARENT, color);
                }
            }
        }
        out
    }

    // ---- stage 5: blending --------------------------------------------------

    /// Rebuild final ink from the thinned markers.  Marker pixels take the
    /// classified ink (or the channel ink for filled spots).  Soft fringe
    /// pixels join the nearest channel if they touch its line, and are
    /// dropped otherwise.  Solid ink that thinning removed is dropped.
    pub fn blend_lines(&self, thinned: &RasterBuffer, classified: &RasterBuffer) -> RasterBuffer {
        let distances: Vec<(Channel, DistanceMap)> = self
            .channels
            .iter()
            .map(|c| (c, manhattan_distance(thinned, c.line_color())))
            .collect();

        thinned.map_pixels(|x, y, t| {
            let c = classified.scan_line(x, y);
            if let Some(channel) = self.channels.iter().find(|ch| t == ch.line_color()) {
                return if channel.matches(c) { c } else { channel.ink_color() };
            }
            if c[3] == 0 || c[3] >= TRANSP_THRESHOLD {
                return TRANSPARENT;
            }
            let nearest = distances
                .iter()
                .filter_map(|(ch, map)| map.get(x, y).map(|d| (d, *ch)))
                .min_by_key(|(d, _)| *d);
            match nearest {
                Some((d, ch)) if d <= 1 => {
                    let ink = ch.ink_color();
                    Rgba([ink[0], ink[1], ink[2], c[3]])
                }
                _ => TRANSPARENT,
            }
        })
    }

    // ---- stage 6: guide removal ---------------------------------------------

    /// Drop every pixel belonging to an enabled guide channel.
    pub fn erase_red_green_blue_lines(&self, input: &RasterBuffer) -> RasterBuffer {
        input.map_pixels(|_, _, p| {
            if self.channels.guide_channels().any(|c| c.matches(p)) {
                TRANSPARENT
            } else {
                p
            }
        })
    }
}

impl RasterBuffer {
    /// Run the full scan cleanup with this buffer's threshold and spot area.
    pub fn scan_to_transparent(&self, red: bool, green: bool, blue: bool) -> RasterBuffer {
        LineArtProcessor::for_buffer(self, red, green, blue).scan_to_transparent(self)
    }
}

// ============================================================================
// REGION HELPERS
// ============================================================================

/// Recolor the 4-connected area of exactly `from` around `point` to `to`.
/// Returns the number of pixels changed.
pub fn fill_with_color(buffer: &mut RasterBuffer, point: Point, from: Rgba<u8>, to: Rgba<u8>) -> usize {
    if from == to || !buffer.contains(point) || buffer.pixel_at(point) != from {
        return 0;
    }
    let b = buffer.bounds();
    let mut visited = vec![false; b.width as usize * b.height as usize];
    let region = collect_region(buffer, point, from, &mut visited);
    for p in &region.pixels {
        buffer.set_scan_line(p.x, p.y, to);
    }
    region.pixels.len()
}

struct Region {
    pixels: Vec<Point>,
    touches_edge: bool,
}

/// BFS over the 4-connected pixels equal to `color`, marking `visited`.
fn collect_region(buffer: &RasterBuffer, start: Point, color: Rgba<u8>, visited: &mut [bool]) -> Region {
    let b = buffer.bounds();
    let w = b.width as usize;
    let index = |p: Point| (p.y - b.y) as usize * w + (p.x - b.x) as usize;

    let mut region = Region { pixels: Vec::new(), touches_edge: false };
    let mut queue = VecDeque::new();
    visited[index(start)] = true;
    queue.push_back(start);

    while let Some(p) = queue.pop_front() {
        if p.x == b.left() || p.y == b.top() || p.x == b.right() - 1 || p.y == b.bottom() - 1 {
            region.touches_edge = true;
        }
        region.pixels.push(p);
        for n in [
            Point::new(p.x - 1, p.y),
            Point::new(p.x + 1, p.y),
            Point::new(p.x, p.y - 1),
            Point::new(p.x, p.y + 1),
        ] {
            if !b.contains(n) || visited[index(n)] {
                continue;
            }
            if buffer.scan_line(n.x, n.y) == color {
                visited[index(n)] = true;
                queue.push_back(n);
            }
        }
    }
    region
}

/// Most frequent visible color 4-adjacent to the region (first seen wins ties).
fn border_color(buffer: &RasterBuffer, pixels: &[Point]) -> Option<Rgba<u8>> {
    let mut counts: Vec<(Rgba<u8>, usize)> = Vec::new();
    for p in pixels {
        for n in [
            Point::new(p.x - 1, p.y),
            Point::new(p.x + 1, p.y),
            Point::new(p.x, p.y - 1),
            Point::new(p.x, p.y + 1),
        ] {
            let c = buffer.scan_line(n.x, n.y);
            if c[3] == 0 {
                continue;
            }
            match counts.iter_mut().find(|(k, _)| *k == c) {
                Some((_, n)) => *n += 1,
                None => counts.push((c, 1)),
            }
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max()?;
    counts.into_iter().find(|(_, n)| *n == best).map(|(c, _)| c)
}

#[inline]
fn gray_level(r: i32, g: i32, b: i32) -> i32 {
    (r * 11 + g * 16 + b * 5) / 32
}

// ============================================================================
// THINNING
// ============================================================================

/// Zhang-Suen thinning of a binary mask, repeated until stable.
///
/// Candidates need three to six set neighbours, so two-pixel diagonals are
/// not eaten from their ends.  A subiteration clears its candidates
/// together, except those whose remaining neighbours would split apart or
/// vanish.  A last sweep drops the corner pixels of diagonal staircases.
fn thin_mask(mask: &mut [bool], w: usize, h: usize) {
    loop {
        let mut changed = false;
        for step in 0..2 {
            let candidates: Vec<usize> = (0..w * h)
                .filter(|&i| mask[i] && is_removable(mask, w, h, i, step))
                .collect();
            let mut after = mask.to_vec();
            for &i in &candidates {
                after[i] = false;
            }
            for i in candidates {
                if ring_components(&neighbours(&after, w, h, i)) == 1 {
                    mask[i] = false;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    loop {
        let mut changed = false;
        for i in 0..w * h {
            if mask[i] && is_staircase_corner(&neighbours(mask, w, h, i)) {
                mask[i] = false;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn is_removable(mask: &[bool], w: usize, h: usize, i: usize, step: usize) -> bool {
    let ring = neighbours(mask, w, h, i);
    let count = ring.iter().filter(|&&n| n).count();
    if !(3..=6).contains(&count) || transitions(&ring) != 1 {
        return false;
    }
    let [n, _, e, _, s, _, west, _] = ring;
    if step == 0 {
        !(n && e && s) && !(e && s && west)
    } else {
        !(n && e && west) && !(n && s && west)
    }
}

/// Pixel sitting in the elbow of two edge neighbours that still touch
/// each other diagonally once it is gone.
fn is_staircase_corner(ring: &[bool; 8]) -> bool {
    let [n, _, e, _, s, _, west, _] = *ring;
    ((n && e) || (e && s) || (s && west) || (west && n)) && ring_components(ring) == 1
}

/// Ring offsets clockwise from north.
const RING: [(i64, i64); 8] = [(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1)];

/// 8-neighbourhood clockwise from north; outside the mask counts as empty.
fn neighbours(mask: &[bool], w: usize, h: usize, i: usize) -> [bool; 8] {
    let (x, y) = ((i % w) as i64, (i / w) as i64);
    RING.map(|(dx, dy)| {
        let (nx, ny) = (x + dx, y + dy);
        nx >= 0 && ny >= 0 && (nx as usize) < w && (ny as usize) < h && mask[ny as usize * w + nx as usize]
    })
}

/// Number of empty→filled steps walking once around the ring.
fn transitions(ring: &[bool; 8]) -> usize {
    (0..8).filter(|&k| !ring[k] && ring[(k + 1) % 8]).count()
}

/// 8-connected groups among the set cells of a ring.
fn ring_components(ring: &[bool; 8]) -> usize {
    let mut seen = [false; 8];
    let mut groups = 0;
    for start in 0..8 {
        if !ring[start] || seen[start] {
            continue;
        }
        groups += 1;
        seen[start] = true;
        let mut stack = vec![start];
        while let Some(k) = stack.pop() {
            for j in 0..8 {
                let touching = (RING[k].0 - RING[j].0).abs() <= 1 && (RING[k].1 - RING[j].1).abs() <= 1;
                if ring[j] && !seen[j] && touching {
                    seen[j] = true;
                    stack.push(j);
                }
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Rect;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn processor(red: bool) -> LineArtProcessor {
        LineArtProcessor::new(200, 6, ChannelFlags::guides(red, false, false))
    }

    fn marked(buf: &RasterBuffer, color: Rgba<u8>) -> Vec<(i32, i32)> {
        let b = buf.bounds();
        let mut out = Vec::new();
        for y in b.top()..b.bottom() {
            for x in b.left()..b.right() {
                if buf.pixel(x, y) == color {
                    out.push((x, y));
                }
            }
        }
        out
    }

    fn mask_components(mask: &[bool], w: usize, h: usize) -> usize {
        let mut seen = vec![false; w * h];
        let mut count = 0;
        for start in 0..w * h {
            if !mask[start] || seen[start] {
                continue;
            }
            count += 1;
            let mut stack = vec![start];
            seen[start] = true;
            while let Some(i) = stack.pop() {
                let (x, y) = ((i % w) as i64, (i / w) as i64);
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx as usize >= w || ny as usize >= h {
                            continue;
                        }
                        let n = ny as usize * w + nx as usize;
                        if mask[n] && !seen[n] {
                            seen[n] = true;
                            stack.push(n);
                        }
                    }
                }
            }
        }
        count
    }

    #[test]
    fn classify_background_and_ink() {
        let p = processor(true);
        assert_eq!(p.classify_pixel(WHITE), TRANSPARENT);
        assert_eq!(p.classify_pixel(Rgba([210, 210, 210, 255])), TRANSPARENT);
        assert_eq!(p.classify_pixel(BLACK), BLACK);
        assert_eq!(p.classify_pixel(Rgba([20, 22, 21, 255])), BLACK);
        assert_eq!(p.classify_pixel(Rgba([255, 0, 0, 255])), RED_LINE);
        let mid = p.classify_pixel(Rgba([115, 115, 115, 255]));
        assert_eq!(&mid.0[..3], &[0, 0, 0]);
        assert!(mid[3] > 100 && mid[3] < 160, "{mid:?}");
    }

    #[test]
    fn disabled_guide_becomes_black_ink() {
        let p = processor(false);
        // Gray level 87 at threshold 200.
        assert_eq!(p.classify_pixel(Rgba([255, 0, 0, 255])), Rgba([0, 0, 0, 169]));
    }

    #[test]
    fn tinted_pencil_classifies_as_black() {
        let p = processor(true);
        // Warm near-black is solid ink.
        assert_eq!(p.classify_pixel(Rgba([40, 20, 5, 255])), BLACK);
        let brown = p.classify_pixel(Rgba([150, 110, 80, 255]));
        assert_eq!(brown, Rgba([0, 0, 0, 121]));
        assert_eq!(p.trace_pixel(brown), BLACK_LINE);
        let blueish = p.classify_pixel(Rgba([70, 80, 110, 255]));
        assert_eq!(&blueish.0[..3], &[0, 0, 0]);
    }

    #[test]
    fn low_threshold_does_not_divide_by_zero() {
        let p = LineArtProcessor::new(LOW_THRESHOLD, 6, ChannelFlags::guides(false, false, false));
        assert_eq!(p.classify_pixel(Rgba([20, 20, 20, 255])), BLACK);
        assert_eq!(p.classify_pixel(Rgba([40, 40, 40, 255])), TRANSPARENT);
    }

    #[test]
    fn trace_skips_fringe() {
        let p = processor(false);
        assert_eq!(p.trace_pixel(Rgba([0, 0, 0, 200])), BLACK_LINE);
        assert_eq!(p.trace_pixel(Rgba([0, 0, 0, 40])), TRANSPARENT);
        assert_eq!(p.trace_pixel(Rgba([200, 40, 40, 200])), TRANSPARENT);
    }

    #[test]
    fn thick_bar_thins_to_single_row() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 24, 9), TRANSPARENT);
        for y in 2..=6 {
            for x in 2..=21 {
                buf.set_pixel(x, y, BLACK_LINE);
            }
        }
        let thin = processor(false).to_thin_line(&buf, ChannelFlags::guides(false, false, false));
        for x in 7..=15 {
            let column = (0..9).filter(|&y| thin.pixel(x, y) == BLACK_LINE).count();
            assert_eq!(column, 1, "column {x}");
        }
    }

    #[test]
    fn thinning_is_idempotent_and_keeps_connectivity() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 20, 20), TRANSPARENT);
        for y in 3..10 {
            for x in 3..10 {
                buf.set_pixel(x, y, BLACK_LINE);
            }
        }
        for x in 9..18 {
            for y in 6..9 {
                buf.set_pixel(x, y, BLACK_LINE);
            }
        }
        let p = processor(false);
        let flags = ChannelFlags::guides(false, false, false);
        let once = p.to_thin_line(&buf, flags);
        let twice = p.to_thin_line(&once, flags);
        assert_eq!(marked(&once, BLACK_LINE), marked(&twice, BLACK_LINE));

        let as_mask = |b: &RasterBuffer| -> Vec<bool> {
            (0..400).map(|i| b.pixel(i % 20, i / 20) == BLACK_LINE).collect()
        };
        assert_eq!(mask_components(&as_mask(&once), 20, 20), 1);
        assert!(marked(&once, BLACK_LINE).len() < marked(&buf, BLACK_LINE).len());
    }

    #[test]
    fn thinning_keeps_diagonal_and_small_blocks() {
        let mut mask = vec![false; 25];
        for i in 0..5 {
            mask[i * 5 + i] = true;
        }
        let diagonal = mask.clone();
        thin_mask(&mut mask, 5, 5);
        assert_eq!(mask, diagonal);

        let mut block = vec![true; 4];
        thin_mask(&mut block, 2, 2);
        assert_eq!(block, vec![false, true, true, false]);
    }

    fn neighbour_counts(mask: &[bool], w: usize, h: usize) -> Vec<((usize, usize), usize)> {
        (0..w * h)
            .filter(|&i| mask[i])
            .map(|i| ((i % w, i / w), neighbours(mask, w, h, i).iter().filter(|&&n| n).count()))
            .collect()
    }

    #[test]
    fn thinned_strokes_are_one_pixel_wide() {
        let mut shapes = Vec::new();
        for width in 2..=4 {
            let mut mask = vec![false; 20 * 20];
            for i in 2..16 {
                for d in 0..width {
                    mask[i * 20 + i + d - 1] = true;
                }
            }
            shapes.push((20, 20, mask));
        }
        // L with a four pixel thick bend.
        let mut l = vec![false; 22 * 20];
        for y in 2..18 {
            for x in 3..7 {
                l[y * 22 + x] = true;
            }
        }
        for y in 14..18 {
            for x in 3..19 {
                l[y * 22 + x] = true;
            }
        }
        shapes.push((22, 20, l));

        for (w, h, mut mask) in shapes {
            thin_mask(&mut mask, w, h);
            let counts = neighbour_counts(&mask, w, h);
            assert!(counts.len() > 10, "stroke eroded to {} pixels", counts.len());
            assert!(counts.iter().all(|(_, c)| *c <= 2), "{counts:?}");
            assert_eq!(counts.iter().filter(|(_, c)| *c == 1).count(), 2, "{counts:?}");
            assert_eq!(mask_components(&mask, w, h), 1);
        }
    }

    #[test]
    fn crossing_strokes_branch_only_at_the_crossing() {
        let (w, h) = (21, 21);
        let mut mask = vec![false; w * h];
        for a in 2..19 {
            for b in 9..12 {
                mask[b * w + a] = true;
                mask[a * w + b] = true;
            }
        }
        thin_mask(&mut mask, w, h);
        let counts = neighbour_counts(&mask, w, h);
        assert_eq!(counts.iter().filter(|(_, c)| *c == 1).count(), 4);
        for ((x, y), c) in counts {
            if c > 2 {
                assert!(x.abs_diff(10) <= 1 && y.abs_diff(10) <= 1, "branch at ({x}, {y})");
            }
        }
        assert_eq!(mask_components(&mask, w, h), 1);
    }

    #[test]
    fn spot_fill_closes_small_holes_only() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 12, 7), TRANSPARENT);
        // Ring around a single pixel hole at (2, 2).
        for (x, y) in [(1, 1), (2, 1), (3, 1), (1, 2), (3, 2), (1, 3), (2, 3), (3, 3)] {
            buf.set_pixel(x, y, BLACK_LINE);
        }
        // Ring around a 3x3 hole at (6..9, 2..5).
        for x in 5..=9 {
            buf.set_pixel(x, 1, BLACK_LINE);
            buf.set_pixel(x, 5, BLACK_LINE);
        }
        for y in 1..=5 {
            buf.set_pixel(5, y, BLACK_LINE);
            buf.set_pixel(9, y, BLACK_LINE);
        }
        let out = processor(false).fill_spot_areas(&buf);
        assert_eq!(out.pixel(2, 2), BLACK_LINE);
        assert_eq!(out.pixel(7, 3), TRANSPARENT);
        assert_eq!(out.pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn fill_with_color_counts_pixels() {
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), WHITE);
        buf.set_pixel(2, 0, BLACK);
        buf.set_pixel(2, 1, BLACK);
        buf.set_pixel(2, 2, BLACK);
        buf.set_pixel(2, 3, BLACK);
        assert_eq!(fill_with_color(&mut buf, Point::new(0, 0), WHITE, RED_LINE), 8);
        assert_eq!(buf.pixel(1, 3), RED_LINE);
        assert_eq!(buf.pixel(3, 3), WHITE);
        assert_eq!(fill_with_color(&mut buf, Point::new(2, 0), WHITE, RED_LINE), 0);
    }

    #[test]
    fn fill_with_color_ignores_seeds_off_the_grid() {
        let mut empty = RasterBuffer::new();
        assert_eq!(fill_with_color(&mut empty, Point::new(0, 0), TRANSPARENT, BLACK_LINE), 0);
        assert!(empty.is_empty());

        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 4, 4), WHITE);
        assert_eq!(fill_with_color(&mut buf, Point::new(-3, 1), WHITE, RED_LINE), 0);
        assert_eq!(fill_with_color(&mut buf, Point::new(-3, 1), TRANSPARENT, RED_LINE), 0);
        assert_eq!(fill_with_color(&mut buf, Point::new(4, 4), TRANSPARENT, RED_LINE), 0);
        assert_eq!(buf.bounds(), Rect::new(0, 0, 4, 4));
        assert_eq!(buf.pixel(0, 1), WHITE);
    }

    #[test]
    fn blend_attaches_fringe_to_nearest_line() {
        let p = processor(false);
        let mut thinned = RasterBuffer::filled(Rect::new(0, 0, 5, 3), TRANSPARENT);
        thinned.set_pixel(1, 1, BLACK_LINE);
        let mut classified = RasterBuffer::filled(Rect::new(0, 0, 5, 3), TRANSPARENT);
        classified.set_pixel(1, 1, Rgba([0, 0, 0, 255]));
        classified.set_pixel(2, 1, Rgba([0, 0, 0, 40]));
        classified.set_pixel(4, 1, Rgba([0, 0, 0, 40]));
        // Solid ink that thinning removed.
        classified.set_pixel(0, 0, Rgba([0, 0, 0, 200]));

        let out = p.blend_lines(&thinned, &classified);
        assert_eq!(out.pixel(1, 1), Rgba([0, 0, 0, 255]));
        assert_eq!(out.pixel(2, 1), Rgba([0, 0, 0, 40]));
        assert_eq!(out.pixel(4, 1), TRANSPARENT);
        assert_eq!(out.pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn erase_only_enabled_guides() {
        let p = LineArtProcessor::new(200, 6, ChannelFlags::guides(true, false, false));
        let mut buf = RasterBuffer::filled(Rect::new(0, 0, 3, 1), TRANSPARENT);
        buf.set_pixel(0, 0, RED_LINE);
        buf.set_pixel(1, 0, GREEN_LINE);
        buf.set_pixel(2, 0, BLACK);
        let out = p.erase_red_green_blue_lines(&buf);
        assert_eq!(out.pixel(0, 0), TRANSPARENT);
        assert_eq!(out.pixel(1, 0), GREEN_LINE);
        assert_eq!(out.pixel(2, 0), BLACK);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let out = processor(true).scan_to_transparent(&RasterBuffer::new());
        assert!(out.is_empty());
    }

    #[test]
    fn result_keeps_the_input_auto_crop_flag() {
        for enabled in [false, true] {
            let mut page = RasterBuffer::filled(Rect::new(0, 0, 6, 6), WHITE);
            page.set_pixel(2, 3, BLACK);
            page.enable_auto_crop(enabled);
            let out = processor(false).scan_to_transparent(&page);
            assert_eq!(out.auto_crop_enabled(), enabled);
            assert_eq!(out.bounds(), Rect::new(2, 3, 1, 1));

            let mut blank = RasterBuffer::new();
            blank.enable_auto_crop(enabled);
            assert_eq!(processor(false).scan_to_transparent(&blank).auto_crop_enabled(), enabled);
        }
    }

    #[test]
    fn input_is_left_untouched() {
        let mut page = RasterBuffer::filled(Rect::new(0, 0, 6, 6), WHITE);
        page.set_pixel(2, 2, BLACK);
        let before = page.clone();
        let _ = page.scan_to_transparent(false, false, false);
        assert_eq!(page.bounds(), before.bounds());
        assert_eq!(page.pixel(0, 0), WHITE);
        assert_eq!(page.pixel(2, 2), BLACK);
    }
}
