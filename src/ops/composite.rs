use image::Rgba;

use crate::canvas::{CropHint, RasterBuffer, Rect, TRANSPARENT};

// ============================================================================
// COMPOSITION MODES
// ============================================================================

/// Porter-Duff operator used by [`RasterBuffer::paste`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositionMode {
    Clear,
    Source,
    Destination,
    #[default]
    SourceOver,
    DestinationOver,
    SourceIn,
    DestinationIn,
    SourceOut,
    DestinationOut,
    SourceAtop,
    DestinationAtop,
    Xor,
    Plus,
}

/// How a paste moves the destination bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BoundsEffect {
    /// Coverage can only stay the same inside the destination.
    Keep,
    /// Pixels inside the source rect may lose alpha.
    Shrink,
    /// Union of both; nothing visible is removed.
    Grow,
    /// Union of both; destination pixels under the source may be removed.
    Replace,
}

impl CompositionMode {
    pub const ALL: [CompositionMode; 13] = [
        CompositionMode::Clear,
        CompositionMode::Source,
        CompositionMode::Destination,
        CompositionMode::SourceOver,
        CompositionMode::DestinationOver,
        CompositionMode::SourceIn,
        CompositionMode::DestinationIn,
        CompositionMode::SourceOut,
        CompositionMode::DestinationOut,
        CompositionMode::SourceAtop,
        CompositionMode::DestinationAtop,
        CompositionMode::Xor,
        CompositionMode::Plus,
    ];

    fn bounds_effect(self) -> BoundsEffect {
        match self {
            CompositionMode::Destination | CompositionMode::SourceAtop => BoundsEffect::Keep,
            CompositionMode::SourceIn
            | CompositionMode::DestinationIn
            | CompositionMode::Clear
            | CompositionMode::DestinationOut => BoundsEffect::Shrink,
            CompositionMode::SourceOver
            | CompositionMode::DestinationOver
            | CompositionMode::Plus => BoundsEffect::Grow,
            CompositionMode::Source
            | CompositionMode::SourceOut
            | CompositionMode::DestinationAtop
            | CompositionMode::Xor => BoundsEffect::Replace,
        }
    }

    /// Porter-Duff weights `(Fa, Fb)` applied to premultiplied source and destination.
    #[inline]
    fn factors(self, sa: f32, da: f32) -> (f32, f32) {
        match self {
            CompositionMode::Clear => (0.0, 0.0),
            CompositionMode::Source => (1.0, 0.0),
            CompositionMode::Destination => (0.0, 1.0),
            CompositionMode::SourceOver => (1.0, 1.0 - sa),
            CompositionMode::DestinationOver => (1.0 - da, 1.0),
            CompositionMode::SourceIn => (da, 0.0),
            CompositionMode::DestinationIn => (0.0, sa),
            CompositionMode::SourceOut => (1.0 - da, 0.0),
            CompositionMode::DestinationOut => (0.0, 1.0 - sa),
            CompositionMode::SourceAtop => (da, 1.0 - sa),
            CompositionMode::DestinationAtop => (1.0 - da, sa),
            CompositionMode::Xor => (1.0 - da, 1.0 - sa),
            CompositionMode::Plus => (1.0, 1.0),
        }
    }
}

// ============================================================================
// PIXEL BLENDING
// ============================================================================

/// Composite one straight-alpha source pixel onto one destination pixel.
/// A fully transparent result is always `[0, 0, 0, 0]`.
pub fn composite_pixel(mode: CompositionMode, src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    // Fast paths for the common source-over cases.
    if mode == CompositionMode::SourceOver {
        if src[3] == 255 {
            return src;
        }
        if src[3] == 0 {
            return dst;
        }
    }

    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let (fa, fb) = mode.factors(sa, da);

    let out_a = (sa * fa + da * fb).min(1.0);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = src[c] as f32 / 255.0 * sa;
        let d = dst[c] as f32 / 255.0 * da;
        let premul = (s * fa + d * fb).min(out_a);
        out[c] = ((premul / out_a) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    if out[3] == 0 {
        return TRANSPARENT;
    }
    Rgba(out)
}

// ============================================================================
// PASTE
// ============================================================================

impl RasterBuffer {
    /// Composite `source` onto this buffer at the source's own position.
    ///
    /// Blending is limited to the source rectangle.  Modes that can add
    /// coverage grow the bounds to the union of both rectangles.  Modes
    /// that can remove coverage leave the bounds as they are and mark them
    /// non-minimal until the next `auto_crop`.  The buffer's opacity is
    /// ignored here; it only matters for display.
    pub fn paste(&mut self, source: &RasterBuffer, mode: CompositionMode) {
        let src_bounds = source.bounds();
        if src_bounds.is_empty() {
            return;
        }
        let Some(src_img) = source.image.as_ref() else {
            log_warn!("Paste skipped: source frame is not loaded");
            return;
        };
        if !self.ensure_loaded() {
            return;
        }

        let dest_empty = self.bounds.is_empty();
        let src_hint = if source.is_minimally_bounded() { CropHint::Minimal } else { CropHint::Unknown };
        let (new_bounds, hint) = match mode.bounds_effect() {
            BoundsEffect::Keep => (self.bounds, self.hint),
            BoundsEffect::Shrink => {
                let touched = src_bounds.intersect(&self.bounds);
                let hint = if touched.is_empty() { self.hint } else { self.hint.erase(touched) };
                (self.bounds, hint)
            }
            BoundsEffect::Grow if dest_empty => (src_bounds, src_hint),
            BoundsEffect::Grow => {
                let both_minimal = self.hint == CropHint::Minimal && src_hint == CropHint::Minimal;
                let hint = if both_minimal { CropHint::Minimal } else { CropHint::Unknown };
                (self.bounds.union(&src_bounds), hint)
            }
            BoundsEffect::Replace if dest_empty => (src_bounds, src_hint),
            BoundsEffect::Replace => (self.bounds.union(&src_bounds), CropHint::Unknown),
        };
        if new_bounds != self.bounds {
            self.regrid(new_bounds);
        }

        let area: Rect = src_bounds.intersect(&self.bounds);
        let dst_bounds = self.bounds;
        if let Some(dst_img) = self.image.as_mut() {
            for y in area.top()..area.bottom() {
                for x in area.left()..area.right() {
                    let s = *src_img.get_pixel((x - src_bounds.x) as u32, (y - src_bounds.y) as u32);
                    let d = dst_img.get_pixel_mut((x - dst_bounds.x) as u32, (y - dst_bounds.y) as u32);
                    *d = composite_pixel(mode, s, *d);
                }
            }
        }
        self.hint = hint;
        self.touch();

        if self.enable_auto_crop && self.hint != CropHint::Minimal {
            self.auto_crop();
        }
    }
}
