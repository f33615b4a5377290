//! Multi-frame "trace scanned drawing" runs.
//!
//! The orchestrator only talks to its collaborators through the small
//! contracts below, so a GUI timeline, a test double, or the CLI's
//! [`KeyFrameStore`](crate::project::KeyFrameStore) can all drive it.

use crate::canvas::{RasterBuffer, Rect};
use crate::ops::composite::CompositionMode;
use crate::project::TimedContent;
use crate::settings::TraceSettings;

// ============================================================================
// CONTRACTS
// ============================================================================

/// Key frames of the layer being traced.
pub trait FrameStore {
    fn buffer_at_frame(&mut self, index: i32) -> Option<&mut RasterBuffer>;
    fn key_exists(&self, index: i32) -> bool;
    fn remove_key_frame(&mut self, index: i32);
    /// Insert an empty key at `index` (keeps an existing one).
    fn add_new_key_frame_at(&mut self, index: i32);
    fn first_key_frame_position(&self) -> Option<i32>;
    fn last_key_frame_position(&self) -> Option<i32>;
    fn key_frame_count(&self) -> usize;
}

/// Active selection plus the clipboard used to carry it across a frame rewrite.
pub trait SelectionClipboard {
    fn something_selected(&self) -> bool;
    fn copy(&mut self, frame: &RasterBuffer);
    fn paste(&mut self, frame: &mut RasterBuffer);
}

/// Progress display with a cancel button.  Polled between frames only.
pub trait ProgressSink {
    fn set_progress(&mut self, current: usize, max: usize);
    fn was_canceled(&self) -> bool;
}

/// Rectangular selection with a private clipboard.
#[derive(Clone, Debug, Default)]
pub struct RectSelection {
    rect: Option<Rect>,
    clipboard: Option<RasterBuffer>,
}

impl RectSelection {
    pub fn new(rect: Rect) -> Self {
        Self { rect: Some(rect), clipboard: None }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn clipboard(&self) -> Option<&RasterBuffer> {
        self.clipboard.as_ref()
    }
}

impl SelectionClipboard for RectSelection {
    fn something_selected(&self) -> bool {
        self.rect.is_some_and(|r| !r.is_empty())
    }

    fn copy(&mut self, frame: &RasterBuffer) {
        if let Some(rect) = self.rect {
            self.clipboard = Some(frame.copy_rect(rect));
        }
    }

    fn paste(&mut self, frame: &mut RasterBuffer) {
        if let Some(clip) = &self.clipboard {
            frame.paste(clip, CompositionMode::SourceOver);
        }
    }
}

/// Progress sink for unattended runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_progress(&mut self, _current: usize, _max: usize) {}

    fn was_canceled(&self) -> bool {
        false
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Which key frames to trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceScope {
    CurrentKeyFrame(i32),
    AllKeyFrames,
}

/// Outcome of a batch.  Frames in `processed` keep their new content even
/// when the run was canceled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: Vec<i32>,
    pub failed: Vec<(i32, String)>,
    pub canceled: bool,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.canceled
    }
}

/// Replace key frames with their transparent, thinned line art.
///
/// With a selection, only the selected part of a frame survives: it is
/// copied out, the key is recreated empty, the copy is pasted back and
/// that is what gets traced.  A failing frame is recorded and skipped.
pub fn trace_scanned_drawings(
    store: &mut dyn FrameStore,
    selection: &mut dyn SelectionClipboard,
    progress: &mut dyn ProgressSink,
    settings: &TraceSettings,
    scope: TraceScope,
) -> BatchReport {
    let settings = settings.clamped();
    let mut report = BatchReport::default();

    match scope {
        TraceScope::CurrentKeyFrame(index) => {
            if store.key_exists(index) {
                trace_key_frame(store, selection, &settings, index, &mut report);
            } else {
                log_warn!("Trace skipped: no key frame at {}", index);
            }
        }
        TraceScope::AllKeyFrames => {
            let total = store.key_frame_count();
            let (Some(first), Some(last)) =
                (store.first_key_frame_position(), store.last_key_frame_position())
            else {
                return report;
            };
            log_info!("Tracing {} key frames ({}..={})", total, first, last);

            let mut done = 0;
            for index in first..=last {
                if !store.key_exists(index) {
                    continue;
                }
                progress.set_progress(done, total);
                done += 1;
                if progress.was_canceled() {
                    log_info!("Trace canceled before frame {}", index);
                    report.canceled = true;
                    break;
                }
                trace_key_frame(store, selection, &settings, index, &mut report);
            }
            if !report.canceled {
                progress.set_progress(total, total);
            }
        }
    }

    log_info!(
        "Trace finished: {} processed, {} failed{}",
        report.processed.len(),
        report.failed.len(),
        if report.canceled { ", canceled" } else { "" }
    );
    report
}

fn trace_key_frame(
    store: &mut dyn FrameStore,
    selection: &mut dyn SelectionClipboard,
    settings: &TraceSettings,
    index: i32,
    report: &mut BatchReport,
) {
    let mut fail = |reason: String| {
        log_err!("Frame {}: {}", index, reason);
        report.failed.push((index, reason));
    };

    let Some(frame) = store.buffer_at_frame(index) else {
        fail("key frame disappeared".to_string());
        return;
    };
    if let Err(e) = TimedContent::load(frame) {
        fail(e.to_string());
        return;
    }

    if selection.something_selected() {
        selection.copy(frame);
        store.remove_key_frame(index);
        store.add_new_key_frame_at(index);
        match store.buffer_at_frame(index) {
            Some(fresh) => selection.paste(fresh),
            None => {
                fail("key frame could not be recreated".to_string());
                return;
            }
        }
    }

    let Some(frame) = store.buffer_at_frame(index) else {
        fail("key frame disappeared".to_string());
        return;
    };
    frame.set_threshold(settings.threshold);
    frame.set_spot_area(settings.spot_area);
    let page = frame.bounds();

    let mut traced = settings.processor().scan_to_transparent(frame);
    if !settings.auto_crop && !page.is_empty() {
        traced.set_bounds(page);
    }
    *frame = traced;
    report.processed.push(index);
}
