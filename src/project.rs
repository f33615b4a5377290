use std::collections::BTreeMap;
use std::path::Path;

use crate::batch::FrameStore;
use crate::canvas::{Point, RasterBuffer};
use crate::io::Status;

/// Content that sits on a timeline and can drop its payload from memory
/// while a copy of it lives on disk.
pub trait TimedContent {
    fn clone_boxed(&self) -> Box<dyn TimedContent>;
    /// Bring the payload back into memory (no-op when resident).
    fn load(&mut self) -> Status;
    /// Drop the payload if it can be restored later.
    fn unload(&mut self);
    fn is_loaded(&self) -> bool;
    /// Resident payload size in bytes.
    fn memory_usage(&self) -> u64;
}

impl TimedContent for RasterBuffer {
    fn clone_boxed(&self) -> Box<dyn TimedContent> {
        Box::new(self.clone())
    }

    fn load(&mut self) -> Status {
        self.load_file()
    }

    fn unload(&mut self) {
        self.unload_file();
    }

    fn is_loaded(&self) -> bool {
        RasterBuffer::is_loaded(self)
    }

    fn memory_usage(&self) -> u64 {
        RasterBuffer::memory_usage(self)
    }
}

/// In-memory key frames of one bitmap layer, keyed by frame position.
#[derive(Clone, Debug, Default)]
pub struct KeyFrameStore {
    frames: BTreeMap<i32, RasterBuffer>,
}

impl KeyFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive file-backed key frames starting at position 1.  Nothing
    /// is decoded until a frame is first touched.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut store = Self::new();
        for (i, path) in paths.iter().enumerate() {
            store.insert(i as i32 + 1, RasterBuffer::from_file(Point::new(0, 0), path.as_ref()));
        }
        store
    }

    /// Insert or replace the key at `index`.
    pub fn insert(&mut self, index: i32, frame: RasterBuffer) {
        self.frames.insert(index, frame);
    }

    pub fn frame(&self, index: i32) -> Option<&RasterBuffer> {
        self.frames.get(&index)
    }

    /// Key positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = i32> + '_ {
        self.frames.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (i32, &mut RasterBuffer)> {
        self.frames.iter_mut().map(|(k, v)| (*k, v))
    }

    /// Pixel bytes currently resident across all frames.
    pub fn memory_usage(&self) -> u64 {
        self.frames.values().map(TimedContent::memory_usage).sum()
    }
}

impl FrameStore for KeyFrameStore {
    fn buffer_at_frame(&mut self, index: i32) -> Option<&mut RasterBuffer> {
        self.frames.get_mut(&index)
    }

    fn key_exists(&self, index: i32) -> bool {
        self.frames.contains_key(&index)
    }

    fn remove_key_frame(&mut self, index: i32) {
        self.frames.remove(&index);
    }

    fn add_new_key_frame_at(&mut self, index: i32) {
        self.frames.entry(index).or_default();
    }

    fn first_key_frame_position(&self) -> Option<i32> {
        self.frames.keys().next().copied()
    }

    fn last_key_frame_position(&self) -> Option<i32> {
        self.frames.keys().next_back().copied()
    }

    fn key_frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Rect, TRANSPARENT};
    use image::Rgba;

    const INK: Rgba<u8> = Rgba([3, 3, 3, 255]);

    #[test]
    fn unload_only_when_backed_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.png");

        let mut frame = RasterBuffer::filled(Rect::new(0, 0, 4, 4), INK);
        TimedContent::unload(&mut frame);
        assert!(TimedContent::is_loaded(&frame), "no backing file yet");

        frame.write_file(&path).unwrap();
        TimedContent::unload(&mut frame);
        assert!(!TimedContent::is_loaded(&frame));
        assert_eq!(TimedContent::memory_usage(&frame), 0);
        assert_eq!(frame.pixel(1, 1), TRANSPARENT);

        TimedContent::load(&mut frame).unwrap();
        assert_eq!(frame.pixel(1, 1), INK);
        assert_eq!(TimedContent::memory_usage(&frame), 64);

        frame.set_pixel(0, 0, TRANSPARENT);
        TimedContent::unload(&mut frame);
        assert!(TimedContent::is_loaded(&frame), "unsaved edits stay resident");
    }

    #[test]
    fn writes_reload_unloaded_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.png");
        let mut frame = RasterBuffer::filled(Rect::new(0, 0, 2, 2), INK);
        frame.write_file(&path).unwrap();
        frame.unload_file();

        frame.set_pixel(1, 1, TRANSPARENT);
        assert!(frame.is_loaded());
        assert_eq!(frame.pixel(0, 0), INK);
        assert_eq!(frame.pixel(1, 1), TRANSPARENT);
    }

    #[test]
    fn clone_boxed_is_independent() {
        let frame = RasterBuffer::filled(Rect::new(0, 0, 2, 2), INK);
        let boxed = frame.clone_boxed();
        assert_eq!(boxed.memory_usage(), 16);
        assert!(boxed.is_loaded());
    }

    #[test]
    fn store_positions_and_keys() {
        let mut store = KeyFrameStore::new();
        assert_eq!(store.first_key_frame_position(), None);
        store.insert(5, RasterBuffer::filled(Rect::new(0, 0, 1, 1), INK));
        store.insert(2, RasterBuffer::new());
        assert_eq!(store.first_key_frame_position(), Some(2));
        assert_eq!(store.last_key_frame_position(), Some(5));
        assert_eq!(store.key_frame_count(), 2);

        store.remove_key_frame(5);
        assert!(!store.key_exists(5));
        store.add_new_key_frame_at(5);
        assert!(store.buffer_at_frame(5).is_some_and(|f| f.is_empty()));
        assert_eq!(store.positions().collect::<Vec<_>>(), vec![2, 5]);
    }

    #[test]
    fn from_files_is_lazy() {
        let store = KeyFrameStore::from_files(&["a.png", "b.png"]);
        assert_eq!(store.key_frame_count(), 2);
        assert_eq!(store.memory_usage(), 0);
        assert!(store.frame(1).is_some_and(|f| !f.is_loaded()));
    }
}
