use image::codecs::png::PngEncoder;
use image::{ImageError, RgbaImage};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::canvas::{Point, RasterBuffer};

/// Failure of a frame file operation.
#[derive(Debug)]
pub enum FileError {
    Io(std::io::Error),
    Image(ImageError),
    /// The buffer was unloaded and has no file to reload from.
    NoBackingFile,
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileError::Io(e) => write!(f, "I/O error: {}", e),
            FileError::Image(e) => write!(f, "Image error: {}", e),
            FileError::NoBackingFile => write!(f, "Frame has no backing file"),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::Io(e) => Some(e),
            FileError::Image(e) => Some(e),
            FileError::NoBackingFile => None,
        }
    }
}

impl From<std::io::Error> for FileError {
    fn from(e: std::io::Error) -> Self {
        FileError::Io(e)
    }
}

impl From<ImageError> for FileError {
    fn from(e: ImageError) -> Self {
        FileError::Image(e)
    }
}

/// Outcome of a blocking file operation.
pub type Status = Result<(), FileError>;

/// Decode any supported raster file to RGBA.
pub fn decode_rgba(path: &Path) -> Result<RgbaImage, FileError> {
    Ok(image::open(path)?.to_rgba8())
}

/// Decode `path` into a file-backed frame placed at the origin.
pub fn load_frame(path: &Path) -> Result<RasterBuffer, FileError> {
    let mut frame = RasterBuffer::from_file(Point::new(0, 0), path);
    frame.load_file()?;
    Ok(frame)
}

/// PNG-encode `image` to `path`, replacing any existing file.
pub fn encode_png(image: &RgbaImage, path: &Path) -> Status {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = PngEncoder::new(&mut writer);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

/// `<dir>/<stem><suffix>.png` for `input`.
pub fn output_path_in(dir: &Path, input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("frame");
    dir.join(format!("{stem}{suffix}.png"))
}

impl RasterBuffer {
    /// Write the grid as PNG.  An empty buffer has nothing to store, so an
    /// existing file at `path` is removed instead.  On success the buffer
    /// is backed by `path` and no longer counts as modified.
    pub fn write_file(&mut self, path: &Path) -> Status {
        if !self.is_loaded() {
            self.load_file()?;
        }
        if self.is_empty() {
            if path.exists() {
                fs::remove_file(path)?;
            }
            return Ok(());
        }
        let image = self.image().ok_or(FileError::NoBackingFile)?;
        encode_png(image, path)?;
        self.mark_saved(path);
        Ok(())
    }
}
