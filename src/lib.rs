//! InkScan: turns scanned pencil drawings into transparent line art.
//!
//! [`RasterBuffer`] is a bounded pixel grid placed on an unbounded plane.
//! The `ops` modules composite, transform and flood-fill such grids, and
//! [`LineArtProcessor`] runs the scan-to-line-art pipeline over them.
//! [`batch`] applies that pipeline to every key frame of a layer.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;
pub mod batch;
pub mod canvas;
pub mod cli;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;

pub use canvas::{Point, RasterBuffer, Rect};
pub use ops::composite::CompositionMode;
pub use ops::line_art::{Channel, ChannelFlags, LineArtProcessor};
pub use settings::TraceSettings;
