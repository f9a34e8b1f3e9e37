use std::path::Path;

use crate::dictionary::Dictionary;
use crate::{Color, DetectionSet, Frame, Point2, Result};

/// A probed capture device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: i32,
    pub backend: String,
    pub width: u32,
    pub height: u32,
}

pub trait CameraSource {
    /// Open a camera by device index, requesting the given resolution.
    fn open(index: i32, width: u32, height: u32) -> Result<Self>
    where
        Self: Sized;

    /// Probe the first `max_index` device indices and report those that open.
    fn list(max_index: i32) -> Result<Vec<DeviceInfo>>
    where
        Self: Sized;

    /// Read a single frame.
    fn read(&mut self) -> Result<Frame>;
}

/// Marker detection and rendering, delegated to a vision backend.
pub trait MarkerEngine {
    /// Detect markers of every dictionary in `dictionaries`, running the
    /// backend on a frame shrunk by `downscale`. Corners are reported in
    /// full-resolution coordinates.
    fn detect(
        &mut self,
        frame: &Frame,
        dictionaries: &[Dictionary],
        downscale: u32,
    ) -> Result<DetectionSet>;

    /// Render marker `id` as a `side_px` square gray image.
    fn render_marker(
        &mut self,
        dictionary: Dictionary,
        id: u32,
        side_px: u32,
        border_bits: u32,
    ) -> Result<Frame>;
}

/// Drawing surface used by the overlay compositor.
pub trait Canvas {
    /// Copy a frame into a new 3-channel canvas.
    fn from_frame(frame: &Frame) -> Result<Self>
    where
        Self: Sized;

    fn blank(width: u32, height: u32, fill: Color) -> Result<Self>
    where
        Self: Sized;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Copy `image` with its top-left corner at (x, y).
    fn paste(&mut self, image: &Frame, x: u32, y: u32) -> Result<()>;

    fn polyline(&mut self, points: &[Point2], closed: bool, color: Color, thickness: i32)
        -> Result<()>;

    /// Draw text with its baseline starting at `origin`.
    fn text(
        &mut self,
        text: &str,
        origin: (i32, i32),
        scale: f64,
        color: Color,
        thickness: i32,
    ) -> Result<()>;

    fn to_frame(&self) -> Result<Frame>;
}

/// A display window that shows canvases and reports key presses.
pub trait Window {
    type Canvas: Canvas;

    fn show(&mut self, canvas: &Self::Canvas) -> Result<()>;

    /// Wait up to `timeout_ms` (0 = forever) for a key; -1 when none arrived.
    fn wait_key(&mut self, timeout_ms: i32) -> Result<i32>;
}

/// Persists rendered images.
pub trait ImageWriter {
    fn write_png(&mut self, path: &Path, image: &Frame) -> Result<()>;
}
