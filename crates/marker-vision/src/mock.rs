//! In-process backends so both tools and their tests run without OpenCV.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use time::OffsetDateTime;

use crate::dictionary::Dictionary;
use crate::{
    CameraSource, Canvas, Color, DetectionSet, DeviceInfo, Error, Frame, ImageWriter, MarkerEngine,
    MarkerHit, PixelFormat, Point2, Quad, Result, Window,
};

const MOCK_WIDTH: u32 = 320;
const MOCK_HEIGHT: u32 = 240;

/// A gray ramp camera available at index 0 only.
#[derive(Debug)]
pub struct MockCamera {
    counter: u64,
    limit: Option<u64>,
}

impl MockCamera {
    /// End the stream after `frames` reads.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }
}

impl CameraSource for MockCamera {
    fn open(index: i32, _width: u32, _height: u32) -> Result<Self> {
        if index != 0 {
            return Err(Error::NotFound(format!("mock camera index {index}")));
        }
        Ok(Self {
            counter: 0,
            limit: None,
        })
    }

    fn list(max_index: i32) -> Result<Vec<DeviceInfo>> {
        Ok((0..max_index.min(1))
            .map(|index| DeviceInfo {
                index,
                backend: "mock".to_string(),
                width: MOCK_WIDTH,
                height: MOCK_HEIGHT,
            })
            .collect())
    }

    fn read(&mut self) -> Result<Frame> {
        if self.limit.is_some_and(|l| self.counter >= l) {
            return Err(Error::Io("end of mock stream".into()));
        }
        self.counter += 1;
        let mut data = vec![0u8; (MOCK_WIDTH * MOCK_HEIGHT) as usize];
        for y in 0..MOCK_HEIGHT {
            for x in 0..MOCK_WIDTH {
                let idx = (y * MOCK_WIDTH + x) as usize;
                data[idx] = ((x + y + self.counter as u32) % 256) as u8;
            }
        }
        Ok(Frame {
            width: MOCK_WIDTH,
            height: MOCK_HEIGHT,
            pixel_format: PixelFormat::Gray8,
            data,
            ts: Some(OffsetDateTime::now_utc()),
        })
    }
}

/// A camera that never opens, for exercising device-open failures.
#[derive(Debug)]
pub struct NoCamera;

impl CameraSource for NoCamera {
    fn open(index: i32, _width: u32, _height: u32) -> Result<Self> {
        Err(Error::NotFound(format!("no camera at index {index}")))
    }

    fn list(_max_index: i32) -> Result<Vec<DeviceInfo>> {
        Ok(Vec::new())
    }

    fn read(&mut self) -> Result<Frame> {
        Err(Error::Unsupported("no camera"))
    }
}

/// Reports one marker centered in the frame and one undecoded candidate.
#[derive(Debug, Default)]
pub struct MockEngine {
    pub marker_id: u32,
    pub calls: u64,
}

impl MockEngine {
    pub fn reporting(marker_id: u32) -> Self {
        Self {
            marker_id,
            calls: 0,
        }
    }
}

fn centered_square(cx: f32, cy: f32, half: f32) -> Quad {
    Quad([
        Point2::new(cx - half, cy - half),
        Point2::new(cx + half, cy - half),
        Point2::new(cx + half, cy + half),
        Point2::new(cx - half, cy + half),
    ])
}

impl MarkerEngine for MockEngine {
    fn detect(
        &mut self,
        frame: &Frame,
        dictionaries: &[Dictionary],
        downscale: u32,
    ) -> Result<DetectionSet> {
        let Some(first) = dictionaries.first() else {
            return Err(Error::InvalidArgument("no dictionaries selected".into()));
        };
        self.calls += 1;
        let factor = downscale.max(1) as f32;
        let (w, h) = (frame.width as f32 / factor, frame.height as f32 / factor);
        let marker = centered_square(w / 2.0, h / 2.0, h / 8.0).scaled(factor);
        let rejected = centered_square(w / 8.0, h / 8.0, h / 16.0).scaled(factor);
        Ok(DetectionSet {
            markers: vec![MarkerHit {
                id: self.marker_id % first.capacity(),
                quad: marker,
                dictionary: *first,
            }],
            rejected: vec![rejected],
        })
    }

    fn render_marker(
        &mut self,
        dictionary: Dictionary,
        id: u32,
        side_px: u32,
        border_bits: u32,
    ) -> Result<Frame> {
        if id >= dictionary.capacity() {
            return Err(Error::InvalidArgument(format!(
                "id {id} outside {dictionary}"
            )));
        }
        let bits = dictionary.marker_bits();
        let cells = bits + 2 * border_bits;
        let mut frame = Frame::filled_gray(side_px, side_px, 255);
        for y in 0..side_px {
            for x in 0..side_px {
                let (cx, cy) = (x * cells / side_px, y * cells / side_px);
                let in_border = cx < border_bits
                    || cy < border_bits
                    || cx >= cells - border_bits
                    || cy >= cells - border_bits;
                let black = in_border || {
                    let bit = (cy - border_bits) * bits + (cx - border_bits);
                    (id.wrapping_mul(2_654_435_761) >> (bit % 32)) & 1 == 1
                };
                if black {
                    frame.data[(y * side_px + x) as usize] = 0;
                }
            }
        }
        Ok(frame)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Paste {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Polyline {
        points: Vec<Point2>,
        closed: bool,
        color: Color,
        thickness: i32,
    },
    Text {
        text: String,
        origin: (i32, i32),
        scale: f64,
        color: Color,
        thickness: i32,
    },
}

/// Canvas that records draw calls instead of rasterizing them.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordingCanvas {
    pub width: u32,
    pub height: u32,
    pub fill: Color,
    pub ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fill: Color::BLACK,
            ops: Vec::new(),
        }
    }

    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Canvas for RecordingCanvas {
    fn from_frame(frame: &Frame) -> Result<Self> {
        Ok(Self::new(frame.width, frame.height))
    }

    fn blank(width: u32, height: u32, fill: Color) -> Result<Self> {
        Ok(Self {
            fill,
            ..Self::new(width, height)
        })
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn paste(&mut self, image: &Frame, x: u32, y: u32) -> Result<()> {
        if x + image.width > self.width || y + image.height > self.height {
            return Err(Error::InvalidArgument("pasted image exceeds canvas".into()));
        }
        self.ops.push(DrawOp::Paste {
            x,
            y,
            width: image.width,
            height: image.height,
        });
        Ok(())
    }

    fn polyline(
        &mut self,
        points: &[Point2],
        closed: bool,
        color: Color,
        thickness: i32,
    ) -> Result<()> {
        self.ops.push(DrawOp::Polyline {
            points: points.to_vec(),
            closed,
            color,
            thickness,
        });
        Ok(())
    }

    fn text(
        &mut self,
        text: &str,
        origin: (i32, i32),
        scale: f64,
        color: Color,
        thickness: i32,
    ) -> Result<()> {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            origin,
            scale,
            color,
            thickness,
        });
        Ok(())
    }

    fn to_frame(&self) -> Result<Frame> {
        Ok(Frame::filled_gray(self.width, self.height, self.fill.g))
    }
}

/// Window fed from a key script; answers ESC once the script runs out.
#[derive(Debug, Default)]
pub struct MockWindow {
    keys: Vec<i32>,
    pub shown: Vec<RecordingCanvas>,
}

impl MockWindow {
    pub fn scripted(keys: impl IntoIterator<Item = i32>) -> Self {
        let mut keys: Vec<i32> = keys.into_iter().collect();
        keys.reverse();
        Self {
            keys,
            shown: Vec::new(),
        }
    }
}

impl Window for MockWindow {
    type Canvas = RecordingCanvas;

    fn show(&mut self, canvas: &RecordingCanvas) -> Result<()> {
        self.shown.push(canvas.clone());
        Ok(())
    }

    fn wait_key(&mut self, _timeout_ms: i32) -> Result<i32> {
        Ok(self.keys.pop().unwrap_or(27))
    }
}

/// No display at all; keys only arrive through the terminal or signals.
#[derive(Debug, Default)]
pub struct HeadlessWindow {
    pub frames: u64,
}

impl Window for HeadlessWindow {
    type Canvas = RecordingCanvas;

    fn show(&mut self, _canvas: &RecordingCanvas) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn wait_key(&mut self, timeout_ms: i32) -> Result<i32> {
        thread::sleep(Duration::from_millis(timeout_ms.max(1) as u64));
        Ok(-1)
    }
}

/// Keeps written images in memory; optionally fails every write.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    pub written: Vec<(PathBuf, Frame)>,
    fail: bool,
}

impl MemoryWriter {
    pub fn failing() -> Self {
        Self {
            written: Vec::new(),
            fail: true,
        }
    }
}

impl ImageWriter for MemoryWriter {
    fn write_png(&mut self, path: &Path, image: &Frame) -> Result<()> {
        if self.fail {
            return Err(Error::Io(format!("cannot write {}", path.display())));
        }
        self.written.push((path.to_path_buf(), image.clone()));
        Ok(())
    }
}
