use std::collections::HashMap;
use std::path::Path;

use opencv::prelude::*;
use opencv::{core, highgui, imgproc, objdetect, videoio};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::dictionary::Dictionary;
use crate::{
    io, CameraSource, Canvas, Color, DetectionSet, DeviceInfo, Error, Frame, ImageWriter,
    MarkerEngine, MarkerHit, Point2, Quad, Result, Window,
};

pub struct OpenCvCamera {
    cap: videoio::VideoCapture,
}

impl CameraSource for OpenCvCamera {
    fn open(index: i32, width: u32, height: u32) -> Result<Self> {
        let mut cap = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        let opened = videoio::VideoCapture::is_opened(&cap)?;
        if !opened {
            return Err(Error::NotFound(format!("video device {index}")));
        }
        // Drivers may ignore the request; frames carry their real size.
        cap.set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(width))?;
        cap.set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(height))?;
        info!(
            index,
            backend = %cap.get_backend_name().unwrap_or_default(),
            width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or_default(),
            height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or_default(),
            "camera opened"
        );
        Ok(Self { cap })
    }

    fn list(max_index: i32) -> Result<Vec<DeviceInfo>> {
        let mut found = Vec::new();
        for index in 0..max_index {
            let cap = match videoio::VideoCapture::new(index, videoio::CAP_ANY) {
                Ok(cap) => cap,
                Err(e) => {
                    debug!(index, "probe failed: {e}");
                    continue;
                }
            };
            if !cap.is_opened().unwrap_or(false) {
                continue;
            }
            found.push(DeviceInfo {
                index,
                backend: cap.get_backend_name().unwrap_or_else(|_| "unknown".into()),
                width: cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32,
                height: cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32,
            });
        }
        Ok(found)
    }

    fn read(&mut self) -> Result<Frame> {
        let mut mat = core::Mat::default();
        let grabbed = self.cap.read(&mut mat)?;
        if !grabbed || mat.empty() {
            return Err(Error::Io("empty frame".into()));
        }
        let mut frame = io::mat_to_frame(&mat)?;
        frame.ts = Some(OffsetDateTime::now_utc());
        Ok(frame)
    }
}

fn predefined(d: Dictionary) -> objdetect::PredefinedDictionaryType {
    use objdetect::PredefinedDictionaryType as P;
    match d {
        Dictionary::Dict4x4_50 => P::DICT_4X4_50,
        Dictionary::Dict4x4_100 => P::DICT_4X4_100,
        Dictionary::Dict4x4_250 => P::DICT_4X4_250,
        Dictionary::Dict4x4_1000 => P::DICT_4X4_1000,
        Dictionary::Dict5x5_50 => P::DICT_5X5_50,
        Dictionary::Dict5x5_100 => P::DICT_5X5_100,
        Dictionary::Dict5x5_250 => P::DICT_5X5_250,
        Dictionary::Dict5x5_1000 => P::DICT_5X5_1000,
        Dictionary::Dict6x6_50 => P::DICT_6X6_50,
        Dictionary::Dict6x6_100 => P::DICT_6X6_100,
        Dictionary::Dict6x6_250 => P::DICT_6X6_250,
        Dictionary::Dict6x6_1000 => P::DICT_6X6_1000,
        Dictionary::Dict7x7_50 => P::DICT_7X7_50,
        Dictionary::Dict7x7_100 => P::DICT_7X7_100,
        Dictionary::Dict7x7_250 => P::DICT_7X7_250,
        Dictionary::Dict7x7_1000 => P::DICT_7X7_1000,
        Dictionary::ArucoOriginal => P::DICT_ARUCO_ORIGINAL,
    }
}

fn to_quad(corners: &core::Vector<core::Point2f>, factor: f32) -> Result<Quad> {
    if corners.len() != 4 {
        return Err(Error::Backend(format!(
            "expected 4 marker corners, got {}",
            corners.len()
        )));
    }
    let mut pts = [Point2::default(); 4];
    for (i, p) in corners.iter().enumerate() {
        pts[i] = Point2::new(p.x, p.y);
    }
    Ok(Quad(pts).scaled(factor))
}

/// OpenCV ArUco detection and marker rendering, one detector per dictionary.
#[derive(Default)]
pub struct ArucoEngine {
    dictionaries: HashMap<Dictionary, objdetect::Dictionary>,
    detectors: HashMap<Dictionary, objdetect::ArucoDetector>,
}

impl ArucoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn dictionary(&mut self, d: Dictionary) -> Result<&objdetect::Dictionary> {
        if !self.dictionaries.contains_key(&d) {
            let dict = objdetect::get_predefined_dictionary(predefined(d))?;
            self.dictionaries.insert(d, dict);
        }
        self.dictionaries
            .get(&d)
            .ok_or(Error::Backend("dictionary cache miss".into()))
    }

    fn detector(&mut self, d: Dictionary) -> Result<&objdetect::ArucoDetector> {
        if !self.detectors.contains_key(&d) {
            let params = objdetect::DetectorParameters::default()?;
            let refine = objdetect::RefineParameters::new(10.0, 3.0, true)?;
            let detector = objdetect::ArucoDetector::new(self.dictionary(d)?, &params, refine)?;
            debug!(dictionary = %d, "created ArUco detector");
            self.detectors.insert(d, detector);
        }
        self.detectors
            .get(&d)
            .ok_or(Error::Backend("detector cache miss".into()))
    }
}

impl MarkerEngine for ArucoEngine {
    fn detect(
        &mut self,
        frame: &Frame,
        dictionaries: &[Dictionary],
        downscale: u32,
    ) -> Result<DetectionSet> {
        if dictionaries.is_empty() {
            return Err(Error::InvalidArgument("no dictionaries selected".into()));
        }
        let gray = io::frame_to_gray(frame)?;
        let factor = downscale.max(1) as i32;
        let input = if factor > 1 {
            let mut small = core::Mat::default();
            let size = core::Size::new(gray.cols() / factor, gray.rows() / factor);
            imgproc::resize(&gray, &mut small, size, 0.0, 0.0, imgproc::INTER_AREA)?;
            small
        } else {
            gray
        };

        let mut set = DetectionSet::default();
        for d in dictionaries {
            let detector = self.detector(*d)?;
            let mut corners = core::Vector::<core::Vector<core::Point2f>>::new();
            let mut ids = core::Vector::<i32>::new();
            let mut rejected = core::Vector::<core::Vector<core::Point2f>>::new();
            detector.detect_markers(&input, &mut corners, &mut ids, &mut rejected)?;
            for (id, quad) in ids.iter().zip(corners.iter()) {
                set.markers.push(MarkerHit {
                    id: id as u32,
                    quad: to_quad(&quad, factor as f32)?,
                    dictionary: *d,
                });
            }
            for quad in rejected.iter() {
                set.rejected.push(to_quad(&quad, factor as f32)?);
            }
        }
        Ok(set)
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
        let dict = self.dictionary(dictionary)?;
        let mut img = core::Mat::default();
        objdetect::generate_image_marker(
            dict,
            id as i32,
            side_px as i32,
            &mut img,
            border_bits as i32,
        )?;
        io::mat_to_frame(&img)
    }
}

fn scalar(c: Color) -> core::Scalar {
    core::Scalar::new(f64::from(c.b), f64::from(c.g), f64::from(c.r), 0.0)
}

/// A BGR OpenCV matrix used as the drawing surface.
pub struct MatCanvas(pub core::Mat);

impl Canvas for MatCanvas {
    fn from_frame(frame: &Frame) -> Result<Self> {
        Ok(Self(io::frame_to_bgr(frame)?))
    }

    fn blank(width: u32, height: u32, fill: Color) -> Result<Self> {
        let mat = core::Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            core::CV_8UC3,
            scalar(fill),
        )?;
        Ok(Self(mat))
    }

    fn width(&self) -> u32 {
        self.0.cols() as u32
    }

    fn height(&self) -> u32 {
        self.0.rows() as u32
    }

    fn paste(&mut self, image: &Frame, x: u32, y: u32) -> Result<()> {
        let src = io::frame_to_bgr(image)?;
        let rect = core::Rect::new(x as i32, y as i32, image.width as i32, image.height as i32);
        let mut roi = core::Mat::roi_mut(&mut self.0, rect)?;
        src.copy_to(&mut *roi)?;
        Ok(())
    }

    fn polyline(
        &mut self,
        points: &[Point2],
        closed: bool,
        color: Color,
        thickness: i32,
    ) -> Result<()> {
        let pts: core::Vector<core::Point> = points
            .iter()
            .map(|p| core::Point::new(p.x.round() as i32, p.y.round() as i32))
            .collect();
        let mut contours = core::Vector::<core::Vector<core::Point>>::new();
        contours.push(pts);
        imgproc::polylines(
            &mut self.0,
            &contours,
            closed,
            scalar(color),
            thickness,
            imgproc::LINE_AA,
            0,
        )?;
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
        imgproc::put_text(
            &mut self.0,
            text,
            core::Point::new(origin.0, origin.1),
            imgproc::FONT_HERSHEY_SIMPLEX,
            scale,
            scalar(color),
            thickness,
            imgproc::LINE_AA,
            false,
        )?;
        Ok(())
    }

    fn to_frame(&self) -> Result<Frame> {
        io::mat_to_frame(&self.0)
    }
}

/// A HighGUI window, destroyed on drop.
pub struct HighGuiWindow {
    name: String,
}

impl HighGuiWindow {
    pub fn open(name: &str) -> Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: name.to_string(),
        })
    }
}

impl Window for HighGuiWindow {
    type Canvas = MatCanvas;

    fn show(&mut self, canvas: &MatCanvas) -> Result<()> {
        highgui::imshow(&self.name, &canvas.0)?;
        Ok(())
    }

    fn wait_key(&mut self, timeout_ms: i32) -> Result<i32> {
        // Extended codes keep arrows distinguishable from letters.
        Ok(highgui::wait_key_ex(timeout_ms)?)
    }
}

impl Drop for HighGuiWindow {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.name);
    }
}

/// PNG output through `imgcodecs`.
#[derive(Debug, Default)]
pub struct OpenCvImageWriter;

impl ImageWriter for OpenCvImageWriter {
    fn write_png(&mut self, path: &Path, image: &Frame) -> Result<()> {
        io::write_png(path, image)
    }
}
