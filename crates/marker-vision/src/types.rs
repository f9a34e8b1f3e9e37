use time::OffsetDateTime;

use crate::dictionary::Dictionary;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Bgr8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
    pub ts: Option<OffsetDateTime>,
}

impl Frame {
    /// A frame filled with a single gray level.
    pub fn filled_gray(width: u32, height: u32, level: u8) -> Self {
        Self {
            width,
            height,
            pixel_format: PixelFormat::Gray8,
            data: vec![level; (width * height) as usize],
            ts: None,
        }
    }

    /// True when the buffer length matches the declared geometry.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * self.pixel_format.channels()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Four marker corners in image coordinates, clockwise from top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad(pub [Point2; 4]);

impl Quad {
    pub fn centroid(&self) -> Point2 {
        let (sx, sy) = self
            .0
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point2::new(sx / 4.0, sy / 4.0)
    }

    /// Map corners found on a downscaled frame back to full resolution.
    pub fn scaled(&self, factor: f32) -> Self {
        let mut pts = self.0;
        for p in pts.iter_mut() {
            p.x *= factor;
            p.y *= factor;
        }
        Quad(pts)
    }
}

/// 8-bit BGR color, the channel order the display backend draws with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { b, g, r }
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const RED: Color = Color::rgb(255, 40, 40);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const GRAY: Color = Color::rgb(160, 160, 160);
    pub const LIGHT_GRAY: Color = Color::rgb(200, 200, 200);
}

/// A decoded marker as reported by the engine, before any policy is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerHit {
    pub id: u32,
    pub quad: Quad,
    pub dictionary: Dictionary,
}

/// Raw engine output for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    pub markers: Vec<MarkerHit>,
    /// Candidates that passed shape filtering but decoded to no dictionary entry.
    pub rejected: Vec<Quad>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32, s: f32) -> Quad {
        Quad([
            Point2::new(x, y),
            Point2::new(x + s, y),
            Point2::new(x + s, y + s),
            Point2::new(x, y + s),
        ])
    }

    #[test]
    fn centroid_of_square() {
        let c = square(10.0, 20.0, 4.0).centroid();
        assert_eq!(c, Point2::new(12.0, 22.0));
    }

    #[test]
    fn scaled_quad_maps_back_to_full_resolution() {
        let q = square(5.0, 5.0, 10.0).scaled(2.0);
        assert_eq!(q.0[0], Point2::new(10.0, 10.0));
        assert_eq!(q.0[2], Point2::new(30.0, 30.0));
    }

    #[test]
    fn gray_frame_is_consistent() {
        let f = Frame::filled_gray(8, 4, 255);
        assert!(f.is_consistent());
        assert_eq!(f.data.len(), 32);
    }
}
