//! marker-vision: ArUco detection and marker generation behind swappable
//! camera, detector and display backends.

mod types;
pub use types::{Color, DetectionSet, Frame, MarkerHit, PixelFormat, Point2, Quad};

mod error;
pub use error::{Error, Result};

mod traits;
pub use traits::{CameraSource, Canvas, DeviceInfo, ImageWriter, MarkerEngine, Window};

pub mod dictionary;
pub use dictionary::Dictionary;

pub mod keys;
pub use keys::{Arrow, KeyEvent};

pub mod stats;
pub use stats::FpsStats;

pub mod lifecycle;
pub use lifecycle::{Lifecycle, LifecycleOptions};

pub mod detection;
pub mod overlay;

pub mod capture;
pub use capture::{CaptureConfig, CaptureError, CaptureSession, DeviceSelection};

pub mod generator;
pub use generator::GeneratorState;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "opencv")]
mod opencv_backend;
#[cfg(feature = "opencv")]
pub use opencv_backend::{ArucoEngine, HighGuiWindow, MatCanvas, OpenCvCamera, OpenCvImageWriter};

#[cfg(feature = "opencv")]
pub mod io;
