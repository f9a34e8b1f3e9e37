//! Conversions between `Frame` buffers and OpenCV matrices, and PNG output.

use std::path::Path;

use opencv::{core, imgcodecs, imgproc, prelude::*};

use crate::{Error, Frame, PixelFormat, Result};

/// Copy a frame into an owned OpenCV matrix with the frame's channel count.
pub fn frame_to_mat(frame: &Frame) -> Result<core::Mat> {
    if !frame.is_consistent() {
        return Err(Error::Backend("frame buffer does not match its size".into()));
    }
    let channels = frame.pixel_format.channels() as i32;
    let flat = core::Mat::from_slice(&frame.data)?;
    let shaped = flat.reshape(channels, frame.height as i32)?;
    Ok(shaped.try_clone()?)
}

/// Copy a gray, BGR or BGRA matrix into a frame (BGRA loses its alpha).
pub fn mat_to_frame(mat: &core::Mat) -> Result<Frame> {
    if mat.empty() {
        return Err(Error::Io("empty frame".into()));
    }
    let mut converted = core::Mat::default();
    let (src, pixel_format) = match mat.channels() {
        1 => (mat, PixelFormat::Gray8),
        3 => (mat, PixelFormat::Bgr8),
        4 => {
            imgproc::cvt_color(mat, &mut converted, imgproc::COLOR_BGRA2BGR, 0)?;
            (&converted, PixelFormat::Bgr8)
        }
        n => return Err(Error::Backend(format!("unsupported channel count {n}"))),
    };
    // Continuous layout is required for a flat copy.
    let data = if src.is_continuous() {
        src.data_bytes()?.to_vec()
    } else {
        src.try_clone()?.data_bytes()?.to_vec()
    };
    Ok(Frame {
        width: src.cols() as u32,
        height: src.rows() as u32,
        pixel_format,
        data,
        ts: None,
    })
}

/// Gray view of a frame for the detector.
pub fn frame_to_gray(frame: &Frame) -> Result<core::Mat> {
    let mat = frame_to_mat(frame)?;
    let code = match frame.pixel_format {
        PixelFormat::Gray8 => return Ok(mat),
        PixelFormat::Bgr8 => imgproc::COLOR_BGR2GRAY,
        PixelFormat::Rgb8 => imgproc::COLOR_RGB2GRAY,
    };
    let mut gray = core::Mat::default();
    imgproc::cvt_color(&mat, &mut gray, code, 0)?;
    Ok(gray)
}

/// BGR view of a frame for drawing and display.
pub fn frame_to_bgr(frame: &Frame) -> Result<core::Mat> {
    let mat = frame_to_mat(frame)?;
    let code = match frame.pixel_format {
        PixelFormat::Bgr8 => return Ok(mat),
        PixelFormat::Gray8 => imgproc::COLOR_GRAY2BGR,
        PixelFormat::Rgb8 => imgproc::COLOR_RGB2BGR,
    };
    let mut bgr = core::Mat::default();
    imgproc::cvt_color(&mat, &mut bgr, code, 0)?;
    Ok(bgr)
}

pub fn write_png(path: &Path, frame: &Frame) -> Result<()> {
    let mat = match frame.pixel_format {
        PixelFormat::Gray8 => frame_to_mat(frame)?,
        _ => frame_to_bgr(frame)?,
    };
    let target = path.to_string_lossy();
    let ok = imgcodecs::imwrite(&target, &mat, &core::Vector::<i32>::new())?;
    if !ok {
        return Err(Error::Io(format!("could not write {target}")));
    }
    Ok(())
}
