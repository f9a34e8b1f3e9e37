//! Per-frame compositing: marker outlines, labels and the status line.

use crate::detection::{Detection, DetectionClass};
use crate::{Canvas, Color, Result};

pub const STATUS_ORIGIN: (i32, i32) = (10, 24);
const STATUS_SCALE: f64 = 0.6;
const LABEL_SCALE: f64 = 0.5;
const OUTLINE_THICKNESS: i32 = 2;

pub fn class_color(class: DetectionClass) -> Color {
    match class {
        DetectionClass::Accepted => Color::GREEN,
        DetectionClass::RejectedByPolicy => Color::RED,
        DetectionClass::Undecoded => Color::GRAY,
    }
}

pub fn label(detection: &Detection) -> String {
    match (detection.class, detection.id, detection.dictionary) {
        (DetectionClass::Accepted, Some(id), Some(dict)) => format!("id={id} {dict}"),
        (DetectionClass::Accepted, Some(id), None) => format!("id={id}"),
        (DetectionClass::RejectedByPolicy, Some(id), _) => format!("id={id} blocked"),
        _ => "?".to_string(),
    }
}

/// Text drawn with a dark outline under a bright fill.
pub fn draw_outlined_text<C: Canvas>(
    canvas: &mut C,
    text: &str,
    origin: (i32, i32),
    scale: f64,
    color: Color,
    thickness: i32,
) -> Result<()> {
    canvas.text(text, origin, scale, Color::BLACK, thickness + 2)?;
    canvas.text(text, origin, scale, color, thickness)
}

pub fn draw_detections<C: Canvas>(canvas: &mut C, detections: &[Detection]) -> Result<()> {
    for d in detections {
        let color = class_color(d.class);
        canvas.polyline(&d.quad.0, true, color, OUTLINE_THICKNESS)?;
        let c = d.quad.centroid();
        let text = label(d);
        // Roughly center the label; Hershey simplex glyphs are ~10px wide at 0.5.
        let x = c.x as i32 - (text.len() as i32 * 5);
        draw_outlined_text(canvas, &text, (x, c.y as i32), LABEL_SCALE, color, 1)?;
    }
    Ok(())
}

/// Contents of the status line.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub avg_ms: f64,
    pub avg_fps: f64,
    pub detections: usize,
    pub mode: String,
}

impl Status {
    pub fn line(&self) -> String {
        format!(
            "{:.1} ms | {:.1} fps | {} markers | {}",
            self.avg_ms, self.avg_fps, self.detections, self.mode
        )
    }
}

pub fn draw_status<C: Canvas>(canvas: &mut C, status: &Status) -> Result<()> {
    draw_outlined_text(
        canvas,
        &status.line(),
        STATUS_ORIGIN,
        STATUS_SCALE,
        Color::YELLOW,
        1,
    )
}
