//! Interactive marker generator: hotkey-driven state, rendering and saving.

use std::path::PathBuf;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::dictionary::{self, Dictionary};
use crate::keys::{Arrow, KeyEvent};
use crate::lifecycle::Lifecycle;
use crate::overlay::draw_outlined_text;
use crate::{Canvas, Color, Frame, ImageWriter, MarkerEngine, PixelFormat, Result, Window};

pub const MIN_SIZE: u32 = 50;
pub const MAX_SIZE: u32 = 4096;
pub const SIZE_STEP: u32 = 50;
pub const MAX_BORDER_BITS: u32 = 7;
pub const DEFAULT_SIZE: u32 = 300;
pub const DEFAULT_BORDER_BITS: u32 = 1;

const LINE_HEIGHT: i32 = 20;
const BASE_LINES: i32 = 6;
const HELP_LINES: i32 = 4;
const INFO_SCALE: f64 = 0.5;
const FLASH_SCALE: f64 = 0.6;
const POLL_MS: i32 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GeneratorCommand {
    PrevDictionary,
    NextDictionary,
    PrevId,
    NextId,
    SizeUp,
    SizeDown,
    BorderDown,
    BorderUp,
    RandomId,
    ToggleHelp,
    Save,
    Quit,
}

impl GeneratorCommand {
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        if let Some(arrow) = key.arrow() {
            return Some(match arrow {
                Arrow::Left => Self::PrevId,
                Arrow::Right => Self::NextId,
                Arrow::Up => Self::SizeUp,
                Arrow::Down => Self::SizeDown,
            });
        }
        match key.char()? {
            27 | b'q' | b'Q' => Some(Self::Quit),
            b'h' | b'H' => Some(Self::ToggleHelp),
            b'd' => Some(Self::PrevDictionary),
            b'D' => Some(Self::NextDictionary),
            b',' => Some(Self::PrevId),
            b'.' => Some(Self::NextId),
            b'[' => Some(Self::BorderDown),
            b']' => Some(Self::BorderUp),
            b'r' | b'R' => Some(Self::RandomId),
            b's' | b'S' => Some(Self::Save),
            _ => None,
        }
    }
}

/// Transient message shown under the info panel until the next command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flash {
    Saved(PathBuf),
    SaveFailed(String),
}

impl Flash {
    pub fn text(&self) -> String {
        match self {
            Flash::Saved(p) => format!("Saved: {}", p.display()),
            Flash::SaveFailed(reason) => format!("Save failed: {reason}"),
        }
    }

    fn color(&self) -> Color {
        match self {
            Flash::Saved(_) => Color::YELLOW,
            Flash::SaveFailed(_) => Color::RED,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratorState {
    dict_index: usize,
    marker_id: u32,
    marker_size: u32,
    border_bits: u32,
    output: Option<PathBuf>,
    show_help: bool,
    flash: Option<Flash>,
}

impl Default for GeneratorState {
    fn default() -> Self {
        Self {
            dict_index: dictionary::DEFAULT_INDEX,
            marker_id: 0,
            marker_size: DEFAULT_SIZE,
            border_bits: DEFAULT_BORDER_BITS,
            output: None,
            show_help: true,
            flash: None,
        }
    }
}

impl GeneratorState {
    /// Build a state from user input, clamping every field into range.
    pub fn new(
        dict_index: usize,
        marker_id: u32,
        marker_size: u32,
        border_bits: u32,
        output: Option<PathBuf>,
    ) -> Self {
        let dict_index = dict_index.min(dictionary::ALL.len() - 1);
        let mut s = Self {
            dict_index,
            marker_id,
            marker_size: marker_size.clamp(MIN_SIZE, MAX_SIZE),
            border_bits: border_bits.min(MAX_BORDER_BITS),
            output,
            ..Self::default()
        };
        s.clamp_id();
        if s.marker_id != marker_id {
            warn!(
                requested = marker_id,
                used = s.marker_id,
                "marker id out of range for {}",
                s.dictionary()
            );
        }
        s
    }

    pub fn dictionary(&self) -> Dictionary {
        dictionary::ALL[self.dict_index]
    }

    pub fn dict_index(&self) -> usize {
        self.dict_index
    }

    pub fn marker_id(&self) -> u32 {
        self.marker_id
    }

    pub fn marker_size(&self) -> u32 {
        self.marker_size
    }

    pub fn border_bits(&self) -> u32 {
        self.border_bits
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn flash(&self) -> Option<&Flash> {
        self.flash.as_ref()
    }

    fn capacity(&self) -> u32 {
        self.dictionary().capacity()
    }

    fn clamp_id(&mut self) {
        self.marker_id = self.marker_id.min(self.capacity() - 1);
    }

    /// Apply every command except `Save` and `Quit`, which need collaborators.
    /// Returns whether the display must be re-rendered.
    pub fn apply<R: Rng + ?Sized>(&mut self, cmd: GeneratorCommand, rng: &mut R) -> bool {
        if matches!(cmd, GeneratorCommand::Save | GeneratorCommand::Quit) {
            return false;
        }
        self.flash = None;
        match cmd {
            GeneratorCommand::PrevDictionary => {
                self.dict_index = Dictionary::cycled(self.dict_index, -1);
                self.clamp_id();
            }
            GeneratorCommand::NextDictionary => {
                self.dict_index = Dictionary::cycled(self.dict_index, 1);
                self.clamp_id();
            }
            GeneratorCommand::PrevId => {
                self.marker_id = match self.marker_id {
                    0 => self.capacity() - 1,
                    id => id - 1,
                };
            }
            GeneratorCommand::NextId => self.marker_id = (self.marker_id + 1) % self.capacity(),
            GeneratorCommand::SizeUp => {
                self.marker_size = (self.marker_size + SIZE_STEP).min(MAX_SIZE)
            }
            GeneratorCommand::SizeDown => {
                self.marker_size = self.marker_size.saturating_sub(SIZE_STEP).max(MIN_SIZE)
            }
            GeneratorCommand::BorderDown => self.border_bits = self.border_bits.saturating_sub(1),
            GeneratorCommand::BorderUp => {
                self.border_bits = (self.border_bits + 1).min(MAX_BORDER_BITS)
            }
            GeneratorCommand::RandomId => self.marker_id = rng.gen_range(0..self.capacity()),
            GeneratorCommand::ToggleHelp => self.show_help = !self.show_help,
            GeneratorCommand::Save | GeneratorCommand::Quit => {}
        }
        debug!(
            dict = %self.dictionary(),
            id = self.marker_id,
            size = self.marker_size,
            border = self.border_bits,
            "generator state changed"
        );
        true
    }

    /// `marker_<DICT>_id<id>_<size>px_bb<border>.png`
    pub fn auto_file_name(&self) -> String {
        format!(
            "marker_{}_id{}_{}px_bb{}.png",
            self.dictionary().name(),
            self.marker_id,
            self.marker_size,
            self.border_bits
        )
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.auto_file_name()))
    }

    /// White padding around the marker so it never touches the image edge.
    pub fn margin(&self) -> u32 {
        (self.marker_size / 5).max(30)
    }

    pub fn panel_height(&self) -> u32 {
        let extra = if self.show_help { HELP_LINES } else { 0 };
        (10 + (BASE_LINES + extra) * LINE_HEIGHT + 10) as u32
    }

    /// Info panel lines with their fill colors.
    pub fn info_lines(&self) -> Vec<(String, Color)> {
        let dict = self.dictionary();
        let mut lines = vec![
            ("ArUco Marker Generator (GUI)".to_string(), Color::WHITE),
            (format!("Dict: {}  (d/D prev/next)", dict.name()), Color::GREEN),
            (
                format!(
                    "ID: {} / {}  (Left/Right; r=random)",
                    self.marker_id,
                    dict.capacity() - 1
                ),
                Color::GREEN,
            ),
            (format!("Size: {} px  (Up/Down)", self.marker_size), Color::GREEN),
            (format!("Border: {}  ([/])", self.border_bits), Color::GREEN),
            (
                match &self.output {
                    Some(p) => format!("Save: s -> {}", p.display()),
                    None => "Save: s -> auto name in CWD".to_string(),
                },
                Color::GREEN,
            ),
        ];
        if self.show_help {
            for text in [
                "Keys: Left/Right ID  | Up/Down Size  | [/ ] Border",
                "      d/D Prev/Next Dict | r Random ID | s Save PNG",
                "      h Toggle Help | q/ESC Quit",
            ] {
                lines.push((text.to_string(), Color::LIGHT_GRAY));
            }
        }
        lines
    }

    /// The marker on its white background, as written to disk.
    pub fn render<E: MarkerEngine>(&self, engine: &mut E) -> Result<Frame> {
        let marker = engine.render_marker(
            self.dictionary(),
            self.marker_id,
            self.marker_size,
            self.border_bits,
        )?;
        pad_gray(&marker, self.margin())
    }

    /// Full display canvas: padded marker above the info panel.
    pub fn compose<C: Canvas, E: MarkerEngine>(&self, engine: &mut E) -> Result<C> {
        let padded = self.render(engine)?;
        let mut canvas = C::blank(
            padded.width,
            padded.height + self.panel_height(),
            Color::WHITE,
        )?;
        canvas.paste(&padded, 0, 0)?;

        let mut y = padded.height as i32 + LINE_HEIGHT;
        for (i, (text, color)) in self.info_lines().iter().enumerate() {
            if i == BASE_LINES as usize {
                y += LINE_HEIGHT / 2;
            }
            draw_outlined_text(&mut canvas, text, (10, y), INFO_SCALE, *color, 1)?;
            y += LINE_HEIGHT;
        }

        if let Some(flash) = &self.flash {
            let origin = (10, canvas.height() as i32 - 10);
            canvas.text(&flash.text(), origin, FLASH_SCALE, Color::BLACK, 3)?;
            canvas.text(&flash.text(), origin, FLASH_SCALE, flash.color(), 2)?;
        }
        Ok(canvas)
    }

    /// Render and write the current marker. The outcome is kept as the flash message.
    pub fn save<E: MarkerEngine, W: ImageWriter>(
        &mut self,
        engine: &mut E,
        writer: &mut W,
    ) -> Result<PathBuf> {
        let path = self.output_path();
        let outcome = self
            .render(engine)
            .and_then(|img| writer.write_png(&path, &img));
        match outcome {
            Ok(()) => {
                info!(path = %path.display(), "saved marker");
                self.flash = Some(Flash::Saved(path.clone()));
                Ok(path)
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to save marker: {e}");
                self.flash = Some(Flash::SaveFailed(e.to_string()));
                Err(e)
            }
        }
    }
}

/// Copy a gray image onto a larger white image with `margin` on every side.
pub fn pad_gray(image: &Frame, margin: u32) -> Result<Frame> {
    if image.pixel_format != PixelFormat::Gray8 || !image.is_consistent() {
        return Err(crate::Error::InvalidArgument(
            "marker image must be a consistent Gray8 frame".into(),
        ));
    }
    let width = image.width + 2 * margin;
    let height = image.height + 2 * margin;
    let mut out = Frame::filled_gray(width, height, 255);
    let (w, m) = (image.width as usize, margin as usize);
    for (row, src) in image.data.chunks_exact(w).enumerate() {
        let start = (row + m) * width as usize + m;
        out.data[start..start + w].copy_from_slice(src);
    }
    out.ts = image.ts;
    Ok(out)
}

/// Drive the generator window until the user quits or a shutdown signal arrives.
pub fn run<E, W, I, R>(
    state: &mut GeneratorState,
    engine: &mut E,
    window: &mut W,
    writer: &mut I,
    rng: &mut R,
    lifecycle: &Lifecycle,
) -> Result<()>
where
    E: MarkerEngine,
    W: Window,
    I: ImageWriter,
    R: Rng + ?Sized,
{
    let mut redraw = true;
    loop {
        if lifecycle.shutdown_requested() {
            info!("generator stopping on shutdown signal");
            break;
        }
        if redraw {
            let canvas: W::Canvas = state.compose(engine)?;
            window.show(&canvas)?;
            redraw = false;
        }
        let Some(key) = KeyEvent::from_window_code(window.wait_key(POLL_MS)?) else {
            continue;
        };
        match GeneratorCommand::from_key(key) {
            Some(GeneratorCommand::Quit) => break,
            Some(GeneratorCommand::Save) => {
                // Failures are already logged and shown in the flash line.
                let _ = state.save(engine, writer);
                redraw = true;
            }
            Some(cmd) => redraw = state.apply(cmd, rng),
            None => {}
        }
    }
    Ok(())
}
