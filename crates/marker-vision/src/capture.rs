//! Capture tool plumbing: device selection, JSON configuration and the
//! poll-driven capture/detect/display loop.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detection::{
    classify, AcceptPolicy, CaptureHotkey, Detection, DetectionClass, DetectionSettings,
};
use crate::dictionary::{self, Dictionary};
use crate::keys::KeyEvent;
use crate::lifecycle::{Lifecycle, LifecycleOptions};
use crate::overlay::{self, Status};
use crate::stats::FpsStats;
use crate::{CameraSource, Canvas, Error, ImageWriter, MarkerEngine, Result, Window};

/// Highest index probed by `--list`.
pub const LIST_PROBE_MAX: i32 = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceSelection {
    /// Try index 0, then 1.
    Auto,
    Index(i32),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid device index '{0}': expected 0 or 1")]
    InvalidDevice(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to open camera {index}: {source}")]
    OpenFailed {
        index: i32,
        #[source]
        source: Error,
    },
    #[error("no camera found on index 0 or 1")]
    NoCamera,
    #[error("{0} backend not enabled at compile time; rebuild with --features opencv")]
    BackendUnavailable(&'static str),
    #[error(transparent)]
    Runtime(#[from] Error),
}

impl CaptureError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CaptureError::OpenFailed { .. }
            | CaptureError::BackendUnavailable(_)
            | CaptureError::Runtime(_) => 1,
            CaptureError::InvalidDevice(_) | CaptureError::InvalidArgument(_) => 2,
            CaptureError::NoCamera => 3,
        }
    }
}

pub fn parse_device_arg(arg: Option<&str>) -> Result<DeviceSelection, CaptureError> {
    match arg.map(str::trim) {
        None => Ok(DeviceSelection::Auto),
        Some("0") => Ok(DeviceSelection::Index(0)),
        Some("1") => Ok(DeviceSelection::Index(1)),
        Some(other) => Err(CaptureError::InvalidDevice(other.to_string())),
    }
}

/// Open the selected camera, returning it with the index that worked.
pub fn open_camera<C: CameraSource>(
    selection: DeviceSelection,
    width: u32,
    height: u32,
) -> Result<(C, i32), CaptureError> {
    match selection {
        DeviceSelection::Index(index) => C::open(index, width, height)
            .map(|cam| (cam, index))
            .map_err(|source| CaptureError::OpenFailed { index, source }),
        DeviceSelection::Auto => {
            for index in [0, 1] {
                match C::open(index, width, height) {
                    Ok(cam) => return Ok((cam, index)),
                    Err(e) => debug!(index, "camera probe failed: {e}"),
                }
            }
            Err(CaptureError::NoCamera)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    /// Primary dictionary index into the catalog.
    pub dictionary: usize,
    pub all_dictionaries: bool,
    pub allow_ids: Option<Vec<u32>>,
    pub downscale: u32,
    pub frame_skip: u32,
    pub print_ids: bool,
    /// Key wait per frame in milliseconds.
    pub wait_ms: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            dictionary: dictionary::DEFAULT_INDEX,
            all_dictionaries: false,
            allow_ids: None,
            downscale: 1,
            frame_skip: 1,
            print_ids: false,
            wait_ms: 1,
        }
    }
}

impl CaptureConfig {
    /// Load from `path`, writing the defaults there first if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)
                .map_err(|e| Error::InvalidArgument(format!("{}: {e}", path.display())))
        } else {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "wrote default capture config");
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn primary(&self) -> Result<Dictionary, CaptureError> {
        Dictionary::from_index(self.dictionary).ok_or_else(|| {
            CaptureError::InvalidArgument(format!(
                "dictionary index {} out of range 0..{}",
                self.dictionary,
                dictionary::ALL.len()
            ))
        })
    }

    pub fn settings(&self) -> Result<DetectionSettings, CaptureError> {
        let mut s = DetectionSettings::new(self.primary()?).with_cycles(self.downscale, self.frame_skip);
        s.all_dictionaries = self.all_dictionaries;
        Ok(s)
    }

    pub fn policy(&self) -> AcceptPolicy {
        match &self.allow_ids {
            Some(ids) => AcceptPolicy::allow_only(ids.iter().copied()),
            None => AcceptPolicy::accept_all(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EndReason {
    #[default]
    UserQuit,
    Signal,
    EndOfStream,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub detection_runs: u64,
    pub snapshots: Vec<PathBuf>,
    pub end: EndReason,
}

/// One camera, one engine, one window; everything runs on the calling thread.
pub struct CaptureSession<C, E, W, I> {
    camera: C,
    engine: E,
    window: W,
    writer: I,
    settings: DetectionSettings,
    policy: AcceptPolicy,
    stats: FpsStats,
    print_ids: bool,
    id_out: Box<dyn Write>,
    wait_ms: i32,
    last: Vec<Detection>,
    frame_index: u64,
}

impl<C, E, W, I> CaptureSession<C, E, W, I>
where
    C: CameraSource,
    E: MarkerEngine,
    W: Window,
    I: ImageWriter,
{
    pub fn new(
        camera: C,
        engine: E,
        window: W,
        writer: I,
        settings: DetectionSettings,
        policy: AcceptPolicy,
    ) -> Self {
        Self {
            camera,
            engine,
            window,
            writer,
            settings,
            policy,
            stats: FpsStats::new(),
            print_ids: false,
            id_out: Box::new(std::io::stdout()),
            wait_ms: 1,
            last: Vec::new(),
            frame_index: 0,
        }
    }

    pub fn with_print_ids(mut self, on: bool) -> Self {
        self.print_ids = on;
        self
    }

    /// Destination for `--print-ids` lines (stdout by default).
    pub fn with_id_output(mut self, out: impl Write + 'static) -> Self {
        self.id_out = Box::new(out);
        self
    }

    pub fn with_wait_ms(mut self, ms: i32) -> Self {
        self.wait_ms = ms.max(1);
        self
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    /// Run until a quit key, a shutdown signal, or the end of the stream.
    pub fn run(&mut self, lifecycle: &Lifecycle) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();
        loop {
            if lifecycle.shutdown_requested() {
                summary.end = EndReason::Signal;
                break;
            }
            let frame = match self.camera.read() {
                Ok(f) => f,
                Err(e) => {
                    info!("capture ended: {e}");
                    summary.end = EndReason::EndOfStream;
                    break;
                }
            };

            let started = Instant::now();
            if self.settings.should_detect(self.frame_index) {
                let dictionaries = self.settings.dictionaries();
                let set = self
                    .engine
                    .detect(&frame, &dictionaries, self.settings.downscale())?;
                self.last = classify(set, &self.policy, self.settings.show_undecoded);
                summary.detection_runs += 1;
                if self.print_ids {
                    self.write_ids(line_ending(lifecycle.raw_terminal_active()));
                }
            }

            let mut canvas = W::Canvas::from_frame(&frame)?;
            overlay::draw_detections(&mut canvas, &self.last)?;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let status = Status {
                avg_ms: self.stats.update_avg_ms(elapsed_ms),
                avg_fps: self.stats.tick_fps(),
                detections: self.last.iter().filter(|d| d.id.is_some()).count(),
                mode: self.settings.mode(),
            };
            overlay::draw_status(&mut canvas, &status)?;
            self.window.show(&canvas)?;
            self.frame_index += 1;
            summary.frames += 1;

            let decision = lifecycle.route(self.window.wait_key(self.wait_ms)?);
            if decision.exit {
                summary.end = if decision.hotkey == Some(KeyEvent::SignalRaised) {
                    EndReason::Signal
                } else {
                    EndReason::UserQuit
                };
                break;
            }
            match decision.hotkey.and_then(CaptureHotkey::from_key) {
                Some(CaptureHotkey::Snapshot) => {
                    if let Some(path) = self.snapshot(&canvas) {
                        summary.snapshots.push(path);
                    }
                }
                Some(key) => {
                    self.settings.apply(key);
                    info!(mode = %self.settings.mode(), "detection settings changed");
                }
                None => {}
            }
        }
        info!(
            frames = summary.frames,
            avg_ms = self.stats.avg_ms(),
            avg_fps = self.stats.avg_fps(),
            "capture stopped"
        );
        Ok(summary)
    }

    fn write_ids(&mut self, eol: &str) {
        for d in &self.last {
            if let (DetectionClass::Accepted, Some(id)) = (d.class, d.id) {
                let dict = d.dictionary.map(Dictionary::name).unwrap_or("?");
                if let Err(e) = write!(self.id_out, "id {id} {dict}{eol}") {
                    warn!("cannot print marker ids: {e}");
                    return;
                }
            }
        }
        let _ = self.id_out.flush();
    }

    fn snapshot(&mut self, canvas: &W::Canvas) -> Option<PathBuf> {
        let path = PathBuf::from(format!("snapshot_{:05}.png", self.frame_index));
        match canvas
            .to_frame()
            .and_then(|f| self.writer.write_png(&path, &f))
        {
            Ok(()) => {
                info!(path = %path.display(), "saved snapshot");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), "snapshot failed: {e}");
                None
            }
        }
    }
}

/// Raw mode turns off output post-processing, so lines need an explicit `\r`.
pub fn line_ending(raw_terminal: bool) -> &'static str {
    if raw_terminal {
        "\r\n"
    } else {
        "\n"
    }
}

/// Open the camera, then the window, then run a session to completion.
/// `open_window` is never called when no camera opens.
pub fn launch<C, E, W, I>(
    selection: DeviceSelection,
    config: &CaptureConfig,
    engine: E,
    open_window: impl FnOnce() -> Result<W>,
    writer: I,
    options: LifecycleOptions,
) -> Result<SessionSummary, CaptureError>
where
    C: CameraSource,
    E: MarkerEngine,
    W: Window,
    I: ImageWriter,
{
    let settings = config.settings()?;
    let (camera, index) = open_camera::<C>(selection, config.width, config.height)?;
    info!(index, mode = %settings.mode(), "camera ready");
    let window = open_window()?;
    let lifecycle = Lifecycle::install(options)?;

    let mut session = CaptureSession::new(camera, engine, window, writer, settings, config.policy())
        .with_print_ids(config.print_ids)
        .with_wait_ms(config.wait_ms);
    let summary = session.run(&lifecycle)?;
    info!(
        frames = summary.frames,
        detection_runs = summary.detection_runs,
        snapshots = summary.snapshots.len(),
        end = ?summary.end,
        "session finished"
    );
    Ok(summary)
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::mock::{MemoryWriter, MockCamera, MockEngine, MockWindow, NoCamera};

    fn session(
        keys: Vec<i32>,
        frames: u64,
    ) -> CaptureSession<MockCamera, MockEngine, MockWindow, MemoryWriter> {
        let camera = MockCamera::open(0, 640, 480).unwrap().with_frame_limit(frames);
        CaptureSession::new(
            camera,
            MockEngine::reporting(4),
            MockWindow::scripted(keys),
            MemoryWriter::default(),
            DetectionSettings::new(Dictionary::Dict6x6_50),
            AcceptPolicy::accept_all(),
        )
    }

    #[derive(Clone, Default)]
    struct SharedBuf(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    #[test]
    fn print_ids_writes_each_accepted_id_without_a_subscriber() {
        // No tracing subscriber is installed here; ids must still appear.
        let out = SharedBuf::default();
        let mut s = session(vec![-1, -1, -1], 3)
            .with_print_ids(true)
            .with_id_output(out.clone());
        let summary = s.run(&Lifecycle::detached()).unwrap();
        assert_eq!(summary.detection_runs, 3);
        assert_eq!(out.text(), "id 4 DICT_6X6_50\n".repeat(3));
    }

    #[test]
    fn raw_terminal_lines_return_the_carriage() {
        assert_eq!(line_ending(true), "\r\n");
        assert_eq!(line_ending(false), "\n");
    }

    #[test]
    fn ids_are_silent_unless_requested() {
        let out = SharedBuf::default();
        let mut s = session(vec![-1, -1], 2).with_id_output(out.clone());
        s.run(&Lifecycle::detached()).unwrap();
        assert!(out.text().is_empty());
    }

    #[test]
    fn blocked_ids_are_not_printed() {
        let out = SharedBuf::default();
        let camera = MockCamera::open(0, 640, 480).unwrap().with_frame_limit(1);
        let mut s = CaptureSession::new(
            camera,
            MockEngine::reporting(4),
            MockWindow::scripted(vec![-1]),
            MemoryWriter::default(),
            DetectionSettings::new(Dictionary::Dict6x6_50),
            AcceptPolicy::allow_only([1, 2]),
        )
        .with_print_ids(true)
        .with_id_output(out.clone());
        s.run(&Lifecycle::detached()).unwrap();
        assert!(out.text().is_empty());
    }

    #[test]
    fn device_argument_parsing() {
        assert_eq!(parse_device_arg(None).unwrap(), DeviceSelection::Auto);
        assert_eq!(parse_device_arg(Some("1")).unwrap(), DeviceSelection::Index(1));
        let err = parse_device_arg(Some("2")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(parse_device_arg(Some("cam")).is_err());
    }

    #[test]
    fn missing_backend_is_an_error_not_a_fallback() {
        let err = CaptureError::BackendUnavailable("OpenCV");
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("OpenCV backend not enabled"));
    }

    #[test]
    fn auto_selection_falls_back_and_reports() {
        let (_, index) = open_camera::<MockCamera>(DeviceSelection::Auto, 640, 480).unwrap();
        assert_eq!(index, 0);
        let err = open_camera::<NoCamera>(DeviceSelection::Auto, 640, 480).unwrap_err();
        assert!(matches!(err, CaptureError::NoCamera));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn explicit_index_failure_exits_with_one() {
        let err = open_camera::<MockCamera>(DeviceSelection::Index(1), 640, 480).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("camera 1"));
    }

    #[test]
    fn end_of_stream_stops_cleanly() {
        let mut s = session(vec![-1; 10], 3);
        let summary = s.run(&Lifecycle::detached()).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.end, EndReason::EndOfStream);
        assert_eq!(s.window().shown.len(), 3);
    }

    #[test]
    fn quit_key_stops_loop() {
        let mut s = session(vec![-1, b'x' as i32, -1], 100);
        let summary = s.run(&Lifecycle::detached()).unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.end, EndReason::UserQuit);
    }

    #[test]
    fn arrow_key_does_not_quit() {
        let mut s = session(vec![65361, 2424832, -1], 3);
        let summary = s.run(&Lifecycle::detached()).unwrap();
        assert_eq!(summary.end, EndReason::EndOfStream);
    }

    #[test]
    fn signal_flag_stops_before_next_frame() {
        let lc = Lifecycle::detached();
        lc.request_shutdown();
        let mut s = session(vec![], 100);
        let summary = s.run(&lc).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.end, EndReason::Signal);
    }

    #[test]
    fn hotkeys_change_settings_and_frame_skip_reuses_results() {
        // 'f' -> skip 2, then 10 more frames
        let mut keys = vec![b'f' as i32];
        keys.extend(std::iter::repeat(-1).take(10));
        let mut s = session(keys, 11);
        let summary = s.run(&Lifecycle::detached()).unwrap();
        assert_eq!(s.settings().frame_skip(), 2);
        // frame 0 detects, then frames 1..=10 detect on even indices
        assert_eq!(summary.detection_runs, 1 + 5);
        let last = s.window().shown.last().unwrap();
        assert!(last.texts().iter().any(|t| t.contains("id=4 DICT_6X6_50")));
    }

    #[test]
    fn status_line_and_snapshot() {
        let mut s = session(vec![b'u' as i32, b'p' as i32], 5);
        let summary = s.run(&Lifecycle::detached()).unwrap();
        assert_eq!(summary.snapshots, vec![PathBuf::from("snapshot_00002.png")]);
        assert!(s.settings().show_undecoded);
        let shown = &s.window().shown[1];
        assert!(shown.texts().iter().any(|t| t.contains("1 markers | fast(6)")));
        assert!(shown.texts().contains(&"?"));
    }

    #[test]
    fn config_round_trip_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        let created = CaptureConfig::load(&path).unwrap();
        assert_eq!(created, CaptureConfig::default());
        assert!(path.exists());

        std::fs::write(&path, r#"{ "dictionary": 2, "allow_ids": [1, 5], "frame_skip": 3 }"#)
            .unwrap();
        let cfg = CaptureConfig::load(&path).unwrap();
        assert_eq!(cfg.width, 640);
        assert_eq!(cfg.primary().unwrap(), Dictionary::Dict4x4_250);
        assert!(cfg.policy().accepts(5));
        assert!(!cfg.policy().accepts(2));
        assert_eq!(cfg.settings().unwrap().frame_skip(), 3);

        let bad = CaptureConfig {
            dictionary: 40,
            ..CaptureConfig::default()
        };
        assert_eq!(bad.settings().unwrap_err().exit_code(), 2);
    }
}
