use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing::{error, info};

use marker_vision::capture::{self, CaptureConfig, CaptureError, DeviceSelection, LIST_PROBE_MAX};
use marker_vision::detection::parse_id_list;
use marker_vision::mock::{HeadlessWindow, MemoryWriter, MockCamera, MockEngine};
use marker_vision::{CameraSource, LifecycleOptions};

#[cfg(feature = "opencv")]
const WINDOW_NAME: &str = "ArUco detect";

#[derive(Parser, Debug)]
#[command(
    name = "aruco-detect",
    version,
    about = "Live ArUco marker detection from a camera"
)]
struct Cli {
    /// Camera index, 0 or 1 (default: try 0, then 1)
    device: Option<String>,

    /// Probe camera indices, print what opens, and exit
    #[arg(long, action = ArgAction::SetTrue)]
    list: bool,

    /// JSON config file; written with defaults if it does not exist
    #[arg(long)]
    config: Option<PathBuf>,

    /// Primary dictionary index (0..16, 8 = DICT_6X6_50)
    #[arg(long)]
    dict: Option<usize>,

    /// Start with every dictionary enabled instead of the fast subset
    #[arg(long, action = ArgAction::SetTrue)]
    all: bool,

    /// Only accept these marker ids, e.g. 1,2,3
    #[arg(long)]
    allow_ids: Option<String>,

    /// Requested capture width
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height
    #[arg(long)]
    height: Option<u32>,

    /// Log every accepted marker id on each detection pass
    #[arg(long, action = ArgAction::SetTrue)]
    print_ids: bool,

    /// Leave the terminal in cooked mode (no hotkeys from stdin)
    #[arg(long, action = ArgAction::SetTrue)]
    no_raw: bool,

    /// Use the in-process mock camera and detector without a window
    #[arg(long, action = ArgAction::SetTrue)]
    mock: bool,
}

fn main() -> ExitCode {
    setup_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("aruco-detect: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CaptureError> {
    let selection = capture::parse_device_arg(cli.device.as_deref())?;
    let config = resolve_config(&cli)?;
    // Reject a bad dictionary before any device is touched.
    config.settings()?;
    let options = LifecycleOptions {
        raw_terminal: !cli.no_raw,
        ..LifecycleOptions::default()
    };

    if cli.mock {
        if cli.list {
            return list_devices::<MockCamera>();
        }
        return run_mock(selection, &config, options);
    }

    #[cfg(feature = "opencv")]
    {
        use marker_vision::{ArucoEngine, HighGuiWindow, OpenCvCamera, OpenCvImageWriter};
        if cli.list {
            return list_devices::<OpenCvCamera>();
        }
        capture::launch::<OpenCvCamera, _, _, _>(
            selection,
            &config,
            ArucoEngine::new(),
            || HighGuiWindow::open(WINDOW_NAME),
            OpenCvImageWriter,
            options,
        )
        .map(|_| ())
    }
    #[cfg(not(feature = "opencv"))]
    {
        let _ = (selection, options);
        Err(CaptureError::BackendUnavailable("OpenCV"))
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn resolve_config(cli: &Cli) -> Result<CaptureConfig, CaptureError> {
    let mut config = match &cli.config {
        Some(path) => CaptureConfig::load(path)
            .map_err(|e| CaptureError::InvalidArgument(e.to_string()))?,
        None => CaptureConfig::default(),
    };
    if let Some(dict) = cli.dict {
        config.dictionary = dict;
    }
    if cli.all {
        config.all_dictionaries = true;
    }
    if let Some(ids) = &cli.allow_ids {
        let ids = parse_id_list(ids).map_err(|e| CaptureError::InvalidArgument(e.to_string()))?;
        config.allow_ids = Some(ids);
    }
    if let Some(w) = cli.width {
        config.width = w;
    }
    if let Some(h) = cli.height {
        config.height = h;
    }
    if cli.print_ids {
        config.print_ids = true;
    }
    Ok(config)
}

fn list_devices<C: CameraSource>() -> Result<(), CaptureError> {
    let devices = C::list(LIST_PROBE_MAX)?;
    if devices.is_empty() {
        println!("no cameras found on indices 0..{LIST_PROBE_MAX}");
    }
    for d in &devices {
        println!("{}: {} {}x{}", d.index, d.backend, d.width, d.height);
    }
    Ok(())
}

fn run_mock(
    selection: DeviceSelection,
    config: &CaptureConfig,
    options: LifecycleOptions,
) -> Result<(), CaptureError> {
    info!("running with the mock camera; snapshots stay in memory");
    capture::launch::<MockCamera, _, _, _>(
        selection,
        config,
        MockEngine::default(),
        || Ok(HeadlessWindow::default()),
        MemoryWriter::default(),
        options,
    )
    .map(|_| ())
}
