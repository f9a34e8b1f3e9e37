use std::path::PathBuf;

use anyhow::Result;
use clap::{value_parser, ArgAction, Parser};
use tracing::info;

use marker_vision::generator::{DEFAULT_BORDER_BITS, DEFAULT_SIZE};
use marker_vision::{dictionary, GeneratorState};
#[cfg(feature = "opencv")]
use marker_vision::{generator, ImageWriter, Lifecycle, LifecycleOptions, MarkerEngine, Window};

#[cfg(feature = "opencv")]
const WINDOW_NAME: &str = "ArUco generator";

#[derive(Parser, Debug)]
#[command(
    name = "aruco-generator",
    version,
    about = "Render ArUco markers, page through ids and dictionaries, save PNGs"
)]
struct Cli {
    /// Output PNG path (default: marker_<DICT>_id<id>_<size>px_bb<bits>.png)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Dictionary index 0..16 (8 = DICT_6X6_50)
    #[arg(short, long, default_value_t = dictionary::DEFAULT_INDEX as u8, value_parser = value_parser!(u8).range(0..17))]
    dict: u8,

    /// Marker id, clamped into the dictionary's range
    #[arg(long, default_value_t = 0)]
    id: u32,

    /// Marker side in pixels
    #[arg(long, default_value_t = DEFAULT_SIZE, value_parser = value_parser!(u32).range(50..=4096))]
    ms: u32,

    /// Border width in marker bits
    #[arg(long, default_value_t = DEFAULT_BORDER_BITS, value_parser = value_parser!(u32).range(0..=7))]
    bb: u32,

    /// Save the initial marker and exit without opening a window
    #[arg(long, action = ArgAction::SetTrue)]
    no_gui: bool,
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    #[cfg_attr(not(feature = "opencv"), allow(unused_mut))]
    let mut state = GeneratorState::new(cli.dict as usize, cli.id, cli.ms, cli.bb, cli.out);
    info!(
        dictionary = %state.dictionary(),
        id = state.marker_id(),
        size = state.marker_size(),
        border_bits = state.border_bits(),
        "generator ready"
    );

    #[cfg(feature = "opencv")]
    {
        use marker_vision::{ArucoEngine, HighGuiWindow, OpenCvImageWriter};
        let mut engine = ArucoEngine::new();
        let mut writer = OpenCvImageWriter;
        if cli.no_gui {
            return save_once(&mut state, &mut engine, &mut writer);
        }
        let mut window = HighGuiWindow::open(WINDOW_NAME)?;
        interactive(&mut state, &mut engine, &mut window, &mut writer)
    }
    #[cfg(not(feature = "opencv"))]
    {
        println!("OpenCV backend not enabled at compile time; rebuild with --features opencv");
        if cli.no_gui {
            println!("nothing written to {}", state.output_path().display());
        }
        Ok(())
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[cfg(feature = "opencv")]
fn save_once<E: MarkerEngine, I: ImageWriter>(
    state: &mut GeneratorState,
    engine: &mut E,
    writer: &mut I,
) -> Result<()> {
    let path = state.save(engine, writer)?;
    println!("{}", path.display());
    Ok(())
}

#[cfg(feature = "opencv")]
fn interactive<E: MarkerEngine, W: Window, I: ImageWriter>(
    state: &mut GeneratorState,
    engine: &mut E,
    window: &mut W,
    writer: &mut I,
) -> Result<()> {
    // The window delivers keys itself; only signals need a listener.
    let lifecycle = Lifecycle::install(LifecycleOptions {
        raw_terminal: false,
        signals: true,
    })?;
    generator::run(
        state,
        engine,
        window,
        writer,
        &mut rand::thread_rng(),
        &lifecycle,
    )?;
    info!("generator closed");
    Ok(())
}
