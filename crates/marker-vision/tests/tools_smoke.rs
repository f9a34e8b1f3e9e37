//! End-to-end runs of both tool loops against the in-process backends.
#![cfg(feature = "mock")]

use std::path::PathBuf;

use anyhow::Result;
use marker_vision::capture::{self, CaptureConfig, CaptureError, DeviceSelection, EndReason};
use marker_vision::generator::{self, Flash};
use marker_vision::mock::{MemoryWriter, MockCamera, MockEngine, MockWindow, NoCamera};
use marker_vision::{
    CameraSource, CaptureSession, Dictionary, GeneratorState, Lifecycle, LifecycleOptions,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const RIGHT_X11: i32 = 65363;
const LEFT_WIN32: i32 = 2424832;

fn quiet() -> LifecycleOptions {
    LifecycleOptions {
        raw_terminal: false,
        signals: false,
    }
}

#[test]
fn device_open_failure_exits_nonzero_without_a_window() {
    for (selection, code) in [(DeviceSelection::Index(0), 1), (DeviceSelection::Auto, 3)] {
        let mut windows_opened = 0;
        let err = capture::launch::<NoCamera, _, _, _>(
            selection,
            &CaptureConfig::default(),
            MockEngine::default(),
            || {
                windows_opened += 1;
                Ok(MockWindow::scripted(Vec::new()))
            },
            MemoryWriter::default(),
            quiet(),
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), code, "{err}");
        assert_eq!(windows_opened, 0);
    }
}

#[test]
fn bad_dictionary_fails_before_the_camera_opens() {
    let config = CaptureConfig {
        dictionary: 99,
        ..CaptureConfig::default()
    };
    let mut windows_opened = 0;
    let err = capture::launch::<MockCamera, _, _, _>(
        DeviceSelection::Auto,
        &config,
        MockEngine::default(),
        || {
            windows_opened += 1;
            Ok(MockWindow::scripted(Vec::new()))
        },
        MemoryWriter::default(),
        quiet(),
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert_eq!(windows_opened, 0);
}

#[test]
fn launch_opens_one_window_and_runs_until_quit() -> Result<()> {
    let mut windows_opened = 0;
    let summary = capture::launch::<MockCamera, _, _, _>(
        DeviceSelection::Index(0),
        &CaptureConfig::default(),
        MockEngine::reporting(3),
        || {
            windows_opened += 1;
            Ok(MockWindow::scripted([-1, -1]))
        },
        MemoryWriter::default(),
        quiet(),
    )?;
    assert_eq!(windows_opened, 1);
    // two idle frames, then the exhausted script answers ESC
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.end, EndReason::UserQuit);
    Ok(())
}

#[test]
fn invalid_device_is_rejected_before_probing() {
    let err = capture::parse_device_arg(Some("7")).unwrap_err();
    assert!(matches!(err, CaptureError::InvalidDevice(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn capture_session_runs_hotkeys_then_quits() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = CaptureConfig::load(&dir.path().join("capture.json"))?;
    let (camera, index) = capture::open_camera::<MockCamera>(DeviceSelection::Auto, 640, 480)?;
    assert_eq!(index, 0);

    // a: all dictionaries, z: downscale x2, p: snapshot, q: quit
    let keys = [b'a', b'z', b'p', b'q'].map(i32::from);
    let mut session = CaptureSession::new(
        camera,
        MockEngine::reporting(12),
        MockWindow::scripted(keys),
        MemoryWriter::default(),
        config.settings()?,
        config.policy(),
    );
    let summary = session.run(&Lifecycle::detached())?;

    assert_eq!(summary.end, EndReason::UserQuit);
    assert_eq!(summary.frames, 4);
    assert_eq!(summary.snapshots, vec![PathBuf::from("snapshot_00003.png")]);
    assert!(session.settings().all_dictionaries);
    assert_eq!(session.settings().downscale(), 2);
    assert_eq!(session.settings().dictionaries().len(), 17);

    let last = session
        .window()
        .shown
        .last()
        .map(|c| c.texts().join("\n"))
        .unwrap_or_default();
    assert!(last.contains("id=12 DICT_4X4_50"), "{last}");
    assert!(last.contains("all(17) | ds x2 | skip 1"), "{last}");
    Ok(())
}

#[test]
fn allow_list_marks_other_ids_blocked() -> Result<()> {
    let config = CaptureConfig {
        allow_ids: Some(vec![1, 2, 3]),
        ..CaptureConfig::default()
    };
    let camera = MockCamera::open(0, config.width, config.height)?.with_frame_limit(2);
    let mut session = CaptureSession::new(
        camera,
        MockEngine::reporting(9),
        MockWindow::scripted([-1, -1]),
        MemoryWriter::default(),
        config.settings()?,
        config.policy(),
    );
    let summary = session.run(&Lifecycle::detached())?;

    assert_eq!(summary.end, EndReason::EndOfStream);
    let texts = session.window().shown[0].texts().join("\n");
    assert!(texts.contains("id=9 blocked"), "{texts}");
    assert!(texts.contains("| 1 markers |"), "{texts}");
    Ok(())
}

#[test]
fn generator_fifty_next_ids_then_save() -> Result<()> {
    let mut state = GeneratorState::default();
    let mut keys = vec![RIGHT_X11; 50];
    keys.extend([i32::from(b's'), i32::from(b'q')]);
    let mut window = MockWindow::scripted(keys);
    let mut writer = MemoryWriter::default();

    generator::run(
        &mut state,
        &mut MockEngine::default(),
        &mut window,
        &mut writer,
        &mut StdRng::seed_from_u64(1),
        &Lifecycle::detached(),
    )?;

    assert_eq!(state.marker_id(), 0);
    assert_eq!(writer.written.len(), 1);
    let name = writer.written[0].0.to_string_lossy().into_owned();
    assert!(name.contains("id0"), "{name}");
    assert!(name.contains("DICT_6X6_50"), "{name}");
    assert!(matches!(state.flash(), Some(Flash::Saved(_))));
    // initial render, one per id change, one after the save
    assert_eq!(window.shown.len(), 1 + 50 + 1);
    Ok(())
}

#[test]
fn generator_left_arrow_pages_back_instead_of_quitting() -> Result<()> {
    let mut state = GeneratorState::default();
    // The script runs out into ESC, which quits.
    let mut window = MockWindow::scripted([LEFT_WIN32, -1, i32::from(b'd')]);

    generator::run(
        &mut state,
        &mut MockEngine::default(),
        &mut window,
        &mut MemoryWriter::default(),
        &mut StdRng::seed_from_u64(1),
        &Lifecycle::detached(),
    )?;

    assert_eq!(state.marker_id(), 49);
    assert_eq!(state.dictionary(), Dictionary::Dict5x5_1000);
    Ok(())
}

#[test]
fn generator_stops_on_shutdown_signal() -> Result<()> {
    let lifecycle = Lifecycle::detached();
    lifecycle.request_shutdown();
    let mut window = MockWindow::scripted([i32::from(b's')]);
    let mut writer = MemoryWriter::default();

    generator::run(
        &mut GeneratorState::default(),
        &mut MockEngine::default(),
        &mut window,
        &mut writer,
        &mut StdRng::seed_from_u64(1),
        &lifecycle,
    )?;

    assert!(window.shown.is_empty());
    assert!(writer.written.is_empty());
    Ok(())
}
