//! Process lifecycle: shutdown signals, raw terminal input, and the
//! routing of all input sources into a single exit/hotkey decision.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tracing::{debug, info, warn};

use crate::keys::{Arrow, KeyEvent};
use crate::Result;

/// Outcome of one input poll.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Decision {
    pub exit: bool,
    pub hotkey: Option<KeyEvent>,
}

/// Merge the window key, the terminal key and the signal flag.
pub fn route(
    window: Option<KeyEvent>,
    terminal: Option<KeyEvent>,
    shutdown_requested: bool,
) -> Decision {
    if shutdown_requested {
        return Decision {
            exit: true,
            hotkey: Some(KeyEvent::SignalRaised),
        };
    }
    let exit = window.is_some_and(KeyEvent::is_exit) || terminal.is_some_and(KeyEvent::is_exit);
    Decision {
        exit,
        hotkey: if exit { None } else { window.or(terminal) },
    }
}

/// Translate a terminal key press into the same codes the window reports.
pub fn decode_terminal_key(code: KeyCode, modifiers: KeyModifiers) -> Option<KeyEvent> {
    match code {
        KeyCode::Char(c) if modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() => {
            Some(KeyEvent::Printable((c.to_ascii_lowercase() as u8) & 0x1f))
        }
        KeyCode::Char(c) if c.is_ascii() => Some(KeyEvent::Printable(c as u8)),
        KeyCode::Esc => Some(KeyEvent::Printable(27)),
        KeyCode::Enter => Some(KeyEvent::Printable(b'\r')),
        KeyCode::Left => Some(KeyEvent::Extended(Arrow::Left.x11_code())),
        KeyCode::Up => Some(KeyEvent::Extended(Arrow::Up.x11_code())),
        KeyCode::Right => Some(KeyEvent::Extended(Arrow::Right.x11_code())),
        KeyCode::Down => Some(KeyEvent::Extended(Arrow::Down.x11_code())),
        _ => None,
    }
}

/// Raw mode on the controlling terminal for as long as this value lives.
pub struct RawTerminal {
    _private: (),
}

impl RawTerminal {
    pub fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        debug!("terminal raw mode enabled");
        Ok(Self { _private: () })
    }

    /// Non-blocking read of one pending key press.
    pub fn poll_key(&self) -> Option<KeyEvent> {
        if !event::poll(Duration::ZERO).unwrap_or(false) {
            return None;
        }
        match event::read() {
            Ok(Event::Key(k)) if k.kind != KeyEventKind::Release => {
                decode_terminal_key(k.code, k.modifiers)
            }
            _ => None,
        }
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        match terminal::disable_raw_mode() {
            Ok(()) => debug!("terminal mode restored"),
            Err(e) => warn!("failed to restore terminal mode: {e}"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LifecycleOptions {
    pub raw_terminal: bool,
    pub signals: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            raw_terminal: true,
            signals: true,
        }
    }
}

/// Shutdown flag plus the optional raw terminal guard, passed to input routing.
pub struct Lifecycle {
    shutdown: Arc<AtomicBool>,
    terminal: Option<RawTerminal>,
}

impl Lifecycle {
    /// No signal handlers and no terminal changes.
    pub fn detached() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            terminal: None,
        }
    }

    pub fn install(opts: LifecycleOptions) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        if opts.signals {
            spawn_signal_listener(shutdown.clone())?;
        }
        let terminal = if opts.raw_terminal && std::io::stdin().is_terminal() {
            match RawTerminal::enable() {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!("terminal input disabled: {e}");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self { shutdown, terminal })
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn raw_terminal_active(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn poll_terminal_key(&self) -> Option<KeyEvent> {
        self.terminal.as_ref().and_then(RawTerminal::poll_key)
    }

    /// Combine a window key code with pending terminal input and the signal flag.
    pub fn route(&self, window_code: i32) -> Decision {
        let window = KeyEvent::from_window_code(window_code);
        let terminal = self.poll_terminal_key();
        route(window, terminal, self.shutdown_requested())
    }
}

#[cfg(unix)]
struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "ctrl-c"
    }
}

fn spawn_signal_listener(flag: Arc<AtomicBool>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    // Handlers are registered before returning so early signals are not lost.
    let mut signals = {
        let _guard = rt.enter();
        ShutdownSignals::register()?
    };
    thread::Builder::new()
        .name("signal-listener".into())
        .spawn(move || {
            let name = rt.block_on(signals.recv());
            info!(signal = name, "shutdown requested");
            flag.store(true, Ordering::SeqCst);
        })?;
    Ok(())
}
