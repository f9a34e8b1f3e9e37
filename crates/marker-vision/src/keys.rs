//! Key events from the display window, the raw terminal, and OS signals.
//!
//! Window backends report plain keys as 0..=255 and everything else
//! (arrows, function keys) as larger platform-specific codes. Those codes are
//! kept whole: X11 reports Left as 0xFF51, whose low byte is `'Q'`.

const ESC: u8 = 27;
const CTRL_C: u8 = 3;
const CTRL_D: u8 = 4;
const CTRL_Q: u8 = 17;
const CTRL_X: u8 = 24;

const EXIT_KEYS: [u8; 11] = [
    ESC, b'q', b'Q', b'x', b'X', b'c', b'C', CTRL_C, CTRL_D, CTRL_Q, CTRL_X,
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyEvent {
    Printable(u8),
    Extended(i32),
    SignalRaised,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arrow {
    Left,
    Up,
    Right,
    Down,
}

impl Arrow {
    /// X11/GTK key code, also used for arrows read from the terminal.
    pub fn x11_code(self) -> i32 {
        match self {
            Arrow::Left => 65361,
            Arrow::Up => 65362,
            Arrow::Right => 65363,
            Arrow::Down => 65364,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        match code {
            65361 | 2424832 => Some(Arrow::Left),
            65362 | 2490368 => Some(Arrow::Up),
            65363 | 2555904 => Some(Arrow::Right),
            65364 | 2621440 => Some(Arrow::Down),
            _ => None,
        }
    }
}

impl KeyEvent {
    /// Classify a raw window key code. Negative codes mean no key was pressed.
    pub fn from_window_code(code: i32) -> Option<Self> {
        match code {
            c if c < 0 => None,
            c @ 0..=255 => Some(KeyEvent::Printable(c as u8)),
            c => Some(KeyEvent::Extended(c)),
        }
    }

    /// The printable byte, if this is a plain key.
    pub fn char(self) -> Option<u8> {
        match self {
            KeyEvent::Printable(c) => Some(c),
            _ => None,
        }
    }

    pub fn arrow(self) -> Option<Arrow> {
        match self {
            KeyEvent::Extended(code) => Arrow::from_code(code),
            _ => None,
        }
    }

    /// Full exit table used by the capture tool.
    pub fn is_exit(self) -> bool {
        match self {
            KeyEvent::Printable(c) => EXIT_KEYS.contains(&c),
            KeyEvent::Extended(_) => false,
            KeyEvent::SignalRaised => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_codes_are_tagged_by_range() {
        assert_eq!(KeyEvent::from_window_code(-1), None);
        assert_eq!(KeyEvent::from_window_code(113), Some(KeyEvent::Printable(b'q')));
        assert_eq!(KeyEvent::from_window_code(255), Some(KeyEvent::Printable(255)));
        assert_eq!(KeyEvent::from_window_code(256), Some(KeyEvent::Extended(256)));
    }

    #[test]
    fn left_arrow_is_not_quit() {
        for code in [65361, 2424832] {
            let k = KeyEvent::from_window_code(code).unwrap();
            assert!(!k.is_exit(), "code {code} must not exit");
            assert_eq!(k.arrow(), Some(Arrow::Left));
            assert_eq!(k.char(), None);
        }
        // Low byte of 65361 is 'Q'; masking would have produced an exit.
        assert!(KeyEvent::Printable((65361 & 0xff) as u8).is_exit());
    }

    #[test]
    fn exit_table() {
        for c in [27u8, b'q', b'Q', b'x', b'X', b'c', b'C', 3, 4, 17, 24] {
            assert!(KeyEvent::Printable(c).is_exit(), "{c}");
        }
        for c in [b'a', b'z', b'f', b'o', b'p', b' ', 13] {
            assert!(!KeyEvent::Printable(c).is_exit(), "{c}");
        }
        assert!(KeyEvent::SignalRaised.is_exit());
    }

    #[test]
    fn all_arrow_encodings_resolve() {
        let cases = [
            (65362, Arrow::Up),
            (2490368, Arrow::Up),
            (65363, Arrow::Right),
            (2555904, Arrow::Right),
            (65364, Arrow::Down),
            (2621440, Arrow::Down),
        ];
        for (code, arrow) in cases {
            assert_eq!(KeyEvent::Extended(code).arrow(), Some(arrow));
            assert_eq!(KeyEvent::Extended(arrow.x11_code()).arrow(), Some(arrow));
        }
        assert_eq!(KeyEvent::Printable(b'Q').arrow(), None);
    }
}
