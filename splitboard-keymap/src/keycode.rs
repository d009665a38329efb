//! USB HID keycodes.
//! See USB HID Usage Tables, Section 10 (Keyboard/Keypad Page 0x07).

use core::fmt;
use core::str::FromStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Keycode {
    // Letters
    A = 0x04,
    B = 0x05,
    C = 0x06,
    D = 0x07,
    E = 0x08,
    F = 0x09,
    G = 0x0A,
    H = 0x0B,
    I = 0x0C,
    J = 0x0D,
    K = 0x0E,
    L = 0x0F,
    M = 0x10,
    N = 0x11,
    O = 0x12,
    P = 0x13,
    Q = 0x14,
    R = 0x15,
    S = 0x16,
    T = 0x17,
    U = 0x18,
    V = 0x19,
    W = 0x1A,
    X = 0x1B,
    Y = 0x1C,
    Z = 0x1D,

    // Numbers
    N1 = 0x1E,
    N2 = 0x1F,
    N3 = 0x20,
    N4 = 0x21,
    N5 = 0x22,
    N6 = 0x23,
    N7 = 0x24,
    N8 = 0x25,
    N9 = 0x26,
    N0 = 0x27,

    // Control keys
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equal = 0x2E,
    LBracket = 0x2F,
    RBracket = 0x30,
    Backslash = 0x31,
    Semicolon = 0x33,
    Quote = 0x34,
    Grave = 0x35,
    Comma = 0x36,
    Dot = 0x37,
    Slash = 0x38,
    CapsLock = 0x39,

    // Function keys
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,

    // Navigation
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    Right = 0x4F,
    Left = 0x50,
    Down = 0x51,
    Up = 0x52,

    // Keypad
    NumLock = 0x53,
    KpSlash = 0x54,
    KpAsterisk = 0x55,
    KpMinus = 0x56,
    KpPlus = 0x57,
    KpEnter = 0x58,
    Kp1 = 0x59,
    Kp2 = 0x5A,
    Kp3 = 0x5B,
    Kp4 = 0x5C,
    Kp5 = 0x5D,
    Kp6 = 0x5E,
    Kp7 = 0x5F,
    Kp8 = 0x60,
    Kp9 = 0x61,
    Kp0 = 0x62,
    KpDot = 0x63,

    /// Non-US \ and | (ISO key left of Z)
    NonUsBackslash = 0x64,
    Application = 0x65,

    // Modifiers (reported in the modifier byte, not in the keycode array)
    LCtrl = 0xE0,
    LShift = 0xE1,
    LAlt = 0xE2,
    LGui = 0xE3,
    RCtrl = 0xE4,
    RShift = 0xE5,
    RAlt = 0xE6,
    RGui = 0xE7,
}

/// (keycode, canonical name, short label) for every keycode.
///
/// The canonical name is what keymap files use; the label is what layout
/// renderings print on a keycap.
const TABLE: &[(Keycode, &str, &str)] = &[
    (Keycode::A, "A", "A"),
    (Keycode::B, "B", "B"),
    (Keycode::C, "C", "C"),
    (Keycode::D, "D", "D"),
    (Keycode::E, "E", "E"),
    (Keycode::F, "F", "F"),
    (Keycode::G, "G", "G"),
    (Keycode::H, "H", "H"),
    (Keycode::I, "I", "I"),
    (Keycode::J, "J", "J"),
    (Keycode::K, "K", "K"),
    (Keycode::L, "L", "L"),
    (Keycode::M, "M", "M"),
    (Keycode::N, "N", "N"),
    (Keycode::O, "O", "O"),
    (Keycode::P, "P", "P"),
    (Keycode::Q, "Q", "Q"),
    (Keycode::R, "R", "R"),
    (Keycode::S, "S", "S"),
    (Keycode::T, "T", "T"),
    (Keycode::U, "U", "U"),
    (Keycode::V, "V", "V"),
    (Keycode::W, "W", "W"),
    (Keycode::X, "X", "X"),
    (Keycode::Y, "Y", "Y"),
    (Keycode::Z, "Z", "Z"),
    (Keycode::N1, "N1", "1"),
    (Keycode::N2, "N2", "2"),
    (Keycode::N3, "N3", "3"),
    (Keycode::N4, "N4", "4"),
    (Keycode::N5, "N5", "5"),
    (Keycode::N6, "N6", "6"),
    (Keycode::N7, "N7", "7"),
    (Keycode::N8, "N8", "8"),
    (Keycode::N9, "N9", "9"),
    (Keycode::N0, "N0", "0"),
    (Keycode::Enter, "Enter", "Ent"),
    (Keycode::Escape, "Escape", "Esc"),
    (Keycode::Backspace, "Backspace", "Bksp"),
    (Keycode::Tab, "Tab", "Tab"),
    (Keycode::Space, "Space", "Spc"),
    (Keycode::Minus, "Minus", "-"),
    (Keycode::Equal, "Equal", "="),
    (Keycode::LBracket, "LBracket", "["),
    (Keycode::RBracket, "RBracket", "]"),
    (Keycode::Backslash, "Backslash", "\\"),
    (Keycode::Semicolon, "Semicolon", ";"),
    (Keycode::Quote, "Quote", "'"),
    (Keycode::Grave, "Grave", "`"),
    (Keycode::Comma, "Comma", ","),
    (Keycode::Dot, "Dot", "."),
    (Keycode::Slash, "Slash", "/"),
    (Keycode::CapsLock, "CapsLock", "Caps"),
    (Keycode::F1, "F1", "F1"),
    (Keycode::F2, "F2", "F2"),
    (Keycode::F3, "F3", "F3"),
    (Keycode::F4, "F4", "F4"),
    (Keycode::F5, "F5", "F5"),
    (Keycode::F6, "F6", "F6"),
    (Keycode::F7, "F7", "F7"),
    (Keycode::F8, "F8", "F8"),
    (Keycode::F9, "F9", "F9"),
    (Keycode::F10, "F10", "F10"),
    (Keycode::F11, "F11", "F11"),
    (Keycode::F12, "F12", "F12"),
    (Keycode::PrintScreen, "PrintScreen", "PScr"),
    (Keycode::ScrollLock, "ScrollLock", "ScrL"),
    (Keycode::Pause, "Pause", "Paus"),
    (Keycode::Insert, "Insert", "Ins"),
    (Keycode::Home, "Home", "Home"),
    (Keycode::PageUp, "PageUp", "PgUp"),
    (Keycode::Delete, "Delete", "Del"),
    (Keycode::End, "End", "End"),
    (Keycode::PageDown, "PageDown", "PgDn"),
    (Keycode::Right, "Right", "\u{2192}"),
    (Keycode::Left, "Left", "\u{2190}"),
    (Keycode::Down, "Down", "\u{2193}"),
    (Keycode::Up, "Up", "\u{2191}"),
    (Keycode::NumLock, "NumLock", "Num"),
    (Keycode::KpSlash, "KpSlash", "/"),
    (Keycode::KpAsterisk, "KpAsterisk", "*"),
    (Keycode::KpMinus, "KpMinus", "-"),
    (Keycode::KpPlus, "KpPlus", "+"),
    (Keycode::KpEnter, "KpEnter", "Ent"),
    (Keycode::Kp1, "Kp1", "1"),
    (Keycode::Kp2, "Kp2", "2"),
    (Keycode::Kp3, "Kp3", "3"),
    (Keycode::Kp4, "Kp4", "4"),
    (Keycode::Kp5, "Kp5", "5"),
    (Keycode::Kp6, "Kp6", "6"),
    (Keycode::Kp7, "Kp7", "7"),
    (Keycode::Kp8, "Kp8", "8"),
    (Keycode::Kp9, "Kp9", "9"),
    (Keycode::Kp0, "Kp0", "0"),
    (Keycode::KpDot, "KpDot", "."),
    (Keycode::NonUsBackslash, "NonUsBackslash", "<>"),
    (Keycode::Application, "Application", "Menu"),
    (Keycode::LCtrl, "LCtrl", "Ctrl"),
    (Keycode::LShift, "LShift", "Shft"),
    (Keycode::LAlt, "LAlt", "Alt"),
    (Keycode::LGui, "LGui", "Gui"),
    (Keycode::RCtrl, "RCtrl", "RCtl"),
    (Keycode::RShift, "RShift", "RSft"),
    (Keycode::RAlt, "RAlt", "RAlt"),
    (Keycode::RGui, "RGui", "RGui"),
];

impl Keycode {
    /// Check if this keycode is a modifier (LCtrl..RGui).
    pub fn is_modifier(self) -> bool {
        let v = self as u8;
        (0xE0..=0xE7).contains(&v)
    }

    /// Get the modifier bit mask (bit 0 = LCtrl, bit 7 = RGui).
    pub fn modifier_bit(self) -> u8 {
        if self.is_modifier() {
            1 << (self as u8 - 0xE0)
        } else {
            0
        }
    }

    /// HID usage id.
    pub fn usage(self) -> u8 {
        self as u8
    }

    /// Look a keycode up by HID usage id.
    pub fn from_usage(usage: u8) -> Option<Keycode> {
        TABLE.iter().find(|e| e.0 as u8 == usage).map(|e| e.0)
    }

    /// Canonical name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        TABLE.iter().find(|e| e.0 == self).map_or("?", |e| e.1)
    }

    /// Short label for layout visualizations.
    pub fn label(self) -> &'static str {
        TABLE.iter().find(|e| e.0 == self).map_or("?", |e| e.2)
    }

    /// Every known keycode, in usage order.
    pub fn all() -> impl Iterator<Item = Keycode> {
        TABLE.iter().map(|e| e.0)
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a name does not match any keycode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown keycode name")]
pub struct UnknownKeycode;

impl FromStr for Keycode {
    type Err = UnknownKeycode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TABLE
            .iter()
            .find(|e| e.1.eq_ignore_ascii_case(s))
            .map(|e| e.0)
            .ok_or(UnknownKeycode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for code in Keycode::all() {
            assert_eq!(code.name().parse::<Keycode>(), Ok(code));
        }
        assert_eq!("lshift".parse::<Keycode>(), Ok(Keycode::LShift));
        assert_eq!("Hyper".parse::<Keycode>(), Err(UnknownKeycode));
    }

    #[test]
    fn table_covers_each_code_once() {
        let mut seen = [false; 256];
        for code in Keycode::all() {
            assert!(!seen[code as usize], "{} listed twice", code);
            seen[code as usize] = true;
        }
        assert_eq!(Keycode::from_usage(0x52), Some(Keycode::Up));
        assert_eq!(Keycode::from_usage(0x00), None);
    }

    #[test]
    fn modifier_bits() {
        assert!(Keycode::LCtrl.is_modifier());
        assert_eq!(Keycode::LShift.modifier_bit(), 0b0000_0010);
        assert_eq!(Keycode::RGui.modifier_bit(), 0b1000_0000);
        assert!(!Keycode::CapsLock.is_modifier());
        assert_eq!(Keycode::A.modifier_bit(), 0);
    }
}
