//! The built-in keymap.
//!
//! Columns 0-6 are the directly wired left half, columns 7-13 the right half
//! behind the I/O expander. Each column lists rows 0-4 top to bottom.

use crate::keycode::Keycode::{self, *};
use crate::keymap::{KeyBinding, KeymapDef, Layer, LayerId};

pub const COLUMNS: u8 = 14;
pub const ROWS: u8 = 5;
/// First right-half column.
pub const SPLIT: u8 = 7;

pub const FUNCTION: LayerId = LayerId(0);
pub const NAVIGATION: LayerId = LayerId(1);
pub const NUMPAD: LayerId = LayerId(2);

const fn k(code: Keycode) -> Option<KeyBinding> {
    Some(KeyBinding::Key(code))
}

const fn ly(layer: LayerId) -> Option<KeyBinding> {
    Some(KeyBinding::Layer(layer))
}

#[rustfmt::skip]
pub static BINDINGS: [Option<KeyBinding>; COLUMNS as usize * ROWS as usize] = [
    // Left half
    k(Grave),     k(Tab),          k(CapsLock),  k(LShift),   k(LCtrl),
    k(N1),        k(Q),            k(A),         k(Z),        k(LGui),
    k(N2),        k(W),            k(S),         k(X),        ly(FUNCTION),
    k(N3),        k(E),            k(D),         k(C),        k(Minus),
    k(N4),        k(R),            k(F),         k(V),        k(LAlt),
    k(N5),        k(T),            k(G),         k(B),        k(Space),
    k(Escape),    ly(NAVIGATION),  k(LBracket),  k(Home),     k(End),
    // Right half
    k(N6),        k(Y),            k(H),         k(N),        k(Backspace),
    k(N7),        k(U),            k(J),         k(M),        k(Enter),
    k(N8),        k(I),            k(K),         k(Comma),    k(RAlt),
    k(N9),        k(O),            k(L),         k(Dot),      ly(NUMPAD),
    k(N0),        k(P),            k(Semicolon), k(Slash),    k(RGui),
    k(Equal),     k(RBracket),     k(Quote),     k(RShift),   k(RCtrl),
    k(Delete),    k(Backslash),    k(PageUp),    k(PageDown), k(Enter),
];

#[rustfmt::skip]
static FUNCTION_OVERRIDES: [(Keycode, Keycode); 16] = [
    (N1, F1), (N2, F2), (N3, F3), (N4, F4), (N5, F5),
    (N6, F6), (N7, F7), (N8, F8), (N9, F9), (N0, F10),
    (Minus, F11), (Equal, F12),
    (W, Up), (A, Left), (S, Down), (D, Right),
];

#[rustfmt::skip]
static NAVIGATION_OVERRIDES: [(Keycode, Keycode); 8] = [
    (H, Left), (J, Down), (K, Up), (L, Right),
    (Y, Home), (O, End), (U, PageDown), (I, PageUp),
];

#[rustfmt::skip]
static NUMPAD_OVERRIDES: [(Keycode, Keycode); 17] = [
    (U, Kp7), (I, Kp8), (O, Kp9),
    (J, Kp4), (K, Kp5), (L, Kp6),
    (M, Kp1), (Comma, Kp2), (Dot, Kp3),
    (Space, Kp0), (Slash, KpDot), (Semicolon, KpEnter),
    (N7, NumLock), (N8, KpSlash), (N9, KpAsterisk), (N0, KpMinus), (P, KpPlus),
];

pub static LAYERS: [Layer<'static>; 3] = [
    Layer::new("Function", &FUNCTION_OVERRIDES),
    Layer::new("Navigation", &NAVIGATION_OVERRIDES),
    Layer::new("Numpad", &NUMPAD_OVERRIDES),
];

pub const KEYMAP: KeymapDef<'static> = KeymapDef {
    columns: COLUMNS,
    rows: ROWS,
    split: SPLIT,
    bindings: &BINDINGS,
    layers: &LAYERS,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{Keymap, Position};

    #[test]
    fn default_keymap_validates() {
        let keymap = Keymap::new(KEYMAP).unwrap();
        assert_eq!(keymap.len(), 70);
        assert_eq!(keymap.activator(FUNCTION), Some(Position::new(2, 4)));
        assert_eq!(keymap.activator(NAVIGATION), Some(Position::new(6, 1)));
        assert_eq!(keymap.activator(NUMPAD), Some(Position::new(10, 4)));
        // Both Enter keys are indexed.
        assert_eq!(keymap.positions_with(Enter).count(), 2);
    }
}
