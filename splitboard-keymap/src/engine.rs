//! Layer resolution.
//!
//! The engine turns physical edges into keycode transitions. Layers form a
//! stack: the most recently activated layer has the highest precedence, and
//! a position resolves through the stack from the top, falling back to its
//! base binding.
//!
//! Every position currently held records the keycode it reported. When the
//! stack changes, held positions whose resolution changed are re-reported
//! (release the old code, press the new one), so a switch released later
//! always releases exactly what is held for it, however many layers came and
//! went in between.

use heapless::Vec;
use log::{debug, warn};

use crate::hid::{Report, MAX_HELD};
use crate::keycode::Keycode;
use crate::keymap::{KeyBinding, Keymap, LayerId, Position, MAX_KEYS, MAX_LAYERS};
use crate::matrix::{Edge, HalfScan, MatrixState};

/// A keycode held down by one position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Held {
    pub index: u8,
    pub code: Keycode,
}

pub struct Engine<'a> {
    keymap: Keymap<'a>,
    matrix: MatrixState,
    /// Active layers, bottom first.
    stack: Vec<LayerId, MAX_LAYERS>,
    /// Held keys, in press order.
    pressed: Vec<Held, MAX_HELD>,
}

impl<'a> Engine<'a> {
    pub fn new(keymap: Keymap<'a>) -> Self {
        let matrix = MatrixState::new(&keymap);
        Self {
            keymap,
            matrix,
            stack: Vec::new(),
            pressed: Vec::new(),
        }
    }

    pub fn keymap(&self) -> &Keymap<'a> {
        &self.keymap
    }

    pub fn matrix(&self) -> &MatrixState {
        &self.matrix
    }

    /// Active layers, most recent last.
    pub fn active_layers(&self) -> &[LayerId] {
        &self.stack
    }

    pub fn is_active(&self, layer: LayerId) -> bool {
        self.stack.contains(&layer)
    }

    pub fn held(&self) -> &[Held] {
        &self.pressed
    }

    /// Whether any position currently holds `code`.
    pub fn is_held(&self, code: Keycode) -> bool {
        self.pressed.iter().any(|h| h.code == code)
    }

    /// The binding a position currently resolves to.
    pub fn effective(&self, index: usize) -> KeyBinding {
        self.matrix.cell(index).effective
    }

    /// Resolve a position through the active stack, top layer first.
    pub fn resolve_effective(&self, index: usize) -> KeyBinding {
        let base = self.keymap.base(index);
        let KeyBinding::Key(code) = base else {
            return base;
        };
        self.stack
            .iter()
            .rev()
            .find_map(|id| self.keymap.layer(*id).override_for(code))
            .map_or(base, KeyBinding::Key)
    }

    /// Feed every switch of one half's scan, in column-then-row order.
    pub fn apply(&mut self, first_column: u8, scan: &HalfScan, report: &mut Report) {
        for (col, row, down) in scan.iter() {
            let position = Position::new(first_column + col, row);
            match self.keymap.index(position) {
                Some(index) => self.process(index, down, report),
                None => {
                    if down {
                        warn!("closed switch at {} is outside the keymap", position);
                    }
                }
            }
        }
    }

    /// Edge detection for one position.
    pub fn process(&mut self, index: usize, down: bool, report: &mut Report) {
        let edge = match self.matrix.observe(index, down) {
            Some(edge) => edge,
            None => return,
        };

        match (edge, self.effective(index)) {
            (Edge::Down, KeyBinding::Layer(layer)) => self.activate_layer(layer, report),
            (Edge::Up, KeyBinding::Layer(layer)) => self.deactivate_layer(layer, report),
            (Edge::Down, KeyBinding::Key(code)) => {
                let held = Held {
                    index: index as u8,
                    code,
                };
                let shared = self.is_held(code);
                if self.pressed.push(held).is_err() {
                    warn!("too many keys held, {} ignored", code);
                    return;
                }
                if !shared {
                    report.press(code);
                }
            }
            (Edge::Up, KeyBinding::Key(_)) => {
                let Some(slot) = self.pressed.iter().position(|h| h.index as usize == index) else {
                    // Dropped on press because the held set was full.
                    return;
                };
                let held = self.pressed.remove(slot);
                if !self.is_held(held.code) {
                    report.release(held.code);
                }
            }
        }
    }

    /// Push `layer` and re-resolve what it covers.
    ///
    /// # Panics
    ///
    /// If the layer is already active: the stack no longer matches the
    /// switches holding it.
    pub fn activate_layer(&mut self, layer: LayerId, report: &mut Report) {
        assert!(
            !self.stack.contains(&layer),
            "layer {} activated while already active",
            layer
        );
        if self.stack.push(layer).is_err() {
            panic!("layer stack overflow activating {}", layer);
        }
        debug!("layer {} ({}) on", layer, self.keymap.layer(layer).name);
        self.remap(layer, report);
    }

    /// Remove `layer` and re-resolve what it covered through the remaining
    /// stack.
    ///
    /// # Panics
    ///
    /// If the layer is not active.
    pub fn deactivate_layer(&mut self, layer: LayerId, report: &mut Report) {
        let Some(slot) = self.stack.iter().position(|l| *l == layer) else {
            panic!("layer {} deactivated while not active", layer);
        };
        self.stack.remove(slot);
        debug!("layer {} ({}) off", layer, self.keymap.layer(layer).name);
        self.remap(layer, report);
    }

    /// Re-resolve every position whose base code `layer` overrides, moving any
    /// held key to its new code.
    fn remap(&mut self, layer: LayerId, report: &mut Report) {
        let overrides = self.keymap.layer(layer).overrides;
        for (base, _) in overrides {
            // Indices are collected first; resolving borrows the keymap.
            let indices: Vec<usize, MAX_KEYS> =
                self.keymap.positions_with(*base).collect();
            for index in indices {
                let resolved = self.resolve_effective(index);
                self.matrix.set_effective(index, resolved);
                if let KeyBinding::Key(code) = resolved {
                    self.rehold(index, code, report);
                }
            }
        }
    }

    /// If `index` is held under another code, switch it to `code`.
    fn rehold(&mut self, index: usize, code: Keycode, report: &mut Report) {
        let Some(slot) = self.pressed.iter().position(|h| h.index as usize == index) else {
            return;
        };
        let old = self.pressed[slot].code;
        if old == code {
            return;
        }
        let shared = self.is_held(code);
        self.pressed[slot].code = code;
        if !self.is_held(old) {
            report.release(old);
        }
        if !shared {
            report.press(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{KeymapDef, Layer};
    use Keycode::*;

    // 2 columns x 3 rows:
    //   col 0: X(=A)  Y(=W)   L1 activator
    //   col 1: Z(=A)  Enter   L2 activator
    const X: usize = 0;
    const WKEY: usize = 1;
    const L1_KEY: usize = 2;
    const Z: usize = 3;
    const L2_KEY: usize = 5;

    static L1_OVERRIDES: [(Keycode, Keycode); 2] = [(A, B), (W, Up)];
    static L2_OVERRIDES: [(Keycode, Keycode); 1] = [(A, C)];
    static LAYERS: [Layer<'static>; 2] = [
        Layer::new("one", &L1_OVERRIDES),
        Layer::new("two", &L2_OVERRIDES),
    ];
    static BINDINGS: [Option<KeyBinding>; 6] = [
        Some(KeyBinding::Key(A)),
        Some(KeyBinding::Key(W)),
        Some(KeyBinding::Layer(LayerId(0))),
        Some(KeyBinding::Key(A)),
        Some(KeyBinding::Key(Enter)),
        Some(KeyBinding::Layer(LayerId(1))),
    ];

    fn engine() -> Engine<'static> {
        Engine::new(
            Keymap::new(KeymapDef {
                columns: 2,
                rows: 3,
                split: 1,
                bindings: &BINDINGS,
                layers: &LAYERS,
            })
            .unwrap(),
        )
    }

    /// Process one edge and return (releases, presses) for the cycle.
    fn step(
        engine: &mut Engine<'_>,
        index: usize,
        down: bool,
    ) -> (std::vec::Vec<Keycode>, std::vec::Vec<Keycode>) {
        let mut report = Report::new();
        engine.process(index, down, &mut report);
        (report.releases().to_vec(), report.presses().to_vec())
    }

    #[test]
    fn unchanged_state_reports_nothing() {
        let mut e = engine();
        assert_eq!(step(&mut e, X, false), (vec![], vec![]));
        assert_eq!(step(&mut e, X, true), (vec![], vec![A]));
        assert_eq!(step(&mut e, X, true), (vec![], vec![]));
    }

    #[test]
    fn layer_remaps_a_held_key_both_ways() {
        let mut e = engine();
        assert_eq!(step(&mut e, X, true), (vec![], vec![A]));
        assert_eq!(step(&mut e, L1_KEY, true), (vec![A], vec![B]));
        assert_eq!(e.effective(X), KeyBinding::Key(B));
        assert_eq!(step(&mut e, L1_KEY, false), (vec![B], vec![A]));
        assert_eq!(step(&mut e, X, false), (vec![A], vec![]));
        assert!(e.held().is_empty());
    }

    #[test]
    fn release_after_layer_reports_the_remapped_code() {
        let mut e = engine();
        assert_eq!(step(&mut e, WKEY, true), (vec![], vec![W]));
        assert_eq!(step(&mut e, L1_KEY, true), (vec![W], vec![Up]));
        assert_eq!(step(&mut e, WKEY, false), (vec![Up], vec![]));
        assert_eq!(step(&mut e, L1_KEY, false), (vec![], vec![]));
        assert_eq!(e.effective(WKEY), KeyBinding::Key(W));
    }

    #[test]
    fn most_recent_layer_wins_and_pops_back_to_the_one_below() {
        let mut e = engine();
        step(&mut e, L1_KEY, true);
        step(&mut e, L2_KEY, true);
        assert_eq!(e.active_layers(), [LayerId(0), LayerId(1)]);
        assert_eq!(e.resolve_effective(X), KeyBinding::Key(C));

        assert_eq!(step(&mut e, X, true), (vec![], vec![C]));
        assert_eq!(step(&mut e, L2_KEY, false), (vec![C], vec![B]));
        assert_eq!(e.effective(X), KeyBinding::Key(B));
        assert_eq!(e.effective(Z), KeyBinding::Key(B));
        assert_eq!(step(&mut e, X, false), (vec![B], vec![]));
    }

    #[test]
    fn layers_released_out_of_order_resolve_through_what_remains() {
        let mut e = engine();
        step(&mut e, L1_KEY, true);
        step(&mut e, L2_KEY, true);
        assert_eq!(step(&mut e, X, true), (vec![], vec![C]));
        // Dropping the lower layer leaves the upper one in charge.
        assert_eq!(step(&mut e, L1_KEY, false), (vec![], vec![]));
        assert_eq!(e.effective(X), KeyBinding::Key(C));
        assert_eq!(step(&mut e, L2_KEY, false), (vec![C], vec![A]));
        assert_eq!(step(&mut e, X, false), (vec![A], vec![]));
    }

    #[test]
    fn shared_code_stays_down_until_both_positions_release() {
        let mut e = engine();
        assert_eq!(step(&mut e, X, true), (vec![], vec![A]));
        assert_eq!(step(&mut e, Z, true), (vec![], vec![]));
        assert_eq!(step(&mut e, X, false), (vec![], vec![]));
        assert_eq!(step(&mut e, Z, false), (vec![A], vec![]));
    }

    #[test]
    fn remap_of_two_holders_moves_the_code_once() {
        let mut e = engine();
        step(&mut e, X, true);
        step(&mut e, Z, true);
        assert_eq!(step(&mut e, L1_KEY, true), (vec![A], vec![B]));
        assert_eq!(e.held().iter().filter(|h| h.code == B).count(), 2);
    }

    #[test]
    #[should_panic(expected = "not active")]
    fn deactivating_an_inactive_layer_panics() {
        let mut e = engine();
        e.deactivate_layer(LayerId(1), &mut Report::new());
    }

    #[test]
    #[should_panic(expected = "already active")]
    fn activating_twice_panics() {
        let mut e = engine();
        let mut report = Report::new();
        e.activate_layer(LayerId(0), &mut report);
        e.activate_layer(LayerId(0), &mut report);
    }

    #[test]
    fn apply_offsets_columns() {
        let mut e = engine();
        let mut scan = HalfScan::new(3);
        scan.push(0b010).unwrap();
        let mut report = Report::new();
        e.apply(1, &scan, &mut report);
        assert_eq!(report.presses(), [Enter]);
    }
}
