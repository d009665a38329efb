//! Static keymap configuration and its startup validation.
//!
//! A [`KeymapDef`] is the raw, compile-time (or file-loaded) description of
//! the board: one optional [`KeyBinding`] per matrix position plus the layer
//! table. [`Keymap::new`] audits the whole definition, collecting every broken
//! entry instead of stopping at the first one, and builds the reverse index
//! the engine uses to find the positions a layer override touches.

use core::fmt;

use heapless::Vec;
use log::warn;

use crate::keycode::Keycode;
use crate::matrix::{MAX_ROWS, MAX_SCAN_COLUMNS};

/// Upper bound on matrix positions.
pub const MAX_KEYS: usize = 96;
/// Upper bound on layers in a keymap.
pub const MAX_LAYERS: usize = 8;
/// Number of configuration errors kept for reporting.
pub const MAX_CONFIG_ERRORS: usize = 16;

/// A physical switch, addressed by matrix column and row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub col: u8,
    pub row: u8,
}

impl Position {
    pub const fn new(col: u8, row: u8) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Index into the keymap's layer table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(pub u8);

impl LayerId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// What a position does when pressed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyBinding {
    /// Report a keycode to the host.
    Key(Keycode),
    /// Hold a layer active while pressed.
    Layer(LayerId),
}

/// A named, sparse override table: base keycode to replacement keycode.
#[derive(Copy, Clone, Debug)]
pub struct Layer<'a> {
    pub name: &'a str,
    pub overrides: &'a [(Keycode, Keycode)],
}

impl<'a> Layer<'a> {
    pub const fn new(name: &'a str, overrides: &'a [(Keycode, Keycode)]) -> Self {
        Self { name, overrides }
    }

    /// The replacement for `base`, if this layer remaps it.
    pub fn override_for(&self, base: Keycode) -> Option<Keycode> {
        self.overrides
            .iter()
            .find(|(from, _)| *from == base)
            .map(|(_, to)| *to)
    }

    pub fn covers(&self, base: Keycode) -> bool {
        self.override_for(base).is_some()
    }
}

/// Raw keymap definition.
///
/// `bindings` is column-major: the entry for `(col, row)` lives at
/// `col * rows + row`. `None` marks a position with no binding, which fails
/// validation.
#[derive(Copy, Clone, Debug)]
pub struct KeymapDef<'a> {
    pub columns: u8,
    pub rows: u8,
    /// First column scanned by the remote half.
    pub split: u8,
    pub bindings: &'a [Option<KeyBinding>],
    pub layers: &'a [Layer<'a>],
}

/// A single broken keymap entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("binding table holds {found} entries, a {columns}x{rows} matrix needs {expected}")]
    Shape {
        columns: u8,
        rows: u8,
        expected: usize,
        found: usize,
    },
    #[error("matrix has {0} positions, at most {max} are supported", max = MAX_KEYS)]
    TooManyKeys(usize),
    #[error("keymap defines {0} layers, at most {max} are supported", max = MAX_LAYERS)]
    TooManyLayers(usize),
    #[error("matrix has {0} rows, at most {max} are supported", max = MAX_ROWS)]
    TooManyRows(u8),
    #[error("split column {split} lies outside {columns} columns")]
    Split { split: u8, columns: u8 },
    #[error(
        "half starting at column {first_column} is {columns} columns wide, at most {max} can be scanned",
        max = MAX_SCAN_COLUMNS
    )]
    HalfTooWide { first_column: u8, columns: u8 },
    #[error("position {0} has no binding")]
    Unbound(Position),
    #[error("position {position} activates unknown layer {layer}")]
    UnknownLayer { position: Position, layer: LayerId },
    #[error("layer {layer} is activated from both {first} and {second}")]
    DuplicateActivator {
        layer: LayerId,
        first: Position,
        second: Position,
    },
    #[error("layer {layer} overrides {code} more than once")]
    DuplicateOverride { layer: LayerId, code: Keycode },
}

/// Every configuration error found during validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, thiserror::Error)]
#[error("keymap failed validation with {} error(s)", .errors.len() + .dropped)]
pub struct ConfigErrors {
    errors: Vec<ConfigError, MAX_CONFIG_ERRORS>,
    dropped: usize,
}

impl ConfigErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ConfigError) {
        if self.errors.push(error).is_err() {
            self.dropped += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.dropped == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.errors.iter()
    }

    /// Errors found but not kept because the list was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn contains(&self, error: &ConfigError) -> bool {
        self.errors.contains(error)
    }
}

/// A validated keymap.
#[derive(Clone, Debug)]
pub struct Keymap<'a> {
    def: KeymapDef<'a>,
    base: Vec<KeyBinding, MAX_KEYS>,
    /// (keycode, position index), sorted by keycode usage.
    by_code: Vec<(Keycode, u8), MAX_KEYS>,
}

impl<'a> Keymap<'a> {
    /// Audit `def`. Every problem is collected; any problem rejects the keymap.
    pub fn new(def: KeymapDef<'a>) -> Result<Self, ConfigErrors> {
        let mut errors = ConfigErrors::new();

        let expected = def.columns as usize * def.rows as usize;
        if def.bindings.len() != expected {
            errors.push(ConfigError::Shape {
                columns: def.columns,
                rows: def.rows,
                expected,
                found: def.bindings.len(),
            });
            return Err(errors);
        }
        if expected > MAX_KEYS {
            errors.push(ConfigError::TooManyKeys(expected));
            return Err(errors);
        }
        if def.layers.len() > MAX_LAYERS {
            errors.push(ConfigError::TooManyLayers(def.layers.len()));
        }
        if def.rows > MAX_ROWS {
            errors.push(ConfigError::TooManyRows(def.rows));
        }
        if def.split > def.columns {
            errors.push(ConfigError::Split {
                split: def.split,
                columns: def.columns,
            });
        } else {
            for (first_column, columns) in [(0, def.split), (def.split, def.columns - def.split)] {
                if columns as usize > MAX_SCAN_COLUMNS {
                    errors.push(ConfigError::HalfTooWide {
                        first_column,
                        columns,
                    });
                }
            }
        }

        let mut activators: [Option<Position>; MAX_LAYERS] = [None; MAX_LAYERS];
        let mut base = Vec::new();
        let mut by_code: Vec<(Keycode, u8), MAX_KEYS> = Vec::new();

        for (index, binding) in def.bindings.iter().enumerate() {
            let position = position_of(def.rows, index);
            let binding = match binding {
                Some(binding) => *binding,
                None => {
                    errors.push(ConfigError::Unbound(position));
                    continue;
                }
            };
            match binding {
                KeyBinding::Key(code) => {
                    // Capacity matches MAX_KEYS, checked above.
                    let _ = by_code.push((code, index as u8));
                }
                KeyBinding::Layer(layer) => {
                    if layer.index() >= def.layers.len() || layer.index() >= MAX_LAYERS {
                        errors.push(ConfigError::UnknownLayer { position, layer });
                    } else if let Some(first) = activators[layer.index()] {
                        errors.push(ConfigError::DuplicateActivator {
                            layer,
                            first,
                            second: position,
                        });
                    } else {
                        activators[layer.index()] = Some(position);
                    }
                }
            }
            let _ = base.push(binding);
        }

        for (index, layer) in def.layers.iter().enumerate() {
            let id = LayerId(index as u8);
            for (i, (from, _)) in layer.overrides.iter().enumerate() {
                if layer.overrides[..i].iter().any(|(seen, _)| seen == from) {
                    errors.push(ConfigError::DuplicateOverride {
                        layer: id,
                        code: *from,
                    });
                }
            }
            if index < MAX_LAYERS && activators[index].is_none() {
                warn!("layer {} ({}) has no activator key", id, layer.name);
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        by_code.sort_unstable_by_key(|&(code, index)| (code.usage(), index));
        Ok(Self { def, base, by_code })
    }

    pub fn columns(&self) -> u8 {
        self.def.columns
    }

    pub fn rows(&self) -> u8 {
        self.def.rows
    }

    /// First column belonging to the remote half.
    pub fn split(&self) -> u8 {
        self.def.split
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn index(&self, position: Position) -> Option<usize> {
        if position.col < self.def.columns && position.row < self.def.rows {
            Some(position.col as usize * self.def.rows as usize + position.row as usize)
        } else {
            None
        }
    }

    pub fn position(&self, index: usize) -> Position {
        position_of(self.def.rows, index)
    }

    /// The binding configured for a position, before any layer applies.
    pub fn base(&self, index: usize) -> KeyBinding {
        self.base[index]
    }

    pub fn layer(&self, id: LayerId) -> &Layer<'a> {
        &self.def.layers[id.index()]
    }

    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer<'a>)> {
        self.def
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| (LayerId(i as u8), layer))
    }

    /// Indices of every position whose base binding is `code`.
    pub fn positions_with(&self, code: Keycode) -> impl Iterator<Item = usize> + '_ {
        let start = self
            .by_code
            .partition_point(|(c, _)| c.usage() < code.usage());
        self.by_code[start..]
            .iter()
            .take_while(move |(c, _)| *c == code)
            .map(|&(_, index)| index as usize)
    }

    /// The position that activates `layer`.
    pub fn activator(&self, layer: LayerId) -> Option<Position> {
        self.base
            .iter()
            .position(|b| *b == KeyBinding::Layer(layer))
            .map(|index| self.position(index))
    }
}

fn position_of(rows: u8, index: usize) -> Position {
    let rows = rows.max(1) as usize;
    Position::new((index / rows) as u8, (index % rows) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Keycode::*;

    fn key(code: Keycode) -> Option<KeyBinding> {
        Some(KeyBinding::Key(code))
    }

    fn layer_key(id: u8) -> Option<KeyBinding> {
        Some(KeyBinding::Layer(LayerId(id)))
    }

    static FN_OVERRIDES: [(Keycode, Keycode); 2] = [(W, Up), (A, Left)];
    static LAYERS: [Layer<'static>; 1] = [Layer::new("Function", &FN_OVERRIDES)];

    #[test]
    fn builds_reverse_index() {
        let bindings = [key(W), key(A), key(W), layer_key(0)];
        let keymap = Keymap::new(KeymapDef {
            columns: 2,
            rows: 2,
            split: 1,
            bindings: &bindings,
            layers: &LAYERS,
        })
        .unwrap();

        let ws: std::vec::Vec<_> = keymap.positions_with(W).collect();
        assert_eq!(ws, [0, 2]);
        assert_eq!(keymap.positions_with(Q).count(), 0);
        assert_eq!(keymap.position(3), Position::new(1, 1));
        assert_eq!(keymap.index(Position::new(1, 0)), Some(2));
        assert_eq!(keymap.index(Position::new(2, 0)), None);
        assert_eq!(keymap.activator(LayerId(0)), Some(Position::new(1, 1)));
    }

    #[test]
    fn collects_every_broken_entry() {
        let dup: [(Keycode, Keycode); 2] = [(W, Up), (W, Down)];
        let layers = [Layer::new("Dup", &dup)];
        let bindings = [None, layer_key(3), layer_key(0), layer_key(0)];
        let errors = Keymap::new(KeymapDef {
            columns: 2,
            rows: 2,
            split: 1,
            bindings: &bindings,
            layers: &layers,
        })
        .unwrap_err();

        assert!(errors.contains(&ConfigError::Unbound(Position::new(0, 0))));
        assert!(errors.contains(&ConfigError::UnknownLayer {
            position: Position::new(0, 1),
            layer: LayerId(3),
        }));
        assert!(errors.contains(&ConfigError::DuplicateActivator {
            layer: LayerId(0),
            first: Position::new(1, 0),
            second: Position::new(1, 1),
        }));
        assert!(errors.contains(&ConfigError::DuplicateOverride {
            layer: LayerId(0),
            code: W,
        }));
        assert_eq!(errors.iter().count(), 4);
    }

    #[test]
    fn rejects_shape_mismatch() {
        let bindings = [key(A); 3];
        let errors = Keymap::new(KeymapDef {
            columns: 2,
            rows: 2,
            split: 1,
            bindings: &bindings,
            layers: &[],
        })
        .unwrap_err();
        assert!(errors.contains(&ConfigError::Shape {
            columns: 2,
            rows: 2,
            expected: 4,
            found: 3,
        }));
    }

    #[test]
    fn error_list_overflow_is_counted() {
        let bindings = [None; 20];
        let errors = Keymap::new(KeymapDef {
            columns: 4,
            rows: 5,
            split: 2,
            bindings: &bindings,
            layers: &[],
        })
        .unwrap_err();
        assert_eq!(errors.iter().count(), MAX_CONFIG_ERRORS);
        assert_eq!(errors.dropped(), 4);
        assert_eq!(
            std::format!("{}", errors),
            "keymap failed validation with 20 error(s)"
        );
    }

    #[test]
    fn rejects_rows_wider_than_a_column_byte() {
        let bindings = [key(A); 9];
        let errors = Keymap::new(KeymapDef {
            columns: 1,
            rows: 9,
            split: 1,
            bindings: &bindings,
            layers: &[],
        })
        .unwrap_err();
        assert!(errors.contains(&ConfigError::TooManyRows(9)));
        assert_eq!(
            std::format!("{}", ConfigError::TooManyRows(9)),
            "matrix has 9 rows, at most 8 are supported"
        );

        let bindings = [key(A); 8];
        assert!(Keymap::new(KeymapDef {
            columns: 1,
            rows: 8,
            split: 1,
            bindings: &bindings,
            layers: &[],
        })
        .is_ok());
    }

    #[test]
    fn rejects_halves_wider_than_a_scan() {
        let bindings = [key(A); 18];
        let errors = Keymap::new(KeymapDef {
            columns: 18,
            rows: 1,
            split: 1,
            bindings: &bindings,
            layers: &[],
        })
        .unwrap_err();
        assert_eq!(
            errors.iter().copied().collect::<std::vec::Vec<_>>(),
            [ConfigError::HalfTooWide {
                first_column: 1,
                columns: 17,
            }]
        );

        let bindings = [key(A); 32];
        assert!(Keymap::new(KeymapDef {
            columns: 32,
            rows: 1,
            split: 16,
            bindings: &bindings,
            layers: &[],
        })
        .is_ok());
    }

    #[test]
    fn limit_messages_name_the_limit() {
        assert_eq!(
            std::format!("{}", ConfigError::TooManyKeys(100)),
            "matrix has 100 positions, at most 96 are supported"
        );
        assert_eq!(
            std::format!("{}", ConfigError::TooManyLayers(9)),
            "keymap defines 9 layers, at most 8 are supported"
        );
    }

    #[test]
    fn layer_lookup() {
        assert_eq!(LAYERS[0].override_for(W), Some(Up));
        assert!(!LAYERS[0].covers(S));
    }
}
