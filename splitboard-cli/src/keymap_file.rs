//! JSON keymap files.
//!
//! ```json
//! {
//!   "columns": 4, "rows": 2, "split": 2,
//!   "layers": [{ "name": "Function", "overrides": [["W", "Up"]] }],
//!   "keys": [
//!     { "col": 0, "row": 0, "key": "W" },
//!     { "col": 0, "row": 1, "layer": "Function" }
//!   ]
//! }
//! ```
//!
//! Problems only the file format can have (unknown names, a key listed twice)
//! are collected together with the keymap's own validation errors, so one run
//! reports everything.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use splitboard_keymap::keymap::ConfigErrors;
use splitboard_keymap::{ConfigError, KeyBinding, Keycode, Keymap, KeymapDef, Layer, LayerId, Position};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeymapFile {
    pub columns: u8,
    pub rows: u8,
    pub split: u8,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
    pub keys: Vec<KeyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerEntry {
    pub name: String,
    #[serde(default)]
    pub overrides: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyEntry {
    pub col: u8,
    pub row: u8,
    pub key: Option<String>,
    pub layer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileError {
    #[error("key at {position}: unknown keycode {name:?}")]
    UnknownKey { position: Position, name: String },
    #[error("key at {position}: layer {name:?} is not defined")]
    UnknownLayer { position: Position, name: String },
    #[error("key at {0} sets both \"key\" and \"layer\"")]
    Ambiguous(Position),
    #[error("key at {0} sets neither \"key\" nor \"layer\"")]
    Empty(Position),
    #[error("key at {0} lies outside the matrix")]
    OutOfRange(Position),
    #[error("key at {0} is listed more than once")]
    Duplicate(Position),
    #[error("layer {layer:?}: unknown keycode {name:?}")]
    UnknownOverride { layer: String, name: String },
}

/// Everything wrong with a keymap file.
#[derive(Debug, Default)]
pub struct Problems {
    pub file: Vec<FileError>,
    pub config: Vec<ConfigError>,
    /// Validation errors found but not kept.
    pub dropped: usize,
}

impl Problems {
    pub fn len(&self) -> usize {
        self.file.len() + self.config.len() + self.dropped
    }
}

impl fmt::Display for Problems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.file {
            writeln!(f, "error: {e}")?;
        }
        for e in &self.config {
            writeln!(f, "error: {e}")?;
        }
        if self.dropped > 0 {
            writeln!(f, "... and {} more", self.dropped)?;
        }
        Ok(())
    }
}

/// Owned override tables, one per layer, in file order.
pub struct Overrides {
    names: Vec<String>,
    tables: Vec<Vec<(Keycode, Keycode)>>,
}

impl Overrides {
    pub fn layers(&self) -> Vec<Layer<'_>> {
        self.names
            .iter()
            .zip(&self.tables)
            .map(|(name, table)| Layer::new(name, table))
            .collect()
    }
}

impl KeymapFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Resolve override names. Unknown names are dropped from the table and
    /// reported.
    pub fn overrides(&self, problems: &mut Problems) -> Overrides {
        let tables = self
            .layers
            .iter()
            .map(|layer| {
                layer
                    .overrides
                    .iter()
                    .filter_map(|(from, to)| {
                        let mut resolve = |name: &String| {
                            name.parse::<Keycode>().map_err(|_| {
                                problems.file.push(FileError::UnknownOverride {
                                    layer: layer.name.clone(),
                                    name: name.clone(),
                                })
                            })
                        };
                        let from = resolve(from);
                        let to = resolve(to);
                        Some((from.ok()?, to.ok()?))
                    })
                    .collect()
            })
            .collect();
        Overrides {
            names: self.layers.iter().map(|l| l.name.clone()).collect(),
            tables,
        }
    }

    /// Column-major binding table. Positions that failed to parse are
    /// returned alongside, so "unbound" is not reported for them again.
    pub fn bindings(&self, problems: &mut Problems) -> (Vec<Option<KeyBinding>>, Vec<Position>) {
        let mut bindings = vec![None; self.columns as usize * self.rows as usize];
        let mut seen = vec![false; bindings.len()];
        let mut flagged = Vec::new();

        for entry in &self.keys {
            let position = Position::new(entry.col, entry.row);
            if entry.col >= self.columns || entry.row >= self.rows {
                problems.file.push(FileError::OutOfRange(position));
                continue;
            }
            let index = entry.col as usize * self.rows as usize + entry.row as usize;
            if seen[index] {
                problems.file.push(FileError::Duplicate(position));
                continue;
            }
            seen[index] = true;

            let binding = match (&entry.key, &entry.layer) {
                (Some(_), Some(_)) => Err(FileError::Ambiguous(position)),
                (None, None) => Err(FileError::Empty(position)),
                (Some(name), None) => name
                    .parse::<Keycode>()
                    .map(KeyBinding::Key)
                    .map_err(|_| FileError::UnknownKey {
                        position,
                        name: name.clone(),
                    }),
                (None, Some(name)) => self
                    .layers
                    .iter()
                    .position(|l| l.name == *name)
                    .map(|i| KeyBinding::Layer(LayerId(i as u8)))
                    .ok_or_else(|| FileError::UnknownLayer {
                        position,
                        name: name.clone(),
                    }),
            };
            match binding {
                Ok(binding) => bindings[index] = Some(binding),
                Err(e) => {
                    problems.file.push(e);
                    flagged.push(position);
                }
            }
        }

        (bindings, flagged)
    }
}

/// Load `path`, or the built-in keymap when there is none, and hand the
/// validated keymap to `f`. Any problem is returned as one error listing all
/// of them.
pub fn with_keymap<T>(path: Option<&Path>, f: impl FnOnce(Keymap<'_>) -> Result<T>) -> Result<T> {
    let Some(path) = path else {
        let keymap = Keymap::new(splitboard_keymap::default::KEYMAP)
            .map_err(|errors| invalid(Problems::default(), errors, &[]))?;
        return f(keymap);
    };

    let file = KeymapFile::load(path)?;
    let mut problems = Problems::default();
    let overrides = file.overrides(&mut problems);
    let (bindings, flagged) = file.bindings(&mut problems);
    let layers = overrides.layers();
    let def = KeymapDef {
        columns: file.columns,
        rows: file.rows,
        split: file.split,
        bindings: &bindings,
        layers: &layers,
    };

    match Keymap::new(def) {
        Ok(_) if !problems.file.is_empty() => Err(invalid(problems, ConfigErrors::new(), &flagged)),
        Ok(keymap) => f(keymap),
        Err(errors) => Err(invalid(problems, errors, &flagged)),
    }
}

fn invalid(mut problems: Problems, errors: ConfigErrors, flagged: &[Position]) -> anyhow::Error {
    problems.config = errors
        .iter()
        .filter(|e| !matches!(e, ConfigError::Unbound(p) if flagged.contains(p)))
        .copied()
        .collect();
    problems.dropped = errors.dropped();
    anyhow::anyhow!("{}keymap failed validation with {} error(s)", problems, problems.len())
}
