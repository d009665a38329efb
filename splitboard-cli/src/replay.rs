//! Replay a scan trace through the keyboard.
//!
//! A trace has one line per scan cycle listing the switches closed during that
//! cycle as `col,row` pairs separated by whitespace. An empty line is a cycle
//! with nothing pressed; `#` starts a comment.
//!
//! ```text
//! # hold W, then Fn
//! 2,1
//! 2,1 2,4
//! 2,4
//!
//! ```

use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use embedded_hal::digital::v2::OutputPin;
use splitboard_keymap::hid::LockIndicators;
use splitboard_keymap::matrix::ScanFull;
use splitboard_keymap::{HalfScan, HidTransport, Keyboard, Keycode, Keymap, LockLed, Position, ScanHalf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceError {
    #[error("line {line}: {text:?} is not a col,row pair")]
    Syntax { line: usize, text: String },
    #[error("line {line}: {position} is outside the matrix")]
    OutOfRange { line: usize, position: Position },
}

/// Closed switches for each cycle.
pub fn parse_trace(text: &str, keymap: &Keymap<'_>) -> Result<Vec<Vec<Position>>, TraceError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            let line_no = i + 1;
            let content = line.split('#').next().unwrap_or_default();
            content
                .split_whitespace()
                .map(|pair| {
                    let position = parse_pair(pair).ok_or_else(|| TraceError::Syntax {
                        line: line_no,
                        text: pair.to_string(),
                    })?;
                    match keymap.index(position) {
                        Some(_) => Ok(position),
                        None => Err(TraceError::OutOfRange {
                            line: line_no,
                            position,
                        }),
                    }
                })
                .collect()
        })
        .collect()
}

fn parse_pair(pair: &str) -> Option<Position> {
    let (col, row) = pair.split_once(',')?;
    Some(Position::new(col.trim().parse().ok()?, row.trim().parse().ok()?))
}

/// The host side of one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    pub release: Vec<Keycode>,
    pub press: Vec<Keycode>,
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |keys: &[Keycode]| {
            keys.iter()
                .map(|k| k.name())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut parts = Vec::new();
        if !self.release.is_empty() {
            parts.push(format!("release [{}]", names(&self.release)));
        }
        if !self.press.is_empty() {
            parts.push(format!("press [{}]", names(&self.press)));
        }
        f.write_str(&parts.join(" "))
    }
}

#[derive(Default)]
struct Recorder {
    batch: Batch,
}

impl HidTransport for Recorder {
    fn press(&mut self, keys: &[Keycode]) {
        self.batch.press.extend_from_slice(keys);
    }

    fn release(&mut self, keys: &[Keycode]) {
        self.batch.release.extend_from_slice(keys);
    }

    fn led_on(&self, _led: LockLed) -> bool {
        false
    }
}

/// One half reading its columns out of the current trace frame.
struct TraceHalf {
    frame: Rc<RefCell<Vec<Position>>>,
    first_column: u8,
    columns: u8,
    rows: u8,
}

impl ScanHalf for TraceHalf {
    type Error = ScanFull;

    fn columns(&self) -> u8 {
        self.columns
    }

    fn rows(&self) -> u8 {
        self.rows
    }

    fn scan(&mut self) -> Result<HalfScan, ScanFull> {
        let frame = self.frame.borrow();
        let mut scan = HalfScan::new(self.rows);
        for col in self.first_column..self.first_column + self.columns {
            let bits = frame
                .iter()
                .filter(|p| p.col == col)
                .fold(0u8, |bits, p| bits | 1 << p.row);
            scan.push(bits)?;
        }
        Ok(scan)
    }
}

struct NoLed;

impl OutputPin for NoLed {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Run every frame through a fresh keyboard. Returns `(cycle, batch)` for
/// each cycle that sent anything; cycles count from 1.
pub fn replay(keymap: Keymap<'_>, frames: &[Vec<Position>]) -> anyhow::Result<Vec<(usize, Batch)>> {
    let frame = Rc::new(RefCell::new(Vec::new()));
    let split = keymap.split();
    let half = |first_column, columns| TraceHalf {
        frame: frame.clone(),
        first_column,
        columns,
        rows: keymap.rows(),
    };
    let left = half(0, split);
    let right = half(split, keymap.columns() - split);
    let leds = LockIndicators::new(NoLed, NoLed, NoLed);
    let mut keyboard = Keyboard::new(keymap, left, right, leds)?;

    let mut batches = Vec::new();
    for (i, closed) in frames.iter().enumerate() {
        *frame.borrow_mut() = closed.clone();
        let mut host = Recorder::default();
        keyboard.cycle(&mut host);
        if host.batch != Batch::default() {
            log::debug!("cycle {}: {} layer(s) active", i + 1, keyboard.engine().active_layers().len());
            batches.push((i + 1, host.batch));
        }
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitboard_keymap::default::KEYMAP;
    use Keycode::*;

    fn keymap() -> Keymap<'static> {
        Keymap::new(KEYMAP).unwrap()
    }

    #[test]
    fn parses_frames_and_comments() {
        let frames = parse_trace("# start\n2,1\n\n2,1  2,4 # both\n", &keymap()).unwrap();
        assert_eq!(
            frames,
            [
                vec![],
                vec![Position::new(2, 1)],
                vec![],
                vec![Position::new(2, 1), Position::new(2, 4)],
            ]
        );
    }

    #[test]
    fn rejects_bad_positions() {
        assert_eq!(
            parse_trace("2,1\n2;1\n", &keymap()),
            Err(TraceError::Syntax {
                line: 2,
                text: "2;1".into()
            })
        );
        assert_eq!(
            parse_trace("14,0\n", &keymap()),
            Err(TraceError::OutOfRange {
                line: 1,
                position: Position::new(14, 0)
            })
        );
    }

    #[test]
    fn replays_a_layer_remap() {
        let frames = parse_trace("2,1\n2,1 2,4\n2,4\n\n", &keymap()).unwrap();
        let batches = replay(keymap(), &frames).unwrap();
        let lines: Vec<String> = batches
            .iter()
            .map(|(cycle, batch)| format!("cycle {cycle}: {batch}"))
            .collect();
        assert_eq!(
            lines,
            [
                "cycle 1: press [W]",
                "cycle 2: release [W] press [Up]",
                "cycle 3: release [Up]",
            ]
        );
        assert_eq!(batches[1].1.press, [Up]);
    }

    #[test]
    fn replay_is_deterministic() {
        let trace = "1,2 8,4\n1,2 8,4 6,1 10,4\n8,2 13,4\n\n";
        let frames = parse_trace(trace, &keymap()).unwrap();
        assert_eq!(
            replay(keymap(), &frames).unwrap(),
            replay(keymap(), &frames).unwrap()
        );
    }
}
