//! One scan cycle over both halves.

use core::fmt::Debug;

use embedded_hal::digital::v2::OutputPin;
use log::{error, info, warn};

use crate::engine::Engine;
use crate::hid::{HidTransport, LockIndicators, Report};
use crate::keymap::{ConfigError, Keymap};
use crate::matrix::{ScanHalf, MAX_SCAN_COLUMNS};

/// Cycles between recovery attempts on a faulted half.
pub const RECOVERY_INTERVAL: u32 = 100;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

struct HalfSlot<H> {
    half: H,
    first_column: u8,
    faulted: bool,
    /// Cycles since the fault, or since the last recovery attempt.
    idle: u32,
}

impl<H: ScanHalf> HalfSlot<H> {
    fn new(half: H, first_column: u8) -> Self {
        Self {
            half,
            first_column,
            faulted: false,
            idle: 0,
        }
    }

    fn retry(&mut self) {
        self.faulted = true;
        self.idle = RECOVERY_INTERVAL;
    }

    /// Scan into the engine. A failed scan leaves every key of the half as it
    /// was.
    fn cycle(&mut self, side: Side, engine: &mut Engine<'_>, report: &mut Report) {
        if self.faulted {
            self.idle += 1;
            if self.idle < RECOVERY_INTERVAL {
                return;
            }
            self.idle = 0;
            match self.half.recover() {
                Ok(()) => {
                    info!("{:?} half recovered", side);
                    self.faulted = false;
                }
                Err(e) => {
                    warn!("{:?} half recovery failed: {:?}", side, e);
                    return;
                }
            }
        }

        match self.half.scan() {
            Ok(scan) => engine.apply(self.first_column, &scan, report),
            Err(e) => {
                error!("{:?} half scan failed, skipping: {:?}", side, e);
                self.faulted = true;
                self.idle = 0;
            }
        }
    }
}

pub struct Keyboard<'a, L, R, P> {
    engine: Engine<'a>,
    left: HalfSlot<L>,
    right: HalfSlot<R>,
    report: Report,
    leds: LockIndicators<P>,
}

impl<'a, L, R, P> Keyboard<'a, L, R, P>
where
    L: ScanHalf,
    R: ScanHalf,
    P: OutputPin,
    P::Error: Debug,
{
    /// Fit the halves to the keymap: the left half covers columns before the
    /// split, the right half the rest, and both scan every row.
    pub fn new(
        keymap: Keymap<'a>,
        left: L,
        right: R,
        leds: LockIndicators<P>,
    ) -> Result<Self, ConfigError> {
        let split = keymap.split();
        for (first_column, columns) in [(0, left.columns()), (split, right.columns())] {
            if columns as usize > MAX_SCAN_COLUMNS {
                return Err(ConfigError::HalfTooWide {
                    first_column,
                    columns,
                });
            }
        }
        let columns = left.columns() as usize + right.columns() as usize;
        if left.columns() != split
            || columns != keymap.columns() as usize
            || left.rows() != keymap.rows()
            || right.rows() != keymap.rows()
        {
            return Err(ConfigError::Shape {
                columns: keymap.columns(),
                rows: keymap.rows(),
                expected: keymap.len(),
                found: columns * keymap.rows() as usize,
            });
        }
        Ok(Self {
            engine: Engine::new(keymap),
            left: HalfSlot::new(left, 0),
            right: HalfSlot::new(right, split),
            report: Report::new(),
            leds,
        })
    }

    pub fn engine(&self) -> &Engine<'a> {
        &self.engine
    }

    pub fn is_faulted(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left.faulted,
            Side::Right => self.right.faulted,
        }
    }

    /// Run the half's recovery on the next cycle instead of waiting out the
    /// interval. Also works before the half has failed a scan, for a half
    /// known to be down at startup.
    pub fn retry(&mut self, side: Side) {
        match side {
            Side::Left => self.left.retry(),
            Side::Right => self.right.retry(),
        }
    }

    /// Scan left then right, report the cycle's transitions and mirror the
    /// host's lock LEDs.
    pub fn cycle<T: HidTransport>(&mut self, transport: &mut T) {
        self.left
            .cycle(Side::Left, &mut self.engine, &mut self.report);
        self.right
            .cycle(Side::Right, &mut self.engine, &mut self.report);
        self.report.flush(transport);
        self.leds.sync(transport);
    }
}
