//! Key matrix state and scanning.
//!
//! The board is split in two halves scanned differently:
//! - Left half: columns and rows wired straight to MCU pins ([`DirectHalf`])
//! - Right half: behind an MCP23018 I/O expander (see [`crate::i2c`])
//!
//! Both produce a [`HalfScan`]: one byte per column, bit `r` set when the
//! switch on row `r` is closed. There is no debouncing; the cell store only
//! detects edges against the previous scan.

use core::fmt::Debug;

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use heapless::Vec;

use crate::keymap::{KeyBinding, Keymap, MAX_KEYS};

/// Most columns a single scan can report.
pub const MAX_SCAN_COLUMNS: usize = 16;
/// Rows per column: one bit each in a column byte.
pub const MAX_ROWS: u8 = 8;
/// Time for a freshly selected column to reach the row inputs.
pub const SETTLE_US: u32 = 5;

/// A half tried to report more columns than a [`HalfScan`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a scan holds at most {max} columns", max = MAX_SCAN_COLUMNS)]
pub struct ScanFull;

/// A failed read of a directly wired half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PinError<E> {
    #[error("pin access failed: {0:?}")]
    Pin(E),
    #[error(transparent)]
    Full(#[from] ScanFull),
}

/// Electrical level that selects a column and marks a closed switch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActiveLevel {
    /// Selected column driven high; closed switch reads high.
    High,
    /// Selected column driven low; closed switch pulls the row low.
    Low,
}

impl ActiveLevel {
    pub fn select<P: OutputPin>(self, pin: &mut P) -> Result<(), P::Error> {
        match self {
            ActiveLevel::High => pin.set_high(),
            ActiveLevel::Low => pin.set_low(),
        }
    }

    pub fn deselect<P: OutputPin>(self, pin: &mut P) -> Result<(), P::Error> {
        match self {
            ActiveLevel::High => pin.set_low(),
            ActiveLevel::Low => pin.set_high(),
        }
    }

    pub fn is_active<P: InputPin>(self, pin: &P) -> Result<bool, P::Error> {
        match self {
            ActiveLevel::High => pin.is_high(),
            ActiveLevel::Low => pin.is_low(),
        }
    }

    /// Port value selecting only `bit`.
    pub fn select_byte(self, bit: u8) -> u8 {
        match self {
            ActiveLevel::High => 1 << bit,
            ActiveLevel::Low => !(1 << bit),
        }
    }

    /// Port value with nothing selected.
    pub fn idle_byte(self) -> u8 {
        match self {
            ActiveLevel::High => 0x00,
            ActiveLevel::Low => 0xFF,
        }
    }

    /// Turn a raw port reading into pressed bits, keeping only `mask`.
    pub fn decode(self, raw: u8, mask: u8) -> u8 {
        match self {
            ActiveLevel::High => raw & mask,
            ActiveLevel::Low => !raw & mask,
        }
    }
}

/// Mask covering the low `rows` bits.
pub fn row_mask(rows: u8) -> u8 {
    if rows >= 8 {
        0xFF
    } else {
        (1u8 << rows) - 1
    }
}

/// One complete read of a half, column by column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HalfScan {
    columns: Vec<u8, MAX_SCAN_COLUMNS>,
    rows: u8,
}

impl HalfScan {
    pub fn new(rows: u8) -> Self {
        Self {
            columns: Vec::new(),
            rows,
        }
    }

    /// Append the next column's row bits.
    pub fn push(&mut self, bits: u8) -> Result<(), ScanFull> {
        self.columns
            .push(bits & row_mask(self.rows))
            .map_err(|_| ScanFull)
    }

    pub fn columns(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn column_bits(&self, col: usize) -> u8 {
        self.columns.get(col).copied().unwrap_or(0)
    }

    /// `(column, row, closed)` in column-then-row order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8, bool)> + '_ {
        let rows = self.rows.min(MAX_ROWS);
        self.columns
            .iter()
            .enumerate()
            .flat_map(move |(col, bits)| {
                (0..rows).map(move |row| (col as u8, row, bits & (1 << row) != 0))
            })
    }
}

/// A source of raw switch states for one half of the board.
pub trait ScanHalf {
    type Error: Debug;

    fn columns(&self) -> u8;

    fn rows(&self) -> u8;

    /// Read every switch. Errors are never papered over with "released".
    fn scan(&mut self) -> Result<HalfScan, Self::Error>;

    /// Try to bring a failed half back. Called periodically while faulted.
    fn recover(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A half whose columns and rows are MCU pins.
pub struct DirectHalf<C, R, D, const COLS: usize, const ROWS: usize> {
    columns: [C; COLS],
    rows: [R; ROWS],
    delay: D,
    active: ActiveLevel,
}

impl<C, R, D, E, const COLS: usize, const ROWS: usize> DirectHalf<C, R, D, COLS, ROWS>
where
    C: OutputPin<Error = E>,
    R: InputPin<Error = E>,
    D: DelayUs<u32>,
{
    const ROWS_FIT: () = assert!(ROWS <= MAX_ROWS as usize, "a column byte holds eight rows");

    /// Take the pins, already configured, and park every column.
    pub fn new(columns: [C; COLS], rows: [R; ROWS], delay: D, active: ActiveLevel) -> Result<Self, E> {
        let () = Self::ROWS_FIT;
        let mut half = Self {
            columns,
            rows,
            delay,
            active,
        };
        for column in half.columns.iter_mut() {
            active.deselect(column)?;
        }
        Ok(half)
    }
}

impl<C, R, D, E, const COLS: usize, const ROWS: usize> ScanHalf for DirectHalf<C, R, D, COLS, ROWS>
where
    C: OutputPin<Error = E>,
    R: InputPin<Error = E>,
    D: DelayUs<u32>,
    E: Debug,
{
    type Error = PinError<E>;

    fn columns(&self) -> u8 {
        COLS as u8
    }

    fn rows(&self) -> u8 {
        ROWS as u8
    }

    fn scan(&mut self) -> Result<HalfScan, Self::Error> {
        let active = self.active;
        let mut scan = HalfScan::new(ROWS as u8);

        for column in self.columns.iter_mut() {
            // Only one column is ever selected, so no current path exists
            // between two columns through held switches.
            active.select(column).map_err(PinError::Pin)?;
            self.delay.delay_us(SETTLE_US);
            let mut bits = 0u8;
            let read = self.rows.iter().enumerate().try_for_each(|(r, row)| -> Result<(), E> {
                if active.is_active(row)? {
                    bits |= 1 << r;
                }
                Ok(())
            });
            active.deselect(column).map_err(PinError::Pin)?;
            read.map_err(PinError::Pin)?;
            scan.push(bits)?;
        }

        Ok(scan)
    }
}

/// Transition seen on a switch since the previous scan.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Edge {
    Down,
    Up,
}

/// Live state of one position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub down: bool,
    /// The binding the position currently resolves to.
    pub effective: KeyBinding,
}

/// Per-position live table, derived from the keymap at startup.
///
/// The static keymap is never written; layer changes patch `effective` here.
#[derive(Clone, Debug)]
pub struct MatrixState {
    cells: Vec<Cell, MAX_KEYS>,
}

impl MatrixState {
    pub fn new(keymap: &Keymap<'_>) -> Self {
        let cells = (0..keymap.len())
            .map(|index| Cell {
                down: false,
                effective: keymap.base(index),
            })
            .collect();
        Self { cells }
    }

    /// Record the new physical state and report the edge, if any.
    pub fn observe(&mut self, index: usize, down: bool) -> Option<Edge> {
        let cell = &mut self.cells[index];
        if cell.down == down {
            return None;
        }
        cell.down = down;
        Some(if down { Edge::Down } else { Edge::Up })
    }

    pub fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    pub fn set_effective(&mut self, index: usize, binding: KeyBinding) {
        self.cells[index].effective = binding;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Bench wiring: which switches are closed and which column is driven.
    #[derive(Default)]
    struct Bench {
        closed: std::vec::Vec<(usize, usize)>,
        selected: Option<usize>,
        selections: usize,
        /// Column that was driven during each settle wait.
        settled: std::vec::Vec<Option<usize>>,
    }

    struct Settle(Rc<RefCell<Bench>>);

    impl DelayUs<u32> for Settle {
        fn delay_us(&mut self, us: u32) {
            assert_eq!(us, SETTLE_US);
            let mut bench = self.0.borrow_mut();
            let selected = bench.selected;
            bench.settled.push(selected);
        }
    }

    struct ColumnPin {
        index: usize,
        bench: Rc<RefCell<Bench>>,
    }

    impl OutputPin for ColumnPin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            let mut bench = self.bench.borrow_mut();
            assert_eq!(bench.selected, None, "two columns selected at once");
            bench.selected = Some(self.index);
            bench.selections += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            let mut bench = self.bench.borrow_mut();
            if bench.selected == Some(self.index) {
                bench.selected = None;
            }
            Ok(())
        }
    }

    struct RowPin {
        index: usize,
        bench: Rc<RefCell<Bench>>,
    }

    impl InputPin for RowPin {
        type Error = Infallible;

        fn is_high(&self) -> Result<bool, Infallible> {
            self.is_low().map(|low| !low)
        }

        fn is_low(&self) -> Result<bool, Infallible> {
            let bench = self.bench.borrow();
            Ok(match bench.selected {
                Some(col) => bench.closed.contains(&(col, self.index)),
                None => false,
            })
        }
    }

    fn half(bench: &Rc<RefCell<Bench>>) -> DirectHalf<ColumnPin, RowPin, Settle, 3, 2> {
        let columns = [0, 1, 2].map(|index| ColumnPin {
            index,
            bench: bench.clone(),
        });
        let rows = [0, 1].map(|index| RowPin {
            index,
            bench: bench.clone(),
        });
        DirectHalf::new(columns, rows, Settle(bench.clone()), ActiveLevel::Low).unwrap()
    }

    #[test]
    fn active_low_rows_read_inverted() {
        let bench = Rc::new(RefCell::new(Bench::default()));
        bench.borrow_mut().closed = vec![(0, 1), (2, 0)];
        let mut half = half(&bench);

        let scan = half.scan().unwrap();
        assert_eq!(scan.columns(), 3);
        assert_eq!(scan.column_bits(0), 0b10);
        assert_eq!(scan.column_bits(1), 0b00);
        assert_eq!(scan.column_bits(2), 0b01);
        assert_eq!(bench.borrow().selections, 3);
        assert_eq!(bench.borrow().selected, None);
    }

    #[test]
    fn each_column_settles_before_its_rows_are_read() {
        let bench = Rc::new(RefCell::new(Bench::default()));
        let mut half = half(&bench);
        half.scan().unwrap();
        half.scan().unwrap();
        assert_eq!(
            bench.borrow().settled,
            [Some(0), Some(1), Some(2), Some(0), Some(1), Some(2)]
        );
    }

    #[test]
    fn scan_iterates_column_then_row() {
        let mut scan = HalfScan::new(2);
        scan.push(0b01).unwrap();
        scan.push(0b10).unwrap();
        let order: std::vec::Vec<_> = scan.iter().collect();
        assert_eq!(
            order,
            [(0, 0, true), (0, 1, false), (1, 0, false), (1, 1, true)]
        );
    }

    #[test]
    fn push_masks_unused_rows_and_refuses_when_full() {
        let mut scan = HalfScan::new(5);
        assert_eq!(scan.push(0xFF), Ok(()));
        assert_eq!(scan.column_bits(0), 0b1_1111);
        for _ in 1..MAX_SCAN_COLUMNS {
            assert_eq!(scan.push(0), Ok(()));
        }
        assert_eq!(scan.push(0), Err(ScanFull));
        assert_eq!(scan.columns(), MAX_SCAN_COLUMNS);
    }

    #[test]
    fn too_many_direct_columns_is_an_error() {
        let bench = Rc::new(RefCell::new(Bench::default()));
        let columns: [ColumnPin; MAX_SCAN_COLUMNS + 1] = core::array::from_fn(|index| ColumnPin {
            index,
            bench: bench.clone(),
        });
        let rows = [RowPin {
            index: 0,
            bench: bench.clone(),
        }];
        let mut half =
            DirectHalf::new(columns, rows, Settle(bench.clone()), ActiveLevel::Low).unwrap();
        assert_eq!(half.scan(), Err(PinError::Full(ScanFull)));
    }

    #[test]
    fn active_level_bytes() {
        assert_eq!(ActiveLevel::High.select_byte(2), 0b0000_0100);
        assert_eq!(ActiveLevel::Low.select_byte(2), 0b1111_1011);
        assert_eq!(ActiveLevel::Low.decode(0b1110_1110, row_mask(5)), 0b1_0001);
        assert_eq!(ActiveLevel::High.decode(0b1110_1110, row_mask(5)), 0b0_1110);
        assert_eq!(row_mask(8), 0xFF);
    }
}
