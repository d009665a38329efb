//! MCP23018 I/O expander driver for the right half.
//!
//! GPIOA drives the columns (one selected at a time) and GPIOB bits 0-4 read
//! the rows. Every register access is a separate bus transaction: the device
//! only exposes the currently selected column, so a scan is a select write
//! followed by an input read, once per column.

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{info, warn};

use crate::matrix::{row_mask, ActiveLevel, HalfScan, ScanFull, ScanHalf, MAX_SCAN_COLUMNS};

/// MCP23018 I2C address (all address pins grounded).
pub const MCP23018_ADDR: u8 = 0x20;

// MCP23018 register addresses (IOCON.BANK = 0, default)
pub const IODIRA: u8 = 0x00; // I/O direction register A (columns)
pub const IODIRB: u8 = 0x01; // I/O direction register B (rows)
pub const GPINTENB: u8 = 0x05; // Interrupt-on-change enable register B
pub const GPPUB: u8 = 0x0D; // Pull-up resistor register B
pub const GPIOA: u8 = 0x12; // Port A register
pub const GPIOB: u8 = 0x13; // Port B register

/// A failed expander access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError<E> {
    #[error("expander {address:#04x}: writing register {register:#04x} failed: {cause:?}")]
    Write { address: u8, register: u8, cause: E },
    #[error("expander {address:#04x}: reading register {register:#04x} failed: {cause:?}")]
    Read { address: u8, register: u8, cause: E },
    #[error("expander {address:#04x} is not configured")]
    NotConfigured { address: u8 },
    #[error(transparent)]
    Full(#[from] ScanFull),
}

pub struct Mcp23018<I> {
    bus: I,
    address: u8,
    columns: u8,
    rows: u8,
    active: ActiveLevel,
    configured: bool,
}

impl<I, E> Mcp23018<I>
where
    I: Write<Error = E> + WriteRead<Error = E>,
{
    /// Wrap a bus. Nothing is sent until [`Mcp23018::configure`].
    pub fn new(bus: I, address: u8, columns: u8, rows: u8, active: ActiveLevel) -> Self {
        Self {
            bus,
            address,
            columns: columns.min(8).min(MAX_SCAN_COLUMNS as u8),
            rows: rows.min(8),
            active,
            configured: false,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Program direction, pull-ups and interrupt mask, and park the columns.
    pub fn configure(&mut self) -> Result<(), BusError<E>> {
        let rows = row_mask(self.rows);
        let pull_ups = match self.active {
            ActiveLevel::Low => rows,
            ActiveLevel::High => 0x00,
        };

        // IODIRA = 0x00: all pins output (columns)
        self.write_register(IODIRA, 0x00)?;
        // IODIRB: row pins input
        self.write_register(IODIRB, rows)?;
        self.write_register(GPPUB, pull_ups)?;
        // No interrupts; the rows are polled.
        self.write_register(GPINTENB, 0x00)?;
        self.write_register(GPIOA, self.active.idle_byte())?;

        self.configured = true;
        Ok(())
    }

    /// Select one column and read its rows.
    pub fn read_column(&mut self, column: u8) -> Result<u8, BusError<E>> {
        self.write_register(GPIOA, self.active.select_byte(column))?;
        let raw = self.read_register(GPIOB)?;
        Ok(self.active.decode(raw, row_mask(self.rows)))
    }

    pub fn release(self) -> I {
        self.bus
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError<E>> {
        self.bus
            .write(self.address, &[register, value])
            .map_err(|cause| {
                self.configured = false;
                BusError::Write {
                    address: self.address,
                    register,
                    cause,
                }
            })
    }

    fn read_register(&mut self, register: u8) -> Result<u8, BusError<E>> {
        let mut buf = [0u8; 1];
        self.bus
            .write_read(self.address, &[register], &mut buf)
            .map_err(|cause| {
                self.configured = false;
                BusError::Read {
                    address: self.address,
                    register,
                    cause,
                }
            })?;
        Ok(buf[0])
    }
}

impl<I, E> ScanHalf for Mcp23018<I>
where
    I: Write<Error = E> + WriteRead<Error = E>,
    E: core::fmt::Debug,
{
    type Error = BusError<E>;

    fn columns(&self) -> u8 {
        self.columns
    }

    fn rows(&self) -> u8 {
        self.rows
    }

    fn scan(&mut self) -> Result<HalfScan, Self::Error> {
        if !self.configured {
            return Err(BusError::NotConfigured {
                address: self.address,
            });
        }
        let mut scan = HalfScan::new(self.rows);
        for column in 0..self.columns {
            let bits = self.read_column(column)?;
            scan.push(bits)?;
        }
        Ok(scan)
    }

    fn recover(&mut self) -> Result<(), Self::Error> {
        match self.configure() {
            Ok(()) => {
                info!("expander {:#04x} configured", self.address);
                Ok(())
            }
            Err(e) => {
                warn!("expander {:#04x} still unreachable", self.address);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Transaction {
        Write(u8, std::vec::Vec<u8>),
        WriteRead(u8, std::vec::Vec<u8>),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Nack;

    /// Records transactions and answers input-register reads from a table
    /// indexed by the last column-select value written.
    #[derive(Default)]
    struct FakeBus {
        log: std::vec::Vec<Transaction>,
        /// Raw GPIOB value per selected column.
        port_b: [u8; 8],
        last_select: u8,
        present: bool,
        fail_after: Option<usize>,
    }

    impl FakeBus {
        fn present() -> Self {
            Self {
                present: true,
                port_b: [0xFF; 8],
                ..Default::default()
            }
        }

        fn check(&mut self) -> Result<(), Nack> {
            if !self.present {
                return Err(Nack);
            }
            if let Some(n) = self.fail_after {
                if self.log.len() >= n {
                    return Err(Nack);
                }
            }
            Ok(())
        }
    }

    impl Write for FakeBus {
        type Error = Nack;

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Nack> {
            self.check()?;
            self.log.push(Transaction::Write(address, bytes.to_vec()));
            if bytes[0] == GPIOA {
                self.last_select = bytes[1];
            }
            Ok(())
        }
    }

    impl WriteRead for FakeBus {
        type Error = Nack;

        fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Nack> {
            self.check()?;
            self.log.push(Transaction::WriteRead(address, bytes.to_vec()));
            assert_eq!(buffer.len(), 1);
            // Active low: the selected column is the cleared bit.
            let column = (!self.last_select).trailing_zeros() as usize;
            buffer[0] = self.port_b[column.min(7)];
            Ok(())
        }
    }

    #[test]
    fn configure_writes_setup_registers() {
        let mut mcp = Mcp23018::new(FakeBus::present(), MCP23018_ADDR, 7, 5, ActiveLevel::Low);
        mcp.configure().unwrap();
        let log = mcp.release().log;
        assert_eq!(
            log,
            [
                Transaction::Write(0x20, vec![IODIRA, 0x00]),
                Transaction::Write(0x20, vec![IODIRB, 0x1F]),
                Transaction::Write(0x20, vec![GPPUB, 0x1F]),
                Transaction::Write(0x20, vec![GPINTENB, 0x00]),
                Transaction::Write(0x20, vec![GPIOA, 0xFF]),
            ]
        );
    }

    #[test]
    fn scan_frames_one_select_and_one_read_per_column() {
        let mut bus = FakeBus::present();
        // Column 3, rows 0 and 4 pulled low.
        bus.port_b[3] = 0b1110_1110;
        let mut mcp = Mcp23018::new(bus, MCP23018_ADDR, 7, 5, ActiveLevel::Low);
        mcp.configure().unwrap();

        let scan = mcp.scan().unwrap();
        assert_eq!(scan.column_bits(3), 0b1_0001);
        assert_eq!(scan.column_bits(2), 0);

        let log = mcp.release().log;
        let frames = &log[5..];
        assert_eq!(frames.len(), 14);
        for (column, pair) in frames.chunks(2).enumerate() {
            assert_eq!(
                pair[0],
                Transaction::Write(0x20, vec![GPIOA, !(1u8 << column)])
            );
            assert_eq!(pair[1], Transaction::WriteRead(0x20, vec![GPIOB]));
        }
    }

    #[test]
    fn active_high_selects_a_single_set_bit() {
        let mut mcp = Mcp23018::new(FakeBus::present(), 0x27, 2, 5, ActiveLevel::High);
        mcp.configure().unwrap();
        mcp.read_column(1).unwrap();
        let log = mcp.release().log;
        assert_eq!(log[5], Transaction::Write(0x27, vec![GPIOA, 0b10]));
    }

    #[test]
    fn missing_device_is_an_error_not_released_keys() {
        let mut mcp = Mcp23018::new(FakeBus::default(), MCP23018_ADDR, 7, 5, ActiveLevel::Low);
        assert_eq!(
            mcp.configure(),
            Err(BusError::Write {
                address: 0x20,
                register: IODIRA,
                cause: Nack
            })
        );
        assert_eq!(
            mcp.scan(),
            Err(BusError::NotConfigured { address: 0x20 })
        );
    }

    #[test]
    fn failure_mid_scan_drops_configuration() {
        let mut bus = FakeBus::present();
        bus.fail_after = Some(8);
        let mut mcp = Mcp23018::new(bus, MCP23018_ADDR, 7, 5, ActiveLevel::Low);
        mcp.configure().unwrap();

        assert_eq!(
            mcp.scan(),
            Err(BusError::Read {
                address: 0x20,
                register: GPIOB,
                cause: Nack
            })
        );
        assert!(!mcp.is_configured());
    }
}
