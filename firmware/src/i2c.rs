//! TWI (I2C) master for the ATmega32U4.
//!
//! Exposes the two blocking transactions the expander driver needs through
//! `embedded-hal`. Every wait on the hardware is bounded and every failure
//! ends the transaction with a STOP so the bus is free for the next attempt.

use avr_device::atmega32u4::TWI;
use embedded_hal::blocking::i2c::{Write, WriteRead};

/// TWI clock prescaler and bit rate for ~100kHz at 16MHz CPU.
/// SCL freq = CPU_FREQ / (16 + 2 * TWBR * prescaler)
/// 100kHz = 16MHz / (16 + 2 * 72 * 1) => TWBR = 72
const TWBR_VALUE: u8 = 72;

/// TWI status codes
const TW_START: u8 = 0x08;
const TW_REP_START: u8 = 0x10;
const TW_MT_SLA_ACK: u8 = 0x18;
const TW_MT_DATA_ACK: u8 = 0x28;
const TW_MR_SLA_ACK: u8 = 0x40;
const TW_MR_DATA_ACK: u8 = 0x50;
const TW_MR_DATA_NACK: u8 = 0x58;

/// TWSR status on failure, where the hardware produced one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TwiError {
    Timeout,
    Start(u8),
    AddressNack(u8),
    DataNack(u8),
}

pub struct Twi<'d> {
    twi: &'d TWI,
}

impl<'d> Twi<'d> {
    /// Set the bit rate and enable the peripheral.
    pub fn new(twi: &'d TWI) -> Self {
        twi.twbr.write(|w| unsafe { w.bits(TWBR_VALUE) });
        // Prescaler = 1 (TWPS = 0)
        twi.twsr.write(|w| w.twps().prescaler_1());
        twi.twcr.write(|w| w.twen().set_bit());
        Self { twi }
    }

    fn status(&self) -> u8 {
        self.twi.twsr.read().tws().bits() << 3
    }

    fn wait(&self) -> Result<(), TwiError> {
        let mut timeout: u16 = 0xFFFF;
        while self.twi.twcr.read().twint().bit_is_clear() {
            timeout -= 1;
            if timeout == 0 {
                return Err(TwiError::Timeout);
            }
        }
        Ok(())
    }

    fn start(&self) -> Result<(), TwiError> {
        self.twi
            .twcr
            .write(|w| w.twint().set_bit().twsta().set_bit().twen().set_bit());
        self.wait()?;
        match self.status() {
            TW_START | TW_REP_START => Ok(()),
            status => Err(TwiError::Start(status)),
        }
    }

    fn address(&self, address: u8, read: bool) -> Result<(), TwiError> {
        self.send((address << 1) | read as u8)?;
        match self.status() {
            TW_MT_SLA_ACK | TW_MR_SLA_ACK => Ok(()),
            status => Err(TwiError::AddressNack(status)),
        }
    }

    fn send(&self, byte: u8) -> Result<(), TwiError> {
        self.twi.twdr.write(|w| unsafe { w.bits(byte) });
        self.twi.twcr.write(|w| w.twint().set_bit().twen().set_bit());
        self.wait()
    }

    fn write_data(&self, bytes: &[u8]) -> Result<(), TwiError> {
        for byte in bytes {
            self.send(*byte)?;
            if self.status() != TW_MT_DATA_ACK {
                return Err(TwiError::DataNack(self.status()));
            }
        }
        Ok(())
    }

    fn read_data(&self, buffer: &mut [u8]) -> Result<(), TwiError> {
        let last = buffer.len().saturating_sub(1);
        for (i, slot) in buffer.iter_mut().enumerate() {
            // ACK every byte but the last.
            if i == last {
                self.twi.twcr.write(|w| w.twint().set_bit().twen().set_bit());
            } else {
                self.twi
                    .twcr
                    .write(|w| w.twint().set_bit().twea().set_bit().twen().set_bit());
            }
            self.wait()?;
            match self.status() {
                TW_MR_DATA_ACK | TW_MR_DATA_NACK => *slot = self.twi.twdr.read().bits(),
                status => return Err(TwiError::DataNack(status)),
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.twi
            .twcr
            .write(|w| w.twint().set_bit().twsto().set_bit().twen().set_bit());
    }

    fn finish<T>(&self, result: Result<T, TwiError>) -> Result<T, TwiError> {
        self.stop();
        result
    }
}

impl Write for Twi<'_> {
    type Error = TwiError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TwiError> {
        let result = self
            .start()
            .and_then(|()| self.address(address, false))
            .and_then(|()| self.write_data(bytes));
        self.finish(result)
    }
}

impl WriteRead for Twi<'_> {
    type Error = TwiError;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), TwiError> {
        let result = self
            .start()
            .and_then(|()| self.address(address, false))
            .and_then(|()| self.write_data(bytes))
            // Repeated start for read
            .and_then(|()| self.start())
            .and_then(|()| self.address(address, true))
            .and_then(|()| self.read_data(buffer));
        self.finish(result)
    }
}
