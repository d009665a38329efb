//! Single GPIO lines on the ATmega32U4, as `embedded-hal` pins.
//!
//! Board wiring (Teensy 2.0):
//!   Column outputs (active low):  PB0, PB1, PB2, PB3, PD2, PD3, PC6
//!   Row inputs (pull-up):         PF0, PF1, PF4, PF5, PF6
//!   Lock LEDs:                    PB5 (num), PB6 (caps), PB7 (scroll)
//!   On-board LED (heartbeat):     PD6

use core::convert::Infallible;

use avr_device::atmega32u4::{PORTB, PORTC, PORTD, PORTF};
use embedded_hal::digital::v2::{InputPin, OutputPin};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Port {
    B,
    C,
    D,
    F,
}

/// Run `$body` with the port's DDR, PORT and PIN registers bound.
macro_rules! with_port {
    ($port:expr, |$ddr:ident, $out:ident, $inp:ident| $body:expr) => {
        match $port {
            Port::B => {
                let regs = unsafe { &*PORTB::ptr() };
                let ($ddr, $out, $inp) = (&regs.ddrb, &regs.portb, &regs.pinb);
                $body
            }
            Port::C => {
                let regs = unsafe { &*PORTC::ptr() };
                let ($ddr, $out, $inp) = (&regs.ddrc, &regs.portc, &regs.pinc);
                $body
            }
            Port::D => {
                let regs = unsafe { &*PORTD::ptr() };
                let ($ddr, $out, $inp) = (&regs.ddrd, &regs.portd, &regs.pind);
                $body
            }
            Port::F => {
                let regs = unsafe { &*PORTF::ptr() };
                let ($ddr, $out, $inp) = (&regs.ddrf, &regs.portf, &regs.pinf);
                $body
            }
        }
    };
}

/// One bit of one port, not yet configured.
#[derive(Copy, Clone, Debug)]
pub struct Pin {
    port: Port,
    mask: u8,
}

impl Pin {
    pub const fn new(port: Port, bit: u8) -> Self {
        Self {
            port,
            mask: 1 << bit,
        }
    }

    /// Make the pin an output, starting high.
    pub fn into_output_high(self) -> Output {
        let mask = self.mask;
        with_port!(self.port, |ddr, out, _inp| {
            out.modify(|r, w| unsafe { w.bits(r.bits() | mask) });
            ddr.modify(|r, w| unsafe { w.bits(r.bits() | mask) });
        });
        Output(self)
    }

    /// Make the pin an output, starting low.
    pub fn into_output_low(self) -> Output {
        let mask = self.mask;
        with_port!(self.port, |ddr, out, _inp| {
            out.modify(|r, w| unsafe { w.bits(r.bits() & !mask) });
            ddr.modify(|r, w| unsafe { w.bits(r.bits() | mask) });
        });
        Output(self)
    }

    /// Make the pin an input with the internal pull-up enabled.
    pub fn into_pull_up_input(self) -> Input {
        let mask = self.mask;
        with_port!(self.port, |ddr, out, _inp| {
            ddr.modify(|r, w| unsafe { w.bits(r.bits() & !mask) });
            out.modify(|r, w| unsafe { w.bits(r.bits() | mask) });
        });
        Input(self)
    }
}

pub struct Output(Pin);

impl OutputPin for Output {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        let mask = self.0.mask;
        with_port!(self.0.port, |_ddr, out, _inp| {
            out.modify(|r, w| unsafe { w.bits(r.bits() & !mask) })
        });
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mask = self.0.mask;
        with_port!(self.0.port, |_ddr, out, _inp| {
            out.modify(|r, w| unsafe { w.bits(r.bits() | mask) })
        });
        Ok(())
    }
}

pub struct Input(Pin);

impl InputPin for Input {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        let mask = self.0.mask;
        Ok(with_port!(self.0.port, |_ddr, _out, inp| {
            inp.read().bits() & mask != 0
        }))
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

pub const COLUMNS: [Pin; 7] = [
    Pin::new(Port::B, 0),
    Pin::new(Port::B, 1),
    Pin::new(Port::B, 2),
    Pin::new(Port::B, 3),
    Pin::new(Port::D, 2),
    Pin::new(Port::D, 3),
    Pin::new(Port::C, 6),
];

pub const ROWS: [Pin; 5] = [
    Pin::new(Port::F, 0),
    Pin::new(Port::F, 1),
    Pin::new(Port::F, 4),
    Pin::new(Port::F, 5),
    Pin::new(Port::F, 6),
];

pub const LED_NUM: Pin = Pin::new(Port::B, 5);
pub const LED_CAPS: Pin = Pin::new(Port::B, 6);
pub const LED_SCROLL: Pin = Pin::new(Port::B, 7);
pub const LED_BOARD: Pin = Pin::new(Port::D, 6);
