//! The Teensy's single on-board LED, driven as a one-pixel strip.
//!
//! The LED has no color, so any non-black pixel lights it.

use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;
use smart_leds::{SmartLedsWrite, RGB8};

use crate::pins::Output;

pub struct BoardLed {
    pin: Output,
}

impl BoardLed {
    pub fn new(pin: Output) -> Self {
        Self { pin }
    }
}

impl SmartLedsWrite for BoardLed {
    type Error = Infallible;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Infallible>
    where
        T: IntoIterator<Item = I>,
        I: Into<RGB8>,
    {
        let lit = iterator
            .into_iter()
            .next()
            .map(Into::into)
            .map_or(false, |c: RGB8| c.r != 0 || c.g != 0 || c.b != 0);
        if lit {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }
}
