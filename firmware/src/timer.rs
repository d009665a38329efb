//! Timer1 as a free-running microsecond clock.
//!
//! TC1 runs in normal mode at clk/64: one tick is 4us at 16MHz and the 16-bit
//! counter wraps every ~262ms. [`Clock`] extends it in software, so it must be
//! read at least once per wrap; the scan loop reads it every cycle.

use avr_device::atmega32u4::TC1;
use embedded_hal::blocking::delay::DelayUs;
use splitboard_keymap::scheduler::{Clock, Instant};

const MICROS_PER_TICK: u32 = 4;

/// Start TC1 counting from zero.
pub fn start(tc1: &TC1) {
    tc1.tccr1a.write(|w| unsafe { w.bits(0) });
    tc1.tcnt1.write(|w| unsafe { w.bits(0) });
    // CS1 = 0b011: clk/64
    tc1.tccr1b.write(|w| unsafe { w.bits(0x03) });
}

pub struct Timer1Clock<'d> {
    tc1: &'d TC1,
    last: u16,
    wraps: u16,
}

impl<'d> Timer1Clock<'d> {
    pub fn new(tc1: &'d TC1) -> Self {
        Self {
            tc1,
            last: tc1.tcnt1.read().bits(),
            wraps: 0,
        }
    }
}

impl Clock for Timer1Clock<'_> {
    fn now(&mut self) -> Instant {
        let count = self.tc1.tcnt1.read().bits();
        if count < self.last {
            self.wraps = self.wraps.wrapping_add(1);
        }
        self.last = count;
        let ticks = (self.wraps as u32) << 16 | count as u32;
        Instant::from_ticks(ticks.wrapping_mul(MICROS_PER_TICK))
    }
}

/// Busy-wait on the TC1 counter.
pub struct Timer1Delay<'d> {
    tc1: &'d TC1,
}

impl<'d> Timer1Delay<'d> {
    pub fn new(tc1: &'d TC1) -> Self {
        Self { tc1 }
    }
}

impl DelayUs<u32> for Timer1Delay<'_> {
    fn delay_us(&mut self, us: u32) {
        let ticks = us / MICROS_PER_TICK;
        let mut waited: u32 = 0;
        let mut last = self.tc1.tcnt1.read().bits();
        while waited < ticks {
            let now = self.tc1.tcnt1.read().bits();
            waited += now.wrapping_sub(last) as u32;
            last = now;
        }
    }
}
