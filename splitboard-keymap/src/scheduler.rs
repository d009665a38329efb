//! Fixed-period scan loop.

use core::fmt::Debug;
use core::iter::once;

use embedded_hal::blocking::delay::DelayUs;
use log::{trace, warn};
use smart_leds::{SmartLedsWrite, RGB8};

/// Microsecond timestamp.
pub type Instant = fugit::TimerInstantU32<1_000_000>;
/// Microsecond span.
pub type Duration = fugit::TimerDurationU32<1_000_000>;

/// Target cycle length when nothing else is configured.
pub const DEFAULT_PERIOD: Duration = Duration::millis(50);

pub const HEARTBEAT_OFF: RGB8 = RGB8::new(0, 0, 0);
pub const HEARTBEAT_ON: RGB8 = RGB8::new(10, 0, 10);

/// Free-running monotonic time source.
pub trait Clock {
    fn now(&mut self) -> Instant;
}

/// Time between two readings of a wrapping counter.
pub fn elapsed(start: Instant, end: Instant) -> Duration {
    Duration::from_ticks(end.ticks().wrapping_sub(start.ticks()))
}

pub struct Scheduler<K, D, L> {
    clock: K,
    delay: D,
    heartbeat: L,
    period: Duration,
    lit: bool,
    cycles: u32,
    overruns: u32,
}

impl<K, D, L> Scheduler<K, D, L>
where
    K: Clock,
    D: DelayUs<u32>,
    L: SmartLedsWrite<Color = RGB8>,
    L::Error: Debug,
{
    pub fn new(clock: K, delay: D, heartbeat: L, period: Duration) -> Self {
        Self {
            clock,
            delay,
            heartbeat,
            period,
            lit: false,
            cycles: 0,
            overruns: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Cycles that took longer than the period.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Run one cycle, sleep out the rest of the period and toggle the
    /// heartbeat. Returns how long it slept.
    pub fn run_cycle<F: FnOnce()>(&mut self, cycle: F) -> Duration {
        let start = self.clock.now();
        cycle();
        let spent = elapsed(start, self.clock.now());
        self.cycles = self.cycles.wrapping_add(1);

        let slept = if spent < self.period {
            let remaining = self.period - spent;
            self.delay.delay_us(remaining.to_micros());
            remaining
        } else {
            self.overruns = self.overruns.wrapping_add(1);
            trace!(
                "cycle {} overran: {} us of {} us",
                self.cycles,
                spent.to_micros(),
                self.period.to_micros()
            );
            Duration::from_ticks(0)
        };

        self.toggle_heartbeat();
        slept
    }

    /// Run `cycle` forever.
    pub fn run<F: FnMut()>(&mut self, mut cycle: F) -> ! {
        loop {
            self.run_cycle(&mut cycle);
        }
    }

    fn toggle_heartbeat(&mut self) {
        self.lit = !self.lit;
        let color = if self.lit { HEARTBEAT_ON } else { HEARTBEAT_OFF };
        if let Err(e) = self.heartbeat.write(once(color)) {
            warn!("heartbeat: {:?}", e);
        }
    }
}
