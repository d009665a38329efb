//! Host-facing side of a scan cycle.
//!
//! [`Report`] collects the keycodes to release and press during one cycle and
//! hands them to a [`HidTransport`], releases first. [`KeyboardReport`] is the
//! 8-byte boot keyboard report a USB transport builds from those calls.

use core::fmt::Debug;

use embedded_hal::digital::v2::OutputPin;
use heapless::Vec;
use log::{error, warn};

use crate::keycode::Keycode;

/// Most keycodes held at once, and the size of each per-cycle batch.
pub const MAX_HELD: usize = 16;

/// Host lock indicators.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockLed {
    NumLock,
    CapsLock,
    ScrollLock,
}

impl LockLed {
    pub const ALL: [LockLed; 3] = [LockLed::CapsLock, LockLed::NumLock, LockLed::ScrollLock];

    /// Bit in the HID LED output report.
    pub fn mask(self) -> u8 {
        match self {
            LockLed::NumLock => 0x01,
            LockLed::CapsLock => 0x02,
            LockLed::ScrollLock => 0x04,
        }
    }
}

/// Whatever carries key events to the host.
pub trait HidTransport {
    fn press(&mut self, keys: &[Keycode]);

    fn release(&mut self, keys: &[Keycode]);

    /// Host-reported state of a lock indicator.
    fn led_on(&self, led: LockLed) -> bool;
}

/// Keycodes to release and press at the end of the current cycle.
///
/// A code pressed and then released within the same cycle cancels out, as
/// does a release followed by a press, so the host never sees a transient
/// state and a key never holds two slots at once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    releases: Vec<Keycode, MAX_HELD>,
    presses: Vec<Keycode, MAX_HELD>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, code: Keycode) {
        if let Some(i) = self.releases.iter().position(|c| *c == code) {
            self.releases.remove(i);
        } else if !self.presses.contains(&code) && self.presses.push(code).is_err() {
            error!("press batch full, {} lost", code);
        }
    }

    pub fn release(&mut self, code: Keycode) {
        if let Some(i) = self.presses.iter().position(|c| *c == code) {
            self.presses.remove(i);
        } else if !self.releases.contains(&code) && self.releases.push(code).is_err() {
            error!("release batch full, {} lost", code);
        }
    }

    pub fn releases(&self) -> &[Keycode] {
        &self.releases
    }

    pub fn presses(&self) -> &[Keycode] {
        &self.presses
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty() && self.presses.is_empty()
    }

    /// Send everything collected, releases before presses, and start over.
    pub fn flush<T: HidTransport>(&mut self, transport: &mut T) {
        if !self.releases.is_empty() {
            transport.release(&self.releases);
        }
        if !self.presses.is_empty() {
            transport.press(&self.presses);
        }
        self.releases.clear();
        self.presses.clear();
    }
}

/// Output lines mirroring the host's lock state.
pub struct LockIndicators<P> {
    caps: P,
    num: P,
    scroll: P,
}

impl<P> LockIndicators<P>
where
    P: OutputPin,
    P::Error: Debug,
{
    pub fn new(caps: P, num: P, scroll: P) -> Self {
        Self { caps, num, scroll }
    }

    /// Drive every indicator to what the host last reported.
    pub fn sync<T: HidTransport>(&mut self, transport: &T) {
        for led in LockLed::ALL {
            let pin = match led {
                LockLed::CapsLock => &mut self.caps,
                LockLed::NumLock => &mut self.num,
                LockLed::ScrollLock => &mut self.scroll,
            };
            let result = if transport.led_on(led) {
                pin.set_high()
            } else {
                pin.set_low()
            };
            if let Err(e) = result {
                warn!("{:?} indicator: {:?}", led, e);
            }
        }
    }
}

/// Standard USB HID keyboard report (8 bytes).
/// Byte 0: modifier keys bitmask
/// Byte 1: reserved (0x00)
/// Bytes 2-7: up to 6 simultaneous keycodes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub reserved: u8,
    pub keys: [u8; 6],
}

impl KeyboardReport {
    pub const fn empty() -> Self {
        Self {
            modifiers: 0,
            reserved: 0,
            keys: [0; 6],
        }
    }

    /// Add a key. Returns false if all six slots are taken; the key is
    /// dropped, which is the rollover limit of the boot protocol.
    pub fn press(&mut self, code: Keycode) -> bool {
        if code.is_modifier() {
            self.modifiers |= code.modifier_bit();
            return true;
        }
        let usage = code.usage();
        if self.keys.contains(&usage) {
            return true;
        }
        match self.keys.iter_mut().find(|k| **k == 0) {
            Some(slot) => {
                *slot = usage;
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, code: Keycode) {
        if code.is_modifier() {
            self.modifiers &= !code.modifier_bit();
            return;
        }
        let usage = code.usage();
        // Keep occupied slots contiguous.
        let mut kept = [0u8; 6];
        for (slot, key) in self
            .keys
            .iter()
            .filter(|k| **k != 0 && **k != usage)
            .enumerate()
        {
            kept[slot] = *key;
        }
        self.keys = kept;
    }

    pub fn as_bytes(&self) -> [u8; 8] {
        let k = self.keys;
        [
            self.modifiers,
            self.reserved,
            k[0],
            k[1],
            k[2],
            k[3],
            k[4],
            k[5],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use Keycode::*;

    #[derive(Default)]
    struct Recorder {
        calls: std::vec::Vec<(&'static str, std::vec::Vec<Keycode>)>,
        leds: u8,
    }

    impl HidTransport for Recorder {
        fn press(&mut self, keys: &[Keycode]) {
            self.calls.push(("press", keys.to_vec()));
        }

        fn release(&mut self, keys: &[Keycode]) {
            self.calls.push(("release", keys.to_vec()));
        }

        fn led_on(&self, led: LockLed) -> bool {
            self.leds & led.mask() != 0
        }
    }

    #[test]
    fn flush_sends_releases_first() {
        let mut report = Report::new();
        report.press(Up);
        report.release(W);
        let mut hid = Recorder::default();
        report.flush(&mut hid);
        assert_eq!(hid.calls, [("release", vec![W]), ("press", vec![Up])]);
        assert!(report.is_empty());

        report.flush(&mut hid);
        assert_eq!(hid.calls.len(), 2);
    }

    #[test]
    fn opposite_events_in_one_cycle_cancel() {
        let mut report = Report::new();
        report.press(A);
        report.release(A);
        assert!(report.is_empty());

        report.release(B);
        report.press(B);
        assert!(report.is_empty());

        report.press(C);
        report.press(C);
        assert_eq!(report.presses(), [C]);
    }

    #[test]
    fn boot_report_tracks_keys_and_modifiers() {
        let mut r = KeyboardReport::empty();
        assert!(r.press(LShift));
        assert!(r.press(A));
        assert!(r.press(B));
        assert_eq!(r.as_bytes(), [0x02, 0, 0x04, 0x05, 0, 0, 0, 0]);

        r.release(A);
        r.release(LShift);
        assert_eq!(r.as_bytes(), [0, 0, 0x05, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn boot_report_drops_a_seventh_key() {
        let mut r = KeyboardReport::empty();
        for code in [A, B, C, D, E, F] {
            assert!(r.press(code));
        }
        assert!(!r.press(G));
        assert!(r.press(A));
        assert!(!r.keys.contains(&G.usage()));
    }

    struct Line(std::rc::Rc<std::cell::Cell<bool>>);

    impl OutputPin for Line {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    #[test]
    fn indicators_follow_host_state() {
        let lines: [std::rc::Rc<std::cell::Cell<bool>>; 3] = Default::default();
        let mut leds = LockIndicators::new(
            Line(lines[0].clone()),
            Line(lines[1].clone()),
            Line(lines[2].clone()),
        );
        let mut hid = Recorder {
            leds: LockLed::CapsLock.mask() | LockLed::ScrollLock.mask(),
            ..Default::default()
        };
        leds.sync(&hid);
        assert_eq!(
            [lines[0].get(), lines[1].get(), lines[2].get()],
            [true, false, true]
        );

        hid.leds = LockLed::NumLock.mask();
        leds.sync(&hid);
        assert_eq!(
            [lines[0].get(), lines[1].get(), lines[2].get()],
            [false, true, false]
        );
    }
}
