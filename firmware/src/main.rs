//! Split keyboard firmware for ATmega32U4 (Teensy 2.0).
//!
//! - Left half: matrix wired to Teensy GPIO pins
//! - Right half: matrix behind an MCP23018 I2C expander
//! - Momentary layers resolved by `splitboard_keymap::Engine`
//! - USB HID keyboard reports (6KRO) and host lock LEDs
//!
//! The scan loop runs every 10ms; the on-board LED toggles once per cycle.

#![no_std]
#![no_main]

mod hid;
mod i2c;
mod led;
mod pins;
mod timer;

use avr_device::atmega32u4::Peripherals;
use splitboard_keymap::default::{COLUMNS, KEYMAP, ROWS, SPLIT};
use splitboard_keymap::hid::LockIndicators;
use splitboard_keymap::i2c::{Mcp23018, MCP23018_ADDR};
use splitboard_keymap::matrix::{ActiveLevel, DirectHalf};
use splitboard_keymap::scheduler::{Duration, Scheduler};
use splitboard_keymap::{Keyboard, Keymap, Side};

use hid::UsbKeyboard;
use i2c::Twi;
use led::BoardLed;
use timer::{Timer1Clock, Timer1Delay};

const SCAN_PERIOD: Duration = Duration::millis(10);

/// Panic handler: light the on-board LED and halt.
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    avr_device::interrupt::disable();
    let dp = unsafe { Peripherals::steal() };
    dp.PORTD.ddrd.modify(|r, w| unsafe { w.bits(r.bits() | 0x40) });
    dp.PORTD.portd.modify(|r, w| unsafe { w.bits(r.bits() | 0x40) });
    loop {}
}

#[no_mangle]
pub extern "C" fn main() -> ! {
    let dp = unsafe { Peripherals::steal() };

    // Run at the full 16 MHz regardless of the CKDIV8 fuse.
    dp.CPU.clkpr.write(|w| w.clkpce().set_bit());
    dp.CPU.clkpr.write(|w| unsafe { w.bits(0) });

    // A broken keymap stops here, before anything is scanned.
    let keymap = match Keymap::new(KEYMAP) {
        Ok(keymap) => keymap,
        Err(_) => panic!("keymap failed validation"),
    };

    timer::start(&dp.TC1);

    let left = DirectHalf::new(
        pins::COLUMNS.map(|p| p.into_output_high()),
        pins::ROWS.map(|p| p.into_pull_up_input()),
        Timer1Delay::new(&dp.TC1),
        ActiveLevel::Low,
    )
    .unwrap_or_else(|e| match e {});

    // An absent right half is not fatal; it is retried from the scan loop.
    let mut right = Mcp23018::new(Twi::new(&dp.TWI), MCP23018_ADDR, COLUMNS - SPLIT, ROWS, ActiveLevel::Low);
    let right_ready = right.configure().is_ok();

    let leds = LockIndicators::new(
        pins::LED_CAPS.into_output_low(),
        pins::LED_NUM.into_output_low(),
        pins::LED_SCROLL.into_output_low(),
    );

    let mut keyboard = match Keyboard::new(keymap, left, right, leds) {
        Ok(keyboard) => keyboard,
        Err(_) => panic!("matrix does not fit the keymap"),
    };
    if !right_ready {
        keyboard.retry(Side::Right);
    }

    let mut usb = UsbKeyboard::new(&dp);
    usb.init();

    let mut scheduler = Scheduler::new(
        Timer1Clock::new(&dp.TC1),
        Timer1Delay::new(&dp.TC1),
        BoardLed::new(pins::LED_BOARD.into_output_low()),
        SCAN_PERIOD,
    );

    scheduler.run(|| {
        usb.poll();
        keyboard.cycle(&mut usb);
    })
}
