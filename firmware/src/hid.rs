//! Boot-protocol keyboard on the ATmega32U4 USB controller.
//!
//! Control transfers are serviced from [`UsbKeyboard::poll`] once per scan
//! cycle. Key reports go out on endpoint 1 whenever the report changes, and
//! the LED byte from the host's SET_REPORT backs [`HidTransport::led_on`].

use avr_device::atmega32u4::{Peripherals, PLL, USB_DEVICE};
use splitboard_keymap::hid::{HidTransport, KeyboardReport, LockLed};
use splitboard_keymap::Keycode;

const CONTROL_ENDPOINT: u8 = 0;
const REPORT_ENDPOINT: u8 = 1;
const CONTROL_SIZE: u8 = 64;
const REPORT_SIZE: u8 = 8;

/// Busy-wait iterations before giving up on the host.
const SPIN_LIMIT: u16 = 0xFFFF;

const VENDOR_ID: u16 = 0x16C0;
const PRODUCT_ID: u16 = 0x047E;

// bmRequestType
const STANDARD_OUT: u8 = 0x00;
const STANDARD_IN: u8 = 0x80;
const INTERFACE_IN: u8 = 0x81;
const CLASS_OUT: u8 = 0x21;

// bRequest
const SET_ADDRESS: u8 = 0x05;
const GET_DESCRIPTOR: u8 = 0x06;
const GET_CONFIGURATION: u8 = 0x08;
const SET_CONFIGURATION: u8 = 0x09;
const SET_REPORT: u8 = 0x09;
const SET_IDLE: u8 = 0x0A;
const SET_PROTOCOL: u8 = 0x0B;

// Descriptor types
const DEVICE: u8 = 0x01;
const CONFIGURATION: u8 = 0x02;
const STRING: u8 = 0x03;
const HID: u8 = 0x21;
const HID_REPORT: u8 = 0x22;

const REPORT_DESCRIPTOR_LEN: u8 = 64;

#[rustfmt::skip]
static REPORT_DESCRIPTOR: [u8; REPORT_DESCRIPTOR_LEN as usize] = [
    0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, // generic desktop, keyboard, application
    // modifier bits for usages 0xE0..=0xE7
    0x05, 0x07, 0x19, 0xE0, 0x29, 0xE7, 0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x08, 0x81, 0x02,
    // reserved byte
    0x95, 0x01, 0x75, 0x08, 0x81, 0x01,
    // five LED outputs, three bits of padding
    0x95, 0x05, 0x75, 0x01, 0x05, 0x08, 0x19, 0x01, 0x29, 0x05, 0x91, 0x02,
    0x95, 0x01, 0x75, 0x03, 0x91, 0x01,
    // six key slots
    0x95, 0x06, 0x75, 0x08, 0x15, 0x00, 0x26, 0xFF, 0x00, 0x05, 0x07, 0x19, 0x00, 0x29, 0xFF,
    0x81, 0x00,
    0xC0,
];

#[rustfmt::skip]
static DEVICE_DESCRIPTOR: [u8; 18] = [
    18, DEVICE,
    0x00, 0x02, // USB 2.0
    0, 0, 0, // class lives on the interface
    CONTROL_SIZE,
    VENDOR_ID as u8, (VENDOR_ID >> 8) as u8,
    PRODUCT_ID as u8, (PRODUCT_ID >> 8) as u8,
    0x00, 0x01, // device release 1.0
    1, 2, 0, // manufacturer, product, no serial
    1,
];

const CONFIGURATION_LEN: u8 = 9 + 9 + 9 + 7;

#[rustfmt::skip]
static CONFIGURATION_DESCRIPTOR: [u8; CONFIGURATION_LEN as usize] = [
    9, CONFIGURATION, CONFIGURATION_LEN, 0, 1, 1, 0, 0x80, 50, // one interface, bus powered, 100 mA
    9, 0x04, 0, 0, 1, 0x03, 0x01, 0x01, 0, // HID, boot subclass, keyboard protocol
    9, HID, 0x11, 0x01, 0, 1, HID_REPORT, REPORT_DESCRIPTOR_LEN, 0,
    7, 0x05, 0x80 | REPORT_ENDPOINT, 0x03, REPORT_SIZE, 0, 10, // interrupt IN, 10 ms
];

static LANGUAGES: [u8; 4] = [4, STRING, 0x09, 0x04];
static MANUFACTURER: [u8; 22] = string_descriptor("Splitboard");
static PRODUCT: [u8; 18] = string_descriptor("Keyboard");

/// UTF-16LE string descriptor for ASCII text. `N` must be `2 + 2 * len`.
const fn string_descriptor<const N: usize>(text: &str) -> [u8; N] {
    let text = text.as_bytes();
    let mut out = [0u8; N];
    out[0] = N as u8;
    out[1] = STRING;
    let mut i = 0;
    while i < text.len() {
        out[2 + 2 * i] = text[i];
        i += 1;
    }
    out
}

/// The eight bytes of a control SETUP packet.
struct Setup {
    request_type: u8,
    request: u8,
    value: u16,
    length: u16,
}

impl Setup {
    fn read(usb: &USB_DEVICE) -> Self {
        let mut raw = [0u8; 8];
        for byte in raw.iter_mut() {
            *byte = usb.uedatx.read().bits();
        }
        Self {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    fn descriptor(&self) -> Option<&'static [u8]> {
        let [index, kind] = self.value.to_le_bytes();
        match (self.request_type, kind, index) {
            (STANDARD_IN, DEVICE, _) => Some(&DEVICE_DESCRIPTOR),
            (STANDARD_IN, CONFIGURATION, _) => Some(&CONFIGURATION_DESCRIPTOR),
            (STANDARD_IN, STRING, 0) => Some(&LANGUAGES),
            (STANDARD_IN, STRING, 1) => Some(&MANUFACTURER),
            (STANDARD_IN, STRING, 2) => Some(&PRODUCT),
            (INTERFACE_IN, HID_REPORT, _) => Some(&REPORT_DESCRIPTOR),
            _ => None,
        }
    }
}

fn spin(mut ready: impl FnMut() -> bool) -> bool {
    (0..SPIN_LIMIT).any(|_| ready())
}

fn select(usb: &USB_DEVICE, endpoint: u8) {
    usb.uenum.write(|w| w.bits(endpoint & 0x07));
}

/// Hand the IN bank to the controller (a zero-length packet if empty).
fn send_in(usb: &USB_DEVICE) {
    usb.ueintx.modify(|_, w| w.txini().clear_bit());
}

fn in_ready(usb: &USB_DEVICE) -> bool {
    usb.ueintx.read().txini().bit_is_set()
}

fn out_ready(usb: &USB_DEVICE) -> bool {
    usb.ueintx.read().rxouti().bit_is_set()
}

fn stall(usb: &USB_DEVICE) {
    usb.ueconx.modify(|_, w| w.stallrq().set_bit());
}

/// Data stage of a control read, followed by the host's status packet.
fn write_control(usb: &USB_DEVICE, data: &[u8], requested: u16) {
    let data = &data[..data.len().min(requested as usize)];
    for packet in data.chunks(CONTROL_SIZE as usize) {
        if !spin(|| in_ready(usb)) {
            return;
        }
        for &byte in packet {
            usb.uedatx.write(|w| w.bits(byte));
        }
        send_in(usb);
    }
    if spin(|| out_ready(usb)) {
        usb.ueintx.modify(|_, w| w.rxouti().clear_bit());
    }
}

pub struct UsbKeyboard<'d> {
    usb: &'d USB_DEVICE,
    pll: &'d PLL,
    configured: bool,
    report: KeyboardReport,
    sent: KeyboardReport,
    /// Lock LED bits from the last SET_REPORT.
    leds: u8,
}

impl<'d> UsbKeyboard<'d> {
    pub fn new(dp: &'d Peripherals) -> Self {
        Self {
            usb: &dp.USB_DEVICE,
            pll: &dp.PLL,
            configured: false,
            report: KeyboardReport::empty(),
            sent: KeyboardReport::empty(),
            leds: 0,
        }
    }

    /// Power up the controller and attach to the bus.
    pub fn init(&mut self) {
        let usb = self.usb;
        usb.uhwcon.write(|w| w.uvrege().set_bit());
        usb.usbcon.write(|w| w.usbe().set_bit().otgpade().set_bit());

        // 16 MHz crystal into the 48 MHz USB clock.
        self.pll.pllcsr.write(|w| w.pindiv().set_bit().plle().set_bit());
        while self.pll.pllcsr.read().plock().bit_is_clear() {}

        usb.usbcon.modify(|_, w| w.frzclk().clear_bit());
        usb.udcon.modify(|_, w| w.detach().clear_bit());
        usb.udien.write(|w| w.eorste().set_bit());
        self.configured = false;
    }

    /// Service a bus reset or a pending control request.
    pub fn poll(&mut self) {
        let usb = self.usb;
        if usb.udint.read().eorsti().bit_is_set() {
            usb.udint.modify(|_, w| w.eorsti().clear_bit());
            self.configured = false;
            self.enable_endpoint(CONTROL_ENDPOINT);
        }

        select(usb, CONTROL_ENDPOINT);
        if usb.ueintx.read().rxstpi().bit_is_set() {
            let setup = Setup::read(usb);
            usb.ueintx.modify(|_, w| w.rxstpi().clear_bit());
            self.control(&setup);
        }
    }

    fn control(&mut self, setup: &Setup) {
        let usb = self.usb;
        match (setup.request_type, setup.request) {
            (STANDARD_IN | INTERFACE_IN, GET_DESCRIPTOR) => match setup.descriptor() {
                Some(data) => write_control(usb, data, setup.length),
                None => stall(usb),
            },
            (STANDARD_OUT, SET_ADDRESS) => {
                // The address takes effect after the status stage.
                send_in(usb);
                if spin(|| in_ready(usb)) {
                    let address = setup.value as u8 & 0x7F;
                    usb.udaddr.write(|w| w.uadd().bits(address).adden().set_bit());
                }
            }
            (STANDARD_OUT, SET_CONFIGURATION) => {
                send_in(usb);
                self.enable_endpoint(REPORT_ENDPOINT);
                self.configured = true;
            }
            (STANDARD_IN, GET_CONFIGURATION) => {
                write_control(usb, &[self.configured as u8], setup.length);
            }
            (CLASS_OUT, SET_REPORT) => {
                if !spin(|| out_ready(usb)) {
                    stall(usb);
                    return;
                }
                self.leds = usb.uedatx.read().bits();
                usb.ueintx.modify(|_, w| w.rxouti().clear_bit());
                send_in(usb);
            }
            (CLASS_OUT, SET_IDLE | SET_PROTOCOL) => send_in(usb),
            _ => stall(usb),
        }
    }

    fn enable_endpoint(&self, endpoint: u8) {
        let usb = self.usb;
        select(usb, endpoint);
        usb.ueconx.write(|w| w.epen().set_bit());
        if endpoint == CONTROL_ENDPOINT {
            usb.uecfg0x.write(|w| w.eptype().bits(0b00));
            usb.uecfg1x.write(|w| w.epsize().bits(0b011).alloc().set_bit());
        } else {
            usb.uecfg0x.write(|w| w.eptype().bits(0b11).epdir().set_bit());
            usb.uecfg1x.write(|w| w.epsize().bits(0b000).alloc().set_bit());
        }
    }

    fn flush(&mut self) {
        if !self.configured || self.report == self.sent {
            return;
        }
        let usb = self.usb;
        select(usb, REPORT_ENDPOINT);
        if !spin(|| usb.ueintx.read().rwal().bit_is_set()) {
            return;
        }
        for byte in self.report.as_bytes() {
            usb.uedatx.write(|w| w.bits(byte));
        }
        usb.ueintx.modify(|_, w| w.fifocon().clear_bit().txini().clear_bit());
        self.sent = self.report;
    }
}

impl HidTransport for UsbKeyboard<'_> {
    fn press(&mut self, keys: &[Keycode]) {
        for &key in keys {
            // A seventh key has no slot in the boot report.
            let _ = self.report.press(key);
        }
        self.flush();
    }

    fn release(&mut self, keys: &[Keycode]) {
        for &key in keys {
            self.report.release(key);
        }
        self.flush();
    }

    fn led_on(&self, led: LockLed) -> bool {
        self.leds & led.mask() != 0
    }
}
