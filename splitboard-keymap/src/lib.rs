//! Keymap, matrix and layer engine for a split keyboard.
//!
//! This crate is `no_std` so the same code runs in the AVR firmware and in
//! the host CLI. Hardware is reached only through `embedded-hal` traits and
//! the small [`HidTransport`](hid::HidTransport) and
//! [`Clock`](scheduler::Clock) seams.
//!
//! A cycle goes: each half's [`ScanHalf`](matrix::ScanHalf) driver produces a
//! [`HalfScan`](matrix::HalfScan), the [`Engine`](engine::Engine) turns its
//! edges into keycode transitions through the active layer stack, and the
//! [`Report`](hid::Report) hands them to the host, releases first.
//! [`Keyboard`](keyboard::Keyboard) strings this together and
//! [`Scheduler`](scheduler::Scheduler) repeats it at a fixed period.

#![cfg_attr(not(test), no_std)]

pub mod default;
pub mod engine;
pub mod hid;
pub mod i2c;
pub mod keyboard;
pub mod keycode;
pub mod keymap;
pub mod matrix;
pub mod scheduler;

pub use engine::Engine;
pub use hid::{HidTransport, LockLed, Report};
pub use keyboard::{Keyboard, Side};
pub use keycode::Keycode;
pub use keymap::{ConfigError, ConfigErrors, KeyBinding, Keymap, KeymapDef, Layer, LayerId, Position};
pub use matrix::{ActiveLevel, HalfScan, ScanHalf};
