#![no_std]

// Shared logic for the combination lock peripheral.
//
// Everything here is written against the capability traits in `hal` so the
// same decoder, timer, servo, and lock state machine run on the STM32 firmware
// and inside the host-side emulator and tests.

pub mod console;
pub mod display;
pub mod encoder;
pub mod hal;
pub mod lock;
pub mod pwm;
pub mod servo;
pub mod telemetry;
pub mod timer;
