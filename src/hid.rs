//! HID keypad: a single active-low, complement-of-pressed-bits register.
//!
//! Scan-code-to-button mapping and the "don't repeat an already-pressed
//! button" rule are grounded on
//! `examples/original_source/hw/arm/ctr9_hid.c`.

use crate::bus::{AccessSize, MmioDevice};

pub const BTN_A: u32 = 0x001;
pub const BTN_B: u32 = 0x002;
pub const BTN_SELECT: u32 = 0x004;
pub const BTN_START: u32 = 0x008;
pub const BTN_RIGHT: u32 = 0x010;
pub const BTN_LEFT: u32 = 0x020;
pub const BTN_UP: u32 = 0x040;
pub const BTN_DOWN: u32 = 0x080;
pub const BTN_R: u32 = 0x100;
pub const BTN_L: u32 = 0x200;
pub const BTN_X: u32 = 0x400;
pub const BTN_Y: u32 = 0x800;

const KEYCODE_UP: u8 = 0x48;
const KEYCODE_DOWN: u8 = 0x50;
const KEYCODE_LEFT: u8 = 0x4b;
const KEYCODE_RIGHT: u8 = 0x4d;
const KEYCODE_M: u8 = 0x32;
const KEYCODE_N: u8 = 0x31;
const KEYCODE_J: u8 = 0x24;
const KEYCODE_H: u8 = 0x23;
const KEYCODE_U: u8 = 0x16;
const KEYCODE_Y: u8 = 0x15;

fn button_for_scancode(code: u8) -> u32 {
    match code {
        KEYCODE_UP => BTN_UP,
        KEYCODE_DOWN => BTN_DOWN,
        KEYCODE_LEFT => BTN_LEFT,
        KEYCODE_RIGHT => BTN_RIGHT,
        KEYCODE_M => BTN_A,
        KEYCODE_N => BTN_B,
        KEYCODE_J => BTN_X,
        KEYCODE_H => BTN_Y,
        KEYCODE_U => BTN_R,
        KEYCODE_Y => BTN_L,
        _ => 0,
    }
}

pub struct Hid {
    pressed: u32,
}

impl Hid {
    pub fn new() -> Self {
        Self { pressed: 0 }
    }

    pub fn reset(&mut self) {
        self.pressed = 0;
    }

    /// Host key-down event by scan code. Repeated key-down events for an
    /// already-pressed button are ignored (no auto-repeat).
    pub fn key_down(&mut self, scancode: u8) {
        let bit = button_for_scancode(scancode);
        if bit != 0 {
            self.pressed |= bit;
        }
    }

    pub fn key_up(&mut self, scancode: u8) {
        let bit = button_for_scancode(scancode);
        if bit != 0 {
            self.pressed &= !bit;
        }
    }

    pub fn pressed(&self) -> u32 {
        self.pressed
    }
}

impl Default for Hid {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioDevice for Hid {
    fn read(&mut self, _offset: u32, _size: AccessSize) -> u32 {
        !self.pressed
    }

    fn write(&mut self, _offset: u32, _size: AccessSize, _value: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_active_low() {
        let mut hid = Hid::new();
        assert_eq!(hid.read(0, AccessSize::Word), 0xFFFF_FFFF);
        hid.key_down(KEYCODE_M); // A
        assert_eq!(hid.read(0, AccessSize::Word), !BTN_A);
    }

    #[test]
    fn release_clears_bit() {
        let mut hid = Hid::new();
        hid.key_down(KEYCODE_U); // R
        hid.key_up(KEYCODE_U);
        assert_eq!(hid.pressed(), 0);
    }

    #[test]
    fn arrows_map_to_dpad() {
        let mut hid = Hid::new();
        hid.key_down(KEYCODE_UP);
        hid.key_down(KEYCODE_LEFT);
        assert_eq!(hid.pressed(), BTN_UP | BTN_LEFT);
    }

    #[test]
    fn unmapped_scancode_is_ignored() {
        let mut hid = Hid::new();
        hid.key_down(0xFF);
        assert_eq!(hid.pressed(), 0);
    }
}
