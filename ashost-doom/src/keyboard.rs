//! Keyboard input for the DOOM port.
//!
//! The guest takes key events through `add_browser_event(type, key)`. Keys are
//! browser `keyCode`s translated to DOOM's own codes; most of them coincide.

/// Event type passed as the first argument of `add_browser_event`.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyEvent {
    Down = 0,
    Up = 1,
}

pub const KEY_BACKSPACE: u32 = 127;
pub const KEY_RCTRL: u32 = 0x80 + 0x1d;
pub const KEY_RALT: u32 = 0x80 + 0x38;
pub const KEY_LEFTARROW: u32 = 0xac;
pub const KEY_UPARROW: u32 = 0xad;
pub const KEY_RIGHTARROW: u32 = 0xae;
pub const KEY_DOWNARROW: u32 = 0xaf;
pub const KEY_F1: u32 = 0x80 + 0x3b;

/// Convert a browser key code into a DOOM key code.
pub fn map_key_code(key_code: u32) -> u32 {
    match key_code {
        8 => KEY_BACKSPACE,
        17 => KEY_RCTRL,
        18 => KEY_RALT,
        37 => KEY_LEFTARROW,
        38 => KEY_UPARROW,
        39 => KEY_RIGHTARROW,
        40 => KEY_DOWNARROW,
        // A..=Z -> lower-case ASCII
        65..=90 => key_code + 32,
        // F1..=F12
        112..=123 => key_code - 112 + KEY_F1,
        other => other,
    }
}
