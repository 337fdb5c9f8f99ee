//! Logical index to HT16K33 register bit remapping for the Trellis PCB.
//!
//! Each entry packs a register index in the high nibble and a bit offset in the
//! low nibble. The values follow the board wiring and must not be reordered.

pub const LED_MAP: [u8; 16] = [
    0x3A, 0x37, 0x35, 0x34, //
    0x28, 0x29, 0x23, 0x24, //
    0x16, 0x1B, 0x11, 0x10, //
    0x0E, 0x0D, 0x0C, 0x02,
];

pub const BUTTON_MAP: [u8; 16] = [
    0x07, 0x04, 0x02, 0x22, //
    0x05, 0x06, 0x00, 0x01, //
    0x03, 0x10, 0x30, 0x21, //
    0x13, 0x12, 0x11, 0x31,
];

/// LED `index` as (16-bit register pair, bit offset inside the pair).
pub fn led_register(index: u8) -> Option<(usize, u8)> {
    LED_MAP.get(index as usize).map(|&v| unpack(v))
}

/// Button `index` as (key data byte, bit offset inside the byte).
pub fn button_register(index: u8) -> Option<(usize, u8)> {
    BUTTON_MAP.get(index as usize).map(|&v| unpack(v))
}

fn unpack(value: u8) -> (usize, u8) {
    ((value >> 4) as usize, value & 0x0F)
}
