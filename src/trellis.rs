//! Single board driver for the HT16K33 on a Trellis 4x4 keypad.

use crate::error::Error;
use crate::pinmap::{button_register, led_register};
use embedded_hal::i2c::{I2c, SevenBitAddress};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// Address of a Trellis board with no address jumpers bridged.
pub const DEFAULT_ADDRESS: SevenBitAddress = 0x70;
/// LEDs (and buttons) on one board.
pub const KEYS_PER_BOARD: usize = 16;

// HT16K33 commands
const OSCILLATOR_ON: u8 = 0x21;
const BLINK_CMD: u8 = 0x80;
const BLINK_DISPLAY_ON: u8 = 0x01;
const BRIGHTNESS_CMD: u8 = 0xE0;
const KEY_READ_CMD: u8 = 0x40;

const LED_BUFFER_LEN: usize = 17;
const KEY_BUFFER_LEN: usize = 6;

const MAX_BRIGHTNESS: u8 = 0x0F;

/// A board handle that can be shared between a `TrellisSet` and the caller.
pub type SharedTrellis<I2C> = Rc<RefCell<Trellis<I2C>>>;

pub struct Trellis<I2C> {
    i2c: I2C,
    address: SevenBitAddress,
    /// Byte 0 stays 0x00, the display RAM start address. Bytes 1..17 are 8 row pairs.
    led_buffer: [u8; LED_BUFFER_LEN],
    keys: [u8; KEY_BUFFER_LEN],
    last_keys: [u8; KEY_BUFFER_LEN],
    brightness: u8,
    blink_rate: u8,
}

impl<I2C: I2c> Trellis<I2C> {
    /// Create a driver for the board at `address`. No bus traffic happens until
    /// `init`, `show` or one of the configuration setters is called.
    pub fn new(i2c: I2C, address: SevenBitAddress) -> Self {
        Trellis {
            i2c,
            address,
            led_buffer: [0u8; LED_BUFFER_LEN],
            keys: [0u8; KEY_BUFFER_LEN],
            last_keys: [0u8; KEY_BUFFER_LEN],
            brightness: MAX_BRIGHTNESS,
            blink_rate: 0,
        }
    }

    /// Same as `new`, wrapped for use in a `TrellisSet`.
    pub fn shared(i2c: I2C, address: SevenBitAddress) -> SharedTrellis<I2C> {
        Rc::new(RefCell::new(Self::new(i2c, address)))
    }

    /// Power-on sequence: start the oscillator, stop blinking, full brightness.
    pub fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        debug!("Initializing Trellis at 0x{:02x}", self.address);
        self.write_cmd(OSCILLATOR_ON)?;
        self.set_blink_rate(0)?;
        self.set_brightness(MAX_BRIGHTNESS)
    }

    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    /// Give the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_cmd(&mut self, cmd: u8) -> Result<(), Error<I2C::Error>> {
        debug!("0x{:02x}: command 0x{:02x}", self.address, cmd);
        self.i2c.write(self.address, &[cmd]).map_err(Error::Transport)
    }

    /// Turn LED `index` on or off in the frame buffer. Call `show` to display it.
    pub fn set_led(&mut self, index: u8, on: bool) -> Result<(), Error<I2C::Error>> {
        let (pair, bit) = led_register(index).ok_or(Error::OutOfRange { index })?;
        let mask = 1u16 << bit;
        let [low, high] = mask.to_le_bytes();
        let offset = pair * 2 + 1;
        if on {
            self.led_buffer[offset] |= low;
            self.led_buffer[offset + 1] |= high;
        } else {
            self.led_buffer[offset] &= !low;
            self.led_buffer[offset + 1] &= !high;
        }
        Ok(())
    }

    pub fn led_on(&mut self, index: u8) -> Result<(), Error<I2C::Error>> {
        self.set_led(index, true)
    }

    pub fn led_off(&mut self, index: u8) -> Result<(), Error<I2C::Error>> {
        self.set_led(index, false)
    }

    /// Buffered state of LED `index`, which may not have been shown yet.
    pub fn led_state(&self, index: u8) -> Result<bool, Error<I2C::Error>> {
        let (pair, bit) = led_register(index).ok_or(Error::OutOfRange { index })?;
        let offset = pair * 2 + 1;
        let word = u16::from_le_bytes([self.led_buffer[offset], self.led_buffer[offset + 1]]);
        Ok(word & (1 << bit) != 0)
    }

    /// Set every display RAM byte, including rows that carry no LED.
    pub fn fill(&mut self, on: bool) {
        let value = if on { 0xFF } else { 0x00 };
        self.led_buffer[1..].fill(value);
    }

    /// Send the whole frame buffer in a single write.
    pub fn show(&mut self) -> Result<(), Error<I2C::Error>> {
        debug!("0x{:02x}: show {:02x?}", self.address, &self.led_buffer[1..]);
        self.i2c
            .write(self.address, &self.led_buffer)
            .map_err(Error::Transport)
    }

    /// Dimming level 0-15; higher bits are ignored.
    pub fn set_brightness(&mut self, level: u8) -> Result<(), Error<I2C::Error>> {
        let level = level & MAX_BRIGHTNESS;
        self.brightness = level;
        self.write_cmd(BRIGHTNESS_CMD | level)
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Blink rate 0 (off) to 3 (0.5 Hz); higher bits are ignored.
    pub fn set_blink_rate(&mut self, rate: u8) -> Result<(), Error<I2C::Error>> {
        let rate = rate & 0x03;
        self.blink_rate = rate;
        self.write_cmd(BLINK_CMD | BLINK_DISPLAY_ON | (rate << 1))
    }

    pub fn blink_rate(&self) -> u8 {
        self.blink_rate
    }

    /// Read the key matrix. Returns true if any key changed since the previous scan.
    ///
    /// The edge queries compare this scan with the one before it, so they only
    /// change meaning after another call to `scan_buttons`. A failed scan leaves
    /// both key buffers as they were.
    pub fn scan_buttons(&mut self) -> Result<bool, Error<I2C::Error>> {
        self.write_cmd(KEY_READ_CMD)?;
        let mut keys = [0u8; KEY_BUFFER_LEN];
        self.i2c
            .read(self.address, &mut keys)
            .map_err(Error::Transport)?;

        self.last_keys = self.keys;
        self.keys = keys;
        let changed = self.keys != self.last_keys;
        if changed {
            debug!("0x{:02x}: keys {:02x?}", self.address, self.keys);
        }
        Ok(changed)
    }

    /// Whether `button` was down in the latest scan.
    pub fn is_pressed(&self, button: u8) -> Result<bool, Error<I2C::Error>> {
        let (current, _) = self.key_bits(button)?;
        Ok(current)
    }

    /// Up in the previous scan, down in the latest.
    pub fn just_pressed(&self, button: u8) -> Result<bool, Error<I2C::Error>> {
        let (current, previous) = self.key_bits(button)?;
        Ok(current && !previous)
    }

    /// Down in the previous scan, up in the latest.
    pub fn just_released(&self, button: u8) -> Result<bool, Error<I2C::Error>> {
        let (current, previous) = self.key_bits(button)?;
        Ok(!current && previous)
    }

    fn key_bits(&self, button: u8) -> Result<(bool, bool), Error<I2C::Error>> {
        let (byte, bit) = button_register(button).ok_or(Error::OutOfRange { index: button })?;
        let mask = 1u8 << bit;
        Ok((self.keys[byte] & mask != 0, self.last_keys[byte] & mask != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinmap::BUTTON_MAP;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = 0x70;

    /// Key buffer with only `button` held down.
    fn keys_with(button: u8) -> Vec<u8> {
        let mut keys = vec![0u8; KEY_BUFFER_LEN];
        let value = BUTTON_MAP[button as usize];
        keys[(value >> 4) as usize] |= 1 << (value & 0x0F);
        keys
    }

    fn scan(keys: Vec<u8>) -> [I2cTransaction; 2] {
        [
            I2cTransaction::write(ADDR, vec![KEY_READ_CMD]),
            I2cTransaction::read(ADDR, keys),
        ]
    }

    #[test]
    fn test_new_does_no_io() {
        let trellis = Trellis::new(I2cMock::new(&[]), ADDR);

        assert_eq!(trellis.brightness(), 15);
        assert_eq!(trellis.blink_rate(), 0);
        assert_eq!(trellis.address(), ADDR);
        for i in 0..16 {
            assert!(!trellis.led_state(i).unwrap());
        }

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_init_sequence() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x21]),
            I2cTransaction::write(ADDR, vec![0x81]),
            I2cTransaction::write(ADDR, vec![0xEF]),
        ];
        let i2c = I2cMock::new(&expectations);
        let mut trellis = Trellis::new(i2c, ADDR);

        trellis.init().unwrap();

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_set_led_roundtrip_is_isolated() {
        let mut trellis = Trellis::new(I2cMock::new(&[]), ADDR);

        for i in 0..16 {
            trellis.set_led(i, true).unwrap();
            for j in 0..16 {
                assert_eq!(trellis.led_state(j).unwrap(), i == j, "led {j} after setting {i}");
            }
            trellis.set_led(i, false).unwrap();
            assert!(!trellis.led_state(i).unwrap());
        }

        trellis.fill(true);
        trellis.led_off(7).unwrap();
        for j in 0..16 {
            assert_eq!(trellis.led_state(j).unwrap(), j != 7);
        }

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_fill() {
        let mut trellis = Trellis::new(I2cMock::new(&[]), ADDR);

        trellis.fill(true);
        assert!((0..16).all(|i| trellis.led_state(i).unwrap()));
        trellis.fill(false);
        assert!((0..16).all(|i| !trellis.led_state(i).unwrap()));

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_out_of_range() {
        let mut trellis = Trellis::new(I2cMock::new(&[]), ADDR);

        assert_eq!(trellis.set_led(16, true), Err(Error::OutOfRange { index: 16 }));
        assert_eq!(trellis.led_state(200), Err(Error::OutOfRange { index: 200 }));
        assert_eq!(trellis.just_pressed(16), Err(Error::OutOfRange { index: 16 }));
        assert_eq!(trellis.just_released(16), Err(Error::OutOfRange { index: 16 }));

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_show_writes_frame() {
        // LED 0 is pair 3, bit 10 -> high byte of pair 3 (buffer[8]) bit 2
        // LED 15 is pair 0, bit 2 -> low byte of pair 0 (buffer[1]) bit 2
        let mut frame = vec![0u8; LED_BUFFER_LEN];
        frame[8] = 0x04;
        frame[1] = 0x04;
        let i2c = I2cMock::new(&[I2cTransaction::write(ADDR, frame)]);
        let mut trellis = Trellis::new(i2c, ADDR);

        trellis.led_on(0).unwrap();
        trellis.led_on(15).unwrap();
        trellis.show().unwrap();

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_brightness_and_blink_are_masked() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0xE3]),
            I2cTransaction::write(ADDR, vec![0x85]),
        ];
        let i2c = I2cMock::new(&expectations);
        let mut trellis = Trellis::new(i2c, ADDR);

        trellis.set_brightness(0x13).unwrap();
        assert_eq!(trellis.brightness(), 3);
        trellis.set_blink_rate(6).unwrap();
        assert_eq!(trellis.blink_rate(), 2);

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_press_and_release_edges() {
        let mut expectations = Vec::new();
        expectations.extend(scan(keys_with(5)));
        expectations.extend(scan(keys_with(5)));
        expectations.extend(scan(vec![0u8; KEY_BUFFER_LEN]));
        let i2c = I2cMock::new(&expectations);
        let mut trellis = Trellis::new(i2c, ADDR);

        assert!(trellis.scan_buttons().unwrap());
        assert!(trellis.just_pressed(5).unwrap());
        assert!(trellis.is_pressed(5).unwrap());
        assert!(!trellis.just_released(5).unwrap());
        assert!((0..16).filter(|&b| b != 5).all(|b| !trellis.just_pressed(b).unwrap()));

        // held
        assert!(!trellis.scan_buttons().unwrap());
        assert!(!trellis.just_pressed(5).unwrap());
        assert!(!trellis.just_released(5).unwrap());
        assert!(trellis.is_pressed(5).unwrap());

        assert!(trellis.scan_buttons().unwrap());
        assert!(trellis.just_released(5).unwrap());
        assert!(!trellis.just_pressed(5).unwrap());

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_unchanged_scans_report_nothing() {
        let mut expectations = Vec::new();
        expectations.extend(scan(vec![0u8; KEY_BUFFER_LEN]));
        expectations.extend(scan(vec![0u8; KEY_BUFFER_LEN]));
        let i2c = I2cMock::new(&expectations);
        let mut trellis = Trellis::new(i2c, ADDR);

        for _ in 0..2 {
            assert!(!trellis.scan_buttons().unwrap());
            for b in 0..16 {
                assert!(!trellis.just_pressed(b).unwrap());
                assert!(!trellis.just_released(b).unwrap());
            }
        }

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_failed_read_keeps_key_state() {
        let mut expectations = Vec::new();
        expectations.extend(scan(keys_with(5)));
        expectations.push(I2cTransaction::write(ADDR, vec![KEY_READ_CMD]));
        expectations.push(
            I2cTransaction::read(ADDR, vec![0xFF; KEY_BUFFER_LEN]).with_error(ErrorKind::Other),
        );
        expectations.extend(scan(keys_with(5)));
        let i2c = I2cMock::new(&expectations);
        let mut trellis = Trellis::new(i2c, ADDR);

        assert!(trellis.scan_buttons().unwrap());
        assert_eq!(trellis.scan_buttons(), Err(Error::Transport(ErrorKind::Other)));
        assert!(trellis.just_pressed(5).unwrap());
        assert!((0..16).filter(|&b| b != 5).all(|b| !trellis.is_pressed(b).unwrap()));

        // no edges invented by the failed read
        assert!(!trellis.scan_buttons().unwrap());
        assert!(trellis.is_pressed(5).unwrap());
        assert!(!trellis.just_pressed(5).unwrap());
        assert!(!trellis.just_released(5).unwrap());

        let mut i2c = trellis.release();
        i2c.done();
    }

    #[test]
    fn test_transport_error_is_surfaced() {
        let expectations =
            [I2cTransaction::write(ADDR, vec![KEY_READ_CMD]).with_error(ErrorKind::Other)];
        let i2c = I2cMock::new(&expectations);
        let mut trellis = Trellis::new(i2c, ADDR);

        assert_eq!(trellis.scan_buttons(), Err(Error::Transport(ErrorKind::Other)));

        let mut i2c = trellis.release();
        i2c.done();
    }
}
