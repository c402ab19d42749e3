//! 16x2 HD44780 character LCD behind a PCF8574 I2C backpack.
//!
//! The expander drives the LCD in 4-bit mode:
//! P0 = RS, P1 = RW, P2 = EN, P3 = backlight, P4..P7 = D4..D7.

use core::fmt::Debug;

use embedded_hal::{delay::DelayNs, i2c::I2c};

pub const DEFAULT_ADDRESS: u8 = 0x27;
pub const COLUMNS: usize = 16;
const ROW_OFFSETS: [u8; 2] = [0x00, 0x40];

const REGISTER_SELECT: u8 = 0x01;
const ENABLE: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CLEAR_DISPLAY: u8 = 0x01;
const ENTRY_MODE_INCREMENT: u8 = 0x06;
const DISPLAY_ON: u8 = 0x0C;
const FUNCTION_4BIT_2LINE: u8 = 0x28;
const SET_DDRAM_ADDRESS: u8 = 0x80;

/// Something that can show two lines of text.
pub trait TextDisplay {
    type Error: Debug;

    fn render_lines(&mut self, top: &str, bottom: &str) -> Result<(), Self::Error>;
}

pub struct Lcd1602<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    backlight: u8,
}

impl<I2C: I2c, D: DelayNs> Lcd1602<I2C, D> {
    /// Call [`Lcd1602::init`] before writing anything.
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            backlight: BACKLIGHT,
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// Runs the HD44780 4-bit initialisation sequence and clears the screen.
    pub fn init(&mut self) -> Result<(), I2C::Error> {
        self.delay.delay_ms(50);
        self.expander_write(0)?;
        self.delay.delay_ms(1);

        // three times 8-bit mode, then switch to 4-bit
        self.write_nibble(0x30, 0)?;
        self.delay.delay_us(4500);
        self.write_nibble(0x30, 0)?;
        self.delay.delay_us(4500);
        self.write_nibble(0x30, 0)?;
        self.delay.delay_us(150);
        self.write_nibble(0x20, 0)?;

        self.command(FUNCTION_4BIT_2LINE)?;
        self.command(DISPLAY_ON)?;
        self.clear()?;
        self.command(ENTRY_MODE_INCREMENT)
    }

    pub fn clear(&mut self) -> Result<(), I2C::Error> {
        self.command(CLEAR_DISPLAY)?;
        self.delay.delay_ms(2);
        Ok(())
    }

    pub fn set_backlight(&mut self, on: bool) -> Result<(), I2C::Error> {
        self.backlight = if on { BACKLIGHT } else { 0 };
        self.expander_write(0)
    }

    pub fn set_cursor(&mut self, column: u8, row: usize) -> Result<(), I2C::Error> {
        let offset = ROW_OFFSETS[row.min(ROW_OFFSETS.len() - 1)];
        self.command(SET_DDRAM_ADDRESS | (offset + column))
    }

    /// Writes a full row, padded with spaces so no stale text remains.
    pub fn write_row(&mut self, row: usize, text: &str) -> Result<(), I2C::Error> {
        self.set_cursor(0, row)?;
        let mut chars = text.chars();
        for _ in 0..COLUMNS {
            let c = chars.next().unwrap_or(' ');
            let byte = if c.is_ascii() && !c.is_ascii_control() {
                c as u8
            } else {
                b'?'
            };
            self.send(byte, REGISTER_SELECT)?;
        }
        Ok(())
    }

    fn command(&mut self, command: u8) -> Result<(), I2C::Error> {
        self.send(command, 0)
    }

    fn send(&mut self, value: u8, mode: u8) -> Result<(), I2C::Error> {
        self.write_nibble(value & 0xF0, mode)?;
        self.write_nibble((value << 4) & 0xF0, mode)
    }

    fn write_nibble(&mut self, nibble: u8, mode: u8) -> Result<(), I2C::Error> {
        self.expander_write(nibble | mode | ENABLE)?;
        self.delay.delay_us(1);
        self.expander_write(nibble | mode)?;
        self.delay.delay_us(50);
        Ok(())
    }

    fn expander_write(&mut self, data: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[data | self.backlight])
    }
}

impl<I2C: I2c, D: DelayNs> TextDisplay for Lcd1602<I2C, D> {
    type Error = I2C::Error;

    fn render_lines(&mut self, top: &str, bottom: &str) -> Result<(), Self::Error> {
        self.write_row(0, top)?;
        self.write_row(1, bottom)
    }
}
