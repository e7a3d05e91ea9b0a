//! # SH1107 OLED Driver
//!
//! Async I2C driver for 64x128 SH1107 panels with a page-organized frame
//! buffer, plus the fixed 90-degree rotation the mounting requires. The
//! logical drawing space is 128 wide by 64 tall; [`Sh1107::set_pixel`] maps
//! logical coordinates onto the panel's native portrait orientation.
//!
//! Implements `embedded-graphics` [`DrawTarget`] so text rasterizes through
//! the usual mono-font path, and [`Surface`] so the render sink can drive it.

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::geometry::{OriginDimensions, Point, Size};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_5X8;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::text::Text;
use embedded_graphics::{Drawable, Pixel};
use embedded_hal_async::i2c::I2c;

use crate::layout::Line;
use crate::render::Surface;

/// Usual SH1107 I2C address.
pub const DEFAULT_ADDR: u8 = 0x3C;

/// Native panel columns.
const WIDTH: usize = 64;
/// Native panel rows.
const HEIGHT: usize = 128;
/// Pages of 8 stacked rows each.
const PAGES: usize = HEIGHT / 8;

/// Logical (rotated) width, along the writing direction.
pub const LOGICAL_WIDTH: u32 = HEIGHT as u32;
/// Logical (rotated) height, along the stacking axis.
pub const LOGICAL_HEIGHT: u32 = WIDTH as u32;

/// SH1107 command bytes.
#[allow(dead_code)]
mod cmd {
    pub const DISPLAY_OFF: u8 = 0xAE;
    pub const DISPLAY_ON: u8 = 0xAF;
    pub const SET_CLOCK_DIV: u8 = 0xD5;
    pub const SET_MUX_RATIO: u8 = 0xA8;
    pub const SET_DISPLAY_OFFSET: u8 = 0xD3;
    pub const SET_START_LINE: u8 = 0xDC;
    pub const SET_CHARGE_PUMP: u8 = 0xAD;
    pub const SET_SEG_REMAP: u8 = 0xA0;
    pub const SET_COM_SCAN_INC: u8 = 0xC0;
    pub const SET_CONTRAST: u8 = 0x81;
    pub const SET_PRECHARGE: u8 = 0xD9;
    pub const SET_VCOM_DETECT: u8 = 0xDB;
    pub const ALL_ON_RESUME: u8 = 0xA4;
    pub const SET_NORMAL: u8 = 0xA6;
    pub const SET_PAGE_ADDR: u8 = 0xB0;
    pub const SET_LOW_COLUMN: u8 = 0x00;
    pub const SET_HIGH_COLUMN: u8 = 0x10;
}

/// SH1107 driver with an internal 1-bpp frame buffer.
pub struct Sh1107<I2C> {
    i2c: I2C,
    addr: u8,
    /// One byte per column per page, LSB at the page's top row.
    buffer: [[u8; WIDTH]; PAGES],
}

impl<I2C> Sh1107<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self {
            i2c,
            addr,
            buffer: [[0; WIDTH]; PAGES],
        }
    }

    /// Reset the frame buffer without touching the panel.
    pub fn clear_buffer(&mut self) {
        for page in self.buffer.iter_mut() {
            page.fill(0);
        }
    }

    /// Set one pixel, given in logical (rotated) coordinates.
    ///
    /// The panel is mounted a quarter turn clockwise, so logical
    /// `(x, y)` lands on native `(WIDTH - 1 - y, x)`. Out-of-range
    /// coordinates are ignored.
    fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        if x < 0 || y < 0 || x >= LOGICAL_WIDTH as i32 || y >= LOGICAL_HEIGHT as i32 {
            return;
        }
        let col = WIDTH - 1 - y as usize;
        let row = x as usize;
        let mask = 1 << (row % 8);
        if on {
            self.buffer[row / 8][col] |= mask;
        } else {
            self.buffer[row / 8][col] &= !mask;
        }
    }
}

impl<I2C: I2c> Sh1107<I2C> {
    /// Power-up command sequence.
    pub async fn init(&mut self) -> Result<(), I2C::Error> {
        let init_cmds: &[u8] = &[
            cmd::DISPLAY_OFF,
            cmd::SET_CLOCK_DIV,
            0x51,
            cmd::SET_MUX_RATIO,
            0x7F, // 128 rows
            cmd::SET_DISPLAY_OFFSET,
            0x00,
            cmd::SET_START_LINE,
            0x00,
            cmd::SET_CHARGE_PUMP,
            0x8A,
            cmd::SET_SEG_REMAP,
            cmd::SET_COM_SCAN_INC,
            cmd::SET_CONTRAST,
            0x4F,
            cmd::SET_PRECHARGE,
            0x22,
            cmd::SET_VCOM_DETECT,
            0x35,
            cmd::ALL_ON_RESUME,
            cmd::SET_NORMAL,
            cmd::DISPLAY_ON,
        ];

        for &c in init_cmds {
            self.command(c).await?;
        }
        Ok(())
    }

    async fn command(&mut self, c: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.addr, &[0x00, c]).await
    }

    /// Wipe the panel's display RAM immediately, leaving the buffer intact.
    pub async fn clear_display(&mut self) -> Result<(), I2C::Error> {
        let zeros = [0u8; WIDTH];
        for page in 0..PAGES {
            self.write_page(page, &zeros).await?;
        }
        Ok(())
    }

    /// Push the full frame buffer to the panel.
    pub async fn flush(&mut self) -> Result<(), I2C::Error> {
        for page in 0..PAGES {
            let data = self.buffer[page];
            self.write_page(page, &data).await?;
        }
        Ok(())
    }

    async fn write_page(&mut self, page: usize, data: &[u8; WIDTH]) -> Result<(), I2C::Error> {
        self.command(cmd::SET_PAGE_ADDR | page as u8).await?;
        self.command(cmd::SET_LOW_COLUMN).await?;
        self.command(cmd::SET_HIGH_COLUMN).await?;

        let mut frame = [0u8; WIDTH + 1];
        frame[0] = 0x40; // data control byte
        frame[1..].copy_from_slice(data);
        self.i2c.write(self.addr, &frame).await
    }
}

impl<I2C> OriginDimensions for Sh1107<I2C> {
    fn size(&self) -> Size {
        Size::new(LOGICAL_WIDTH, LOGICAL_HEIGHT)
    }
}

impl<I2C> DrawTarget for Sh1107<I2C> {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color.is_on());
        }
        Ok(())
    }
}

impl<I2C: I2c> Surface for Sh1107<I2C> {
    type Error = I2C::Error;

    async fn clear_panel(&mut self) -> Result<(), Self::Error> {
        self.clear_display().await
    }

    fn clear_frame(&mut self) {
        self.clear_buffer();
    }

    fn draw_text(&mut self, line: &Line) -> Result<(), Self::Error> {
        let style = MonoTextStyle::new(&FONT_5X8, BinaryColor::On);
        // Buffer rasterization cannot fail.
        let _ = Text::new(line.text.as_str(), Point::new(line.x, line.y), style).draw(self);
        Ok(())
    }

    async fn present(&mut self) -> Result<(), Self::Error> {
        self.flush().await
    }
}
