//! Display capability and the 3-bit grayscale framebuffer.
//!
//! The panel is addressed in `(x, y)` pixels with values `0..=7` (0 is black,
//! 7 is white). Pixel and text calls only touch the buffer; nothing reaches the
//! physical surface until [`Panel::commit`].

use std::convert::Infallible;
use std::fs;
use std::path::PathBuf;

use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyleBuilder},
    pixelcolor::{Gray4, GrayColor},
    prelude::*,
    text::{Baseline, Text},
};
use thiserror::Error;

use crate::AllocationError;

/// Highest gray level the panel can show
pub const MAX_LEVEL: u8 = 7;

/// Width in pixels of one character of the overlay font
pub const CHAR_WIDTH: u32 = 10;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("could not write frame: {0}")]
    Io(#[from] std::io::Error),
}

/// What the pipeline needs from a display.
pub trait Panel {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Set one pixel; out-of-range coordinates are ignored.
    fn set_pixel(&mut self, x: u32, y: u32, value: u8);

    /// Top-left corner of the next printed text.
    fn set_cursor(&mut self, x: u32, y: u32);

    fn set_text_color(&mut self, foreground: u8, background: u8);

    /// Draw text at the cursor and advance the cursor past it.
    fn print(&mut self, text: &str);

    fn draw_text(&mut self, x: u32, y: u32, text: &str) {
        self.set_cursor(x, y);
        self.print(text);
    }

    /// Push the buffered frame to the physical surface.
    fn commit(&mut self) -> Result<(), PanelError>;
}

/// Framebuffer for a 3-bit grayscale panel, two pixels per byte.
pub struct GrayFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    cursor: (u32, u32),
    foreground: u8,
    background: u8,
}

impl GrayFrame {
    /// New frame, cleared to white.
    ///
    /// Fails instead of aborting when the frame does not fit in memory.
    pub fn try_new(width: u32, height: u32) -> Result<Self, AllocationError> {
        // Each row has (width+1)/2 bytes, high nibble first
        let bytes_per_row = width.div_ceil(2) as usize;
        let requested = bytes_per_row.saturating_mul(height as usize);
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(requested)
            .map_err(|source| AllocationError { requested, source })?;
        pixels.resize(requested, (MAX_LEVEL << 4) | MAX_LEVEL);
        Ok(Self {
            width,
            height,
            pixels,
            cursor: (0, 0),
            foreground: 0,
            background: MAX_LEVEL,
        })
    }

    pub fn clear(&mut self, value: u8) {
        let value = value & MAX_LEVEL;
        self.pixels.fill((value << 4) | value);
    }

    /// Gray level at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        let (index, high) = self.locate(x, y)?;
        let byte = self.pixels[index];
        Some(if high { byte >> 4 } else { byte & 0x0F })
    }

    pub fn cursor(&self) -> (u32, u32) {
        self.cursor
    }

    /// Binary PGM image of the frame (maxval 7).
    pub fn to_pgm(&self) -> Vec<u8> {
        let header = format!("P5\n{} {}\n{}\n", self.width, self.height, MAX_LEVEL);
        let mut out = Vec::with_capacity(header.len() + self.pixels.len() * 2);
        out.extend_from_slice(header.as_bytes());
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(self.pixel(x, y).unwrap_or(MAX_LEVEL));
            }
        }
        out
    }

    /// Coarse text rendering of the frame for terminals.
    ///
    /// Each character averages a `cell_width` x `2 * cell_width` block.
    pub fn to_ascii(&self, columns: u32) -> String {
        const RAMP: &[u8] = b"@%#*+=-. ";
        let columns = columns.clamp(1, self.width.max(1));
        let cell_w = self.width.div_ceil(columns).max(1);
        let cell_h = cell_w * 2;

        let mut out = String::new();
        for row in 0..self.height.div_ceil(cell_h) {
            for col in 0..self.width.div_ceil(cell_w) {
                let (mut sum, mut count) = (0u32, 0u32);
                for y in row * cell_h..((row + 1) * cell_h).min(self.height) {
                    for x in col * cell_w..((col + 1) * cell_w).min(self.width) {
                        sum += u32::from(self.pixel(x, y).unwrap_or(MAX_LEVEL));
                        count += 1;
                    }
                }
                let level = sum.checked_div(count).unwrap_or(u32::from(MAX_LEVEL)) as usize;
                let index = level * (RAMP.len() - 1) / usize::from(MAX_LEVEL);
                out.push(RAMP[index] as char);
            }
            out.push('\n');
        }
        out
    }

    fn locate(&self, x: u32, y: u32) -> Option<(usize, bool)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bytes_per_row = self.width.div_ceil(2) as usize;
        let index = y as usize * bytes_per_row + (x / 2) as usize;
        Some((index, x % 2 == 0))
    }
}

impl Panel for GrayFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_pixel(&mut self, x: u32, y: u32, value: u8) {
        let Some((index, high)) = self.locate(x, y) else {
            return;
        };
        let value = value & MAX_LEVEL;
        let byte = &mut self.pixels[index];
        *byte = if high {
            (*byte & 0x0F) | (value << 4)
        } else {
            (*byte & 0xF0) | value
        };
    }

    fn set_cursor(&mut self, x: u32, y: u32) {
        self.cursor = (x, y);
    }

    fn set_text_color(&mut self, foreground: u8, background: u8) {
        self.foreground = foreground & MAX_LEVEL;
        self.background = background & MAX_LEVEL;
    }

    fn print(&mut self, text: &str) {
        let style = MonoTextStyleBuilder::new()
            .font(&FONT_10X20)
            .text_color(Gray4::new(self.foreground))
            .background_color(Gray4::new(self.background))
            .build();
        let origin = Point::new(self.cursor.0 as i32, self.cursor.1 as i32);
        let next = match Text::with_baseline(text, origin, style, Baseline::Top).draw(self) {
            Ok(next) => next,
            Err(never) => match never {},
        };
        self.cursor.0 = next.x.max(0) as u32;
    }

    fn commit(&mut self) -> Result<(), PanelError> {
        Ok(())
    }
}

impl OriginDimensions for GrayFrame {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for GrayFrame {
    type Color = Gray4;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                Panel::set_pixel(self, point.x as u32, point.y as u32, color.luma());
            }
        }
        Ok(())
    }
}

/// Where [`HostPanel`] sends a committed frame.
pub enum PanelOutput {
    /// Write a PGM file
    Pgm(PathBuf),
    /// Print a text preview to stdout
    Ascii { columns: u32 },
}

/// Desktop stand-in for the e-paper panel.
pub struct HostPanel {
    frame: GrayFrame,
    output: PanelOutput,
    commits: usize,
}

impl HostPanel {
    pub fn new(width: u32, height: u32, output: PanelOutput) -> Result<Self, AllocationError> {
        Ok(Self {
            frame: GrayFrame::try_new(width, height)?,
            output,
            commits: 0,
        })
    }

    pub fn frame(&self) -> &GrayFrame {
        &self.frame
    }

    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl Panel for HostPanel {
    fn width(&self) -> u32 {
        self.frame.width
    }

    fn height(&self) -> u32 {
        self.frame.height
    }

    fn set_pixel(&mut self, x: u32, y: u32, value: u8) {
        self.frame.set_pixel(x, y, value);
    }

    fn set_cursor(&mut self, x: u32, y: u32) {
        self.frame.set_cursor(x, y);
    }

    fn set_text_color(&mut self, foreground: u8, background: u8) {
        self.frame.set_text_color(foreground, background);
    }

    fn print(&mut self, text: &str) {
        self.frame.print(text);
    }

    fn commit(&mut self) -> Result<(), PanelError> {
        match &self.output {
            PanelOutput::Pgm(path) => {
                fs::write(path, self.frame.to_pgm())?;
                log::info!("Frame written to {}", path.display());
            }
            PanelOutput::Ascii { columns } => {
                println!("{}", self.frame.to_ascii(*columns));
            }
        }
        self.commits += 1;
        Ok(())
    }
}
