//! # Display Outputs
//!
//! A [`Display`] turns a [`DisplayState`] into an image and presents it. The
//! coordinator calls the pair once per redraw.
//!
//! Two outputs are provided:
//! - [`TextDisplay`]: prints the board to stdout (development mode)
//! - [`BitmapDisplay`]: rasterises the board into a 1-bit [`FrameBuffer`] and
//!   writes it as a binary PBM file, standing in for the e-paper panel

use crate::display_state::DisplayState;
use crate::renderer::{draw_dashboard, render_text};
use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use std::convert::Infallible;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from presenting a rendered image.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("display IO: {0}")]
    Io(#[from] io::Error),
}

/// Render-and-show collaborator used at every redraw.
pub trait Display: Send + 'static {
    type Image;

    /// Produce an image of `state`.
    fn render(&self, state: &DisplayState) -> Self::Image;

    /// Present a previously rendered image.
    fn show(&mut self, image: Self::Image) -> Result<(), DisplayError>;
}

/// 1-bit frame buffer, one byte per eight pixels, rows padded to whole bytes.
///
/// Bit set means ink (black). This is also the PBM (P4) raster layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    bits: Vec<u8>,
}

impl FrameBuffer {
    /// A blank (all white) buffer.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width.div_ceil(8) as usize;
        FrameBuffer {
            width,
            height,
            bits: vec![0; stride * height as usize],
        }
    }

    fn stride(&self) -> usize {
        self.width.div_ceil(8) as usize
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let index = y as usize * self.stride() + (x / 8) as usize;
        self.bits[index] & (0x80 >> (x % 8)) != 0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, on: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = y as usize * self.stride() + (x / 8) as usize;
        let mask = 0x80 >> (x % 8);
        if on {
            self.bits[index] |= mask;
        } else {
            self.bits[index] &= !mask;
        }
    }

    /// Number of inked pixels.
    pub fn ink(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    /// Encode as a binary PBM (P4) image.
    pub fn to_pbm(&self) -> Vec<u8> {
        let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.bits);
        out
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Ok((x, y)) = <(u32, u32)>::try_from(point) {
                self.set_pixel(x, y, color.is_on());
            }
        }
        Ok(())
    }
}

/// Prints the board as text on stdout.
#[derive(Debug, Default)]
pub struct TextDisplay;

impl Display for TextDisplay {
    type Image = String;

    fn render(&self, state: &DisplayState) -> String {
        render_text(state)
    }

    fn show(&mut self, image: String) -> Result<(), DisplayError> {
        println!("{}", image);
        Ok(())
    }
}

/// Rasterises the board and writes it to a PBM file.
///
/// The file is replaced atomically so viewers never see a partial image.
#[derive(Debug)]
pub struct BitmapDisplay {
    width: u32,
    height: u32,
    path: PathBuf,
}

impl BitmapDisplay {
    pub fn new(width: u32, height: u32, path: impl Into<PathBuf>) -> Self {
        BitmapDisplay {
            width,
            height,
            path: path.into(),
        }
    }
}

impl Display for BitmapDisplay {
    type Image = FrameBuffer;

    fn render(&self, state: &DisplayState) -> FrameBuffer {
        let mut frame = FrameBuffer::new(self.width, self.height);
        match draw_dashboard(state, &mut frame) {
            Ok(()) => frame,
            Err(never) => match never {},
        }
    }

    fn show(&mut self, image: FrameBuffer) -> Result<(), DisplayError> {
        let tmp = self.path.with_extension("pbm.tmp");
        fs::write(&tmp, image.to_pbm())?;
        fs::rename(&tmp, &self.path)?;
        log::info!(
            "Wrote {}x{} frame ({} ink pixels) to {}",
            image.width(),
            image.height(),
            image.ink(),
            self.path.display()
        );
        Ok(())
    }
}
