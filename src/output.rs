//! Serializes assembled words.
//!
//! Each word occupies three bytes, low byte first. The raster form lays
//! the words out as the pixels of a square RGB image, left to right,
//! starting from the bottom row.
use std::io::{self, Cursor, Write};
use std::str::FromStr;

use image::{ImageError, ImageFormat, Rgb, RgbImage};
use thiserror::Error;

use crate::assembler::Word;

pub const IMAGE_SIZE: u32 = 256;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("{words} words do not fit in a {size}x{size} image")]
    ImageFull { words: usize, size: u32 },

    #[error("unable to encode image: {0}")]
    Encode(#[from] ImageError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OutputFormat {
    /// The bare word stream.
    Raw,
    /// A PNG raster.
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Raw => "bin",
            OutputFormat::Png => "png",
        }
    }

    pub fn write<W: Write>(&self, words: &[Word], out: &mut W) -> Result<(), OutputError> {
        match self {
            OutputFormat::Raw => {
                for word in words {
                    out.write_all(&pixel(*word))?;
                }
            },
            OutputFormat::Png => {
                // The PNG encoder needs a seekable sink.
                let mut encoded = Cursor::new(Vec::new());
                raster(words, IMAGE_SIZE)?.write_to(&mut encoded, ImageFormat::Png)?;
                out.write_all(encoded.get_ref())?;
            },
        }
        Ok(())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(OutputFormat::Raw),
            "png" => Ok(OutputFormat::Png),
            _ => Err(format!("unknown output format `{}`, expected raw or png", s)),
        }
    }
}

/// The three bytes of a word, low byte first.
pub fn pixel(word: Word) -> [u8; 3] {
    [(word & 0xFF) as u8, ((word >> 8) & 0xFF) as u8, ((word >> 16) & 0xFF) as u8]
}

/// Lays the words out as a `size` by `size` image.
/// Word `i` lands at column `i % size` of row `size - 1 - i / size`;
/// unused pixels stay black.
pub fn raster(words: &[Word], size: u32) -> Result<RgbImage, OutputError> {
    let capacity = (size as usize) * (size as usize);
    if words.len() > capacity {
        return Err(OutputError::ImageFull { words: words.len(), size });
    }

    let mut image = RgbImage::new(size, size);
    for (i, word) in words.iter().enumerate() {
        let i = i as u32;
        image.put_pixel(i % size, size - 1 - i / size, Rgb(pixel(*word)));
    }
    Ok(image)
}
