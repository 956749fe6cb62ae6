//! Image decoding into single-channel [`ImageFrame`]s.
//!
//! Accepts raw image bytes and produces one intensity channel. 8-bit
//! sources (PNG, JPEG, BMP) stay on the 0-255 scale; deeper sources
//! (16-bit PNG, TIFF) are stored on the 16-bit scale. Color inputs are
//! reduced to luminance.
//!
//! This is the first step of every image: raw bytes in, `ImageFrame` out.

use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::types::{ImageFrame, PipelineError};

/// Hint for which container format the bytes hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatHint {
    /// Sniff the format from the byte content.
    #[default]
    Auto,
    /// Portable Network Graphics (8 or 16-bit).
    Png,
    /// JPEG (8-bit).
    Jpeg,
    /// Windows bitmap (8-bit).
    Bmp,
    /// TIFF (8 or 16-bit).
    Tiff,
}

impl FormatHint {
    /// File extensions recognized by [`from_path`](Self::from_path).
    pub const EXTENSIONS: &'static [&'static str] =
        &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

    /// Derive a hint from a file extension, falling back to
    /// [`FormatHint::Auto`] for anything unrecognized.
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            _ => Self::Auto,
        }
    }

    /// Derive a hint from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(Self::Auto, Self::from_extension)
    }

    const fn image_format(self) -> Option<ImageFormat> {
        match self {
            Self::Auto => None,
            Self::Png => Some(ImageFormat::Png),
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Bmp => Some(ImageFormat::Bmp),
            Self::Tiff => Some(ImageFormat::Tiff),
        }
    }
}

/// Errors surfaced by a [`Decoder`].
///
/// Decoders report through the pipeline's error type; the decode-side
/// variants are [`PipelineError::EmptyInput`],
/// [`PipelineError::ImageDecode`], [`PipelineError::UnsupportedFormat`]
/// and [`PipelineError::InvalidFrame`].
pub type DecodeError = PipelineError;

/// Turns encoded file bytes into an [`ImageFrame`].
///
/// The session holds one decoder for the whole batch, so implementations
/// must not keep per-image state.
pub trait Decoder {
    /// Decode `bytes` into a single-channel frame.
    ///
    /// # Errors
    ///
    /// Returns an error for empty, corrupt, or unsupported input.
    fn decode(&self, bytes: &[u8], hint: FormatHint) -> Result<ImageFrame, DecodeError>;
}

/// Default decoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
    fn decode(&self, bytes: &[u8], hint: FormatHint) -> Result<ImageFrame, DecodeError> {
        if bytes.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let loaded = match hint.image_format() {
            Some(format) => image::load_from_memory_with_format(bytes, format),
            None => image::load_from_memory(bytes),
        };
        let img = loaded.map_err(|e| match e {
            image::ImageError::Unsupported(unsupported) => {
                PipelineError::UnsupportedFormat(unsupported.to_string())
            }
            other => PipelineError::ImageDecode(other),
        })?;
        let frame = to_frame(&img)?;
        log::trace!(
            "decoded {}x{} image ({:?}, {:?})",
            frame.width(),
            frame.height(),
            img.color(),
            frame.depth(),
        );
        Ok(frame)
    }
}

/// Reduce a decoded image to one channel, keeping 16-bit precision for
/// anything deeper than 8 bits per channel.
fn to_frame(img: &DynamicImage) -> Result<ImageFrame, DecodeError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(PipelineError::InvalidFrame(format!(
            "decoded image is {}x{}",
            img.width(),
            img.height()
        )));
    }
    let color = img.color();
    let bits_per_channel = color.bits_per_pixel() / u16::from(color.channel_count());
    Ok(if bits_per_channel > 8 {
        ImageFrame::from_gray16(&img.to_luma16())
    } else {
        ImageFrame::from_gray8(&img.to_luma8())
    })
}
