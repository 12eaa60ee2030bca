//! Output format selection and encoding.
//!
//! ## Fallback chain
//!
//! | Input | First try | On failure |
//! |---|---|---|
//! | GIF | GIF (all frames, looping) | none |
//! | JPEG | modern lossy | JPEG at the same quality |
//! | PNG | modern lossy | lossless PNG |
//! | anything else | modern lossy | JPEG |

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::avif::AvifEncoder;
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Frame, ImageFormat};
use resizer_core::Error;

/// Formats the service can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Avif,
    Jpeg,
    Png,
    Gif,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Avif => "avif",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Avif => "image/avif",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Gif => "image/gif",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded bytes plus the format they are in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

/// The preferred lossy encoder, tried first for every still image.
pub trait ModernEncoder: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, Error>;
}

/// AVIF through rav1e.
#[derive(Debug, Clone, Copy)]
pub struct AvifModernEncoder {
    speed: u8,
}

impl AvifModernEncoder {
    /// `speed` runs from 1 (slowest, smallest) to 10 (fastest).
    pub fn new(speed: u8) -> Self {
        Self { speed: speed.clamp(1, 10) }
    }
}

impl ModernEncoder for AvifModernEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Avif
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        let encoder = AvifEncoder::new_with_speed_quality(&mut buf, self.speed, quality);
        let prepared = if image.color().has_alpha() {
            DynamicImage::ImageRgba8(image.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };
        prepared.write_with_encoder(encoder).map_err(|e| Error::EncodeFailed(format!("avif: {e}")))?;
        Ok(buf)
    }
}

/// Picks the output format for a decoded image and encodes it.
#[derive(Clone)]
pub struct FormatEncoder {
    modern: Arc<dyn ModernEncoder>,
    quality: u8,
}

impl FormatEncoder {
    pub fn new(modern: Arc<dyn ModernEncoder>, quality: u8) -> Self {
        Self { modern, quality }
    }

    /// AVIF-first encoder with the given quality and rav1e speed.
    pub fn avif(quality: u8, speed: u8) -> Self {
        Self::new(Arc::new(AvifModernEncoder::new(speed)), quality)
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a still image decoded from `input`.
    pub fn encode_still(&self, image: &DynamicImage, input: ImageFormat) -> Result<Encoded, Error> {
        match self.modern.encode(image, self.quality) {
            Ok(bytes) => return Ok(Encoded { bytes, format: self.modern.format() }),
            Err(err) => {
                tracing::debug!(error = %err, input = ?input, "modern encode failed, falling back");
            }
        }

        match input {
            ImageFormat::Png => encode_png(image),
            _ => encode_jpeg(image, self.quality),
        }
    }

    /// Re-encode GIF frames as an infinitely looping GIF.
    pub fn encode_animation(&self, frames: Vec<Frame>) -> Result<Encoded, Error> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut buf, 10);
            encoder.set_repeat(Repeat::Infinite).map_err(|e| Error::EncodeFailed(format!("gif: {e}")))?;
            encoder.encode_frames(frames).map_err(|e| Error::EncodeFailed(format!("gif: {e}")))?;
        }
        Ok(Encoded { bytes: buf, format: OutputFormat::Gif })
    }
}

impl std::fmt::Debug for FormatEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatEncoder")
            .field("modern", &self.modern.format())
            .field("quality", &self.quality)
            .finish()
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Encoded, Error> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| Error::EncodeFailed(format!("jpeg: {e}")))?;
    Ok(Encoded { bytes: buf, format: OutputFormat::Jpeg })
}

fn encode_png(image: &DynamicImage) -> Result<Encoded, Error> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| Error::EncodeFailed(format!("png: {e}")))?;
    Ok(Encoded { bytes: buf, format: OutputFormat::Png })
}
