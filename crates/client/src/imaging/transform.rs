//! Decoding and pixel operations.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, DynamicImage, Frame, ImageFormat, RgbaImage};
use resizer_core::Error;

use super::geometry::{Plan, Size};

const FILTER: FilterType = FilterType::Lanczos3;

/// A decoded upstream image.
pub enum Decoded {
    /// Any single-frame format.
    Still { image: DynamicImage, format: ImageFormat },
    /// A GIF, kept as frames so animation survives.
    Animated { frames: Vec<Frame> },
}

impl Decoded {
    /// Short lowercase name of the input format (`jpeg`, `png`, `gif`, ...).
    pub fn format_name(&self) -> &'static str {
        match self {
            Decoded::Still { format, .. } => format_name(*format),
            Decoded::Animated { .. } => "gif",
        }
    }

    /// Dimensions of the (first) frame.
    pub fn size(&self) -> Size {
        match self {
            Decoded::Still { image, .. } => Size::new(image.width(), image.height()),
            Decoded::Animated { frames } => frames
                .first()
                .map(|f| Size::new(f.buffer().width(), f.buffer().height()))
                .unwrap_or_else(|| Size::new(0, 0)),
        }
    }
}

impl std::fmt::Debug for Decoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decoded::Still { format, .. } => f.debug_struct("Still").field("format", format).finish(),
            Decoded::Animated { frames } => f.debug_struct("Animated").field("frames", &frames.len()).finish(),
        }
    }
}

/// Sniff and decode `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Decoded, Error> {
    let format = image::guess_format(bytes).map_err(|e| Error::DecodeFailed(e.to_string()))?;

    if format == ImageFormat::Gif {
        let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(|e| Error::DecodeFailed(e.to_string()))?;
        let frames = decoder.into_frames().collect_frames().map_err(|e| Error::DecodeFailed(e.to_string()))?;
        if frames.is_empty() {
            return Err(Error::DecodeFailed("gif has no frames".into()));
        }
        return Ok(Decoded::Animated { frames });
    }

    let image = image::load_from_memory_with_format(bytes, format).map_err(|e| Error::DecodeFailed(e.to_string()))?;
    Ok(Decoded::Still { image, format })
}

/// Apply `plan` to a still image.
pub fn apply(image: DynamicImage, plan: Plan) -> DynamicImage {
    match plan {
        Plan::Passthrough => image,
        Plan::Resize(size) => image.resize_exact(size.width, size.height, FILTER),
        Plan::Crop { scaled, x, y, window } => {
            image.resize_exact(scaled.width, scaled.height, FILTER).crop_imm(x, y, window.width, window.height)
        }
    }
}

/// Apply `plan` to every frame, keeping each frame's delay.
pub fn apply_frames(frames: Vec<Frame>, plan: Plan) -> Vec<Frame> {
    if plan == Plan::Passthrough {
        return frames;
    }

    frames
        .into_iter()
        .map(|frame| {
            let delay = frame.delay();
            let buffer = apply_rgba(frame.into_buffer(), plan);
            Frame::from_parts(buffer, 0, 0, delay)
        })
        .collect()
}

fn apply_rgba(buffer: RgbaImage, plan: Plan) -> RgbaImage {
    match plan {
        Plan::Passthrough => buffer,
        Plan::Resize(size) => imageops::resize(&buffer, size.width, size.height, FILTER),
        Plan::Crop { scaled, x, y, window } => {
            let resized = imageops::resize(&buffer, scaled.width, scaled.height, FILTER);
            imageops::crop_imm(&resized, x, y, window.width, window.height).to_image()
        }
    }
}

/// Lowercase name for an input format.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Avif => "avif",
        other => other.extensions_str().first().copied().unwrap_or("unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Rgb, RgbImage, Rgba};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn gif_bytes(frames: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            for i in 0..frames {
                let frame = RgbaImage::from_pixel(40, 20, Rgba([i * 60, 10, 10, 255]));
                encoder.encode_frame(Frame::from_parts(frame, 0, 0, Delay::from_numer_denom_ms(50, 1))).unwrap();
            }
        }
        buf
    }

    #[test]
    fn test_decode_png() {
        let decoded = decode(&png_bytes(40, 30)).unwrap();
        assert_eq!(decoded.format_name(), "png");
        assert_eq!(decoded.size(), Size::new(40, 30));
    }

    #[test]
    fn test_decode_gif_keeps_frames() {
        let decoded = decode(&gif_bytes(3)).unwrap();
        assert_eq!(decoded.format_name(), "gif");
        let Decoded::Animated { frames } = decoded else { panic!("expected frames") };
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode(b"definitely not an image"), Err(Error::DecodeFailed(_))));
    }

    #[test]
    fn test_decode_truncated_png_fails() {
        let bytes = png_bytes(40, 30);
        assert!(matches!(decode(&bytes[..bytes.len() / 2]), Err(Error::DecodeFailed(_))));
    }

    #[test]
    fn test_apply_crop_exact_size() {
        let Decoded::Still { image, .. } = decode(&png_bytes(400, 300)).unwrap() else { panic!() };
        let plan = Plan::Crop { scaled: Size::new(133, 100), x: 16, y: 0, window: Size::new(100, 100) };

        let out = apply(image, plan);
        assert_eq!((out.width(), out.height()), (100, 100));
    }

    #[test]
    fn test_apply_frames_resizes_each_frame() {
        let Decoded::Animated { frames } = decode(&gif_bytes(2)).unwrap() else { panic!() };

        let out = apply_frames(frames, Plan::Resize(Size::new(20, 10)));

        assert_eq!(out.len(), 2);
        for frame in &out {
            assert_eq!(frame.buffer().dimensions(), (20, 10));
            assert_eq!(frame.delay(), Delay::from_numer_denom_ms(50, 1));
        }
    }

    #[test]
    fn test_format_names() {
        assert_eq!(format_name(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_name(ImageFormat::WebP), "webp");
        assert_eq!(format_name(ImageFormat::Bmp), "bmp");
    }
}
