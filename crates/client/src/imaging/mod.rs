//! Resize engine and format encoder.
//!
//! ### Flow
//! 1. [`params`] turns query directives into [`ResizeParams`]
//! 2. [`transform::decode`] sniffs and decodes the upstream bytes
//! 3. [`geometry::plan`] picks the pixel operations
//! 4. [`encode::FormatEncoder`] chooses the output format and encodes
//!
//! SVG never reaches this module; it is passed through byte-for-byte.

pub mod encode;
pub mod geometry;
pub mod params;
pub mod placeholder;
pub mod transform;

pub use encode::{AvifModernEncoder, Encoded, FormatEncoder, ModernEncoder, OutputFormat};
pub use params::{Directives, ResizeParams};
pub use placeholder::{PLACEHOLDER_CONTENT_TYPE, placeholder_svg};
pub use transform::Decoded;

use resizer_core::Error;

/// Transform and encode a decoded image for `params`.
///
/// A plan whose largest buffer exceeds `max_pixels` is refused before any
/// pixel is allocated. CPU bound; async callers run it on the blocking pool.
pub fn render(
    decoded: Decoded, params: &ResizeParams, encoder: &FormatEncoder, max_pixels: u64,
) -> Result<Encoded, Error> {
    let plan = geometry::plan(decoded.size(), params);
    if plan.peak_pixels() > max_pixels {
        return Err(Error::OutputTooLarge(format!(
            "{} pixels requested, limit is {max_pixels}",
            plan.peak_pixels()
        )));
    }
    match decoded {
        Decoded::Still { image, format } => encoder.encode_still(&transform::apply(image, plan), format),
        Decoded::Animated { frames } => encoder.encode_animation(transform::apply_frames(frames, plan)),
    }
}
