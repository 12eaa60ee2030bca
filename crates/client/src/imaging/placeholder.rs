//! Placeholder graphic served when the upstream image cannot be used.

/// Content type of [`placeholder_svg`].
pub const PLACEHOLDER_CONTENT_TYPE: &str = "image/svg+xml";

const DEFAULT_WIDTH: u32 = 400;
const DEFAULT_HEIGHT: u32 = 300;

/// Gray "Image not available" SVG sized to the request.
///
/// With no dimensions it is 400x300; a single dimension makes it square.
pub fn placeholder_svg(width: u32, height: u32) -> String {
    let (width, height) = match (width, height) {
        (0, 0) => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
        (0, h) => (h, h),
        (w, 0) => (w, w),
        (w, h) => (w, h),
    };

    format!(
        r##"<svg width="{width}" height="{height}" xmlns="http://www.w3.org/2000/svg">
  <rect width="100%" height="100%" fill="#eeeeee"/>
  <text x="50%" y="50%" text-anchor="middle" dominant-baseline="middle" fill="#999999" font-family="Arial, sans-serif" font-size="16">
    Image not available
  </text>
</svg>"##
    )
}
