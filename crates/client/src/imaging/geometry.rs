//! Pure geometry for the resize rules.
//!
//! Nothing here touches pixels; [`plan`] turns source dimensions and a
//! request into the exact operations `transform` performs.

use super::params::ResizeParams;

/// Fraction of the vertical overflow kept above a crop window.
pub const CROP_TOP_BIAS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// What to do with a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Leave the pixels untouched.
    Passthrough,
    /// Resample to exactly this size.
    Resize(Size),
    /// Resample to `scaled`, then cut `window` out of it at `(x, y)`.
    Crop { scaled: Size, x: u32, y: u32, window: Size },
}

impl Plan {
    /// Pixel count of the largest buffer the plan allocates, 0 for passthrough.
    pub fn peak_pixels(&self) -> u64 {
        match self {
            Plan::Passthrough => 0,
            Plan::Resize(size) => size.pixels(),
            Plan::Crop { scaled, .. } => scaled.pixels(),
        }
    }
}

/// Decide how `source` is transformed for `params`.
///
/// Precedence: no dimensions, crop, fit-within-box, width only, height only.
pub fn plan(source: Size, params: &ResizeParams) -> Plan {
    if source.width == 0 || source.height == 0 || !params.is_transform() {
        return Plan::Passthrough;
    }

    if params.crop {
        return crop(source, Size::new(params.width, params.height));
    }

    match (params.width, params.height) {
        (w, h) if w > 0 && h > 0 => fit(source, Size::new(w, h)),
        (w, _) if w > 0 => Plan::Resize(Size::new(w, proportional(source.height, w, source.width))),
        (_, h) => Plan::Resize(Size::new(proportional(source.width, h, source.height), h)),
    }
}

/// Fill-scale then crop, biased toward the lower part of the image.
fn crop(source: Size, target: Size) -> Plan {
    let scale_x = f64::from(target.width) / f64::from(source.width);
    let scale_y = f64::from(target.height) / f64::from(source.height);
    let scale = scale_x.max(scale_y);

    // Rounding can land one pixel short of the target; never scale below it.
    let scaled = Size::new(
        ((f64::from(source.width) * scale).round() as u32).max(target.width),
        ((f64::from(source.height) * scale).round() as u32).max(target.height),
    );

    let x = (scaled.width - target.width) / 2;
    let y = (f64::from(scaled.height - target.height) * CROP_TOP_BIAS).round() as u32;

    Plan::Crop { scaled, x, y, window: target }
}

/// Fit inside `bounds` keeping the aspect ratio. Never upscales.
fn fit(source: Size, bounds: Size) -> Plan {
    if source.width <= bounds.width && source.height <= bounds.height {
        return Plan::Passthrough;
    }

    let source_ratio = f64::from(source.width) / f64::from(source.height);
    let bounds_ratio = f64::from(bounds.width) / f64::from(bounds.height);

    if source_ratio > bounds_ratio {
        Plan::Resize(Size::new(bounds.width, proportional(source.height, bounds.width, source.width)))
    } else {
        Plan::Resize(Size::new(proportional(source.width, bounds.height, source.height), bounds.height))
    }
}

/// `value * numerator / denominator`, rounded, at least 1.
fn proportional(value: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = f64::from(value) * f64::from(numerator) / f64::from(denominator);
    (scaled.round() as u32).max(1)
}
