//! Resize directive parsing.
//!
//! Accepted directives, in priority order:
//!
//! | Directive | Values | Canonical key |
//! |---|---|---|
//! | `c` / `crop` | `N` (square) or `WxH` | `c_WxH` |
//! | `w` / `width` | `N` or `WxH` | `w_N` / `w_WxH` |
//! | `h` / `height` | `N` | `h_N`, or `w_WxH` alongside a width |
//!
//! A crop directive wins outright; width and height otherwise combine.

use resizer_core::Error;
use resizer_core::cache::key::{self, HASH_BAND_START};

/// Raw directive values as they arrive in the query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Directives<'a> {
    pub crop: Option<&'a str>,
    pub width: Option<&'a str>,
    pub height: Option<&'a str>,
}

/// Parsed resize request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResizeParams {
    /// Target width, 0 when unconstrained.
    pub width: u32,
    /// Target height, 0 when unconstrained.
    pub height: u32,
    pub crop: bool,
    /// Canonical string the store key is derived from, empty for no directive.
    pub cache_key: String,
}

impl ResizeParams {
    /// Parse raw directives. Empty values count as absent.
    ///
    /// # Errors
    ///
    /// `INVALID_PARAMS` for a non-numeric or non-positive dimension, a `WxH`
    /// value that does not split into exactly two parts, or a dimension at or
    /// above the hashed key band.
    pub fn parse(directives: Directives<'_>) -> Result<Self, Error> {
        if let Some(crop) = present(directives.crop) {
            let (width, height) = match crop.split_once('x') {
                Some(_) => parse_pair(crop, "crop")?,
                None => {
                    let size = parse_dimension(crop, "crop size")?;
                    (size, size)
                }
            };
            return Ok(Self::new(width, height, true));
        }

        let (mut width, mut height) = (0, 0);

        if let Some(raw) = present(directives.width) {
            (width, height) = match raw.split_once('x') {
                Some(_) => parse_pair(raw, "width")?,
                None => (parse_dimension(raw, "width")?, 0),
            };
        }

        if let Some(raw) = present(directives.height) {
            height = parse_dimension(raw, "height")?;
        }

        Ok(Self::new(width, height, false))
    }

    /// Build params from already-validated dimensions.
    pub fn new(width: u32, height: u32, crop: bool) -> Self {
        Self { width, height, crop, cache_key: canonical_key(width, height, crop) }
    }

    /// Whether any dimension was requested.
    pub fn is_transform(&self) -> bool {
        self.width > 0 || self.height > 0
    }

    /// Cap both dimensions at `max`, keeping their ratio.
    ///
    /// The canonical key follows the clamped values, so every request above
    /// the ceiling shares one cache entry per aspect.
    pub fn clamp_to(self, max: u32) -> Self {
        let largest = self.width.max(self.height);
        if max == 0 || largest <= max {
            return self;
        }

        let factor = f64::from(max) / f64::from(largest);
        let scale = |v: u32| if v == 0 { 0 } else { ((f64::from(v) * factor).round() as u32).max(1) };
        Self::new(scale(self.width), scale(self.height), self.crop)
    }

    /// Store key for these params.
    pub fn width_key(&self) -> i64 {
        key::width_key(self.width, self.height, self.crop, &self.cache_key)
    }
}

/// Canonical cache-key string for a dimension set.
pub fn canonical_key(width: u32, height: u32, crop: bool) -> String {
    match (crop, width, height) {
        (true, w, h) => format!("c_{w}x{h}"),
        (false, 0, 0) => String::new(),
        (false, 0, h) => format!("h_{h}"),
        (false, w, 0) => format!("w_{w}"),
        (false, w, h) => format!("w_{w}x{h}"),
    }
}

fn parse_pair(raw: &str, what: &str) -> Result<(u32, u32), Error> {
    let parts: Vec<&str> = raw.split('x').collect();
    if parts.len() != 2 {
        return Err(Error::InvalidParams(format!("invalid {what} format, use {what}=100 or {what}=100x100")));
    }
    Ok((parse_dimension(parts[0], what)?, parse_dimension(parts[1], what)?))
}

fn parse_dimension(raw: &str, what: &str) -> Result<u32, Error> {
    let value: i64 = raw.parse().map_err(|_| Error::InvalidParams(format!("invalid {what}: {raw:?}")))?;
    if value <= 0 {
        return Err(Error::InvalidParams(format!("invalid {what}: must be positive")));
    }
    if value >= HASH_BAND_START {
        return Err(Error::InvalidParams(format!("invalid {what}: must be below {HASH_BAND_START}")));
    }
    Ok(value as u32)
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resizer_core::cache::key::{HASH_BAND_SIZE, HASH_BAND_START, ORIGINAL_WIDTH_KEY};

    fn parse(crop: Option<&str>, width: Option<&str>, height: Option<&str>) -> Result<ResizeParams, Error> {
        ResizeParams::parse(Directives { crop, width, height })
    }

    #[test]
    fn test_no_directives() {
        let p = parse(None, None, None).unwrap();
        assert_eq!(p, ResizeParams { width: 0, height: 0, crop: false, cache_key: String::new() });
        assert!(!p.is_transform());
        assert_eq!(p.width_key(), ORIGINAL_WIDTH_KEY);
    }

    #[test]
    fn test_width_only() {
        let p = parse(None, Some("300"), None).unwrap();
        assert_eq!((p.width, p.height, p.crop), (300, 0, false));
        assert_eq!(p.cache_key, "w_300");
        assert_eq!(p.width_key(), 300);
    }

    #[test]
    fn test_width_pair() {
        let p = parse(None, Some("100x200"), None).unwrap();
        assert_eq!((p.width, p.height), (100, 200));
        assert_eq!(p.cache_key, "w_100x200");
        assert_eq!(p.width_key(), 184_803);
    }

    #[test]
    fn test_width_and_height_share_key_with_pair() {
        let pair = parse(None, Some("100x200"), None).unwrap();
        let split = parse(None, Some("100"), Some("200")).unwrap();
        assert_eq!(pair, split);
    }

    #[test]
    fn test_height_only() {
        let p = parse(None, None, Some("200")).unwrap();
        assert_eq!((p.width, p.height), (0, 200));
        assert_eq!(p.cache_key, "h_200");
        assert_eq!(p.width_key(), 125_915);
    }

    #[test]
    fn test_height_overrides_pair_height() {
        let p = parse(None, Some("100x200"), Some("300")).unwrap();
        assert_eq!(p.cache_key, "w_100x300");
        assert_eq!(p.width_key(), 185_764);
    }

    #[test]
    fn test_crop_square_and_pair() {
        let square = parse(Some("150"), None, None).unwrap();
        assert_eq!((square.width, square.height, square.crop), (150, 150, true));
        assert_eq!(square.cache_key, "c_150x150");
        assert_eq!(square.width_key(), 196_996);

        let pair = parse(Some("100x200"), None, None).unwrap();
        assert_eq!(pair.cache_key, "c_100x200");
        assert_eq!(pair.width_key(), 152_047);
    }

    #[test]
    fn test_crop_takes_precedence() {
        let p = parse(Some("50"), Some("300"), Some("400")).unwrap();
        assert!(p.crop);
        assert_eq!(p.cache_key, "c_50x50");
    }

    #[test]
    fn test_empty_values_are_absent() {
        let p = parse(Some(""), Some("120"), Some("")).unwrap();
        assert_eq!(p.cache_key, "w_120");
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        for (crop, width, height) in [
            (None, Some("0"), None),
            (None, Some("-5"), None),
            (None, Some("abc"), None),
            (None, None, Some("0")),
            (None, None, Some("1.5")),
            (Some("0"), None, None),
            (Some("10x"), None, None),
            (Some("x10"), None, None),
            (None, Some("10x20x30"), None),
            (None, Some("100x0"), None),
            (None, Some(" 100"), None),
            (None, None, Some("100 ")),
            (Some("50 x 50"), None, None),
        ] {
            let result = parse(crop, width, height);
            assert!(matches!(result, Err(Error::InvalidParams(_))), "{crop:?} {width:?} {height:?}");
        }
    }

    #[test]
    fn test_rejects_widths_in_hash_band() {
        assert!(matches!(parse(None, Some("100000"), None), Err(Error::InvalidParams(_))));
        assert_eq!(parse(None, Some("99999"), None).unwrap().width_key(), 99_999);
    }

    #[test]
    fn test_keys_stay_out_of_literal_range() {
        for p in [
            parse(None, None, Some("1")).unwrap(),
            parse(Some("9999x9999"), None, None).unwrap(),
            parse(None, Some("1x1"), None).unwrap(),
        ] {
            let band = HASH_BAND_START..HASH_BAND_START + HASH_BAND_SIZE;
            assert!(band.contains(&p.width_key()), "{}", p.cache_key);
        }
        assert_eq!(parse(None, None, Some("1")).unwrap().width_key(), 102_938);
        assert_eq!(parse(Some("9999"), None, None).unwrap().width_key(), 137_532);
    }

    #[test]
    fn test_canonical_key_reparses_to_same_params() {
        for p in [
            parse(None, Some("640"), None).unwrap(),
            parse(None, Some("640x480"), None).unwrap(),
            parse(None, None, Some("480")).unwrap(),
            parse(Some("64x32"), None, None).unwrap(),
        ] {
            let (kind, dims) = p.cache_key.split_once('_').unwrap();
            let reparsed = match kind {
                "c" => parse(Some(dims), None, None),
                "w" => parse(None, Some(dims), None),
                _ => parse(None, None, Some(dims)),
            }
            .unwrap();
            assert_eq!(reparsed, p);
        }
    }

    #[test]
    fn test_clamp_preserves_ratio() {
        let p = parse(None, Some("4000x2000"), None).unwrap().clamp_to(1000);
        assert_eq!((p.width, p.height), (1000, 500));
        assert_eq!(p.cache_key, "w_1000x500");

        let p = parse(None, Some("3000"), None).unwrap().clamp_to(1000);
        assert_eq!((p.width, p.height), (1000, 0));
        assert_eq!(p.width_key(), 1000);

        let small = parse(Some("200"), None, None).unwrap();
        assert_eq!(small.clone().clamp_to(1000), small);
    }
}
