//! Width key derivation.
//!
//! The cache table is keyed by `(url, width)` where `width` is a single
//! integer. Plain width-only requests store under their literal width.
//! Every other request (height-only, width+height, crop) hashes its
//! canonical parameter string into a fixed band that sits above any literal
//! width. Zero is reserved for the original, untransformed upstream bytes.
//!
//! The band is lossy: two canonical strings can land on the same key. The
//! canonical string is stored next to each entry so reads can detect that.

/// Key under which the untransformed original is stored.
pub const ORIGINAL_WIDTH_KEY: i64 = 0;

/// First key of the hashed band; literal widths must stay below it.
pub const HASH_BAND_START: i64 = 100_000;

/// Number of keys in the hashed band.
pub const HASH_BAND_SIZE: i64 = 100_000;

/// Fold a canonical parameter string into the hashed band.
///
/// Rolling `h * 31 + c` over the chars with wrapping 64-bit arithmetic,
/// masked to 31 bits and reduced into `[HASH_BAND_START, HASH_BAND_START + HASH_BAND_SIZE)`.
pub fn hash_band(canonical: &str) -> i64 {
    let hash = canonical.chars().fold(0i64, |h, c| h.wrapping_mul(31).wrapping_add(c as i64));
    (hash & 0x7FFF_FFFF) % HASH_BAND_SIZE + HASH_BAND_START
}

/// Derive the store key for a parsed request.
///
/// Width-only requests map to the literal width, no directive at all maps to
/// [`ORIGINAL_WIDTH_KEY`], and everything else goes through [`hash_band`].
pub fn width_key(width: u32, height: u32, crop: bool, canonical: &str) -> i64 {
    if height > 0 || crop { hash_band(canonical) } else { i64::from(width) }
}

/// Whether `key` lies inside the hashed band.
#[cfg(test)]
pub(crate) fn is_hashed(key: i64) -> bool {
    (HASH_BAND_START..HASH_BAND_START + HASH_BAND_SIZE).contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_only_is_literal() {
        assert_eq!(width_key(100, 0, false, "w_100"), 100);
        assert_eq!(width_key(1, 0, false, "w_1"), 1);
    }

    #[test]
    fn test_no_directive_is_original() {
        assert_eq!(width_key(0, 0, false, ""), ORIGINAL_WIDTH_KEY);
    }

    #[test]
    fn test_known_hash_value() {
        // 'h'=104, '_'=95, '1'=49 -> ((104*31)+95)*31+49 = 102938
        assert_eq!(hash_band("h_1"), 102_938);
    }

    #[test]
    fn test_composite_requests_land_in_band() {
        for (w, h, crop, key) in [
            (0, 200, false, "h_200"),
            (100, 200, false, "w_100x200"),
            (150, 150, true, "c_150x150"),
            (9999, 9999, true, "c_9999x9999"),
        ] {
            let k = width_key(w, h, crop, key);
            assert!(is_hashed(k), "{key} -> {k}");
            assert_ne!(k, ORIGINAL_WIDTH_KEY);
        }
    }

    #[test]
    fn test_long_keys_wrap_without_panic() {
        let long = "c_".to_string() + &"9".repeat(500);
        assert!(is_hashed(hash_band(&long)));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(hash_band("w_100x200"), hash_band("w_100x200"));
        assert_ne!(hash_band("w_100x200"), hash_band("c_100x200"));
    }
}
