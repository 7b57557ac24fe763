use std::fmt;
use std::ops::RangeInclusive;

use crate::errors::{SearchError, SearchResult};

/// Accepted coupon length, in bytes, when no configuration overrides it.
pub const DEFAULT_TOKEN_LEN: RangeInclusive<usize> = 8..=10;

/// A coupon code that passed length validation.
///
/// Codes outside the accepted length range are rejected before any coupon
/// file is opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CouponCode(String);

impl CouponCode {
    /// Validates `code` against the default length range.
    pub fn new(code: impl Into<String>) -> SearchResult<Self> {
        Self::with_len_range(code, DEFAULT_TOKEN_LEN)
    }

    /// Validates `code` against an explicit inclusive byte-length range.
    pub fn with_len_range(code: impl Into<String>, len: RangeInclusive<usize>) -> SearchResult<Self> {
        let code = code.into();
        if !len.contains(&code.len()) {
            return Err(SearchError::invalid_token(
                code.len(),
                *len.start(),
                *len.end(),
            ));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CouponCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range() {
        assert!(CouponCode::new("HAPPYHRS").is_ok());
        assert!(CouponCode::new("FIFTYOFF10").is_ok());
        assert!(matches!(
            CouponCode::new("SHORT"),
            Err(SearchError::InvalidToken { len: 5, min: 8, max: 10 })
        ));
        assert!(CouponCode::new("WAYTOOLONGCODE").is_err());
    }

    #[test]
    fn test_custom_range() {
        let code = CouponCode::with_len_range("ABC", 1..=3).unwrap();
        assert_eq!(code.as_str(), "ABC");
        assert_eq!(code.as_bytes(), b"ABC");
        assert!(CouponCode::with_len_range("", 1..=3).is_err());
    }
}
