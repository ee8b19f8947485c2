//! Checked numeric conversions for values read from text files.
//!
//! Case and scenario files store integer identifiers as floating point
//! columns; a plain `as` cast would silently turn `NaN` or `-1` into a valid
//! index.

use anyhow::{anyhow, Result};

/// Convert f64 to usize, rejecting non-finite, negative, fractional or
/// out-of-range values.
///
/// ```
/// use mtpcut_io::helpers::safe_f64_to_usize;
///
/// assert_eq!(safe_f64_to_usize(42.0).unwrap(), 42);
/// assert!(safe_f64_to_usize(-1.0).is_err());
/// assert!(safe_f64_to_usize(f64::NAN).is_err());
/// ```
pub fn safe_f64_to_usize(value: f64) -> Result<usize> {
    if !value.is_finite() {
        return Err(anyhow!(
            "Cannot convert non-finite value to usize: {}",
            value
        ));
    }
    if value < 0.0 {
        return Err(anyhow!("Cannot convert negative value to usize: {}", value));
    }
    if value.fract() != 0.0 {
        return Err(anyhow!("Expected an integer, found {}", value));
    }
    if value > usize::MAX as f64 {
        return Err(anyhow!(
            "Value {} exceeds maximum usize ({})",
            value,
            usize::MAX
        ));
    }
    Ok(value as usize)
}

/// Convert f64 to i32 with range checks.
pub fn safe_f64_to_i32(value: f64) -> Result<i32> {
    if !value.is_finite() {
        return Err(anyhow!("Cannot convert non-finite value to i32: {}", value));
    }
    if value < i32::MIN as f64 || value > i32::MAX as f64 {
        return Err(anyhow!("Value {} is outside the i32 range", value));
    }
    Ok(value as i32)
}

/// Parse a whitespace token as f64, naming the field on failure.
pub fn parse_f64_token(token: &str, field: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| anyhow!("invalid {} '{}'", field, token))
}

/// Parse a whitespace token as a non-negative integer (accepts `3` and `3.0`).
pub fn parse_index_token(token: &str, field: &str) -> Result<usize> {
    if let Ok(v) = token.parse::<usize>() {
        return Ok(v);
    }
    let v = parse_f64_token(token, field)?;
    safe_f64_to_usize(v).map_err(|e| anyhow!("invalid {} '{}': {}", field, token, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_f64_to_usize_rejects_fractional() {
        assert!(safe_f64_to_usize(2.5).is_err());
        assert_eq!(safe_f64_to_usize(0.0).unwrap(), 0);
    }

    #[test]
    fn test_safe_f64_to_i32_bounds() {
        assert_eq!(safe_f64_to_i32(-100.0).unwrap(), -100);
        assert!(safe_f64_to_i32(3e10).is_err());
        assert!(safe_f64_to_i32(f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_index_token() {
        assert_eq!(parse_index_token("7", "bus").unwrap(), 7);
        assert_eq!(parse_index_token("7.0", "bus").unwrap(), 7);
        let err = parse_index_token("x", "bus").unwrap_err();
        assert!(err.to_string().contains("invalid bus"));
    }
}
