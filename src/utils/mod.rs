//! Utilities module for logging, error handling and formatting helpers
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types
//! - Small formatting helpers used by the CLI

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{HssanError, Result};
pub use logging::{init_logging, LogConfig};

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

/// Format a shape as `a x b x c`
pub fn format_shape(dims: &[usize]) -> String {
    dims.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" x ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1000000), "1,000,000");
        assert_eq!(format_number(42), "42");
    }

    #[test]
    fn test_format_shape() {
        assert_eq!(format_shape(&[1, 224, 224, 3]), "1 x 224 x 224 x 3");
        assert_eq!(format_shape(&[]), "");
    }
}
