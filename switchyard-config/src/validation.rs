// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is within range
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {} (got {})",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate that a value is strictly positive
    pub fn positive<T: PartialOrd + Default + Display>(value: T, field: &str) -> Result<()> {
        if value <= T::default() {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero (got {})",
                field, value
            )));
        }
        Ok(())
    }

    /// Validate `value <= limit`
    pub fn at_most<T: PartialOrd + Display>(
        value: T,
        limit: T,
        field: &str,
        limit_field: &str,
    ) -> Result<()> {
        if value > limit {
            return Err(ConfigError::ValidationError(format!(
                "{} ({}) must not exceed {} ({})",
                field, value, limit_field, limit
            )));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of<T: PartialEq + Display>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            let allowed = allowed
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of: {} (got {})",
                field, allowed, value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty_validation() {
        assert!(ConfigValidator::not_empty("value", "field").is_ok());
        assert!(ConfigValidator::not_empty("", "field").is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(ConfigValidator::in_range(5, 1, 10, "field").is_ok());
        assert!(ConfigValidator::in_range(0, 1, 10, "field").is_err());
        assert!(ConfigValidator::in_range(11, 1, 10, "field").is_err());
    }

    #[test]
    fn test_positive_and_at_most() {
        assert!(ConfigValidator::positive(1u64, "interval").is_ok());
        assert!(ConfigValidator::positive(0u64, "interval").is_err());

        assert!(ConfigValidator::at_most(5, 5, "stale", "cache").is_ok());
        let err = ConfigValidator::at_most(6, 5, "stale", "cache").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: stale (6) must not exceed cache (5)"
        );
    }

    #[test]
    fn test_one_of_validation() {
        let allowed = ["a", "b", "c"];
        assert!(ConfigValidator::one_of(&"a", &allowed, "field").is_ok());
        assert!(ConfigValidator::one_of(&"d", &allowed, "field").is_err());
    }
}
