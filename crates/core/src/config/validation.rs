use anyhow::{bail, Result};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> Result<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> Result<()> {
        if value.trim().is_empty() {
            bail!("{field_name} cannot be empty");
        }
        Ok(())
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> Result<()> {
        if timeout_seconds == 0 {
            bail!("{field_name} must be greater than 0");
        }
        if timeout_seconds > 3600 {
            bail!("{field_name} must be less than or equal to 3600");
        }
        Ok(())
    }

    /// Validate that a count is within (0, max]
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> Result<()> {
        if count == 0 {
            bail!("{field_name} must be greater than 0");
        }
        if count > max {
            bail!("{field_name} must be less than or equal to {max}");
        }
        Ok(())
    }

    pub fn validate_one_of(value: &str, field_name: &str, allowed: &[&str]) -> Result<()> {
        if !allowed.contains(&value) {
            bail!("Invalid {field_name}: {value}. Valid options: {allowed:?}");
        }
        Ok(())
    }
}
