use crate::core::address::validate_address;
use crate::domain::model::DispatchJob;
use crate::utils::error::{MailerError, Result};
use std::time::Duration;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(MailerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(MailerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MailerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(MailerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// 速率必須是有限的正數
pub fn validate_rate(field_name: &str, rate: f64) -> Result<()> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(MailerError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: rate.to_string(),
            reason: "Rate must be a positive number of messages per second".to_string(),
        });
    }
    Ok(())
}

pub fn validate_seconds(field_name: &str, seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|_| MailerError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: seconds.to_string(),
        reason: "Value must be a non-negative number of seconds".to_string(),
    })
}

pub fn validate_email_field(field_name: &str, address: &str) -> Result<()> {
    validate_address(address).map_err(|e| MailerError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: address.to_string(),
        reason: e.reason,
    })
}

impl Validate for DispatchJob {
    fn validate(&self) -> Result<()> {
        validate_range("concurrency", self.concurrency, 1, DispatchJob::MAX_CONCURRENCY)?;
        validate_rate("rate_per_second", self.rate_per_second)?;
        validate_email_field("sender", &self.sender)?;

        if self.send_timeout.is_zero() {
            return Err(MailerError::InvalidConfigValueError {
                field: "send_timeout".to_string(),
                value: format!("{:?}", self.send_timeout),
                reason: "Timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Campaign;
    use chrono::Utc;

    fn job() -> DispatchJob {
        DispatchJob::new(&Campaign {
            id: 1,
            name: "launch".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
            created_at: Utc::now(),
        })
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("concurrency", 5, 1, 20).is_ok());
        assert!(validate_range("concurrency", 0, 1, 20).is_err());
        assert!(validate_range("concurrency", 21, 1, 20).is_err());
    }

    #[test]
    fn test_validate_rate_and_seconds() {
        assert!(validate_rate("rate", 0.5).is_ok());
        assert!(validate_rate("rate", 0.0).is_err());
        assert!(validate_rate("rate", f64::NAN).is_err());
        assert_eq!(
            validate_seconds("backoff", 1.5).unwrap(),
            Duration::from_millis(1500)
        );
        assert!(validate_seconds("backoff", -1.0).is_err());
    }

    #[test]
    fn test_default_job_is_valid() {
        assert!(job().validate().is_ok());
    }

    #[test]
    fn test_job_rejects_out_of_range_settings() {
        let mut bad = job();
        bad.concurrency = 0;
        assert!(bad.validate().is_err());

        let mut bad = job();
        bad.concurrency = 21;
        assert!(bad.validate().is_err());

        let mut bad = job();
        bad.rate_per_second = -1.0;
        assert!(bad.validate().is_err());

        let mut bad = job();
        bad.sender = "noreply".to_string();
        assert!(bad.validate().is_err());

        let mut bad = job();
        bad.send_timeout = Duration::ZERO;
        assert!(bad.validate().is_err());
    }
}
