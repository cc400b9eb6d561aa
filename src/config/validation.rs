//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, URLs parse)
//! - Detect contradictory classifier tables
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AccessConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::AccessConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("classifier.success_code must not be empty")]
    EmptySuccessCode,

    #[error("code {code} is listed both as {first} and as {second}")]
    ConflictingCode {
        code: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("classifier.domain_rules[{index}] has an empty marker")]
    EmptyMarker { index: usize },

    #[error("observability.log_level '{0}' is not a valid filter")]
    InvalidLogLevel(String),
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &AccessConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("backends.primary_url", &config.backends.primary_url),
        ("backends.booking_url", &config.backends.booking_url),
        ("backends.sso_exchange_url", &config.backends.sso_exchange_url),
        ("backends.identity_url", &config.backends.identity_url),
    ] {
        if Url::parse(value).is_err() {
            errors.push(ValidationError::InvalidUrl {
                field,
                value: value.clone(),
            });
        }
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::ZeroTimeout {
            field: "timeouts.request_ms",
        });
    }
    if config.timeouts.relogin_ms == 0 {
        errors.push(ValidationError::ZeroTimeout {
            field: "timeouts.relogin_ms",
        });
    }

    let classifier = &config.classifier;
    if classifier.success_code.is_empty() {
        errors.push(ValidationError::EmptySuccessCode);
    }

    let tables: [(&'static str, Vec<&String>); 4] = [
        ("success_code", vec![&classifier.success_code]),
        ("auth_codes", classifier.auth_codes.iter().collect()),
        (
            "academic_session_codes",
            classifier.academic_session_codes.iter().collect(),
        ),
        ("benign_codes", classifier.benign_codes.iter().collect()),
    ];
    for (i, (first, codes)) in tables.iter().enumerate() {
        let codes: HashSet<&String> = codes.iter().copied().collect();
        for (second, others) in &tables[i + 1..] {
            for code in others.iter().filter(|c| codes.contains(*c)) {
                errors.push(ValidationError::ConflictingCode {
                    code: (*code).clone(),
                    first: *first,
                    second: *second,
                });
            }
        }
    }

    for (index, rule) in classifier.domain_rules.iter().enumerate() {
        if rule.marker.trim().is_empty() {
            errors.push(ValidationError::EmptyMarker { index });
        }
    }

    if tracing_subscriber::EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
