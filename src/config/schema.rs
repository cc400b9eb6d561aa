//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the access layer.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::BackendId;

/// Root configuration for the access layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AccessConfig {
    /// Durable storage location.
    pub storage: StorageConfig,

    /// Backend endpoints.
    pub backends: BackendsConfig,

    /// Session persistence settings.
    pub sessions: SessionConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Cache defaults.
    pub cache: CacheConfig,

    /// Error classification tables.
    pub classifier: ClassifierConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Durable storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding persisted sessions and cache entries.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("campus-access.json"),
        }
    }
}

/// Backend endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendsConfig {
    /// Base URL of the primary envelope API.
    pub primary_url: String,

    /// Path of the refresh-token endpoint, relative to `primary_url`.
    pub refresh_path: String,

    /// Base URL of the seat-booking service.
    pub booking_url: String,

    /// SSO endpoint that redirects to the booking service with a token.
    pub sso_exchange_url: String,

    /// Query parameter of the final redirect URL carrying the booking token.
    pub exchange_token_param: String,

    /// Base URL of the identity one-code service.
    pub identity_url: String,

    /// Path of the identity login endpoint, relative to `identity_url`.
    pub identity_login_path: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://fzuhelper.west2.online/".to_string(),
            refresh_path: "/api/v1/login/refresh-token".to_string(),
            booking_url: "https://aiot.fzu.edu.cn/api/ibs/".to_string(),
            sso_exchange_url: "https://sso.fzu.edu.cn/oauth2.0/authorize?response_type=code&client_id=wlwxt&redirect_uri=http://aiot.fzu.edu.cn/api/admin/sso/getIbsToken".to_string(),
            exchange_token_param: "token".to_string(),
            identity_url: "https://oss.fzu.edu.cn/api/qr/".to_string(),
            identity_login_path: "login/getAccessToken".to_string(),
        }
    }
}

/// Which backends keep their credential across restarts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub persisted: Vec<BackendId>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persisted: vec![BackendId::Primary, BackendId::Academic],
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for one backend call in milliseconds.
    pub request_ms: u64,

    /// Deadline for one re-login attempt in milliseconds.
    pub relogin_ms: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn relogin(&self) -> Duration {
        Duration::from_millis(self.relogin_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 5_000,
            relogin_ms: 15_000,
        }
    }
}

/// Cache defaults.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Default freshness window in seconds (0 = always refetch).
    pub stale_secs: u64,
}

/// Kinds a configured domain rule may produce.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DomainErrorKind {
    EvaluationNotFound,
    NativeLoginFailed,
}

/// A backend-specific precondition detected by a marker in the response body.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DomainRuleConfig {
    pub backend: BackendId,

    /// Substring of the response body that identifies the condition.
    pub marker: String,

    pub kind: DomainErrorKind,

    /// Message carried by the produced error.
    pub message: String,
}

/// Error classification tables.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Envelope code meaning `data` is valid.
    pub success_code: String,

    /// Primary envelope codes meaning the primary credential is invalid or expired.
    pub auth_codes: Vec<String>,

    /// Primary envelope codes meaning the academic-system cookie expired.
    pub academic_session_codes: Vec<String>,

    /// HTTP status the booking service answers with for an expired token.
    pub booking_auth_status: u16,

    /// Business codes that are never shown to the user.
    pub benign_codes: Vec<String>,

    pub domain_rules: Vec<DomainRuleConfig>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            success_code: "10000".to_string(),
            auth_codes: vec![
                "30001".to_string(),
                "30002".to_string(),
                "30003".to_string(),
            ],
            academic_session_codes: vec!["50001".to_string()],
            booking_auth_status: 500,
            benign_codes: vec!["50004".to_string()],
            domain_rules: vec![DomainRuleConfig {
                backend: BackendId::Academic,
                marker: "评议".to_string(),
                kind: DomainErrorKind::EvaluationNotFound,
                message: "Complete the course evaluation on the academic system first".to_string(),
            }],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when neither `RUST_LOG` nor `CAMPUS_ACCESS_LOG` is set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
