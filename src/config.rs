// =====================================================================================
// SECURITY GATE CONFIGURATION
// =====================================================================================

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::models::ViolationSeverity;

/// Immutable policy snapshot supplied at middleware construction. The
/// middleware never mutates or reloads it; reconfiguring means building a
/// new middleware instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_request_size: usize,
    pub max_content_length: usize,
    pub max_parameter_length: usize,
    pub add_security_headers: bool,
    pub require_security_headers: bool,
    pub use_https_only: bool,
    pub enable_rate_limiting: bool,
    /// Violations at or above this severity force `is_valid = false`;
    /// anything below stays advisory.
    pub blocking_threshold: ViolationSeverity,
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub min_severity: ViolationSeverity,
    pub buffered: bool,
    pub flush_threshold: usize,
    pub max_batch_age: Duration,
    pub max_capacity: usize,
    pub delivery_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_request_size: 1_048_576,
            max_content_length: 65_536,
            max_parameter_length: 2_048,
            add_security_headers: true,
            require_security_headers: false,
            use_https_only: false,
            enable_rate_limiting: true,
            blocking_threshold: ViolationSeverity::High,
            rate_limit: RateLimitConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            min_severity: ViolationSeverity::Low,
            buffered: true,
            flush_threshold: 100,
            max_batch_age: Duration::from_secs(30),
            max_capacity: 1_000,
            delivery_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl SecurityConfig {
    /// Fail-fast invariant check, run once at middleware construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_request_size == 0 {
            return Err(ConfigError::NonPositiveLimit {
                field: "max_request_size",
            });
        }
        if self.max_content_length == 0 {
            return Err(ConfigError::NonPositiveLimit {
                field: "max_content_length",
            });
        }
        if self.max_parameter_length == 0 {
            return Err(ConfigError::NonPositiveLimit {
                field: "max_parameter_length",
            });
        }
        // A request cannot be required to carry what the middleware never adds.
        if self.require_security_headers && !self.add_security_headers {
            return Err(ConfigError::HeaderPolicyConflict);
        }
        if self.enable_rate_limiting {
            if self.rate_limit.max_requests == 0 {
                return Err(ConfigError::NonPositiveLimit {
                    field: "rate_limit.max_requests",
                });
            }
            if self.rate_limit.window.is_zero() {
                return Err(ConfigError::ZeroDuration {
                    field: "rate_limit.window",
                });
            }
        }
        if self.audit.flush_threshold == 0 {
            return Err(ConfigError::NonPositiveLimit {
                field: "audit.flush_threshold",
            });
        }
        if self.audit.max_batch_age.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "audit.max_batch_age",
            });
        }
        if self.audit.delivery_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "audit.delivery_timeout",
            });
        }
        if self.audit.max_capacity < self.audit.flush_threshold {
            return Err(ConfigError::AuditCapacityBelowThreshold {
                max_capacity: self.audit.max_capacity,
                flush_threshold: self.audit.flush_threshold,
            });
        }
        Ok(())
    }

    /// Builds the snapshot from `SECURITY_GATE_*` environment variables.
    /// Unset or unparseable variables fall back to the defaults with a
    /// warning, never a failure; `validate` still runs at construction.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_request_size: env_parse("SECURITY_GATE_MAX_REQUEST_SIZE", defaults.max_request_size),
            max_content_length: env_parse(
                "SECURITY_GATE_MAX_CONTENT_LENGTH",
                defaults.max_content_length,
            ),
            max_parameter_length: env_parse(
                "SECURITY_GATE_MAX_PARAMETER_LENGTH",
                defaults.max_parameter_length,
            ),
            add_security_headers: env_parse(
                "SECURITY_GATE_ADD_SECURITY_HEADERS",
                defaults.add_security_headers,
            ),
            require_security_headers: env_parse(
                "SECURITY_GATE_REQUIRE_SECURITY_HEADERS",
                defaults.require_security_headers,
            ),
            use_https_only: env_parse("SECURITY_GATE_USE_HTTPS_ONLY", defaults.use_https_only),
            enable_rate_limiting: env_parse(
                "SECURITY_GATE_ENABLE_RATE_LIMITING",
                defaults.enable_rate_limiting,
            ),
            blocking_threshold: env_parse(
                "SECURITY_GATE_BLOCKING_THRESHOLD",
                defaults.blocking_threshold,
            ),
            rate_limit: RateLimitConfig {
                max_requests: env_parse(
                    "SECURITY_GATE_RATE_LIMIT_MAX_REQUESTS",
                    defaults.rate_limit.max_requests,
                ),
                window: Duration::from_secs(env_parse(
                    "SECURITY_GATE_RATE_LIMIT_WINDOW_SECONDS",
                    defaults.rate_limit.window.as_secs(),
                )),
            },
            audit: AuditConfig {
                min_severity: env_parse(
                    "SECURITY_GATE_AUDIT_MIN_SEVERITY",
                    defaults.audit.min_severity,
                ),
                buffered: env_parse("SECURITY_GATE_AUDIT_BUFFERED", defaults.audit.buffered),
                flush_threshold: env_parse(
                    "SECURITY_GATE_AUDIT_FLUSH_THRESHOLD",
                    defaults.audit.flush_threshold,
                ),
                max_batch_age: Duration::from_secs(env_parse(
                    "SECURITY_GATE_AUDIT_MAX_BATCH_AGE_SECONDS",
                    defaults.audit.max_batch_age.as_secs(),
                )),
                max_capacity: env_parse(
                    "SECURITY_GATE_AUDIT_MAX_CAPACITY",
                    defaults.audit.max_capacity,
                ),
                delivery_timeout: Duration::from_secs(env_parse(
                    "SECURITY_GATE_AUDIT_DELIVERY_TIMEOUT_SECONDS",
                    defaults.audit.delivery_timeout.as_secs(),
                )),
                retry_delay: Duration::from_secs(env_parse(
                    "SECURITY_GATE_AUDIT_RETRY_DELAY_SECONDS",
                    defaults.audit.retry_delay.as_secs(),
                )),
            },
        }
    }
}

fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr + fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value '{}' for {}, using default {}", raw, name, default);
                default
            }
        },
        Err(_) => default,
    }
}
