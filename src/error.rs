use thiserror::Error;

/// Construction-time configuration failures. A malformed snapshot never
/// produces a middleware instance; there is no per-request error path for
/// policy violations (those are reported as `SecurityViolation` values).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NonPositiveLimit { field: &'static str },

    #[error("{field} must be a non-zero duration")]
    ZeroDuration { field: &'static str },

    #[error("require_security_headers is enabled but add_security_headers is not")]
    HeaderPolicyConflict,

    #[error("audit max_capacity ({max_capacity}) is below flush_threshold ({flush_threshold})")]
    AuditCapacityBelowThreshold {
        max_capacity: usize,
        flush_threshold: usize,
    },
}
