// =====================================================================================
// SECURITY GATE - REQUEST VALIDATION & SECURITY AUDIT MIDDLEWARE
// =====================================================================================
//
// Gatekeeper for inbound requests before they reach application logic:
// - Size-limit and injection-signature validation (SQL injection, XSS)
// - Per-client sliding-window rate limiting
// - Mandated security response headers
// - Severity-tiered, buffered audit trail delivered to an abstract sink
//
// The caller builds a SecurityRequest, calls validate_request, merges the
// returned security headers into its response, and applies its own policy
// to the returned violations. The middleware performs no network I/O.
//
// =====================================================================================

pub mod config;
pub mod error;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{AuditConfig, RateLimitConfig, SecurityConfig};
pub use error::ConfigError;
pub use models::{
    AuditEvent, RequestOutcome, SecurityRequest, SecurityValidationResult, SecurityViolation,
    ViolationKind, ViolationSeverity,
};

pub use services::{
    AuditService, AuditSink, AuditStats, DetectionRuleSet, RateLimiterService, SecurityMiddleware,
    TracingAuditSink, ValidationService,
};
