// =====================================================================================
// SECURITY MIDDLEWARE - PER-REQUEST ORCHESTRATION
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::SecurityConfig;
use crate::error::ConfigError;
use crate::models::{
    AuditEvent, RequestOutcome, SecurityRequest, SecurityValidationResult, SecurityViolation,
    ViolationKind,
};
use crate::services::audit::{AuditService, AuditSink};
use crate::services::rate_limit::RateLimiterService;
use crate::services::validation::ValidationService;

/// Gatekeeper entry point: rate check, validation, response header
/// construction, audit dispatch, one aggregate result. Policy violations
/// are reported in the result, never raised as errors; the caller decides
/// whether to reject based on `is_valid` and its own severity policy.
pub struct SecurityMiddleware {
    config: SecurityConfig,
    validation: ValidationService,
    rate_limiter: RateLimiterService,
    audit: AuditService,
}

impl SecurityMiddleware {
    /// Validates the configuration snapshot and wires the services. Fails
    /// fast on a malformed configuration; must run inside a Tokio runtime
    /// because the audit flush task is spawned here.
    pub fn new(config: SecurityConfig, sink: Arc<dyn AuditSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let validation = ValidationService::new(config.clone());
        let rate_limiter =
            RateLimiterService::new(config.enable_rate_limiting, config.rate_limit.clone());
        let audit = AuditService::new(config.audit.clone(), sink);
        Ok(Self {
            config,
            validation,
            rate_limiter,
            audit,
        })
    }

    /// Synchronous from the caller's point of view: no suspension, the
    /// audit record is a bounded in-memory enqueue. Safe to call
    /// concurrently from many in-flight requests.
    #[instrument(skip(self, request), fields(client_id = %request.client_id, endpoint = %request.endpoint))]
    pub fn validate_request(&self, request: &SecurityRequest) -> SecurityValidationResult {
        let mut violations = Vec::new();

        if !self.rate_limiter.check(&request.client_id) {
            violations.push(SecurityViolation::new(
                ViolationKind::RateLimitExceeded,
                format!(
                    "client '{}' exceeded {} requests per {:?}",
                    request.client_id, self.config.rate_limit.max_requests, self.config.rate_limit.window
                ),
            ));
        }

        violations.extend(self.validation.validate_request(request));

        let is_valid = violations
            .iter()
            .all(|v| v.severity < self.config.blocking_threshold);
        let security_headers = self.build_security_headers();

        let outcome = if is_valid {
            RequestOutcome::Allowed
        } else {
            RequestOutcome::Blocked
        };
        // Observational only: the event cannot alter the result computed above.
        let event = AuditEvent::new(request.client_id.clone(), request.endpoint.clone(), outcome)
            .with_violations(violations.clone())
            .add_context("content_length", request.content_length)
            .add_context("parameter_count", request.parameters.len());
        self.audit.record(event);

        if !is_valid {
            info!(
                violation_count = violations.len(),
                "request blocked by security policy"
            );
        }

        SecurityValidationResult {
            is_valid,
            violations,
            security_headers,
        }
    }

    fn build_security_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if !self.config.add_security_headers {
            return headers;
        }
        headers.insert("X-Content-Type-Options".to_string(), "nosniff".to_string());
        headers.insert("X-Frame-Options".to_string(), "DENY".to_string());
        headers.insert("X-XSS-Protection".to_string(), "1; mode=block".to_string());
        headers.insert(
            "Content-Security-Policy".to_string(),
            "default-src 'self'".to_string(),
        );
        if self.config.use_https_only {
            headers.insert(
                "Strict-Transport-Security".to_string(),
                "max-age=31536000; includeSubDomains".to_string(),
            );
        }
        headers
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditService {
        &self.audit
    }

    pub fn rate_limiter(&self) -> &RateLimiterService {
        &self.rate_limiter
    }

    /// Graceful close: drains and stops the audit flush task.
    pub async fn shutdown(&self) {
        self.audit.shutdown().await;
    }
}
