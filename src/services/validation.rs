// =====================================================================================
// VALIDATION SERVICE - SIZE LIMITS + INJECTION SCREENING
// =====================================================================================

use tracing::{debug, instrument};

use crate::config::SecurityConfig;
use crate::models::{SecurityRequest, SecurityViolation, ViolationKind};
use crate::services::detection::DetectionRuleSet;

/// Request-side markers checked when `require_security_headers` is set.
const REQUIRED_SECURITY_HEADERS: &[&str] = &["x-content-type-options", "strict-transport-security"];

pub struct ValidationService {
    config: SecurityConfig,
    rules: DetectionRuleSet,
}

impl ValidationService {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            rules: DetectionRuleSet::new(),
            config,
        }
    }

    /// Runs every check and reports every violation found. Checks never
    /// short-circuit on an earlier failure: the caller and the audit trail
    /// both need the complete picture for one request.
    #[instrument(skip(self, request), fields(client_id = %request.client_id, endpoint = %request.endpoint))]
    pub fn validate_request(&self, request: &SecurityRequest) -> Vec<SecurityViolation> {
        let mut violations = Vec::new();

        if request.content_length > self.config.max_request_size {
            violations.push(SecurityViolation::new(
                ViolationKind::RequestTooLarge,
                format!(
                    "declared request size {} exceeds limit {}",
                    request.content_length, self.config.max_request_size
                ),
            ));
        }

        if request.content.len() > self.config.max_content_length {
            violations.push(SecurityViolation::new(
                ViolationKind::ContentTooLarge,
                format!(
                    "content length {} exceeds limit {}",
                    request.content.len(),
                    self.config.max_content_length
                ),
            ));
        }

        for (name, value) in &request.parameters {
            if value.len() > self.config.max_parameter_length {
                violations.push(SecurityViolation::new(
                    ViolationKind::ParameterTooLong,
                    format!(
                        "parameter '{}' length {} exceeds limit {}",
                        name,
                        value.len(),
                        self.config.max_parameter_length
                    ),
                ));
            }
        }

        if let Some(signature) = self.rules.first_sql_match(&request.content) {
            violations.push(SecurityViolation::new(
                ViolationKind::SqlInjectionSuspected,
                format!("sql injection signature ({}) in request content", signature),
            ));
        }
        for (name, value) in &request.parameters {
            if let Some(signature) = self.rules.first_sql_match(value) {
                violations.push(SecurityViolation::new(
                    ViolationKind::SqlInjectionSuspected,
                    format!("sql injection signature ({}) in parameter '{}'", signature, name),
                ));
            }
        }

        if let Some(signature) = self.rules.first_xss_match(&request.content) {
            violations.push(SecurityViolation::new(
                ViolationKind::XssSuspected,
                format!("xss signature ({}) in request content", signature),
            ));
        }
        for (name, value) in &request.parameters {
            if let Some(signature) = self.rules.first_xss_match(value) {
                violations.push(SecurityViolation::new(
                    ViolationKind::XssSuspected,
                    format!("xss signature ({}) in parameter '{}'", signature, name),
                ));
            }
        }

        if self.config.require_security_headers {
            for header in REQUIRED_SECURITY_HEADERS {
                if !request.has_header(header) {
                    violations.push(SecurityViolation::new(
                        ViolationKind::MissingRequiredHeader,
                        format!("required security header '{}' is missing", header),
                    ));
                }
            }
        }

        if !violations.is_empty() {
            debug!(count = violations.len(), "request produced security violations");
        }

        violations
    }
}
