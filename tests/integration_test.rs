// End-to-end middleware coverage: the full validate pipeline, blocking
// policy, security headers, audit wiring and configuration fail-fast.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio_test::assert_ok;

use security_gate::{
    AuditEvent, AuditSink, ConfigError, RateLimitConfig, RequestOutcome, SecurityConfig,
    SecurityMiddleware, SecurityRequest, ViolationKind, ViolationSeverity,
};

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<AuditEvent>>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<AuditEvent> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn deliver(&self, events: &[AuditEvent]) -> Result<()> {
        self.batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn deliver(&self, _events: &[AuditEvent]) -> Result<()> {
        anyhow::bail!("audit store unreachable")
    }
}

fn middleware_with(config: SecurityConfig) -> (SecurityMiddleware, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let middleware = SecurityMiddleware::new(config, Arc::clone(&sink))
        .expect("config should be valid");
    (middleware, sink)
}

fn clean_request() -> SecurityRequest {
    SecurityRequest::new("/api/test".to_string(), "c1".to_string())
        .with_content("test".to_string())
        .with_content_length(10)
        .with_header("User-Agent".to_string(), "Test".to_string())
        .with_parameter("test".to_string(), "value".to_string())
}

#[tokio::test]
async fn test_ordinary_request_passes_with_security_headers() {
    let (middleware, _sink) = middleware_with(SecurityConfig::default());

    let result = middleware.validate_request(&clean_request());

    assert!(result.is_valid);
    assert!(result.violations.is_empty());
    assert_eq!(
        result.security_headers.get("X-Content-Type-Options").map(String::as_str),
        Some("nosniff")
    );
    assert_eq!(
        result.security_headers.get("X-Frame-Options").map(String::as_str),
        Some("DENY")
    );
}

#[tokio::test]
async fn test_sql_attack_is_blocked_and_audited() {
    let (middleware, sink) = middleware_with(SecurityConfig::default());

    let request = SecurityRequest::new("/api/orders".to_string(), "attacker".to_string())
        .with_content("'; DROP TABLE orders; --".to_string());
    let result = middleware.validate_request(&request);

    assert!(!result.is_valid);
    assert!(result.has_violation(ViolationKind::SqlInjectionSuspected));
    assert_eq!(result.max_severity(), Some(ViolationSeverity::Critical));

    // Shutdown drains the buffered event to the sink.
    middleware.shutdown().await;
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].client_id, "attacker");
    assert_eq!(events[0].outcome, RequestOutcome::Blocked);
    assert_eq!(events[0].severity, ViolationSeverity::Critical);
    assert!(events[0]
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::SqlInjectionSuspected));
    assert_eq!(
        events[0].context["content_length"],
        serde_json::json!(request.content_length)
    );
    assert_eq!(events[0].context["parameter_count"], serde_json::json!(0));
}

#[tokio::test]
async fn test_xss_parameter_is_blocked() {
    let (middleware, _sink) = middleware_with(SecurityConfig::default());

    let request = SecurityRequest::new("/api/profile".to_string(), "c1".to_string())
        .with_parameter("bio".to_string(), "<script>alert(1)</script>".to_string());
    let result = middleware.validate_request(&request);

    assert!(!result.is_valid);
    assert!(result.has_violation(ViolationKind::XssSuspected));
}

#[tokio::test]
async fn test_rate_limit_is_advisory_under_default_threshold() {
    let config = SecurityConfig {
        rate_limit: RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        },
        ..SecurityConfig::default()
    };
    let (middleware, _sink) = middleware_with(config);
    let request = clean_request();

    assert!(middleware.validate_request(&request).is_valid);
    assert!(middleware.validate_request(&request).is_valid);

    // Third request in the window picks up the violation, but a medium
    // severity does not block under the default threshold.
    let third = middleware.validate_request(&request);
    assert!(third.has_violation(ViolationKind::RateLimitExceeded));
    assert!(third.is_valid);

    // Another client is unaffected.
    let other = SecurityRequest::new("/api/test".to_string(), "c2".to_string());
    let result = middleware.validate_request(&other);
    assert!(result.is_valid);
    assert!(result.violations.is_empty());
}

#[tokio::test]
async fn test_lowered_blocking_threshold_makes_rate_limit_blocking() {
    let config = SecurityConfig {
        blocking_threshold: ViolationSeverity::Medium,
        rate_limit: RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        },
        ..SecurityConfig::default()
    };
    let (middleware, _sink) = middleware_with(config);
    let request = clean_request();

    assert!(middleware.validate_request(&request).is_valid);

    let second = middleware.validate_request(&request);
    assert!(second.has_violation(ViolationKind::RateLimitExceeded));
    assert!(!second.is_valid);
}

#[tokio::test]
async fn test_validation_is_repeatable_for_the_same_request() {
    let config = SecurityConfig {
        enable_rate_limiting: false,
        ..SecurityConfig::default()
    };
    let (middleware, _sink) = middleware_with(config);
    let request = SecurityRequest::new("/api/search".to_string(), "c1".to_string())
        .with_parameter("q".to_string(), "' OR '1'='1".to_string());

    let first = middleware.validate_request(&request);
    let second = middleware.validate_request(&request);

    assert_eq!(first.is_valid, second.is_valid);
    assert_eq!(first.violations, second.violations);
}

#[tokio::test]
async fn test_headers_absent_when_disabled() {
    let config = SecurityConfig {
        add_security_headers: false,
        ..SecurityConfig::default()
    };
    let (middleware, _sink) = middleware_with(config);

    let result = middleware.validate_request(&clean_request());
    assert!(result.security_headers.is_empty());
}

#[tokio::test]
async fn test_hsts_header_requires_https_only() {
    let (middleware, _sink) = middleware_with(SecurityConfig::default());
    let result = middleware.validate_request(&clean_request());
    assert!(!result.security_headers.contains_key("Strict-Transport-Security"));

    let config = SecurityConfig {
        use_https_only: true,
        ..SecurityConfig::default()
    };
    let (middleware, _sink) = middleware_with(config);
    let result = middleware.validate_request(&clean_request());
    assert_eq!(
        result
            .security_headers
            .get("Strict-Transport-Security")
            .map(String::as_str),
        Some("max-age=31536000; includeSubDomains")
    );
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_construction() {
    let sink = Arc::new(RecordingSink::default());

    let config = SecurityConfig {
        max_request_size: 0,
        ..SecurityConfig::default()
    };
    assert_matches!(
        SecurityMiddleware::new(config, Arc::clone(&sink)),
        Err(ConfigError::NonPositiveLimit {
            field: "max_request_size"
        })
    );

    let config = SecurityConfig {
        require_security_headers: true,
        add_security_headers: false,
        ..SecurityConfig::default()
    };
    assert_matches!(
        SecurityMiddleware::new(config, Arc::clone(&sink)),
        Err(ConfigError::HeaderPolicyConflict)
    );

    let mut config = SecurityConfig::default();
    config.audit.max_capacity = 10;
    config.audit.flush_threshold = 50;
    assert_matches!(
        SecurityMiddleware::new(config, Arc::clone(&sink)),
        Err(ConfigError::AuditCapacityBelowThreshold { .. })
    );

    let config = SecurityConfig {
        rate_limit: RateLimitConfig {
            max_requests: 10,
            window: Duration::ZERO,
        },
        ..SecurityConfig::default()
    };
    assert_matches!(
        SecurityMiddleware::new(config, Arc::clone(&sink)),
        Err(ConfigError::ZeroDuration {
            field: "rate_limit.window"
        })
    );

    let mut config = SecurityConfig::default();
    config.audit.max_batch_age = Duration::ZERO;
    assert_matches!(
        SecurityMiddleware::new(config, Arc::clone(&sink)),
        Err(ConfigError::ZeroDuration {
            field: "audit.max_batch_age"
        })
    );
}

#[tokio::test]
async fn test_audit_failure_never_affects_validation() {
    let middleware = SecurityMiddleware::new(SecurityConfig::default(), Arc::new(FailingSink))
        .expect("config should be valid");

    let result = middleware.validate_request(&clean_request());
    assert!(result.is_valid);

    // The sink is down, flushes fail, and the request path keeps working.
    assert!(middleware.audit().flush().await.is_err());
    let result = middleware.validate_request(&clean_request());
    assert!(result.is_valid);
}

#[tokio::test]
async fn test_low_severity_outcomes_filtered_from_audit() {
    let mut config = SecurityConfig::default();
    config.audit.min_severity = ViolationSeverity::Medium;
    let (middleware, sink) = middleware_with(config);

    // A clean request produces a low-severity event, which the filter drops.
    middleware.validate_request(&clean_request());
    assert_eq!(assert_ok!(middleware.audit().flush().await), 0);

    let attack = SecurityRequest::new("/api/orders".to_string(), "attacker".to_string())
        .with_content("1 UNION SELECT password FROM users".to_string());
    middleware.validate_request(&attack);
    assert_eq!(assert_ok!(middleware.audit().flush().await), 1);
    assert_eq!(sink.events()[0].client_id, "attacker");
}

#[tokio::test]
async fn test_middleware_exposes_runtime_stats() {
    let (middleware, _sink) = middleware_with(SecurityConfig::default());

    middleware.validate_request(&clean_request());
    middleware.validate_request(&clean_request());

    assert_eq!(middleware.rate_limiter().tracked_clients(), 1);
    assert_ok!(middleware.audit().flush().await);
    assert_eq!(middleware.audit().stats().delivered_events, 2);
}

#[tokio::test]
async fn test_config_from_env_reads_overrides_and_survives_bad_values() {
    std::env::set_var("SECURITY_GATE_MAX_REQUEST_SIZE", "4096");
    std::env::set_var("SECURITY_GATE_BLOCKING_THRESHOLD", "medium");
    std::env::set_var("SECURITY_GATE_MAX_CONTENT_LENGTH", "not-a-number");

    let config = SecurityConfig::from_env();
    assert_eq!(config.max_request_size, 4096);
    assert_eq!(config.blocking_threshold, ViolationSeverity::Medium);
    // Unparseable values fall back to the default.
    assert_eq!(config.max_content_length, 65_536);

    std::env::remove_var("SECURITY_GATE_MAX_REQUEST_SIZE");
    std::env::remove_var("SECURITY_GATE_BLOCKING_THRESHOLD");
    std::env::remove_var("SECURITY_GATE_MAX_CONTENT_LENGTH");
}
