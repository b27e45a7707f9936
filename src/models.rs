// =====================================================================================
// SECURITY GATE MODELS
// =====================================================================================

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =====================================================================================
// VIOLATION MODELS
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationSeverity::Low => write!(f, "low"),
            ViolationSeverity::Medium => write!(f, "medium"),
            ViolationSeverity::High => write!(f, "high"),
            ViolationSeverity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for ViolationSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(ViolationSeverity::Low),
            "medium" => Ok(ViolationSeverity::Medium),
            "high" => Ok(ViolationSeverity::High),
            "critical" => Ok(ViolationSeverity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    RequestTooLarge,
    ContentTooLarge,
    ParameterTooLong,
    SqlInjectionSuspected,
    XssSuspected,
    MissingRequiredHeader,
    RateLimitExceeded,
}

impl ViolationKind {
    /// Fixed severity tiering per violation kind. Injection findings are
    /// Critical, size breaches High, throttling and long parameters Medium,
    /// missing request-side security headers Low.
    pub fn severity(&self) -> ViolationSeverity {
        match self {
            ViolationKind::RequestTooLarge | ViolationKind::ContentTooLarge => {
                ViolationSeverity::High
            }
            ViolationKind::ParameterTooLong | ViolationKind::RateLimitExceeded => {
                ViolationSeverity::Medium
            }
            ViolationKind::SqlInjectionSuspected | ViolationKind::XssSuspected => {
                ViolationSeverity::Critical
            }
            ViolationKind::MissingRequiredHeader => ViolationSeverity::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityViolation {
    pub kind: ViolationKind,
    pub severity: ViolationSeverity,
    pub detail: String,
}

impl SecurityViolation {
    pub fn new(kind: ViolationKind, detail: String) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            detail,
        }
    }
}

// =====================================================================================
// REQUEST / RESULT MODELS
// =====================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRequest {
    pub endpoint: String,
    pub client_id: String,
    pub content_length: usize,
    pub content: String,
    pub headers: HashMap<String, String>,
    pub parameters: HashMap<String, String>,
}

impl SecurityRequest {
    pub fn new(endpoint: String, client_id: String) -> Self {
        Self {
            endpoint,
            client_id,
            content_length: 0,
            content: String::new(),
            headers: HashMap::new(),
            parameters: HashMap::new(),
        }
    }

    /// Sets the body and the declared length to the actual byte length.
    /// Use `with_content_length` afterwards when the declared size differs.
    pub fn with_content(mut self, content: String) -> Self {
        self.content_length = content.len();
        self.content = content;
        self
    }

    pub fn with_content_length(mut self, declared: usize) -> Self {
        self.content_length = declared;
        self
    }

    /// Header names are case-insensitive; they are normalized to lowercase
    /// on insert so duplicates collapse to one entry, last write wins.
    pub fn with_header(mut self, name: String, value: String) -> Self {
        self.headers.insert(name.to_lowercase(), value);
        self
    }

    pub fn with_parameter(mut self, name: String, value: String) -> Self {
        self.parameters.insert(name, value);
        self
    }

    /// Case-insensitive lookup. Keys are scanned rather than probed so a
    /// request deserialized with unnormalized header names still matches.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityValidationResult {
    pub is_valid: bool,
    pub violations: Vec<SecurityViolation>,
    pub security_headers: HashMap<String, String>,
}

impl SecurityValidationResult {
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    pub fn max_severity(&self) -> Option<ViolationSeverity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}

// =====================================================================================
// AUDIT MODELS
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOutcome {
    Allowed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub client_id: String,
    pub endpoint: String,
    pub severity: ViolationSeverity,
    pub outcome: RequestOutcome,
    pub violations: Vec<SecurityViolation>,
    pub context: HashMap<String, serde_json::Value>,
}

impl AuditEvent {
    pub fn new(client_id: String, endpoint: String, outcome: RequestOutcome) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            client_id,
            endpoint,
            severity: ViolationSeverity::Low,
            outcome,
            violations: Vec::new(),
            context: HashMap::new(),
        }
    }

    /// Attaches the violations and lifts the event severity to the highest
    /// violation severity present (Low for a clean request).
    pub fn with_violations(mut self, violations: Vec<SecurityViolation>) -> Self {
        self.severity = violations
            .iter()
            .map(|v| v.severity)
            .max()
            .unwrap_or(ViolationSeverity::Low);
        self.violations = violations;
        self
    }

    pub fn with_severity(mut self, severity: ViolationSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn add_context<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(serialized) = serde_json::to_value(value) {
            self.context.insert(key.to_string(), serialized);
        }
        self
    }
}
