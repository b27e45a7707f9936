pub mod audit;
pub mod detection;
pub mod middleware;
pub mod rate_limit;
pub mod validation;

pub use audit::{AuditService, AuditSink, AuditStats, TracingAuditSink};
pub use detection::DetectionRuleSet;
pub use middleware::SecurityMiddleware;
pub use rate_limit::RateLimiterService;
pub use validation::ValidationService;
