mod client;
mod error_handler;
mod request_metrics;
mod rate_limit;
mod security_headers;
mod threat_scan;

pub use client::ClientKey;
pub use error_handler::{GENERIC_ERROR, log_errors, panic_response};
pub use request_metrics::track_metrics;
pub use rate_limit::{LimitDecision, RateLimiter, rate_limit};
pub use security_headers::{cors_layer, security_headers, with_security_headers};
pub use threat_scan::{SUSPICIOUS_PATTERNS, ScanOutcome, ThreatScanner, scan_request};
