//! API request handlers.

/// Follow-up questions about finished reports.
pub mod faq;
/// Liveness probe.
pub mod health;
/// Starting and advancing research runs.
pub mod research;
