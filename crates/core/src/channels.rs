//! Well-known notification channel name constants.
//!
//! Alert actions reference a channel by name; the notification router maps
//! each name to a provisioned delivery sink.

/// Email notification delivered via SMTP.
pub const CHANNEL_EMAIL: &str = "email";

/// Webhook notification delivered to an external HTTP endpoint.
pub const CHANNEL_WEBHOOK: &str = "webhook";

/// Notification recorded in memory and written to the log.
pub const CHANNEL_LOG: &str = "log";
