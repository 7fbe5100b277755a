pub mod auth;
pub mod idempotency;
pub mod rate_limit;
pub mod tenant;
