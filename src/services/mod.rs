pub mod absences;
pub mod actor_gateway;
pub mod attendance;
pub mod children;
pub mod employees;
pub mod metrics;
pub mod notifications;
pub mod reports;
pub mod timeclock;
