pub mod attendance;
pub mod health;
pub mod kiosk;
pub mod metrics;
pub mod portal;
pub mod timeclock;
