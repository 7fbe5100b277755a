pub mod absence;
pub mod attendance;
pub mod auth;
pub mod child;
pub mod employee;
pub mod reports;
pub mod timeclock;
pub mod user;
