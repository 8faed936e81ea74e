//! Side-effecting operations: config files, processes, reports, notifications.

pub mod config;
pub mod notify;
pub mod preflight;
pub mod process;
pub mod report;
pub mod tools;
