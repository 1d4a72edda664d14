// src/lib.rs
pub mod check;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;

pub use check::{timeout, Check, CheckError, CheckResult};
pub use health::{Aggregation, CheckClass, Registry};
pub use server::HealthService;
