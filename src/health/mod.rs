// src/health/mod.rs
mod aggregator;
mod async_check;
mod registry;

pub use aggregator::{Aggregation, STATUS_OK};
pub use async_check::{AsyncCheck, CheckState};
pub use registry::{CheckClass, Registry};
