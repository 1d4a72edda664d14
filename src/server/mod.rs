pub mod builder;
pub mod handler;
pub mod listener;

pub use builder::ServerBuilder;
pub use handler::{encode_statuses, render, HealthService, JSON_CONTENT_TYPE};
