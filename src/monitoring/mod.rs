//! Monitoring
//!
//! Health reporting for the engine and the binary's probe endpoints.

pub mod health;

pub use health::{HealthCheck, HealthCheckResult, HealthResponse, HealthStatus};
