pub mod config;
pub mod error;
pub mod relay;
pub mod routes;
pub mod telemetry;
