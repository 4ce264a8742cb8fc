pub mod annotations;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod owner;
pub mod status;
pub mod telemetry;
