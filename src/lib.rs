// Docpress document generation library

pub mod clock;
pub mod coalescing;
pub mod config;
pub mod constants;
pub mod error;
pub mod fingerprint;
pub mod jobs;
pub mod logging;
pub mod metrics; // Prometheus metrics
pub mod orchestrator;
pub mod renderer;
pub mod store;
