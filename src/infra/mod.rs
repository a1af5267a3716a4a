//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod memory;
pub mod render_sink;
pub mod telemetry;
