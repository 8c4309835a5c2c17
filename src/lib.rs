pub mod analysis;
pub mod audio;
pub mod config;
pub mod detector;
mod error;
mod lock;
pub mod monitor;
pub mod sink;
mod telemetry;

pub use error::{DetectorError, SinkError};
pub use telemetry::init_tracing;
