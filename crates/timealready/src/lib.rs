//! timealready: concrete collaborators for the healing orchestrator
//!
//! - [`config`]: layered settings (defaults, TOML, environment)
//! - [`generator`]: two-tier model generation over OpenAI-compatible APIs
//! - [`sandbox`] / [`probe`]: remote validation of candidates
//! - [`report`] / [`telemetry`]: console output and the session log

pub mod config;
pub mod generator;
pub mod probe;
pub mod report;
pub mod sandbox;
pub mod telemetry;

pub use config::{ConfigError, HealerConfig};
pub use generator::RigFixGenerator;
pub use sandbox::HttpSandboxValidator;
