//! KDL configuration parsing for RGAP.
//!
//! The server reads a single `rgap.kdl` file describing the listen address,
//! database, session and search settings. Environment variables override a
//! few deployment-specific values.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    AuthConfig, DatabaseConfig, LogConfig, LogFormat, MAX_SESSION_TTL_DAYS, ServerConfig,
    SystemConfig, load_system_config, parse_system_config,
};
