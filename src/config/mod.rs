pub mod loader;
pub mod schema;

pub use loader::{ConfigLoader, EnvOverrides};
pub use schema::{ApiConfig, AuthConfig, ConsoleConfig, PollerConfig};
