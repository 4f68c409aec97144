mod config;
mod logging;

pub use config::{RegistryConfig, SourceConfig, WebhookConfig, DEFAULT_PORT};
pub use logging::setup_logging;
