mod errors;
mod outcome;
mod request;
mod secret;

pub use errors::{ConfigError, DeployError, FetchError, GatewayError};
pub use outcome::{DeploymentOutcome, Stage};
pub use request::{DeployRequest, MANIFEST_FILE};
pub use secret::{Credentials, SecretToken};
