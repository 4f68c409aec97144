mod cmd;
mod compose;
mod fetch;
mod orchestrator;
mod registry;

pub use cmd::{CommandError, CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use compose::ComposeExecutor;
pub use fetch::{ArtifactFetcher, HttpArtifactFetcher};
pub use orchestrator::{Deployer, DeploymentOrchestrator};
pub use registry::RegistryAuthenticator;
