use deploy_defs::{DeployError, SecretToken};
use deploy_utils::RegistryConfig;
use log::{error, info};
use std::sync::Arc;

use crate::cmd::{CommandRunner, CommandSpec};

/// Logs the local docker daemon in to the container registry.
pub struct RegistryAuthenticator {
    runner: Arc<dyn CommandRunner>,
    registry: RegistryConfig,
}

impl RegistryAuthenticator {
    pub fn new(runner: Arc<dyn CommandRunner>, registry: RegistryConfig) -> Self {
        RegistryAuthenticator { runner, registry }
    }

    pub fn login_command(&self, access_token: &SecretToken) -> CommandSpec {
        CommandSpec::new("docker")
            .args([
                "login",
                self.registry.host.as_str(),
                "-u",
                self.registry.username.as_str(),
                "--password-stdin",
            ])
            .stdin(access_token)
    }

    /// Single attempt, safe to repeat before every deployment.
    pub async fn login(&self, access_token: &SecretToken) -> Result<(), DeployError> {
        let output = self
            .runner
            .run(&self.login_command(access_token))
            .await
            .map_err(|e| DeployError::RegistryAuthFailed {
                cause: e.to_string(),
            })?;

        if !output.success() {
            error!(
                "Failed to login to {} (exit code {:?}): {}",
                self.registry.host,
                output.exit_code,
                output.combined_output.trim_end()
            );
            return Err(DeployError::RegistryAuthFailed {
                cause: output.combined_output.trim_end().to_string(),
            });
        }

        info!("Logged in to {} successfully.", self.registry.host);
        Ok(())
    }
}
