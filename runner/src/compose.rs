use deploy_defs::DeployError;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cmd::{CommandRunner, CommandSpec};

/// Drives `docker compose` in the directory holding the fetched manifest.
pub struct ComposeExecutor {
    runner: Arc<dyn CommandRunner>,
    work_dir: PathBuf,
}

impl ComposeExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, work_dir: impl Into<PathBuf>) -> Self {
        ComposeExecutor {
            runner,
            work_dir: work_dir.into(),
        }
    }

    /// Pull, then `up -d --remove-orphans`. Both steps see the request's
    /// environment variables exactly as given, so the manifest can
    /// interpolate them into image tags as well as container settings.
    pub fn redeploy_commands(
        &self,
        environment_vars: &BTreeMap<String, String>,
    ) -> [CommandSpec; 2] {
        let compose = |args: &[&str]| {
            CommandSpec::new("docker")
                .args(["compose"])
                .args(args.iter().copied())
                .envs(environment_vars)
                .current_dir(self.work_dir.clone())
        };
        [
            compose(&["pull"]),
            compose(&["up", "-d", "--remove-orphans"]),
        ]
    }

    pub async fn redeploy(
        &self,
        environment_vars: &BTreeMap<String, String>,
    ) -> Result<(), DeployError> {
        let mut output = String::new();

        for spec in self.redeploy_commands(environment_vars) {
            let result = match self.runner.run(&spec).await {
                Ok(result) => result,
                Err(e) => {
                    output.push_str(&e.to_string());
                    error!("Error updating Docker: {}\nOutput: {}", e, output);
                    return Err(DeployError::RedeployFailed { output });
                }
            };
            output.push_str(&result.combined_output);

            if !result.success() {
                error!(
                    "Error updating Docker: `{}` exited with {:?}\nOutput: {}",
                    spec, result.exit_code, output
                );
                return Err(DeployError::RedeployFailed { output });
            }
        }

        info!("Docker containers updated.");
        Ok(())
    }

    pub fn prune_command(&self) -> CommandSpec {
        CommandSpec::new("docker").args(["image", "prune", "-f"])
    }

    /// Cleanup only; callers decide whether a failure matters.
    pub async fn prune_dangling_images(&self) -> Result<(), DeployError> {
        let output = self
            .runner
            .run(&self.prune_command())
            .await
            .map_err(|e| DeployError::PruneFailed {
                cause: e.to_string(),
            })?;

        if !output.success() {
            warn!(
                "Failed to remove dangling images: {}",
                output.combined_output.trim_end()
            );
            return Err(DeployError::PruneFailed {
                cause: output.combined_output.trim_end().to_string(),
            });
        }

        info!("Removed dangling images.");
        Ok(())
    }
}
