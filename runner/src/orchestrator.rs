use async_trait::async_trait;
use deploy_defs::{
    Credentials, DeployError, DeployRequest, DeploymentOutcome, Stage, MANIFEST_FILE,
};
use deploy_utils::{RegistryConfig, WebhookConfig};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cmd::{CommandRunner, ProcessRunner};
use crate::compose::ComposeExecutor;
use crate::fetch::{ArtifactFetcher, HttpArtifactFetcher};
use crate::registry::RegistryAuthenticator;

/// Runs one deployment request to completion.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, request: &DeployRequest) -> DeploymentOutcome;
}

/// Sequences fetch, registry login, redeploy and prune for a request.
///
/// Requests are not serialized against each other: two concurrent
/// deployments share the working directory and the docker daemon.
pub struct DeploymentOrchestrator {
    fetcher: Arc<dyn ArtifactFetcher>,
    registry: RegistryAuthenticator,
    compose: ComposeExecutor,
    credentials: Credentials,
}

impl DeploymentOrchestrator {
    pub fn new(
        fetcher: Arc<dyn ArtifactFetcher>,
        runner: Arc<dyn CommandRunner>,
        credentials: Credentials,
        registry: RegistryConfig,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        DeploymentOrchestrator {
            fetcher,
            registry: RegistryAuthenticator::new(runner.clone(), registry),
            compose: ComposeExecutor::new(runner, work_dir),
            credentials,
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self, anyhow::Error> {
        let fetcher = HttpArtifactFetcher::new(
            config.source.clone(),
            config.work_dir.clone(),
            config.fetch_timeout,
        )?;
        let runner = ProcessRunner::new(config.command_timeout);

        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(runner),
            config.credentials.clone(),
            config.registry.clone(),
            config.work_dir.clone(),
        ))
    }

    /// Performs the work of `stage` and returns the stage that follows it.
    async fn advance(
        &self,
        stage: Stage,
        request: &DeployRequest,
    ) -> Result<Stage, DeployError> {
        match stage {
            Stage::Start => Ok(Stage::FetchingManifest),
            Stage::FetchingManifest => {
                self.fetch(&request.application_name, MANIFEST_FILE).await?;
                Ok(Stage::FetchingExtras)
            }
            Stage::FetchingExtras => {
                for file_name in &request.extra_files_to_download {
                    self.fetch(&request.application_name, file_name).await?;
                }
                Ok(Stage::AuthenticatingRegistry)
            }
            Stage::AuthenticatingRegistry => {
                self.registry.login(&self.credentials.access_token).await?;
                Ok(Stage::Redeploying)
            }
            Stage::Redeploying => {
                self.compose.redeploy(&request.environment_vars).await?;
                Ok(Stage::Pruning)
            }
            Stage::Pruning => {
                if let Err(e) = self.compose.prune_dangling_images().await {
                    warn!("{}", e);
                }
                Ok(Stage::Done)
            }
            Stage::Done | Stage::Failed => Ok(stage),
        }
    }

    async fn fetch(&self, application_name: &str, file_name: &str) -> Result<(), DeployError> {
        self.fetcher
            .fetch(application_name, file_name, &self.credentials.access_token)
            .await
            .map(|_| ())
            .map_err(|cause| DeployError::FetchFailed {
                file: file_name.to_string(),
                cause,
            })
    }
}

#[async_trait]
impl Deployer for DeploymentOrchestrator {
    async fn deploy(&self, request: &DeployRequest) -> DeploymentOutcome {
        let application_name = request.application_name.clone();
        let mut stage = Stage::Start;

        while !stage.is_terminal() {
            match self.advance(stage, request).await {
                Ok(next) => {
                    debug!("{}: {} -> {}", application_name, stage, next);
                    stage = next;
                }
                Err(error) => {
                    error!(
                        "Deployment of '{}' failed while {}: {}",
                        application_name, stage, error
                    );
                    return DeploymentOutcome::Failed {
                        application_name,
                        stage,
                        error,
                    };
                }
            }
        }

        info!("Application '{}' updated successfully.", application_name);
        DeploymentOutcome::Succeeded { application_name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{CommandOutput, CommandSpec, MockCommandRunner};
    use crate::fetch::MockArtifactFetcher;
    use deploy_defs::{FetchError, SecretToken};
    use mockall::Sequence;
    use pretty_assertions::assert_eq;

    fn credentials() -> Credentials {
        Credentials {
            deploy_token: SecretToken::new("deploy-secret"),
            access_token: SecretToken::new("ghp_access"),
        }
    }

    fn registry() -> RegistryConfig {
        RegistryConfig {
            host: "ghcr.io".to_string(),
            username: "deployer".to_string(),
        }
    }

    fn orchestrator(
        fetcher: MockArtifactFetcher,
        runner: MockCommandRunner,
    ) -> DeploymentOrchestrator {
        DeploymentOrchestrator::new(
            Arc::new(fetcher),
            Arc::new(runner),
            credentials(),
            registry(),
            ".",
        )
    }

    fn exit(code: i32) -> CommandOutput {
        CommandOutput {
            exit_code: Some(code),
            combined_output: String::new(),
        }
    }

    fn is_login(spec: &CommandSpec) -> bool {
        spec.args.first().map(String::as_str) == Some("login")
    }

    fn is_pull(spec: &CommandSpec) -> bool {
        spec.args == ["compose", "pull"]
    }

    fn is_up(spec: &CommandSpec) -> bool {
        spec.args == ["compose", "up", "-d", "--remove-orphans"]
    }

    fn is_prune(spec: &CommandSpec) -> bool {
        spec.args == ["image", "prune", "-f"]
    }

    fn expect_fetch_ok(
        fetcher: &mut MockArtifactFetcher,
        seq: &mut Sequence,
        file: &'static str,
    ) {
        fetcher
            .expect_fetch()
            .withf(move |app, name, token| {
                app == "blog" && name == file && token.expose() == "ghp_access"
            })
            .times(1)
            .in_sequence(seq)
            .returning(|_, name, _| Ok(PathBuf::from(name)));
    }

    fn expect_command(
        runner: &mut MockCommandRunner,
        seq: &mut Sequence,
        matcher: fn(&CommandSpec) -> bool,
        code: i32,
    ) {
        runner
            .expect_run()
            .withf(move |spec| matcher(spec))
            .times(1)
            .in_sequence(seq)
            .returning(move |_| Ok(exit(code)));
    }

    #[tokio::test]
    async fn test_successful_deployment_runs_every_stage_in_order() {
        let mut fetcher = MockArtifactFetcher::new();
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();

        expect_fetch_ok(&mut fetcher, &mut seq, "docker-compose.yml");
        expect_fetch_ok(&mut fetcher, &mut seq, "nginx.conf");
        expect_command(&mut runner, &mut seq, is_login, 0);
        runner
            .expect_run()
            .withf(|spec| is_pull(spec) && spec.envs.get("TAG").map(String::as_str) == Some("v2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(exit(0)));
        runner
            .expect_run()
            .withf(|spec| is_up(spec) && spec.envs.get("TAG").map(String::as_str) == Some("v2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(exit(0)));
        expect_command(&mut runner, &mut seq, is_prune, 0);

        let request = DeployRequest::new("blog")
            .with_env("TAG", "v2")
            .with_extra_file("nginx.conf");
        let outcome = orchestrator(fetcher, runner).deploy(&request).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.application_name(), "blog");
        assert_eq!(outcome.terminal_stage(), Stage::Done);
    }

    #[tokio::test]
    async fn test_manifest_failure_stops_pipeline() {
        let mut fetcher = MockArtifactFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_, name, _| {
            Err(FetchError::Status {
                file: name.to_string(),
                status: 404,
            })
        });
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();

        let request = DeployRequest::new("blog").with_extra_file("nginx.conf");
        let outcome = orchestrator(fetcher, runner).deploy(&request).await;

        assert_eq!(outcome.terminal_stage(), Stage::Failed);
        assert_eq!(outcome.failed_stage(), Some(Stage::FetchingManifest));
        match outcome.error() {
            Some(DeployError::FetchFailed { file, cause }) => {
                assert_eq!(file, "docker-compose.yml");
                assert_eq!(
                    cause,
                    &FetchError::Status {
                        file: "docker-compose.yml".to_string(),
                        status: 404
                    }
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_extra_file_failure_skips_remaining_files() {
        let mut fetcher = MockArtifactFetcher::new();
        let mut seq = Sequence::new();
        expect_fetch_ok(&mut fetcher, &mut seq, "docker-compose.yml");
        fetcher
            .expect_fetch()
            .withf(|_, name, _| name == "a.env")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, name, _| {
                Err(FetchError::Transport {
                    file: name.to_string(),
                    message: "connection reset".to_string(),
                })
            });
        fetcher
            .expect_fetch()
            .withf(|_, name, _| name == "b.env")
            .never();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();

        let request = DeployRequest::new("blog")
            .with_extra_file("a.env")
            .with_extra_file("b.env");
        let outcome = orchestrator(fetcher, runner).deploy(&request).await;

        assert_eq!(outcome.failed_stage(), Some(Stage::FetchingExtras));
        assert!(matches!(
            outcome.error(),
            Some(DeployError::FetchFailed { file, .. }) if file == "a.env"
        ));
    }

    #[tokio::test]
    async fn test_registry_failure_skips_redeploy() {
        let mut fetcher = MockArtifactFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, name, _| Ok(PathBuf::from(name)));
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_command(&mut runner, &mut seq, is_login, 1);

        let outcome = orchestrator(fetcher, runner)
            .deploy(&DeployRequest::new("blog"))
            .await;

        assert_eq!(outcome.failed_stage(), Some(Stage::AuthenticatingRegistry));
        assert!(matches!(
            outcome.error(),
            Some(DeployError::RegistryAuthFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_redeploy_failure_skips_prune() {
        let mut fetcher = MockArtifactFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, name, _| Ok(PathBuf::from(name)));
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_command(&mut runner, &mut seq, is_login, 0);
        expect_command(&mut runner, &mut seq, is_pull, 0);
        runner
            .expect_run()
            .withf(|spec| is_up(spec))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(CommandOutput {
                    exit_code: Some(1),
                    combined_output: "no such service: web\n".to_string(),
                })
            });

        let outcome = orchestrator(fetcher, runner)
            .deploy(&DeployRequest::new("blog"))
            .await;

        assert_eq!(outcome.failed_stage(), Some(Stage::Redeploying));
        match outcome.error() {
            Some(DeployError::RedeployFailed { output }) => {
                assert_eq!(output, "no such service: web\n")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prune_failure_keeps_success() {
        let mut fetcher = MockArtifactFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, name, _| Ok(PathBuf::from(name)));
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_command(&mut runner, &mut seq, is_login, 0);
        expect_command(&mut runner, &mut seq, is_pull, 0);
        expect_command(&mut runner, &mut seq, is_up, 0);
        expect_command(&mut runner, &mut seq, is_prune, 1);

        let outcome = orchestrator(fetcher, runner)
            .deploy(&DeployRequest::new("blog"))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.terminal_stage(), Stage::Done);
    }
}
