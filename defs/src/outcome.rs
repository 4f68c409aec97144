use std::fmt;

use crate::errors::DeployError;

/// States of a single deployment run.
///
/// `Start -> FetchingManifest -> FetchingExtras -> AuthenticatingRegistry ->
/// Redeploying -> Pruning -> Done`, with `Failed` reachable from every
/// non-terminal state except `Pruning`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Start,
    FetchingManifest,
    FetchingExtras,
    AuthenticatingRegistry,
    Redeploying,
    Pruning,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::FetchingManifest => "fetching-manifest",
            Stage::FetchingExtras => "fetching-extras",
            Stage::AuthenticatingRegistry => "authenticating-registry",
            Stage::Redeploying => "redeploying",
            Stage::Pruning => "pruning",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal result of one deployment. Exactly one is produced per request.
#[derive(Debug)]
pub enum DeploymentOutcome {
    Succeeded {
        application_name: String,
    },
    Failed {
        application_name: String,
        /// The stage that was running when the failure happened.
        stage: Stage,
        error: DeployError,
    },
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentOutcome::Succeeded { .. })
    }

    pub fn application_name(&self) -> &str {
        match self {
            DeploymentOutcome::Succeeded { application_name }
            | DeploymentOutcome::Failed {
                application_name, ..
            } => application_name,
        }
    }

    pub fn terminal_stage(&self) -> Stage {
        match self {
            DeploymentOutcome::Succeeded { .. } => Stage::Done,
            DeploymentOutcome::Failed { .. } => Stage::Failed,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            DeploymentOutcome::Succeeded { .. } => None,
            DeploymentOutcome::Failed { stage, .. } => Some(*stage),
        }
    }

    pub fn error(&self) -> Option<&DeployError> {
        match self {
            DeploymentOutcome::Succeeded { .. } => None,
            DeploymentOutcome::Failed { error, .. } => Some(error),
        }
    }
}
