use thiserror::Error;

/// Client-caused rejections raised before any deployment work starts.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid token")]
    Unauthorized,

    #[error("No application name provided")]
    MissingApplicationName,
}

/// Failure to retrieve a single file from the artifact host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Failed to download {file}: HTTP status code {status}")]
    Status { file: String, status: u16 },

    #[error("Failed to download {file}: {message}")]
    Transport { file: String, message: String },

    #[error("Failed to store {file}: {message}")]
    Io { file: String, message: String },

    #[error("Refusing to download {file}: not a plain file name")]
    InvalidFileName { file: String },
}

impl FetchError {
    pub fn file(&self) -> &str {
        match self {
            FetchError::Status { file, .. }
            | FetchError::Transport { file, .. }
            | FetchError::Io { file, .. }
            | FetchError::InvalidFileName { file } => file,
        }
    }
}

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Failed to download {file}: {cause}")]
    FetchFailed { file: String, cause: FetchError },

    #[error("Failed to login to container registry: {cause}")]
    RegistryAuthFailed { cause: String },

    #[error("Failed to update Docker containers. Output:\n{output}")]
    RedeployFailed { output: String },

    #[error("Failed to remove dangling images: {cause}")]
    PruneFailed { cause: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set.")]
    Missing(String),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: String, value: String },
}
