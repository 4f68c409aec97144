use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use deploy_defs::{ConfigError, Credentials, SecretToken};
use log::info;

pub const DEFAULT_PORT: u16 = 9090;
const DEFAULT_SOURCE_BASE_URL: &str = "https://raw.githubusercontent.com";
const DEFAULT_SOURCE_OWNER: &str = "nielshoek";
const DEFAULT_SOURCE_BRANCH: &str = "main";
const DEFAULT_REGISTRY_HOST: &str = "ghcr.io";
const DEFAULT_REGISTRY_USERNAME: &str = "nielshoek";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;

/// Where deployment files are fetched from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    pub base_url: String,
    pub owner: String,
    pub branch: String,
}

impl SourceConfig {
    /// `<base>/<owner>/<application>/<branch>/<file>`
    pub fn file_url(&self, application_name: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.owner,
            application_name,
            self.branch,
            file_name
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    pub host: String,
    pub username: String,
}

/// Process-wide settings, read once at startup.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub port: u16,
    pub credentials: Credentials,
    pub source: SourceConfig,
    pub registry: RegistryConfig,
    pub work_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub command_timeout: Duration,
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.is_empty())
            .collect();

        let deploy_token = required(&vars, "DEPLOY_TOKEN")?;
        let access_token = required(&vars, "GITHUB_TOKEN")?;

        let port = match vars.get("PORT") {
            Some(value) => match value.parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => return Err(invalid("PORT", value)),
            },
            None => {
                info!(
                    "PORT environment variable not set. Using default port {}.",
                    DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        };

        Ok(WebhookConfig {
            port,
            credentials: Credentials {
                deploy_token: SecretToken::new(deploy_token),
                access_token: SecretToken::new(access_token),
            },
            source: SourceConfig {
                base_url: optional(&vars, "SOURCE_BASE_URL", DEFAULT_SOURCE_BASE_URL),
                owner: optional(&vars, "SOURCE_OWNER", DEFAULT_SOURCE_OWNER),
                branch: optional(&vars, "SOURCE_BRANCH", DEFAULT_SOURCE_BRANCH),
            },
            registry: RegistryConfig {
                host: optional(&vars, "REGISTRY_HOST", DEFAULT_REGISTRY_HOST),
                username: optional(&vars, "REGISTRY_USERNAME", DEFAULT_REGISTRY_USERNAME),
            },
            work_dir: PathBuf::from(optional(&vars, "WORK_DIR", ".")),
            fetch_timeout: seconds(&vars, "FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?,
            command_timeout: seconds(&vars, "COMMAND_TIMEOUT_SECS", DEFAULT_COMMAND_TIMEOUT_SECS)?,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::Missing(name.to_string()))
}

fn optional(vars: &HashMap<String, String>, name: &str, default: &str) -> String {
    vars.get(name)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(value) => match value.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(invalid(name, value)),
        },
        None => Ok(Duration::from_secs(default)),
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
    }
}
