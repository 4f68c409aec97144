use async_trait::async_trait;
use deploy_defs::{FetchError, SecretToken};
use deploy_utils::SourceConfig;
use log::{error, info};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

const USER_AGENT: &str = "compose-deployer/fetch";

/// Retrieves named files of an application from the artifact host.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Downloads `file_name` and returns the local path it was written to.
    async fn fetch(
        &self,
        application_name: &str,
        file_name: &str,
        access_token: &SecretToken,
    ) -> Result<PathBuf, FetchError>;
}

/// Fetches raw files over HTTPS and stores them under `output_dir`, keeping
/// their original names. Existing files are overwritten.
pub struct HttpArtifactFetcher {
    client: Client,
    source: SourceConfig,
    output_dir: PathBuf,
}

impl HttpArtifactFetcher {
    pub fn new(
        source: SourceConfig,
        output_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(HttpArtifactFetcher {
            client,
            source,
            output_dir: output_dir.into(),
        })
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(
        &self,
        application_name: &str,
        file_name: &str,
        access_token: &SecretToken,
    ) -> Result<PathBuf, FetchError> {
        if !is_plain_file_name(file_name) {
            return Err(FetchError::InvalidFileName {
                file: file_name.to_string(),
            });
        }

        let url = self.source.file_url(application_name, file_name);
        let transport_error = |e: reqwest::Error| FetchError::Transport {
            file: file_name.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", access_token.expose()))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            error!(
                "Failed to download {}: HTTP status code {}",
                file_name,
                status.as_u16()
            );
            return Err(FetchError::Status {
                file: file_name.to_string(),
                status: status.as_u16(),
            });
        }

        let content = response.bytes().await.map_err(transport_error)?;
        let output_path = self.output_path(file_name);
        tokio::fs::write(&output_path, &content)
            .await
            .map_err(|e| FetchError::Io {
                file: file_name.to_string(),
                message: e.to_string(),
            })?;

        info!("Downloaded {} successfully.", file_name);
        Ok(output_path)
    }
}

// Only bare names are accepted so a download can never land outside the
// output directory.
fn is_plain_file_name(file_name: &str) -> bool {
    let mut components = Path::new(file_name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    ) && !file_name.contains(['/', '\\'])
}
