use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Primary deployment definition fetched for every application.
pub const MANIFEST_FILE: &str = "docker-compose.yml";

/// Decoded body of `POST /deploy`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub application_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub environment_vars: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub extra_files_to_download: Vec<String>,
}

impl DeployRequest {
    pub fn new(application_name: &str) -> Self {
        DeployRequest {
            application_name: application_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.environment_vars
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_extra_file(mut self, file_name: &str) -> Self {
        self.extra_files_to_download.push(file_name.to_string());
        self
    }
}

// An explicit `null` is treated like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
