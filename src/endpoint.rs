//! HTTP surface every module image exposes.
//!
//! `POST {serviceUrl}/module/configuration` hands a module its identity and `GET
//! {serviceUrl}/module/metadata` describes it.

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Body of a configuration call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct ConfigurationPayload {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) port: u16,
}

/// What a module reports about itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ModuleMetadata {
    pub(crate) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    /// Any further fields, passed through untouched
    #[serde(flatten)]
    pub(crate) extra: BTreeMap<String, serde_json::Value>,
}

/// Failure of a single configuration call.
#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("module answered with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
}

pub(crate) trait ModuleEndpoint {
    /// Sends the configuration once. Any non-2xx answer is a failure.
    async fn post_configuration(
        &self,
        service_url: &str,
        payload: &ConfigurationPayload,
    ) -> Result<(), AttemptError>;

    async fn get_metadata(&self, service_url: &str) -> Result<ModuleMetadata>;
}

impl<T: ModuleEndpoint> ModuleEndpoint for Arc<T> {
    async fn post_configuration(
        &self,
        service_url: &str,
        payload: &ConfigurationPayload,
    ) -> Result<(), AttemptError> {
        self.as_ref().post_configuration(service_url, payload).await
    }

    async fn get_metadata(&self, service_url: &str) -> Result<ModuleMetadata> {
        self.as_ref().get_metadata(service_url).await
    }
}

fn endpoint_url(service_url: &str, path: &str) -> String {
    format!("{}{}", service_url.trim_end_matches('/'), path)
}

// -------------------------------------------------------------------------------------------------
// reqwest implementation
// -------------------------------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub(crate) struct HttpModuleEndpoint {
    client: Client,
}

impl HttpModuleEndpoint {
    /// Creates a client whose requests give up after `request_timeout`.
    pub(crate) fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl ModuleEndpoint for HttpModuleEndpoint {
    #[instrument(skip(self, payload))]
    async fn post_configuration(
        &self,
        service_url: &str,
        payload: &ConfigurationPayload,
    ) -> Result<(), AttemptError> {
        let url = endpoint_url(service_url, "/module/configuration");
        debug!("Posting configuration {:?} to {}", payload, url);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AttemptError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn get_metadata(&self, service_url: &str) -> Result<ModuleMetadata> {
        let url = endpoint_url(service_url, "/module/metadata");
        self.client
            .get(&url)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to reach {}", url))?
            .error_for_status()
            .wrap_err_with(|| format!("Module rejected metadata request to {}", url))?
            .json::<ModuleMetadata>()
            .await
            .wrap_err_with(|| format!("Failed to parse metadata from {}", url))
    }
}
