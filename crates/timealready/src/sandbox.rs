//! REST sandbox validator.
//!
//! One sandbox per validation:
//!
//! ```text
//! POST   {base}/sandboxes                 -> { "id": "..." }
//! POST   {base}/sandboxes/{id}/files      { "path", "content" }
//! POST   {base}/sandboxes/{id}/execute    { "language", "code" } -> { "stdout", "stderr", "error" }
//! DELETE {base}/sandboxes/{id}
//! ```
//!
//! The sandbox is always deleted, whatever happened in between. That
//! includes a caller dropping the validation mid-flight (an outer timeout):
//! the [`SandboxLease`] then issues the DELETE from its `Drop`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use coordination::escalation::{
    FixValidator, ValidationError, ValidationOutcome, ValidationRequest,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SandboxEndpoint;
use crate::probe::probe_for;

pub const SANDBOX_TEMPLATE: &str = "code-interpreter";

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sandbox returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("sandbox API key is not configured")]
    MissingKey,
}

impl From<SandboxError> for ValidationError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Http(inner) => ValidationError::Transport(inner.to_string()),
            SandboxError::Status { .. } => ValidationError::Protocol(e.to_string()),
            SandboxError::MissingKey => ValidationError::NotConfigured(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateSandbox<'a> {
    template: &'a str,
}

#[derive(Debug, Deserialize)]
struct SandboxHandle {
    id: String,
}

#[derive(Debug, Serialize)]
struct WriteFile<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Execute<'a> {
    language: &'a str,
    code: &'a str,
}

/// Result of running a probe inside the sandbox.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Execution {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// [`FixValidator`] backed by a REST code sandbox.
pub struct HttpSandboxValidator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSandboxValidator {
    pub fn new(endpoint: &SandboxEndpoint, request_timeout: Duration) -> Result<Self, SandboxError> {
        let api_key = endpoint.api_key.clone().ok_or(SandboxError::MissingKey)?;
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn create(&self) -> Result<String, SandboxError> {
        let resp = self
            .client
            .post(format!("{}/sandboxes", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&CreateSandbox {
                template: SANDBOX_TEMPLATE,
            })
            .send()
            .await?;
        let handle: SandboxHandle = check(resp).await?.json().await?;
        debug!(sandbox = %handle.id, "Sandbox created");
        Ok(handle.id)
    }

    async fn write_file(&self, id: &str, path: &str, content: &str) -> Result<(), SandboxError> {
        let resp = self
            .client
            .post(format!("{}/sandboxes/{id}/files", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&WriteFile { path, content })
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn execute(&self, id: &str, language: &str, code: &str) -> Result<Execution, SandboxError> {
        let resp = self
            .client
            .post(format!("{}/sandboxes/{id}/execute", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&Execute { language, code })
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    fn lease(&self, id: String) -> SandboxLease {
        SandboxLease {
            client: self.client.clone(),
            url: format!("{}/sandboxes/{id}", self.base_url),
            api_key: self.api_key.clone(),
            id: Some(id),
        }
    }

    async fn destroy(&self, id: &str) -> Result<(), SandboxError> {
        let resp = self
            .client
            .delete(format!("{}/sandboxes/{id}", self.base_url))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Upload dependencies, write the candidate, run the probe.
    async fn run(&self, id: &str, request: &ValidationRequest) -> Result<Execution, SandboxError> {
        for dep in &request.dependencies {
            if let Err(e) = self.write_file(id, &dep.path, &dep.content).await {
                warn!(path = %dep.path, error = %e, "Could not upload related file");
            }
        }
        self.write_file(id, &request.target_path, &request.candidate)
            .await?;

        let probe = probe_for(request);
        self.execute(id, probe.language.as_str(), &probe.code).await
    }
}

/// Owns a live sandbox until it is released.
///
/// Dropped while still armed, it spawns the DELETE on the current runtime.
struct SandboxLease {
    client: reqwest::Client,
    url: String,
    api_key: String,
    id: Option<String>,
}

impl SandboxLease {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    fn release(mut self) {
        self.id = None;
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(sandbox = %id, "No runtime left to delete abandoned sandbox");
            return;
        };
        let request = self
            .client
            .delete(&self.url)
            .header("X-API-Key", &self.api_key);
        runtime.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => info!(sandbox = %id, "Abandoned sandbox deleted"),
                Err(e) => warn!(sandbox = %id, error = %e, "Failed to delete abandoned sandbox"),
            }
        });
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SandboxError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SandboxError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl FixValidator for HttpSandboxValidator {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationOutcome, ValidationError> {
        let started = Instant::now();
        let lease = self.lease(self.create().await?);
        let result = self.run(lease.id(), request).await;
        if let Err(e) = self.destroy(lease.id()).await {
            warn!(sandbox = %lease.id(), error = %e, "Failed to delete sandbox");
        }
        lease.release();

        let execution = result?;
        let elapsed = started.elapsed();
        match execution.error {
            Some(error) => {
                info!(target_path = %request.target_path, "Candidate failed in sandbox");
                let mut outcome = ValidationOutcome::failed(error, elapsed);
                outcome.output = [execution.stdout, execution.stderr]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(outcome)
            }
            None => {
                info!(target_path = %request.target_path, "Candidate passed in sandbox");
                Ok(ValidationOutcome::passed(execution.stdout, elapsed))
            }
        }
    }
}
