//! HTTP-backed tasks declared in configuration

use crate::config::HttpIntegrationConfig;
use crate::domain::task::{Capability, TaskOutcome, WalletContext};
use crate::error::{CapabilityError, ConfigError, ConfigResult};
use crate::infrastructure::backoff::{retry_with_backoff, BackoffPolicy};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

/// One request per attempt through the wallet's proxied session.
///
/// A transport error or 5xx is retried with backoff; any other unexpected
/// status is reported as a recoverable outcome for the task-level retry.
#[derive(Debug, Clone)]
pub struct HttpCapability {
    name: String,
    method: Method,
    url: String,
    body: Option<Value>,
    expect_status: Option<StatusCode>,
    backoff: BackoffPolicy,
}

impl HttpCapability {
    pub fn from_config(name: &str, config: &HttpIntegrationConfig, backoff: BackoffPolicy) -> ConfigResult<Self> {
        let method = Method::from_bytes(config.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ConfigError::Invalid(format!("integrations.{} has invalid method '{}'", name, config.method)))?;
        let expect_status = config
            .expect_status
            .map(StatusCode::from_u16)
            .transpose()
            .map_err(|e| ConfigError::Invalid(format!("integrations.{}.expect_status: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            method,
            url: config.url.clone(),
            body: config.body.clone(),
            expect_status,
            backoff,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, ctx: &WalletContext) -> Result<StatusCode, CapabilityError> {
        if ctx.http.is_closed() {
            return Err(CapabilityError::Other("HTTP session already closed".into()));
        }
        let mut request = ctx.http.client().request(self.method.clone(), &self.url);
        if let Some(body) = &self.body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(CapabilityError::UnexpectedResponse(format!("{} returned {}", self.url, status)));
        }
        Ok(status)
    }

    fn accepts(&self, status: StatusCode) -> bool {
        match self.expect_status {
            Some(expected) => status == expected,
            None => status.is_success(),
        }
    }
}

#[async_trait]
impl Capability for HttpCapability {
    async fn execute(&self, ctx: &WalletContext) -> Result<TaskOutcome, CapabilityError> {
        let status = retry_with_backoff(&self.name, self.backoff, || self.send(ctx)).await?;
        if self.accepts(status) {
            tracing::info!(account = ctx.account_index, task = %self.name, status = status.as_u16(), "Request accepted");
            Ok(TaskOutcome::Success)
        } else {
            Ok(TaskOutcome::recoverable(format!("{} returned {}", self.url, status)))
        }
    }
}
