//! `http` action
//!
//! Params: `url` (required), `method` (default `GET`), `body`.
//! Result data: `status-code`, `headers` (lower-case names), `body`,
//! `raw-body`.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method};
use tokio_util::sync::CancellationToken;

use super::{required, Action, ActionResult};
use crate::common::config::HttpConfig;
use crate::common::{Error, Result};
use crate::script::Value;

const NAME: &str = "http";

pub struct Http {
    client: Client,
}

impl Http {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn request(&self, params: &HashMap<String, String>) -> Result<ActionResult> {
        let url = required(NAME, params, "url")?;
        let method = params
            .get("method")
            .filter(|m| !m.is_empty())
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| "GET".to_string());
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::action_failed(NAME, format!("invalid method: {}", method)))?;

        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = params.get("body") {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::action_failed(NAME, e.to_string()))?;

        let status = response.status().as_u16();
        tracing::debug!("{} {} -> {}", method, url, status);

        let mut headers: BTreeMap<String, Value> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing| {
                    if let Value::String(s) = existing {
                        s.push_str(", ");
                        s.push_str(&value);
                    }
                })
                .or_insert_with(|| Value::String(value.clone()));
        }

        let mut raw = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::action_failed(NAME, e.to_string()))?;
            raw.extend_from_slice(&chunk);
        }

        Ok(ActionResult::default()
            .with("status-code", i64::from(status))
            .with("headers", Value::Map(headers))
            .with("body", String::from_utf8_lossy(&raw).into_owned())
            .with("raw-body", Value::Bytes(raw)))
    }
}

#[async_trait]
impl Action for Http {
    async fn run(
        &self,
        params: &HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<ActionResult> {
        tokio::select! {
            result = self.request(params) => result,
            _ = cancel.cancelled() => Err(Error::action_failed(NAME, "cancelled")),
        }
    }
}
