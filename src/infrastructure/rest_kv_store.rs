use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::KeyValueStore;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-over-REST store (Upstash / Vercel KV wire protocol).
#[derive(Debug, Clone)]
pub struct RestKeyValueStore {
    client: Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, serde::Deserialize)]
struct RestResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RestKeyValueStore {
    pub fn new(base_url: Url, token: &str) -> Result<Self, InfraError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(InfraError::InvalidConfig(
                "store token must not be empty".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| InfraError::Store(format!("failed to build store client: {error}")))?;
        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    fn get_endpoint(&self, key: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Store("store url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("get");
            segments.push(key);
        }
        Ok(url)
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let detail = serde_json::from_str::<RestResponse>(body)
            .ok()
            .and_then(|parsed| parsed.error)
            .unwrap_or_else(|| body.trim().to_string());
        if detail.is_empty() {
            InfraError::Store(format!("store error: http {}", status.as_u16()))
        } else {
            InfraError::Store(format!("store error: http {}; {detail}", status.as_u16()))
        }
    }
}

/// `["SET", key, value]` with `"EX", ttl` appended when an expiry is given.
pub fn set_command(
    key: &str,
    value: &Value,
    ttl_seconds: Option<u64>,
) -> Result<Value, InfraError> {
    let encoded = serde_json::to_string(value)?;
    let mut command = vec![
        Value::from("SET"),
        Value::from(key),
        Value::from(encoded),
    ];
    if let Some(ttl) = ttl_seconds {
        command.push(Value::from("EX"));
        command.push(Value::from(ttl));
    }
    Ok(Value::Array(command))
}

pub fn decode_get_result(body: &str) -> Result<Option<Value>, InfraError> {
    let parsed: RestResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::Store(format!("invalid store payload: {error}; body={body}"))
    })?;
    if let Some(error) = parsed.error {
        return Err(InfraError::Store(format!("store error: {error}")));
    }
    match parsed.result {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(encoded)) => Ok(Some(serde_json::from_str(&encoded)?)),
        Some(other) => Ok(Some(other)),
    }
}

#[async_trait]
impl KeyValueStore for RestKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, InfraError> {
        let endpoint = self.get_endpoint(key)?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|error| {
                InfraError::Store(format!("network error while reading {key}: {error}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Store(format!("failed reading store response: {error}")))?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        decode_get_result(&body)
    }

    async fn set(
        &self,
        key: &str,
        value: &Value,
        ttl_seconds: Option<u64>,
    ) -> Result<(), InfraError> {
        let command = set_command(key, value, ttl_seconds)?;
        let response = self
            .client
            .post(self.base_url.clone())
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await
            .map_err(|error| {
                InfraError::Store(format!("network error while writing {key}: {error}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Store(format!("failed reading store response: {error}")))?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        let parsed: RestResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Store(format!("invalid store payload: {error}; body={body}"))
        })?;
        if let Some(error) = parsed.error {
            return Err(InfraError::Store(format!("store error: {error}")));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}
