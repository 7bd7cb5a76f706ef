//! Script persistence API.
//!
//! [`ScriptApi`] is the seam between the autosave engine and the REST
//! backend. [`HttpScriptApi`] talks to the real server; tests substitute
//! in-memory implementations.

use async_trait::async_trait;
use reqwest::StatusCode;
use shared_types::{
    CreateScriptRequest, ScriptId, ScriptRecord, UpdateScriptRequest, UpdateScriptResponse,
};

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ScriptApiError {
    #[error("transport error: {0}")]
    Transport(String),

    /// The script no longer exists; the UI should prompt for re-selection.
    #[error("script not found: {0}")]
    NotFound(ScriptId),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ScriptApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScriptApiError::NotFound(_))
    }
}

#[async_trait]
pub trait ScriptApi: Send + Sync {
    async fn get_script(&self, id: &ScriptId) -> Result<ScriptRecord, ScriptApiError>;

    /// Persist new content. `Ok(None)` means the server answered with no
    /// record, which callers treat as a failed save.
    async fn update_script(
        &self,
        id: &ScriptId,
        request: &UpdateScriptRequest,
    ) -> Result<Option<UpdateScriptResponse>, ScriptApiError>;

    async fn create_script(
        &self,
        request: &CreateScriptRequest,
    ) -> Result<ScriptRecord, ScriptApiError>;
}

/// reqwest-backed client for the script REST API.
#[derive(Debug, Clone)]
pub struct HttpScriptApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpScriptApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ScriptApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ScriptApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn scripts_url(&self) -> String {
        format!("{}/api/scripts", self.base_url)
    }

    fn script_url(&self, id: &ScriptId) -> String {
        format!("{}/api/scripts/{}", self.base_url, id)
    }
}

async fn describe_http_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.trim().is_empty() {
        return format!("HTTP error: {status}");
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(message) = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
        {
            return message.to_string();
        }
        if let Some(error) = json.get("error").and_then(|v| v.as_str()) {
            return error.to_string();
        }
        if let Some(message) = json.get("message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }

    body
}

/// Map a non-success response onto the error taxonomy.
async fn error_for_status(id: Option<&ScriptId>, response: reqwest::Response) -> ScriptApiError {
    let status = response.status();
    let message = describe_http_error(response).await;
    match status {
        StatusCode::NOT_FOUND => match id {
            Some(id) => ScriptApiError::NotFound(id.clone()),
            None => ScriptApiError::Http {
                status: status.as_u16(),
                message,
            },
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ScriptApiError::Validation(message)
        }
        StatusCode::CONFLICT => ScriptApiError::Conflict(message),
        _ => ScriptApiError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

fn transport(e: reqwest::Error) -> ScriptApiError {
    ScriptApiError::Transport(e.to_string())
}

#[async_trait]
impl ScriptApi for HttpScriptApi {
    async fn get_script(&self, id: &ScriptId) -> Result<ScriptRecord, ScriptApiError> {
        let response = self
            .http
            .get(self.script_url(id))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_for_status(Some(id), response).await);
        }

        response
            .json::<ScriptRecord>()
            .await
            .map_err(|e| ScriptApiError::Decode(e.to_string()))
    }

    async fn update_script(
        &self,
        id: &ScriptId,
        request: &UpdateScriptRequest,
    ) -> Result<Option<UpdateScriptResponse>, ScriptApiError> {
        let response = self
            .http
            .put(self.script_url(id))
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(Some(id), response).await);
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.text().await.map_err(transport)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str::<Option<UpdateScriptResponse>>(&body)
            .map_err(|e| ScriptApiError::Decode(e.to_string()))
    }

    async fn create_script(
        &self,
        request: &CreateScriptRequest,
    ) -> Result<ScriptRecord, ScriptApiError> {
        let response = self
            .http
            .post(self.scripts_url())
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_for_status(None, response).await);
        }

        response
            .json::<ScriptRecord>()
            .await
            .map_err(|e| ScriptApiError::Decode(e.to_string()))
    }
}
