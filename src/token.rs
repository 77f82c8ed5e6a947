//! Client for the application server that creates sessions and issues
//! connection tokens.

use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct TokenClient {
    http: Client,
    base: Url,
}

impl TokenClient {
    pub fn new(base: &str) -> Result<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(TokenClient {
            http: Client::new(),
            base,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Session id and token for joining `custom_session_id`.
    pub async fn get_token(&self, custom_session_id: &str) -> Result<(String, String)> {
        let session_id = self.create_session(custom_session_id).await?;
        let token = self.create_token(&session_id).await?;
        info!("Obtained connection token for session {}", session_id);
        Ok((session_id, token))
    }

    pub async fn create_session(&self, custom_session_id: &str) -> Result<String> {
        let url = self.base.join("api/openvidu")?;
        self.post(url, json!({ "customSessionId": custom_session_id }))
            .await
    }

    pub async fn create_token(&self, session_id: &str) -> Result<String> {
        let mut url = self.base.join("api/openvidu/")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("cannot extend URL {}", self.base)))?
            .pop_if_empty()
            .push(session_id)
            .push("connections");
        self.post(url, json!({})).await
    }

    async fn post(&self, url: Url, body: serde_json::Value) -> Result<String> {
        debug!("POST {}", url);
        let response = self.http.post(url.clone()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let text = response.text().await?;
        Ok(unquote(&text))
    }
}

/// Servers answer either with the bare string or with a JSON string literal.
fn unquote(body: &str) -> String {
    let body = body.trim();
    match serde_json::from_str::<String>(body) {
        Ok(s) => s,
        Err(_) => body.to_string(),
    }
}
