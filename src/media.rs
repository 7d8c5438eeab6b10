//! Media provider client
//!
//! Narrow HTTP interface to the external real-time media service. The
//! core only gates whether a client may join; it never inspects media
//! state, and a media failure never rolls back committed membership
//! state.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Client for the external media session provider
#[derive(Clone)]
pub struct MediaClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    call_id: &'a str,
    creator_id: &'a str,
}

#[derive(Debug, Serialize)]
struct JoinTokenRequest<'a> {
    call_id: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

impl MediaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a media session for a new meeting.
    pub async fn create(&self, call_id: &str, creator_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&CreateSessionRequest { call_id, creator_id })
            .send()
            .await
            .map_err(|e| AppError::Media(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Media(format!(
                "Failed to create session: {} - {}",
                status, text
            )));
        }

        Ok(())
    }

    /// Fetch a join token for an authorized participant.
    pub async fn join_token(&self, call_id: &str, user_id: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/sessions/{}/tokens", self.base_url, call_id))
            .json(&JoinTokenRequest { call_id, user_id })
            .send()
            .await
            .map_err(|e| AppError::Media(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Media(format!(
                "Failed to get join token: {} - {}",
                status, text
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Media(e.to_string()))?;

        Ok(body.token)
    }

    /// End the media session for a meeting.
    pub async fn end(&self, call_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/sessions/{}", self.base_url, call_id))
            .send()
            .await
            .map_err(|e| AppError::Media(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Media(format!(
                "Failed to end session: {} - {}",
                status, text
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let client = MediaClient::new(server.uri());
        client.create("abc", "creator-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_join_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/abc/tokens"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "tok-1"})),
            )
            .mount(&server)
            .await;

        let client = MediaClient::new(server.uri());
        let token = client.join_token("abc", "guest-1").await.unwrap();
        assert_eq!(token, "tok-1");
    }

    #[tokio::test]
    async fn test_upstream_error_maps_to_media_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = MediaClient::new(server.uri());
        let result = client.create("abc", "creator-1").await;
        assert!(matches!(result.unwrap_err(), AppError::Media(_)));
    }

    #[tokio::test]
    async fn test_end_session() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/sessions/abc"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = MediaClient::new(server.uri());
        client.end("abc").await.unwrap();
    }
}
