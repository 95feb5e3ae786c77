//! Relay transport. [`RelayApi`] is the seam integration tests replace with
//! an in-memory relay; [`HttpRelay`] is the production implementation.

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use dm_proto::api::{
    Challenge, ConversationsResponse, ErrorResponse, GetKeyRequest, GetKeyResponse, HistoryRequest,
    HistoryResponse, RegisterKeyRequest, RegisterKeyResponse, SendRequest, SendResponse,
};

use crate::{config::ServerConfig, error::DmError};

/// Relay endpoints. `auth` is a complete `Authorization` header value and is
/// used for exactly one call.
#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn health(&self) -> Result<bool, DmError>;

    async fn challenge(&self) -> Result<Challenge, DmError>;

    async fn register_key(
        &self,
        auth: &str,
        req: &RegisterKeyRequest,
    ) -> Result<RegisterKeyResponse, DmError>;

    /// Unauthenticated. A 404 is reported as `found: false`.
    async fn get_key(&self, req: &GetKeyRequest) -> Result<GetKeyResponse, DmError>;

    async fn send(&self, auth: &str, req: &SendRequest) -> Result<SendResponse, DmError>;

    async fn history(&self, auth: &str, req: &HistoryRequest) -> Result<HistoryResponse, DmError>;

    async fn conversations(&self, auth: &str) -> Result<ConversationsResponse, DmError>;
}

pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    pub fn new(server: &ServerConfig) -> Result<Self, DmError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("polycentric-dm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DmError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: server.http_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, auth: Option<&str>, body: &B) -> Result<T, DmError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let mut req = self.client.post(self.url(path)).json(body);
        if let Some(auth) = auth {
            req = req.header(AUTHORIZATION, auth);
        }
        let res = check_status(path, req.send().await?).await?;
        Ok(res.json().await?)
    }
}

/// Map a non-2xx response onto the error taxonomy.
async fn check_status(path: &str, res: reqwest::Response) -> Result<reqwest::Response, DmError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    tracing::warn!(
        target: "dm_client",
        event = "relay_request_failed",
        path = %path,
        status = %status,
        reason_len = reason.len()
    );
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DmError::Authentication(format!("{path} returned {status}: {reason}"))
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            DmError::Network(format!("{path} returned {status}"))
        }
        _ => DmError::Rejected(format!("{path} returned {status}: {reason}")),
    })
}

#[async_trait]
impl RelayApi for HttpRelay {
    async fn health(&self) -> Result<bool, DmError> {
        let res = self.client.get(self.url("/health")).send().await?;
        Ok(res.status().is_success())
    }

    async fn challenge(&self) -> Result<Challenge, DmError> {
        let res = self.client.get(self.url("/challenge")).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(DmError::Authentication(format!(
                "challenge request returned {status}"
            )));
        }
        res.json()
            .await
            .map_err(|e| DmError::Authentication(format!("malformed challenge: {e}")))
    }

    async fn register_key(
        &self,
        auth: &str,
        req: &RegisterKeyRequest,
    ) -> Result<RegisterKeyResponse, DmError> {
        let res = self
            .client
            .post(self.url("/register_key"))
            .header(AUTHORIZATION, auth)
            .json(req)
            .send()
            .await?;
        if res.status() == StatusCode::CONFLICT {
            return Ok(RegisterKeyResponse {
                success: true,
                error: Some("already registered".into()),
            });
        }
        Ok(check_status("/register_key", res).await?.json().await?)
    }

    async fn get_key(&self, req: &GetKeyRequest) -> Result<GetKeyResponse, DmError> {
        let res = self.client.post(self.url("/get_key")).json(req).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(GetKeyResponse {
                found: false,
                x25519_public_key: None,
            });
        }
        Ok(check_status("/get_key", res).await?.json().await?)
    }

    async fn send(&self, auth: &str, req: &SendRequest) -> Result<SendResponse, DmError> {
        self.post_json("/send", Some(auth), req).await
    }

    async fn history(&self, auth: &str, req: &HistoryRequest) -> Result<HistoryResponse, DmError> {
        self.post_json("/history", Some(auth), req).await
    }

    async fn conversations(&self, auth: &str) -> Result<ConversationsResponse, DmError> {
        let res = self
            .client
            .get(self.url("/conversations/detailed"))
            .header(AUTHORIZATION, auth)
            .send()
            .await?;
        Ok(check_status("/conversations/detailed", res).await?.json().await?)
    }
}
