//! Credential exchange against Steam's authentication service.
//!
//! The login flow is begin-session → submit guard code → poll for tokens.
//! The service reports failures through an `x-eresult` response header;
//! non-success codes map to the engine's typed rejections. The password in
//! the credentials must already be sealed with the key material from
//! [`SteamAuthGateway::password_key`]; the sealing step itself belongs to
//! the importing collaborator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use vigil_core::config::Settings;
use vigil_core::entities::{Credentials, TokenPair};
use vigil_core::ports::AuthGateway;
use vigil_core::{AuthRejection, Error};

use crate::network::{build_api_client, API_BASE_URL};

const BEGIN_SESSION_PATH: &str = "/IAuthenticationService/BeginAuthSessionViaCredentials/v1/";
const SUBMIT_CODE_PATH: &str = "/IAuthenticationService/UpdateAuthSessionWithSteamGuardCode/v1/";
const POLL_SESSION_PATH: &str = "/IAuthenticationService/PollAuthSessionStatus/v1/";
const REFRESH_TOKEN_PATH: &str = "/IAuthenticationService/GenerateAccessTokenForApp/v1/";
const PASSWORD_KEY_PATH: &str = "/IAuthenticationService/GetPasswordRSAPublicKey/v1/";

/// Guard-code token type for the code-submit call (device code).
const CODE_TYPE_DEVICE: u32 = 3;

const POLL_ATTEMPTS: u32 = 5;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Accept a string or a number, normalising to a string.
fn stringly<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    response: T,
}

#[derive(Debug, Default, Deserialize)]
struct BeginSessionBody {
    #[serde(default, deserialize_with = "stringly")]
    client_id: String,
    #[serde(default)]
    request_id: String,
    #[serde(default, deserialize_with = "stringly")]
    steamid: String,
    #[serde(default)]
    interval: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PollSessionBody {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshBody {
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct PasswordKeyBody {
    #[serde(default)]
    publickey_mod: String,
    #[serde(default)]
    publickey_exp: String,
    #[serde(default, deserialize_with = "stringly")]
    timestamp: String,
}

/// RSA key material for sealing a password before login.
#[derive(Debug, Clone)]
pub struct PasswordKey {
    pub modulus_hex: String,
    pub exponent_hex: String,
    pub timestamp: u64,
}

/// Map a non-success `x-eresult` header value to a typed error.
fn map_eresult(code: i32, message: Option<&str>) -> Error {
    match code {
        5 => Error::AuthRejected(AuthRejection::InvalidCredentials),
        82 => Error::AuthRejected(AuthRejection::AccountLocked),
        84 => Error::AuthRejected(AuthRejection::RateLimited),
        88 => Error::AuthRejected(AuthRejection::InvalidGuardCode),
        other => Error::AuthRejected(AuthRejection::Unknown(format!(
            "service error {}{}",
            other,
            message.map(|m| format!(": {}", m)).unwrap_or_default()
        ))),
    }
}

/// Check the service's result header; `1` is success.
fn check_eresult(response: &Response) -> Result<(), Error> {
    let Some(code) = response
        .headers()
        .get("x-eresult")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok())
    else {
        return Ok(());
    };
    if code == 1 {
        return Ok(());
    }
    let message = response
        .headers()
        .get("x-error_message")
        .and_then(|v| v.to_str().ok());
    warn!(eresult = code, "authentication service rejected the request");
    Err(map_eresult(code, message))
}

pub struct SteamAuthGateway {
    client: Client,
    base_url: String,
}

impl SteamAuthGateway {
    pub fn new(settings: &Settings) -> Result<Self, Error> {
        Ok(Self {
            client: build_api_client(&settings.network)?,
            base_url: API_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Fetch the RSA key material for an account so a collaborator can seal
    /// the password before calling `login`.
    #[instrument(skip(self))]
    pub async fn password_key(&self, account_name: &str) -> Result<PasswordKey, Error> {
        let url = format!("{}{}", self.base_url, PASSWORD_KEY_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[("account_name", account_name)])
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("password key request failed: {}", e)))?;
        check_eresult(&response)?;

        let body: ApiResponse<PasswordKeyBody> = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("malformed password key response: {}", e)))?;

        if body.response.publickey_mod.is_empty() || body.response.publickey_exp.is_empty() {
            return Err(Error::Protocol("password key response missing key material".to_string()));
        }

        Ok(PasswordKey {
            modulus_hex: body.response.publickey_mod,
            exponent_hex: body.response.publickey_exp,
            timestamp: body.response.timestamp.parse().unwrap_or(0),
        })
    }

    async fn post_json<T>(&self, path: &str, input: &Value) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .form(&[("input_json", input.to_string())])
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("auth request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "auth service returned HTTP {}",
                response.status()
            )));
        }
        check_eresult(&response)?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("malformed auth response: {}", e)))?;
        Ok(body.response)
    }

    async fn begin_session(&self, credentials: &Credentials) -> Result<BeginSessionBody, Error> {
        let input = serde_json::json!({
            "account_name": credentials.account_name,
            "encrypted_password": credentials.sealed_password,
            "encryption_timestamp": credentials.key_timestamp,
            "persistence": 1,
            "website_id": "Mobile",
        });

        let body: BeginSessionBody = self.post_json(BEGIN_SESSION_PATH, &input).await?;
        if body.client_id.is_empty() {
            return Err(Error::Protocol("begin-session response missing client id".to_string()));
        }
        debug!("auth session started");
        Ok(body)
    }

    async fn submit_guard_code(
        &self,
        session: &BeginSessionBody,
        code: &str,
    ) -> Result<(), Error> {
        let input = serde_json::json!({
            "client_id": session.client_id,
            "steamid": session.steamid,
            "code": code,
            "code_type": CODE_TYPE_DEVICE,
        });

        let _: Value = self.post_json(SUBMIT_CODE_PATH, &input).await?;
        debug!("guard code accepted");
        Ok(())
    }

    async fn poll_tokens(&self, session: &BeginSessionBody) -> Result<TokenPair, Error> {
        let input = serde_json::json!({
            "client_id": session.client_id,
            "request_id": session.request_id,
        });

        let interval = session
            .interval
            .map(Duration::from_secs_f64)
            .unwrap_or(POLL_INTERVAL);

        for _ in 0..POLL_ATTEMPTS {
            let body: PollSessionBody = self.post_json(POLL_SESSION_PATH, &input).await?;
            if !body.access_token.is_empty() && !body.refresh_token.is_empty() {
                return Ok(TokenPair {
                    access_token: body.access_token,
                    refresh_token: body.refresh_token,
                });
            }
            tokio::time::sleep(interval).await;
        }

        Err(Error::Protocol("authentication did not complete in time".to_string()))
    }
}

#[async_trait]
impl AuthGateway for SteamAuthGateway {
    #[instrument(skip(self, credentials), fields(account = %credentials.account_name))]
    async fn login(&self, credentials: &Credentials) -> Result<TokenPair, Error> {
        let session = self.begin_session(credentials).await?;

        if let Some(code) = &credentials.guard_code {
            self.submit_guard_code(&session, code).await?;
        }

        let pair = self.poll_tokens(&session).await?;
        info!("login succeeded");
        Ok(pair)
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh_access(&self, steam_id: &str, refresh_token: &str) -> Result<String, Error> {
        let url = format!("{}{}", self.base_url, REFRESH_TOKEN_PATH);
        let response = self
            .client
            .post(&url)
            .form(&[("refresh_token", refresh_token), ("steamid", steam_id)])
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("token refresh failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "token refresh returned HTTP {}",
                response.status()
            )));
        }
        check_eresult(&response)?;

        let body: ApiResponse<RefreshBody> = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("malformed refresh response: {}", e)))?;

        if body.response.access_token.is_empty() {
            // The service answers an invalid refresh token with an empty
            // grant rather than an HTTP error.
            return Err(Error::Unauthorized);
        }
        debug!("access token refreshed");
        Ok(body.response.access_token)
    }
}
