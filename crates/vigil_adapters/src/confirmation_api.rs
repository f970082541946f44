//! The mobile confirmation endpoints.
//!
//! Both calls are GETs carrying the signed query (`p`/`a`/`k`/`t`/`m`/`tag`)
//! plus the session cookies the community site expects. A `needauth` answer
//! or an HTTP 401 surfaces as `Error::Unauthorized` so the engine can run
//! its refresh-and-retry step.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use vigil_core::config::Settings;
use vigil_core::entities::{Confirmation, ConfirmationKind};
use vigil_core::ports::{ConfirmationQuery, ConfirmationTransport};
use vigil_core::Error;

use crate::network::{build_community_client, COMMUNITY_BASE_URL};

const LIST_PATH: &str = "/mobileconf/getlist";
const RESPOND_PATH: &str = "/mobileconf/ajaxop";
const REFERER: &str = "https://steamcommunity.com/mobileconf/conf";

/// Client identifier sent as the `m` parameter.
const CLIENT_KIND: &str = "react";

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

#[derive(Debug, Default, Deserialize)]
struct ListResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    needauth: bool,
    #[serde(default)]
    conf: Vec<ConfRecord>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfRecord {
    #[serde(default, deserialize_with = "stringly")]
    id: String,
    /// The confirmation key required by the accept/deny call.
    #[serde(default, deserialize_with = "stringly")]
    nonce: String,
    #[serde(rename = "type", default)]
    type_id: i32,
    #[serde(default, deserialize_with = "stringly")]
    creator_id: String,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: Vec<String>,
}

impl From<ConfRecord> for Confirmation {
    fn from(record: ConfRecord) -> Self {
        Confirmation {
            id: record.id,
            nonce: record.nonce,
            kind: ConfirmationKind::from_type_id(record.type_id),
            creator_id: record.creator_id,
            headline: record.headline,
            summary: record.summary,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RespondResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    needauth: bool,
    #[serde(default)]
    message: Option<String>,
}

pub struct SteamConfirmationTransport {
    client: Client,
    base_url: String,
}

impl SteamConfirmationTransport {
    pub fn new(settings: &Settings) -> Result<Self, Error> {
        Ok(Self {
            client: build_community_client(&settings.network)?,
            base_url: COMMUNITY_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn signed_params(query: &ConfirmationQuery<'_>) -> Vec<(&'static str, String)> {
        vec![
            ("p", query.signed.device_id.clone()),
            ("a", query.steam_id.to_string()),
            ("k", query.signed.signature.clone()),
            ("t", query.signed.time.to_string()),
            ("m", CLIENT_KIND.to_string()),
            ("tag", query.signed.tag.as_str().to_string()),
        ]
    }

    /// The community site authenticates confirmations through cookies, not a
    /// bearer header.
    fn session_cookie(query: &ConfirmationQuery<'_>) -> String {
        format!(
            "dob=; steamid={}; steamLoginSecure={}||{}",
            query.steam_id, query.steam_id, query.access_token
        )
    }

    async fn get_json<T>(
        &self,
        path: &str,
        query: &ConfirmationQuery<'_>,
        extra_params: &[(&'static str, String)],
    ) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut params = Self::signed_params(query);
        params.extend_from_slice(extra_params);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .header(header::REFERER, REFERER)
            .header(header::COOKIE, Self::session_cookie(query))
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("confirmation request failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(Error::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => return Err(Error::RateLimited),
            status if !status.is_success() => {
                return Err(Error::RemoteUnavailable(format!(
                    "confirmation endpoint returned HTTP {}",
                    status
                )));
            }
            _ => {}
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("failed to read response: {}", e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Protocol(format!("malformed confirmation response: {}", e)))
    }
}

#[async_trait]
impl ConfirmationTransport for SteamConfirmationTransport {
    #[instrument(skip(self, query), fields(tag = query.signed.tag.as_str()))]
    async fn fetch(&self, query: ConfirmationQuery<'_>) -> Result<Vec<Confirmation>, Error> {
        let body: ListResponse = self.get_json(LIST_PATH, &query, &[]).await?;

        if body.needauth {
            warn!("confirmation list rejected the session tokens");
            return Err(Error::Unauthorized);
        }
        if !body.success {
            return Err(Error::Protocol(
                body.message
                    .unwrap_or_else(|| "confirmation list reported failure".to_string()),
            ));
        }

        debug!(count = body.conf.len(), "confirmation list fetched");
        Ok(body.conf.into_iter().map(Confirmation::from).collect())
    }

    #[instrument(skip(self, query, confirmation_key), fields(tag = query.signed.tag.as_str()))]
    async fn respond(
        &self,
        query: ConfirmationQuery<'_>,
        confirmation_id: &str,
        confirmation_key: &str,
    ) -> Result<(), Error> {
        let extra = [
            ("op", query.signed.tag.as_str().to_string()),
            ("cid", confirmation_id.to_string()),
            ("ck", confirmation_key.to_string()),
        ];
        let body: RespondResponse = self.get_json(RESPOND_PATH, &query, &extra).await?;

        if body.needauth {
            warn!("confirmation response rejected the session tokens");
            return Err(Error::Unauthorized);
        }
        if !body.success {
            // Usually the confirmation is already gone or the key is stale.
            debug!(message = ?body.message, "confirmation response refused");
            return Err(Error::ConfirmationRejected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_response() {
        let json = r#"{
            "success": true,
            "conf": [
                {
                    "type": 2,
                    "type_name": "Trade",
                    "id": "13613923583",
                    "creator_id": "4345773185",
                    "nonce": "9563163409225282845",
                    "creation_time": 1687793925,
                    "icon": "https://example.invalid/icon.jpg",
                    "multi": false,
                    "headline": "Trade with partner",
                    "summary": ["You will give up...", "You will receive..."],
                    "accept": "Accept Trade",
                    "cancel": "Cancel Trade"
                }
            ]
        }"#;

        let parsed: ListResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.success);
        assert!(!parsed.needauth);
        assert_eq!(parsed.conf.len(), 1);

        let confirmation: Confirmation = parsed.conf.into_iter().next().unwrap().into();
        assert_eq!(confirmation.id, "13613923583");
        assert_eq!(confirmation.nonce, "9563163409225282845");
        assert_eq!(confirmation.kind, ConfirmationKind::Trade);
        assert_eq!(confirmation.creator_id, "4345773185");
        assert_eq!(confirmation.headline, "Trade with partner");
        assert_eq!(confirmation.summary.len(), 2);
    }

    #[test]
    fn test_parse_numeric_ids() {
        // Some responses carry numeric ids instead of strings.
        let json = r#"{"success":true,"conf":[{"type":3,"id":42,"nonce":99,"creator_id":7}]}"#;
        let parsed: ListResponse = serde_json::from_str(json).unwrap();
        let confirmation: Confirmation = parsed.conf.into_iter().next().unwrap().into();
        assert_eq!(confirmation.id, "42");
        assert_eq!(confirmation.nonce, "99");
        assert_eq!(confirmation.kind, ConfirmationKind::MarketListing);
    }

    #[test]
    fn test_parse_needauth() {
        let json = r#"{"success":false,"needauth":true}"#;
        let parsed: ListResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.needauth);
        assert!(!parsed.success);
    }

    #[test]
    fn test_parse_empty_list() {
        let json = r#"{"success":true,"conf":[]}"#;
        let parsed: ListResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.success);
        assert!(parsed.conf.is_empty());
    }

    #[test]
    fn test_parse_respond_failure_message() {
        let json = r#"{"success":false,"message":"Oops"}"#;
        let parsed: RespondResponse = serde_json::from_str(json).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.message.as_deref(), Some("Oops"));
    }

    #[test]
    fn test_transport_construction() {
        assert!(SteamConfirmationTransport::new(&Settings::default()).is_ok());
    }
}
