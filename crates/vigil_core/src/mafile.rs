//! The persisted account record (".maFile"), the boundary contract with
//! import/export collaborators.
//!
//! Two shapes are accepted on import: the native record with a lowercase
//! `session` object, and the Windows desktop authenticator's record with a
//! PascalCase `Session` object. Exports always produce the native shape.
//! Unrecognised fields are preserved so an import/export cycle is lossless.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::entities::{derive_device_id, Account, AccountId, AccountSecrets, Secret, Session};
use crate::error::Error;

/// Accept a string or a number, normalising to a string. Desktop exports
/// write the 64-bit id as a bare JSON number.
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

fn stringly_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    stringly(deserializer).map(|s| if s.is_empty() { None } else { Some(s) })
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionRecord {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Unix timestamp of the last successful login or refresh.
    #[serde(default)]
    pub token_timestamp: i64,
    #[serde(
        default,
        deserialize_with = "stringly_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub steamid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Session object written by the Windows desktop authenticator.
/// Read on import only; exports use [`SessionRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesktopSessionRecord {
    #[serde(rename = "AccessToken", default)]
    pub access_token: String,
    #[serde(rename = "RefreshToken", default)]
    pub refresh_token: String,
    #[serde(
        rename = "SteamID",
        default,
        deserialize_with = "stringly_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub steam_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaFileRecord {
    pub account_name: String,
    #[serde(default, deserialize_with = "stringly")]
    pub steamid: String,
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default)]
    pub identity_secret: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRecord>,
    #[serde(rename = "Session", default, skip_serializing_if = "Option::is_none")]
    pub desktop_session: Option<DesktopSessionRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MaFileRecord {
    /// Validate the record and build an [`Account`] from it.
    ///
    /// Every missing or malformed field is reported at once so a user fixing
    /// an import sees the whole picture, never a partially-built account.
    pub fn into_account(self) -> Result<Account, Error> {
        let mut problems = Vec::new();

        if self.account_name.trim().is_empty() {
            problems.push("account_name is empty".to_string());
        }

        let steam_id = self.resolved_steam_id();
        if steam_id.is_empty() {
            problems.push("steamid is missing".to_string());
        }

        let secrets = match (
            self.shared_secret.trim().is_empty(),
            self.identity_secret.trim().is_empty(),
        ) {
            (true, true) => None,
            (false, false) => {
                let shared = Secret::from_base64(&self.shared_secret)
                    .map_err(|e| problems.push(format!("shared_secret: {}", e)))
                    .ok();
                let identity = Secret::from_base64(&self.identity_secret)
                    .map_err(|e| problems.push(format!("identity_secret: {}", e)))
                    .ok();
                match (shared, identity) {
                    (Some(shared), Some(identity)) => Some(AccountSecrets { shared, identity }),
                    _ => None,
                }
            }
            _ => {
                problems.push(
                    "shared_secret and identity_secret must be present together".to_string(),
                );
                None
            }
        };

        if !problems.is_empty() {
            return Err(Error::AccountInvalid(problems));
        }

        let device_id = if self.device_id.is_empty() {
            derive_device_id(&steam_id)
        } else {
            self.device_id.clone()
        };

        let session = self.resolved_session();

        Ok(Account {
            id: AccountId::new(&self.account_name),
            account_name: self.account_name,
            steam_id,
            secrets,
            device_id,
            session,
            extra: self.extra,
        })
    }

    /// The remote id may live in three places depending on which tool wrote
    /// the record.
    fn resolved_steam_id(&self) -> String {
        if !self.steamid.is_empty() {
            return self.steamid.clone();
        }
        if let Some(id) = self
            .desktop_session
            .as_ref()
            .and_then(|s| s.steam_id.clone())
        {
            return id;
        }
        self.session
            .as_ref()
            .and_then(|s| s.steamid.clone())
            .unwrap_or_default()
    }

    fn resolved_session(&self) -> Option<Session> {
        if let Some(record) = &self.session {
            if !record.access_token.is_empty() || !record.refresh_token.is_empty() {
                return Some(Session {
                    access_token: record.access_token.clone(),
                    refresh_token: record.refresh_token.clone(),
                    issued_at: record.token_timestamp,
                    extra: record.extra.clone(),
                });
            }
        }
        if let Some(record) = &self.desktop_session {
            if !record.access_token.is_empty() || !record.refresh_token.is_empty() {
                return Some(Session::new(
                    record.access_token.clone(),
                    record.refresh_token.clone(),
                    0,
                ));
            }
        }
        None
    }
}

impl Account {
    /// Serialise back to the native record shape.
    pub fn to_record(&self) -> MaFileRecord {
        let (shared_secret, identity_secret) = match &self.secrets {
            Some(secrets) => (secrets.shared.to_base64(), secrets.identity.to_base64()),
            None => (String::new(), String::new()),
        };

        MaFileRecord {
            account_name: self.account_name.clone(),
            steamid: self.steam_id.clone(),
            shared_secret,
            identity_secret,
            device_id: self.device_id.clone(),
            session: self.session.as_ref().map(|s| SessionRecord {
                access_token: s.access_token.clone(),
                refresh_token: s.refresh_token.clone(),
                token_timestamp: s.issued_at,
                steamid: None,
                extra: s.extra.clone(),
            }),
            desktop_session: None,
            extra: self.extra.clone(),
        }
    }
}
