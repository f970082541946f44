use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use sha1::{Digest, Sha1};

use crate::error::SecretError;

/// Decoded length of an authenticator secret.
pub const SECRET_LEN: usize = 20;

/// Refresh this long before the decoded token expiry, not at it.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Unique identifier for an account (derived from account name, lowercase)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(account_name: &str) -> Self {
        Self(account_name.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-length authenticator secret. Stored base64-encoded at rest,
/// never logged and never placed in error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    pub fn from_base64(encoded: &str) -> Result<Self, SecretError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SecretError::Malformed(e.to_string()))?;
        let bytes: [u8; SECRET_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| SecretError::WrongLength {
                    expected: SECRET_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Redacted: secrets must not leak through debug logging.
        write!(f, "Secret(..)")
    }
}

/// The two per-account secrets. Holding them in one struct enforces the
/// invariant that they are present together or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSecrets {
    /// Keys one-time guard codes.
    pub shared: Secret,
    /// Keys confirmation-request signatures.
    pub identity: Secret,
}

/// One managed identity with its secrets and (optionally) a live session.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub account_name: String,
    /// Remote identity, immutable once set.
    pub steam_id: String,
    pub secrets: Option<AccountSecrets>,
    pub device_id: String,
    pub session: Option<Session>,
    /// Unrecognised record fields, carried so exports round-trip losslessly.
    pub extra: Map<String, serde_json::Value>,
}

/// Derive the stable device identifier for a remote identity.
///
/// The confirmation API expects the same `android:`-prefixed token on every
/// signed request, so it is computed deterministically from the id rather
/// than generated randomly: a re-import of the same account produces the
/// same device id.
pub fn derive_device_id(steam_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(steam_id.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(
        "android:{}-{}-{}-{}-{}",
        &digest[..8],
        &digest[8..12],
        &digest[12..16],
        &digest[16..20],
        &digest[20..32]
    )
}

/// Authenticated access state for an account.
///
/// Token expiries are decoded from the tokens themselves and are advisory:
/// real invalidation is only learned from API responses.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp of the last successful login or refresh.
    pub issued_at: i64,
    /// Unrecognised session fields from the source record.
    pub extra: Map<String, serde_json::Value>,
}

impl Session {
    pub fn new(access_token: String, refresh_token: String, issued_at: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            issued_at,
            extra: Map::new(),
        }
    }

    /// Expiry instant encoded in the access token, if it can be decoded.
    pub fn access_expires_at(&self) -> Option<i64> {
        token_expiry(&self.access_token)
    }

    /// Expiry instant encoded in the refresh token, if it can be decoded.
    pub fn refresh_expires_at(&self) -> Option<i64> {
        token_expiry(&self.refresh_token)
    }

    /// An undecodable token counts as expired so a refresh is tried first.
    pub fn access_expired(&self, now: i64) -> bool {
        self.access_expires_at()
            .map_or(true, |exp| exp - EXPIRY_MARGIN_SECS <= now)
    }

    pub fn refresh_expired(&self, now: i64) -> bool {
        self.refresh_expires_at()
            .map_or(true, |exp| exp - EXPIRY_MARGIN_SECS <= now)
    }
}

/// Pull the `exp` claim out of a JWT-shaped bearer token.
fn token_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()
}

/// Access/refresh token pair returned by a successful login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Login credentials handed to the auth gateway.
///
/// The password must already be sealed with the platform's published RSA key
/// for the account; sealing (and fetching the key material) is the calling
/// collaborator's responsibility.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub account_name: String,
    pub sealed_password: String,
    /// Timestamp of the key the password was sealed with.
    pub key_timestamp: u64,
    pub guard_code: Option<String>,
}

/// Category of a pending confirmation, as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationKind {
    Generic,
    Trade,
    MarketListing,
    AccountRecovery,
    Unknown(i32),
}

impl ConfirmationKind {
    pub fn from_type_id(type_id: i32) -> Self {
        match type_id {
            1 => Self::Generic,
            2 => Self::Trade,
            3 => Self::MarketListing,
            5 => Self::AccountRecovery,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ConfirmationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => write!(f, "Generic"),
            Self::Trade => write!(f, "Trade"),
            Self::MarketListing => write!(f, "Market Listing"),
            Self::AccountRecovery => write!(f, "Account Recovery"),
            Self::Unknown(id) => write!(f, "Unknown ({})", id),
        }
    }
}

/// One pending remote action awaiting accept/deny.
///
/// Fetched fresh on every list call; acting on it requires the
/// `(id, nonce)` pair. The summary fields are display-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub id: String,
    /// Opaque confirmation key, required by the accept/deny call.
    pub nonce: String,
    pub kind: ConfirmationKind,
    pub creator_id: String,
    pub headline: String,
    pub summary: Vec<String>,
}

/// A generated guard code together with its remaining lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardCode {
    pub code: String,
    /// Seconds left in the current 30-second window.
    pub expires_in: u32,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_token(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"EdDSA","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp }).to_string());
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_account_id_lowercase() {
        let id1 = AccountId::new("TestUser");
        let id2 = AccountId::new("testuser");
        let id3 = AccountId::new("TESTUSER");

        assert_eq!(id1, id2);
        assert_eq!(id2, id3);
        assert_eq!(id1.as_str(), "testuser");
    }

    #[test]
    fn test_secret_roundtrip() {
        let encoded = STANDARD.encode([7u8; SECRET_LEN]);
        let secret = Secret::from_base64(&encoded).unwrap();
        assert_eq!(secret.as_bytes(), &[7u8; SECRET_LEN]);
        assert_eq!(secret.to_base64(), encoded);
    }

    #[test]
    fn test_secret_rejects_bad_base64() {
        assert!(matches!(
            Secret::from_base64("not!!base64"),
            Err(SecretError::Malformed(_))
        ));
    }

    #[test]
    fn test_secret_rejects_wrong_length() {
        let short = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            Secret::from_base64(&short),
            Err(SecretError::WrongLength {
                expected: 20,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::from_base64(&STANDARD.encode([1u8; SECRET_LEN])).unwrap();
        assert_eq!(format!("{:?}", secret), "Secret(..)");
    }

    #[test]
    fn test_derive_device_id_deterministic() {
        let id1 = derive_device_id("76561197960287930");
        let id2 = derive_device_id("76561197960287930");
        assert_eq!(id1, id2);

        assert!(id1.starts_with("android:"));
        // android: + 8-4-4-4-12 hex groups
        let groups: Vec<&str> = id1.trim_start_matches("android:").split('-').collect();
        assert_eq!(
            groups.iter().map(|g| g.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(groups
            .iter()
            .all(|g| g.chars().all(|c| c.is_ascii_hexdigit())));

        assert_ne!(id1, derive_device_id("76561197960287931"));
    }

    #[test]
    fn test_session_expiry_from_token() {
        let now = 1_700_000_000;
        let fresh = Session::new(make_token(now + 3_600), make_token(now + 86_400), now);
        assert!(!fresh.access_expired(now));
        assert!(!fresh.refresh_expired(now));
        assert_eq!(fresh.access_expires_at(), Some(now + 3_600));

        let stale = Session::new(make_token(now - 10), make_token(now + 86_400), now);
        assert!(stale.access_expired(now));
        assert!(!stale.refresh_expired(now));
    }

    #[test]
    fn test_session_expiry_within_margin() {
        // A token expiring in under the safety margin counts as expired.
        let now = 1_700_000_000;
        let session = Session::new(make_token(now + 30), make_token(now + 30), now);
        assert!(session.access_expired(now));
        assert!(session.refresh_expired(now));
    }

    #[test]
    fn test_session_undecodable_token_counts_as_expired() {
        let session = Session::new("opaque".to_string(), "also-opaque".to_string(), 0);
        assert!(session.access_expired(0));
        assert!(session.refresh_expired(0));
        assert_eq!(session.access_expires_at(), None);
    }

    #[test]
    fn test_confirmation_kind_mapping() {
        assert_eq!(ConfirmationKind::from_type_id(1), ConfirmationKind::Generic);
        assert_eq!(ConfirmationKind::from_type_id(2), ConfirmationKind::Trade);
        assert_eq!(
            ConfirmationKind::from_type_id(3),
            ConfirmationKind::MarketListing
        );
        assert_eq!(
            ConfirmationKind::from_type_id(5),
            ConfirmationKind::AccountRecovery
        );
        assert_eq!(
            ConfirmationKind::from_type_id(42),
            ConfirmationKind::Unknown(42)
        );
        assert_eq!(ConfirmationKind::Trade.to_string(), "Trade");
        assert_eq!(ConfirmationKind::Unknown(42).to_string(), "Unknown (42)");
    }
}
