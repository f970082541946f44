use async_trait::async_trait;

use crate::entities::{Confirmation, Credentials, TokenPair};
use crate::error::Error;
use crate::mafile::MaFileRecord;
use crate::signer::SignedRequest;

/// The remote service's time endpoint.
#[async_trait]
pub trait TimeEndpoint: Send + Sync {
    /// Current time at the remote service, seconds since the Unix epoch.
    async fn server_time(&self) -> Result<u64, Error>;
}

/// Credential exchange with the remote authentication service.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchange credentials plus the current guard code for a token pair.
    /// Rejections surface as `Error::AuthRejected`; never retried here.
    async fn login(&self, credentials: &Credentials) -> Result<TokenPair, Error>;

    /// Obtain a fresh access token from a stored refresh token.
    async fn refresh_access(&self, steam_id: &str, refresh_token: &str) -> Result<String, Error>;
}

/// Everything a confirmation call needs besides the operation itself.
pub struct ConfirmationQuery<'a> {
    pub steam_id: &'a str,
    pub access_token: &'a str,
    pub signed: &'a SignedRequest,
}

/// The confirmation endpoints, behind an authenticated transport.
#[async_trait]
pub trait ConfirmationTransport: Send + Sync {
    /// Fetch the pending confirmations. An empty list is a valid success.
    async fn fetch(&self, query: ConfirmationQuery<'_>) -> Result<Vec<Confirmation>, Error>;

    /// Act on a single confirmation; the operation (accept/deny) is carried
    /// by the query's signed tag.
    async fn respond(
        &self,
        query: ConfirmationQuery<'_>,
        confirmation_id: &str,
        confirmation_key: &str,
    ) -> Result<(), Error>;
}

/// Durable account-record persistence (the maFiles directory).
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Load every readable record; unreadable files are skipped with a log.
    async fn scan(&self) -> Result<Vec<MaFileRecord>, Error>;

    async fn save(&self, record: &MaFileRecord) -> Result<(), Error>;

    async fn delete(&self, record: &MaFileRecord) -> Result<(), Error>;
}
