//! Session lifecycle: login, refresh, expiry handling.
//!
//! Per account the state machine is `LoggedOut -> LoggingIn -> Authenticated
//! -> (Refreshing -> Authenticated | LoggedOut)`, realised as the presence of
//! a `Session` on the stored account plus a per-account async lock that
//! serialises all session mutation. Concurrent refresh attempts for one
//! account collapse into a single round-trip; duplicate refreshes risk the
//! remote service invalidating a token the first call still uses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, instrument, warn};

use crate::entities::{AccountId, Credentials, Session};
use crate::error::Error;
use crate::ports::AuthGateway;
use crate::secret_store::SecretStore;

pub struct SessionManager<G: AuthGateway> {
    store: Arc<SecretStore>,
    gateway: Arc<G>,
    locks: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<G: AuthGateway> SessionManager<G> {
    pub fn new(store: Arc<SecretStore>, gateway: Arc<G>) -> Self {
        Self {
            store,
            gateway,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn account_lock(&self, id: &AccountId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .expect("session lock table poisoned")
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Exchange credentials plus the current guard code for a session.
    ///
    /// A rejection (bad password, bad code, rate limit) is surfaced
    /// immediately as `AuthRejected` with the account left logged out. No
    /// automatic retry, so the caller can regenerate a fresh code instead of
    /// resubmitting a stale one. The store is only written after the
    /// round-trip completes, so a cancelled login leaves the account
    /// unchanged.
    #[instrument(skip(self, credentials))]
    pub async fn login(&self, id: &AccountId, credentials: &Credentials) -> Result<(), Error> {
        let lock = self.account_lock(id);
        let _guard = lock.lock().await;

        // The account must exist before it can hold a session.
        self.store.get(id)?;

        let pair = self.gateway.login(credentials).await?;
        info!(account = %id, "login accepted");

        self.store.update_session(
            id,
            Some(Session::new(
                pair.access_token,
                pair.refresh_token,
                Self::now(),
            )),
        )
    }

    /// A bearer token ready for use: the stored one if its decoded expiry is
    /// still comfortably in the future, otherwise the result of a refresh.
    pub async fn ensure_access_token(&self, id: &AccountId) -> Result<String, Error> {
        let account = self.store.get(id)?;
        let session = account
            .session
            .ok_or_else(|| Error::NotAuthenticated(id.clone()))?;

        if !session.access_expired(Self::now()) {
            return Ok(session.access_token);
        }
        self.refresh(id, false).await
    }

    /// Refresh unconditionally, used after the remote rejected a token that
    /// still looked valid locally (expiry decoded from tokens is advisory).
    pub async fn force_refresh(&self, id: &AccountId) -> Result<String, Error> {
        self.refresh(id, true).await
    }

    /// Drop the session; the account needs a fresh login afterwards.
    pub fn logout(&self, id: &AccountId) -> Result<(), Error> {
        self.store.update_session(id, None)
    }

    #[instrument(skip(self))]
    async fn refresh(&self, id: &AccountId, force: bool) -> Result<String, Error> {
        let lock = self.account_lock(id);
        let _guard = lock.lock().await;

        let account = self.store.get(id)?;
        let session = account
            .session
            .ok_or_else(|| Error::NotAuthenticated(id.clone()))?;

        // A caller that waited on the lock may find the token already
        // replaced by the refresh it was waiting for.
        if !force && !session.access_expired(Self::now()) {
            return Ok(session.access_token);
        }

        if session.refresh_expired(Self::now()) {
            warn!(account = %id, "refresh token expired, session cleared");
            self.store.update_session(id, None)?;
            return Err(Error::SessionExpired);
        }

        debug!(account = %id, "refreshing access token");
        match self
            .gateway
            .refresh_access(&account.steam_id, &session.refresh_token)
            .await
        {
            Ok(access_token) => {
                self.store.update_session(
                    id,
                    Some(Session {
                        access_token: access_token.clone(),
                        refresh_token: session.refresh_token,
                        issued_at: Self::now(),
                        extra: session.extra,
                    }),
                )?;
                Ok(access_token)
            }
            Err(Error::Unauthorized) | Err(Error::AuthRejected(_)) => {
                // The remote no longer honours the refresh token.
                warn!(account = %id, "refresh rejected, session cleared");
                self.store.update_session(id, None)?;
                Err(Error::SessionExpired)
            }
            // Transport trouble is retryable; keep the session intact.
            Err(other) => Err(other),
        }
    }
}
