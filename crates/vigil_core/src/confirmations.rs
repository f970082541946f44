//! Listing and resolving pending confirmations.
//!
//! Every call is signed for its specific operation tag at the current
//! corrected time and sent through the authenticated transport. When the
//! remote refuses the session tokens, exactly one refresh-and-retry is
//! attempted (with a freshly signed request); a second refusal clears the
//! session and surfaces `SessionExpired`.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::clock::ClockSync;
use crate::entities::{Account, AccountId, Confirmation};
use crate::error::Error;
use crate::ports::{AuthGateway, ConfirmationQuery, ConfirmationTransport, TimeEndpoint};
use crate::secret_store::SecretStore;
use crate::session::SessionManager;
use crate::signer::{sign_confirmation_request, ConfirmationTag, SignedRequest};

/// Owned material for one signed, authenticated confirmation call.
pub struct ConfirmationCall {
    pub steam_id: String,
    pub access_token: String,
    pub signed: SignedRequest,
}

impl ConfirmationCall {
    pub fn query(&self) -> ConfirmationQuery<'_> {
        ConfirmationQuery {
            steam_id: &self.steam_id,
            access_token: &self.access_token,
            signed: &self.signed,
        }
    }
}

/// Per-item result of a batch resolve. Failures carry the item's identity so
/// a caller can tell "3 of 5 succeeded" apart from a wholesale failure.
#[derive(Debug)]
pub struct ConfirmationOutcome {
    pub confirmation_id: String,
    pub result: Result<(), Error>,
}

impl ConfirmationOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct ConfirmationEngine<G, C, T>
where
    G: AuthGateway,
    C: ConfirmationTransport,
    T: TimeEndpoint,
{
    store: Arc<SecretStore>,
    sessions: Arc<SessionManager<G>>,
    transport: Arc<C>,
    clock: Arc<ClockSync<T>>,
}

impl<G, C, T> ConfirmationEngine<G, C, T>
where
    G: AuthGateway,
    C: ConfirmationTransport,
    T: TimeEndpoint,
{
    pub fn new(
        store: Arc<SecretStore>,
        sessions: Arc<SessionManager<G>>,
        transport: Arc<C>,
        clock: Arc<ClockSync<T>>,
    ) -> Self {
        Self {
            store,
            sessions,
            transport,
            clock,
        }
    }

    /// Fetch the pending confirmations. An empty list is a success.
    #[instrument(skip(self))]
    pub async fn list(&self, id: &AccountId) -> Result<Vec<Confirmation>, Error> {
        let confirmations = self
            .execute(id, ConfirmationTag::List, |transport, call| async move {
                transport.fetch(call.query()).await
            })
            .await?;
        info!(account = %id, count = confirmations.len(), "fetched confirmations");
        Ok(confirmations)
    }

    /// Accept or deny a single confirmation.
    #[instrument(skip(self, confirmation), fields(confirmation_id = %confirmation.id))]
    pub async fn resolve(
        &self,
        id: &AccountId,
        confirmation: &Confirmation,
        accept: bool,
    ) -> Result<(), Error> {
        let tag = ConfirmationTag::for_response(accept);
        let confirmation_id = confirmation.id.clone();
        let confirmation_key = confirmation.nonce.clone();

        self.execute(id, tag, move |transport, call| {
            let confirmation_id = confirmation_id.clone();
            let confirmation_key = confirmation_key.clone();
            async move {
                transport
                    .respond(call.query(), &confirmation_id, &confirmation_key)
                    .await
            }
        })
        .await
    }

    /// Accept or deny a batch, item by item, because the remote protocol takes one
    /// confirmation key per signed request. Partial failure never aborts the
    /// batch: every item's outcome is collected and returned, in input order.
    #[instrument(skip(self, confirmations))]
    pub async fn resolve_all(
        &self,
        id: &AccountId,
        confirmations: &[Confirmation],
        accept: bool,
    ) -> Vec<ConfirmationOutcome> {
        let mut outcomes = Vec::with_capacity(confirmations.len());
        for confirmation in confirmations {
            let result = self.resolve(id, confirmation, accept).await;
            if let Err(e) = &result {
                warn!(confirmation_id = %confirmation.id, error = %e, "confirmation failed");
            }
            outcomes.push(ConfirmationOutcome {
                confirmation_id: confirmation.id.clone(),
                result,
            });
        }
        outcomes
    }

    /// Run one signed call with the single refresh-and-retry contract.
    async fn execute<R, F, Fut>(
        &self,
        id: &AccountId,
        tag: ConfirmationTag,
        op: F,
    ) -> Result<R, Error>
    where
        F: Fn(Arc<C>, ConfirmationCall) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        let token = self.sessions.ensure_access_token(id).await?;
        let call = self.build_call(id, tag, token).await?;

        match op(self.transport.clone(), call).await {
            Err(Error::Unauthorized) => {
                debug!(account = %id, "session rejected, refreshing once");
                let token = self.sessions.force_refresh(id).await?;
                // Re-sign as well: the retry gets its own timestamp.
                let call = self.build_call(id, tag, token).await?;
                match op(self.transport.clone(), call).await {
                    Err(Error::Unauthorized) => {
                        warn!(account = %id, "session rejected after refresh");
                        self.sessions.logout(id)?;
                        Err(Error::SessionExpired)
                    }
                    result => result,
                }
            }
            result => result,
        }
    }

    async fn build_call(
        &self,
        id: &AccountId,
        tag: ConfirmationTag,
        access_token: String,
    ) -> Result<ConfirmationCall, Error> {
        let account: Account = self.store.get(id)?;
        let secrets = account
            .secrets
            .as_ref()
            .ok_or_else(|| Error::SecretsMissing(id.clone()))?;

        let time = self.clock.corrected_time().await;
        let signed =
            sign_confirmation_request(secrets.identity.as_bytes(), &account.device_id, tag, time);

        Ok(ConfirmationCall {
            steam_id: account.steam_id,
            access_token,
            signed,
        })
    }
}
