//! One-time guard code derivation.
//!
//! The scheme is the platform's published variant of HMAC-based one-time
//! passwords: HMAC-SHA1 over the 30-second step counter, standard dynamic
//! truncation, then five symbols from a fixed 26-character alphabet instead
//! of decimal digits. Alphabet and truncation are a compatibility contract,
//! pinned by a known vector in the tests.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::clock::ClockSync;
use crate::entities::{AccountId, GuardCode};
use crate::error::Error;
use crate::ports::TimeEndpoint;
use crate::secret_store::SecretStore;

/// The platform's code alphabet: digits and consonants with the visually
/// ambiguous characters removed.
pub const CODE_ALPHABET: &[u8; 26] = b"23456789BCDFGHJKMNPQRTVWXY";

/// Codes rotate on this fixed interval.
pub const CODE_INTERVAL_SECS: u64 = 30;

pub const CODE_LENGTH: usize = 5;

/// Derive the guard code for a given (corrected) Unix timestamp.
///
/// Pure function of `(shared_secret, time / 30)`; the same step always
/// yields the same code.
pub fn code_for_time(shared_secret: &[u8], unix_time: u64) -> String {
    let counter = unix_time / CODE_INTERVAL_SECS;

    let mut mac =
        Hmac::<Sha1>::new_from_slice(shared_secret).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // Dynamic truncation: 4-byte window selected by the low nibble of the
    // final digest byte, top bit masked off.
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let mut value = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7fff_ffff;

    let mut code = String::with_capacity(CODE_LENGTH);
    for _ in 0..CODE_LENGTH {
        code.push(CODE_ALPHABET[(value % CODE_ALPHABET.len() as u32) as usize] as char);
        value /= CODE_ALPHABET.len() as u32;
    }
    code
}

/// Seconds left in the 30-second window containing `unix_time`.
pub fn seconds_until_rotation(unix_time: u64) -> u32 {
    (CODE_INTERVAL_SECS - unix_time % CODE_INTERVAL_SECS) as u32
}

/// Produces the current code for stored accounts, using clock-corrected time.
pub struct CodeGenerator<T: TimeEndpoint> {
    store: Arc<SecretStore>,
    clock: Arc<ClockSync<T>>,
}

impl<T: TimeEndpoint> CodeGenerator<T> {
    pub fn new(store: Arc<SecretStore>, clock: Arc<ClockSync<T>>) -> Self {
        Self { store, clock }
    }

    /// The code for the current corrected time step, with its remaining
    /// lifetime. Re-evaluates the clock on every call so a caller polling
    /// across a step boundary always sees the new step's code.
    pub async fn current_code(&self, id: &AccountId) -> Result<GuardCode, Error> {
        let account = self.store.get(id)?;
        let secrets = account
            .secrets
            .as_ref()
            .ok_or_else(|| Error::SecretsMissing(id.clone()))?;

        let now = self.clock.corrected_time().await;
        Ok(GuardCode {
            code: code_for_time(secrets.shared.as_bytes(), now),
            expires_in: seconds_until_rotation(now),
        })
    }
}
