//! Confirmation-request signing.
//!
//! Every confirmation call carries an HMAC-SHA1 signature over the corrected
//! timestamp and a short operation tag, keyed by the account's identity
//! secret. The tag strings are the live service's accepted values; they are
//! not a free choice. Signatures are tied to the timestamp they embed and
//! are computed fresh per request, never cached.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Operation class of a signed confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationTag {
    /// Fetch the pending list.
    List,
    /// Accept one confirmation.
    Accept,
    /// Deny one confirmation.
    Deny,
}

impl ConfirmationTag {
    /// The wire value, also used as the `op` parameter for accept/deny.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "conf",
            Self::Accept => "allow",
            Self::Deny => "cancel",
        }
    }

    pub fn for_response(accept: bool) -> Self {
        if accept {
            Self::Accept
        } else {
            Self::Deny
        }
    }
}

/// A time-bound authorization token for one confirmation-API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub device_id: String,
    pub time: u64,
    pub signature: String,
    pub tag: ConfirmationTag,
}

/// Sign a confirmation request: base64 of HMAC-SHA1 over the 8-byte
/// big-endian timestamp followed by the tag's UTF-8 bytes.
pub fn sign_confirmation_request(
    identity_secret: &[u8],
    device_id: &str,
    tag: ConfirmationTag,
    time: u64,
) -> SignedRequest {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(identity_secret).expect("HMAC accepts any key length");
    mac.update(&time.to_be_bytes());
    mac.update(tag.as_str().as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    SignedRequest {
        device_id: device_id.to_string(),
        time,
        signature,
        tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DEVICE_ID: &str = "android:00000000-1111-2222-3333-444444444444";

    fn vector_secret() -> Vec<u8> {
        STANDARD.decode("GQP46b73Ws7gr8GmZFR0sDuau5c=").unwrap()
    }

    #[test]
    fn test_known_vector() {
        // Published vector for the list tag.
        let signed = sign_confirmation_request(
            &vector_secret(),
            DEVICE_ID,
            ConfirmationTag::List,
            1_617_591_917,
        );
        assert_eq!(signed.signature, "NaL8EIMhfy/7vBounJ0CvpKbrPk=");
        assert_eq!(signed.time, 1_617_591_917);
        assert_eq!(signed.device_id, DEVICE_ID);
    }

    #[test]
    fn test_deterministic() {
        let a = sign_confirmation_request(
            &vector_secret(),
            DEVICE_ID,
            ConfirmationTag::Accept,
            1_617_591_917,
        );
        let b = sign_confirmation_request(
            &vector_secret(),
            DEVICE_ID,
            ConfirmationTag::Accept,
            1_617_591_917,
        );
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn test_distinct_tags_distinct_signatures() {
        let tags = [
            ConfirmationTag::List,
            ConfirmationTag::Accept,
            ConfirmationTag::Deny,
        ];
        let signatures: Vec<String> = tags
            .iter()
            .map(|&tag| {
                sign_confirmation_request(&vector_secret(), DEVICE_ID, tag, 1_617_591_917)
                    .signature
            })
            .collect();

        assert_ne!(signatures[0], signatures[1]);
        assert_ne!(signatures[0], signatures[2]);
        assert_ne!(signatures[1], signatures[2]);
    }

    #[test]
    fn test_time_changes_signature() {
        let a = sign_confirmation_request(
            &vector_secret(),
            DEVICE_ID,
            ConfirmationTag::List,
            1_617_591_917,
        );
        let b = sign_confirmation_request(
            &vector_secret(),
            DEVICE_ID,
            ConfirmationTag::List,
            1_617_591_918,
        );
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn test_secret_changes_signature() {
        let other = [0x42u8; 20];
        let a = sign_confirmation_request(
            &vector_secret(),
            DEVICE_ID,
            ConfirmationTag::List,
            1_617_591_917,
        );
        let b =
            sign_confirmation_request(&other, DEVICE_ID, ConfirmationTag::List, 1_617_591_917);
        assert_ne!(a.signature, b.signature);
    }

    #[rstest]
    #[case(ConfirmationTag::List, "conf")]
    #[case(ConfirmationTag::Accept, "allow")]
    #[case(ConfirmationTag::Deny, "cancel")]
    fn test_tag_wire_values(#[case] tag: ConfirmationTag, #[case] expected: &str) {
        assert_eq!(tag.as_str(), expected);
    }

    #[test]
    fn test_for_response() {
        assert_eq!(ConfirmationTag::for_response(true), ConfirmationTag::Accept);
        assert_eq!(ConfirmationTag::for_response(false), ConfirmationTag::Deny);
    }
}
