//! Reaction secrets derived from a feed's shared symmetric key.
//!
//! HKDF-SHA256 with the feed or message id as salt and a fixed context string per purpose.

use crate::{FeedId, MessageId, F, FIELD_BYTES};
use ark_ff::PrimeField;
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

/// Length of a feed's symmetric key.
pub const FEED_KEY_LEN: usize = 32;

const REACTION_KEY_INFO: &[u8] = b"omega/reactions/message-key/v1";
const FEED_SECRET_INFO: &[u8] = b"omega/reactions/feed-secret/v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyDerivationError {
    #[error("feed key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("hkdf expansion failed")]
    Expand,
}

fn derive(
    feed_key: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<[u8; FIELD_BYTES], KeyDerivationError> {
    if feed_key.len() != FEED_KEY_LEN {
        return Err(KeyDerivationError::InvalidKeyLength {
            expected: FEED_KEY_LEN,
            actual: feed_key.len(),
        });
    }
    let hk = Hkdf::<Sha256>::new(Some(salt), feed_key);
    let mut okm = [0u8; FIELD_BYTES];
    hk.expand(info, &mut okm).map_err(|_| KeyDerivationError::Expand)?;
    Ok(okm)
}

/// Per-message reaction key.
pub fn derive_reaction_key(
    feed_key: &[u8],
    message_id: &MessageId,
) -> Result<[u8; FIELD_BYTES], KeyDerivationError> {
    derive(feed_key, message_id.as_bytes(), REACTION_KEY_INFO)
}

/// Per-feed secret.
pub fn derive_feed_secret(
    feed_key: &[u8],
    feed_id: &FeedId,
) -> Result<[u8; FIELD_BYTES], KeyDerivationError> {
    derive(feed_key, feed_id.as_bytes(), FEED_SECRET_INFO)
}

/// Maps a derived secret into the scalar field, for use as a circuit witness.
pub fn secret_to_field(secret: &[u8; FIELD_BYTES]) -> F {
    F::from_be_bytes_mod_order(secret)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reaction_key_is_deterministic() {
        let key = [9u8; 32];
        let msg = MessageId([1; 32]);
        assert_eq!(
            derive_reaction_key(&key, &msg).unwrap(),
            derive_reaction_key(&key, &msg).unwrap()
        );
    }

    #[test]
    fn reaction_key_depends_on_key_and_message() {
        let base = derive_reaction_key(&[9u8; 32], &MessageId([1; 32])).unwrap();
        assert_ne!(base, derive_reaction_key(&[8u8; 32], &MessageId([1; 32])).unwrap());
        assert_ne!(base, derive_reaction_key(&[9u8; 32], &MessageId([2; 32])).unwrap());
    }

    #[test]
    fn purposes_are_domain_separated() {
        // Same key and same 32 id bytes, different context string.
        let key = [3u8; 32];
        let reaction = derive_reaction_key(&key, &MessageId([5; 32])).unwrap();
        let feed = derive_feed_secret(&key, &FeedId([5; 32])).unwrap();
        assert_ne!(reaction, feed);
    }

    #[test]
    fn secrets_reduce_into_the_field() {
        let secret = derive_feed_secret(&[1u8; 32], &FeedId([2; 32])).unwrap();
        assert_eq!(secret_to_field(&secret), secret_to_field(&secret));
        // All-ones is above the modulus and wraps.
        assert_eq!(
            secret_to_field(&[0xff; 32]),
            F::from_be_bytes_mod_order(&[0xff; 32])
        );
        assert_ne!(secret_to_field(&[0xff; 32]), F::from(0u64));
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        for len in [0usize, 16, 31, 33, 64] {
            let key = vec![0u8; len];
            assert_eq!(
                derive_feed_secret(&key, &FeedId::default()),
                Err(KeyDerivationError::InvalidKeyLength {
                    expected: 32,
                    actual: len
                })
            );
        }
    }
}
