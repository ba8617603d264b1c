//! Exponential ElGamal on BabyJubJub.
//!
//! A vote for emoji `k` encrypts `1` in slot `k` and `0` everywhere else, so summing ciphertexts
//! sums the counts. Decryption recovers `m·G`, and the count is found by a bounded search.

use crate::{Ciphertext, CurvePoint, EncryptedVote, EMOJI_SLOTS};
use ark_ec::AffineRepr;
use ark_ed_on_bn254::{EdwardsAffine, Fr as Scalar};
use ark_ff::UniformRand;
use rand::{CryptoRng, RngCore};

#[derive(Clone)]
pub struct SecretKey(Scalar);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(pub CurvePoint);

impl SecretKey {
    pub fn generate(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        Self(Scalar::rand(rng))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey((EdwardsAffine::generator() * self.0).into())
    }

    /// Returns `m·G` for the plaintext `m`.
    pub fn decrypt_point(&self, ct: &Ciphertext) -> CurvePoint {
        let shared: CurvePoint = (ct.c1.0 * self.0).into();
        ct.c2 - shared
    }

    /// Recovers a small plaintext, or `None` if it exceeds `max`.
    pub fn decrypt_count(&self, ct: &Ciphertext, max: u64) -> Option<u64> {
        let target = self.decrypt_point(ct);
        let g = CurvePoint::generator();
        let mut acc = CurvePoint::identity();
        for m in 0..=max {
            if acc == target {
                return Some(m);
            }
            acc = acc + g;
        }
        None
    }
}

/// Encrypts `m` under `pk` with fresh randomness.
pub fn encrypt(pk: &PublicKey, m: u64, rng: &mut (impl CryptoRng + RngCore)) -> Ciphertext {
    let r = Scalar::rand(rng);
    let g = EdwardsAffine::generator();
    let c1: CurvePoint = (g * r).into();
    let shared: CurvePoint = (pk.0 .0 * r).into();
    let message: CurvePoint = (g * Scalar::from(m)).into();
    Ciphertext {
        c1,
        c2: message + shared,
    }
}

/// Encrypts a one-hot vote for `emoji`. Returns `None` if the slot does not exist.
pub fn encrypt_vote(
    pk: &PublicKey,
    emoji: usize,
    rng: &mut (impl CryptoRng + RngCore),
) -> Option<EncryptedVote> {
    if emoji >= EMOJI_SLOTS {
        return None;
    }
    let mut slots = [Ciphertext::identity(); EMOJI_SLOTS];
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot = encrypt(pk, u64::from(i == emoji), rng);
    }
    Some(EncryptedVote(slots))
}
