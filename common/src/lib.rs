//! Shared primitives for anonymous reactions.
//!
//! Everything here is pure: field and curve aliases, the Poseidon compression used by the
//! membership tree, the fixed-width encodings that storage and proofs agree on, and the key
//! derivation that turns a feed's symmetric key into reaction secrets.

use ark_groth16::{Groth16, Proof, VerifyingKey};

/// Scalar field of BN254. Also the base field of BabyJubJub, so every curve coordinate is a
/// valid public input.
pub type F = ark_bn254::Fr;
pub type E = ark_bn254::Bn254;

pub type Snark = Groth16<E>;

pub type VK = VerifyingKey<E>;
pub type SnarkProof = Proof<E>;

/// Number of emoji slots carried by every reaction.
pub const EMOJI_SLOTS: usize = 6;

/// Width of every serialized field element and coordinate.
pub const FIELD_BYTES: usize = 32;

pub mod curve;
pub mod elgamal;
pub mod encoding;
pub mod hash;
pub mod ids;
pub mod kdf;

pub use curve::{Ciphertext, CurveError, CurvePoint, EncryptedVote};
pub use hash::poseidon2;
pub use ids::{Commitment, FeedId, MessageId, Nullifier};
