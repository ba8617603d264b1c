//! Identifiers shared by every layer.
//!
//! Feed and message ids, and nullifiers, are opaque 32-byte values produced by the chain and by
//! the reaction circuit. They render and serialize as `0x`-prefixed hex.

use crate::{
    encoding::{field_from_be_bytes, field_to_be_bytes, hex32, parse_hex32},
    hash::poseidon2,
    F, FIELD_BYTES,
};
use ark_ff::{AdditiveGroup, PrimeField};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

macro_rules! bytes32_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "hex32")] pub [u8; FIELD_BYTES]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; FIELD_BYTES] {
                &self.0
            }

            /// The id as a field element; `None` unless the bytes are a canonical encoding.
            ///
            /// Ids at or above the modulus would alias a smaller id inside the circuit.
            pub fn to_field(&self) -> Option<F> {
                field_from_be_bytes(&self.0)
            }
        }

        impl From<[u8; FIELD_BYTES]> for $name {
            fn from(bytes: [u8; FIELD_BYTES]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex32(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

bytes32_id!(
    /// A group feed on the chain.
    FeedId
);
bytes32_id!(
    /// A message within a feed.
    MessageId
);
bytes32_id!(
    /// Circuit-derived tag, stable per (member, message) and unlinkable across messages.
    Nullifier
);

/// A member's identity commitment: a leaf of the feed's membership tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Commitment(pub F);

impl Commitment {
    pub fn to_bytes(&self) -> [u8; FIELD_BYTES] {
        field_to_be_bytes(&self.0)
    }

    /// Parses a canonical big-endian commitment; `None` if it is not a field element.
    pub fn from_bytes(bytes: &[u8; FIELD_BYTES]) -> Option<Self> {
        field_from_be_bytes(bytes).map(Self)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self)
    }
}

impl Serialize for Commitment {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        hex32::serialize(&self.to_bytes(), s)
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let bytes = hex32::deserialize(d)?;
        Commitment::from_bytes(&bytes)
            .ok_or_else(|| serde::de::Error::custom("commitment is not a canonical field element"))
    }
}

/// Commitment for a member identified only by their chain address.
///
/// `Poseidon2(SHA-256(address) mod p, 0)`. Deterministic, so a rejoining or unbanned member
/// lands on their original leaf.
pub fn derive_address_commitment(address: &str) -> Commitment {
    let digest = Sha256::digest(address.as_bytes());
    let seed = F::from_be_bytes_mod_order(&digest);
    Commitment(poseidon2(seed, F::ZERO))
}

#[cfg(test)]
mod test {
    use super::*;
    use ark_ff::Field;

    #[test]
    fn ids_render_and_parse_as_hex() {
        let id = MessageId([0xab; 32]);
        let rendered = id.to_string();
        assert!(rendered.starts_with("0xabab"));
        assert_eq!(rendered.parse::<MessageId>().unwrap(), id);
    }

    #[test]
    fn ids_serialize_as_hex_strings() {
        let n = Nullifier([7; 32]);
        let json = serde_json::to_string(&n).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "07".repeat(32)));
        assert_eq!(serde_json::from_str::<Nullifier>(&json).unwrap(), n);
    }

    #[test]
    fn ids_at_or_above_the_modulus_have_no_field_value() {
        let small = Nullifier([0x07; 32]);
        assert!(small.to_field().is_some());

        let modulus = field_to_be_bytes(&(F::ZERO - F::ONE));
        let mut alias = modulus;
        alias[31] = alias[31].wrapping_add(1); // p itself, aliases zero
        assert_eq!(Nullifier(alias).to_field(), None);
        assert_eq!(MessageId([0xff; 32]).to_field(), None);
        assert_eq!(Nullifier(modulus).to_field(), Some(F::ZERO - F::ONE));
    }

    #[test]
    fn address_commitment_is_stable_per_address() {
        let a = derive_address_commitment("omega1qx9alice");
        assert_eq!(a, derive_address_commitment("omega1qx9alice"));
        assert_ne!(a, derive_address_commitment("omega1qx9bob"));
    }

    #[test]
    fn commitment_round_trips_through_json() {
        let c = derive_address_commitment("omega1qx9carol");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(serde_json::from_str::<Commitment>(&json).unwrap(), c);
        assert!(serde_json::from_str::<Commitment>(&format!("\"0x{}\"", "ff".repeat(32))).is_err());
    }
}
