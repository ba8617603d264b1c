//! Fixed-width big-endian encodings.
//!
//! Storage rows, proof blobs and public inputs all assume exactly 32 bytes per field element,
//! left-zero-padded. Anything that crosses a boundary goes through these helpers.

use crate::FIELD_BYTES;
use ark_ff::{BigInt, BigInteger, PrimeField};

/// Serialize a field element as a 32-byte big-endian unsigned integer.
pub fn field_to_be_bytes<Fp: PrimeField<BigInt = BigInt<4>>>(value: &Fp) -> [u8; FIELD_BYTES] {
    let bytes = value.into_bigint().to_bytes_be();
    let mut out = [0u8; FIELD_BYTES];
    out[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Parse a canonical 32-byte big-endian field element.
///
/// Returns `None` when the integer is not below the modulus; callers that want reduction should
/// use [`PrimeField::from_be_bytes_mod_order`] instead.
pub fn field_from_be_bytes<Fp: PrimeField<BigInt = BigInt<4>>>(
    bytes: &[u8; FIELD_BYTES],
) -> Option<Fp> {
    let mut limbs = [0u64; 4];
    for (i, chunk) in bytes.chunks_exact(8).enumerate() {
        let word = <[u8; 8]>::try_from(chunk).ok()?;
        limbs[3 - i] = u64::from_be_bytes(word);
    }
    Fp::from_bigint(BigInt::new(limbs))
}

/// Parse a 32-byte hex string, with or without a `0x` prefix.
pub fn parse_hex32(s: &str) -> Result<[u8; FIELD_BYTES], hex::FromHexError> {
    let mut out = [0u8; FIELD_BYTES];
    hex::decode_to_slice(s.trim_start_matches("0x"), &mut out)?;
    Ok(out)
}

/// Serde adapter for `[u8; 32]` as a `0x`-prefixed hex string.
pub mod hex32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        super::parse_hex32(&s).map_err(D::Error::custom)
    }
}

/// Serde adapter for variable-length byte blobs as `0x`-prefixed hex.
pub mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim_start_matches("0x")).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::F;
    use ark_ff::{Field, UniformRand};
    use ark_std::test_rng;

    #[test]
    fn small_values_are_left_padded() {
        let bytes = field_to_be_bytes(&F::from(0x0102u64));
        assert_eq!(&bytes[..30], &[0u8; 30]);
        assert_eq!(&bytes[30..], &[0x01, 0x02]);
    }

    #[test]
    fn canonical_bytes_parse_back() {
        let mut rng = test_rng();
        for _ in 0..20 {
            let x = F::rand(&mut rng);
            assert_eq!(field_from_be_bytes::<F>(&field_to_be_bytes(&x)), Some(x));
        }
    }

    #[test]
    fn modulus_is_not_canonical() {
        // p - 1 is the largest canonical value; p itself must be refused.
        let max = -F::ONE;
        let mut bytes = field_to_be_bytes(&max);
        assert!(field_from_be_bytes::<F>(&bytes).is_some());
        bytes[31] = bytes[31].wrapping_add(1);
        assert!(field_from_be_bytes::<F>(&bytes).is_none());
        assert!(field_from_be_bytes::<F>(&[0xff; 32]).is_none());
    }

    #[test]
    fn hex_prefix_is_optional() {
        let a = parse_hex32(&format!("0x{}", "ab".repeat(32))).unwrap();
        let b = parse_hex32(&"ab".repeat(32)).unwrap();
        assert_eq!(a, b);
        assert!(parse_hex32("0x1234").is_err());
    }
}
