//! BabyJubJub points and the additive ElGamal ciphertexts built from them.
//!
//! Points are kept in affine twisted-Edwards form. On the wire and in storage each point is a
//! pair of 32-byte big-endian coordinates, and the identity is `(0, 1)`.

use crate::{
    encoding::{field_from_be_bytes, field_to_be_bytes, hex32},
    EMOJI_SLOTS, F, FIELD_BYTES,
};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, EdwardsProjective};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Add, Neg, Sub},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("coordinate is not a canonical field element")]
    NonCanonicalCoordinate,
    #[error("point is not on the curve")]
    NotOnCurve,
}

/// An affine BabyJubJub point.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurvePoint(pub EdwardsAffine);

impl CurvePoint {
    /// The group identity, `(0, 1)`.
    pub fn identity() -> Self {
        Self(EdwardsAffine::zero())
    }

    pub fn generator() -> Self {
        Self(EdwardsAffine::generator())
    }

    pub fn is_identity(&self) -> bool {
        self.0.is_zero()
    }

    pub fn x(&self) -> F {
        self.0.x
    }

    pub fn y(&self) -> F {
        self.0.y
    }

    /// Builds a point from coordinates, refusing anything off the curve.
    pub fn from_xy(x: F, y: F) -> Result<Self, CurveError> {
        let point = EdwardsAffine::new_unchecked(x, y);
        if !point.is_on_curve() {
            return Err(CurveError::NotOnCurve);
        }
        Ok(Self(point))
    }

    pub fn from_bytes(
        x: &[u8; FIELD_BYTES],
        y: &[u8; FIELD_BYTES],
    ) -> Result<Self, CurveError> {
        let x = field_from_be_bytes(x).ok_or(CurveError::NonCanonicalCoordinate)?;
        let y = field_from_be_bytes(y).ok_or(CurveError::NonCanonicalCoordinate)?;
        Self::from_xy(x, y)
    }

    pub fn to_bytes(&self) -> ([u8; FIELD_BYTES], [u8; FIELD_BYTES]) {
        (field_to_be_bytes(&self.0.x), field_to_be_bytes(&self.0.y))
    }

    /// `[x, y]`, the order in which points enter public inputs.
    pub fn coordinates(&self) -> [F; 2] {
        [self.0.x, self.0.y]
    }
}

impl Default for CurvePoint {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<EdwardsProjective> for CurvePoint {
    fn from(p: EdwardsProjective) -> Self {
        Self(p.into_affine())
    }
}

impl Add for CurvePoint {
    type Output = CurvePoint;

    fn add(self, rhs: CurvePoint) -> CurvePoint {
        (self.0.into_group() + rhs.0).into()
    }
}

impl Sub for CurvePoint {
    type Output = CurvePoint;

    fn sub(self, rhs: CurvePoint) -> CurvePoint {
        (self.0.into_group() - rhs.0).into()
    }
}

impl Neg for CurvePoint {
    type Output = CurvePoint;

    fn neg(self) -> CurvePoint {
        Self(-self.0)
    }
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_bytes();
        write!(f, "CurvePoint(0x{}, 0x{})", hex::encode(x), hex::encode(y))
    }
}

#[derive(Serialize, Deserialize)]
struct PointRepr {
    #[serde(with = "hex32")]
    x: [u8; FIELD_BYTES],
    #[serde(with = "hex32")]
    y: [u8; FIELD_BYTES],
}

impl Serialize for CurvePoint {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let (x, y) = self.to_bytes();
        PointRepr { x, y }.serialize(s)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let repr = PointRepr::deserialize(d)?;
        CurvePoint::from_bytes(&repr.x, &repr.y).map_err(serde::de::Error::custom)
    }
}

/// An additive ElGamal ciphertext `(C1, C2)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ciphertext {
    pub c1: CurvePoint,
    pub c2: CurvePoint,
}

impl Ciphertext {
    pub fn identity() -> Self {
        Self {
            c1: CurvePoint::identity(),
            c2: CurvePoint::identity(),
        }
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: self.c1 + rhs.c1,
            c2: self.c2 + rhs.c2,
        }
    }
}

impl Sub for Ciphertext {
    type Output = Ciphertext;

    fn sub(self, rhs: Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: self.c1 - rhs.c1,
            c2: self.c2 - rhs.c2,
        }
    }
}

/// One ciphertext per emoji slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptedVote(pub [Ciphertext; EMOJI_SLOTS]);

impl EncryptedVote {
    /// Every slot at the identity: the additive zero for tallies.
    pub fn identity() -> Self {
        Self([Ciphertext::identity(); EMOJI_SLOTS])
    }

    /// Builds a vote from separate C1 and C2 arrays, as they arrive on the wire.
    pub fn from_parts(c1: [CurvePoint; EMOJI_SLOTS], c2: [CurvePoint; EMOJI_SLOTS]) -> Self {
        Self(std::array::from_fn(|i| Ciphertext {
            c1: c1[i],
            c2: c2[i],
        }))
    }

    pub fn c1(&self) -> [CurvePoint; EMOJI_SLOTS] {
        std::array::from_fn(|i| self.0[i].c1)
    }

    pub fn c2(&self) -> [CurvePoint; EMOJI_SLOTS] {
        std::array::from_fn(|i| self.0[i].c2)
    }
}

impl Add for EncryptedVote {
    type Output = EncryptedVote;

    fn add(self, rhs: EncryptedVote) -> EncryptedVote {
        Self(std::array::from_fn(|i| self.0[i] + rhs.0[i]))
    }
}

impl Sub for EncryptedVote {
    type Output = EncryptedVote;

    fn sub(self, rhs: EncryptedVote) -> EncryptedVote {
        Self(std::array::from_fn(|i| self.0[i] - rhs.0[i]))
    }
}
