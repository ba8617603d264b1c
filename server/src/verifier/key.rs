//! Verification keys: snarkjs `verification_key.json` import and a binary cache.

use crate::verifier::PUBLIC_INPUT_COUNT;
use ark_bn254::{Fq, Fq2, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_serialize::{
    CanonicalDeserialize, CanonicalSerialize, Compress, SerializationError, Validate,
};
use common::VK;
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    str::FromStr,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("reading verification key: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing verification key json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary verification key: {0}")]
    Serialization(#[from] SerializationError),
    #[error("{0} is not a canonical decimal field element")]
    Coordinate(String),
    #[error("{0} is not a valid curve point")]
    Point(&'static str),
    #[error("key has {actual} IC points, the reaction circuit needs {expected}")]
    InputCount { expected: usize, actual: usize },
}

/// A Groth16 verification key bound to the circuit version it verifies.
#[derive(Clone, Debug, PartialEq, CanonicalSerialize, CanonicalDeserialize)]
pub struct VerificationKey {
    pub version: String,
    pub vk: VK,
}

#[derive(Deserialize)]
struct SnarkjsKey {
    vk_alpha_1: Vec<String>,
    vk_beta_2: Vec<Vec<String>>,
    vk_gamma_2: Vec<Vec<String>>,
    vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    ic: Vec<Vec<String>>,
}

fn fq(s: &str) -> Result<Fq, KeyError> {
    Fq::from_str(s).map_err(|_| KeyError::Coordinate(s.to_string()))
}

/// Projective `[x, y, z]`; `z = 0` is the point at infinity.
fn g1(coords: &[String], what: &'static str) -> Result<G1Affine, KeyError> {
    let [x, y, z] = coords else {
        return Err(KeyError::Point(what));
    };
    if z == "0" {
        return Ok(G1Affine::zero());
    }
    let point = G1Affine::new_unchecked(fq(x)?, fq(y)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(KeyError::Point(what));
    }
    Ok(point)
}

fn fq2(pair: &[String], what: &'static str) -> Result<Fq2, KeyError> {
    let [c0, c1] = pair else {
        return Err(KeyError::Point(what));
    };
    Ok(Fq2::new(fq(c0)?, fq(c1)?))
}

/// `[[x.c0, x.c1], [y.c0, y.c1], [z.c0, z.c1]]`.
fn g2(coords: &[Vec<String>], what: &'static str) -> Result<G2Affine, KeyError> {
    let [x, y, z] = coords else {
        return Err(KeyError::Point(what));
    };
    if z.iter().all(|c| c == "0") {
        return Ok(G2Affine::zero());
    }
    let point = G2Affine::new_unchecked(fq2(x, what)?, fq2(y, what)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(KeyError::Point(what));
    }
    Ok(point)
}

impl VerificationKey {
    /// Parses a snarkjs verification key. The key must carry one IC point per public input
    /// plus the constant term.
    pub fn from_snarkjs_json(version: impl Into<String>, json: &str) -> Result<Self, KeyError> {
        let raw: SnarkjsKey = serde_json::from_str(json)?;
        let gamma_abc_g1 = raw
            .ic
            .iter()
            .map(|p| g1(p, "IC"))
            .collect::<Result<Vec<_>, _>>()?;
        if gamma_abc_g1.len() != PUBLIC_INPUT_COUNT + 1 {
            return Err(KeyError::InputCount {
                expected: PUBLIC_INPUT_COUNT + 1,
                actual: gamma_abc_g1.len(),
            });
        }

        Ok(Self {
            version: version.into(),
            vk: VK {
                alpha_g1: g1(&raw.vk_alpha_1, "vk_alpha_1")?,
                beta_g2: g2(&raw.vk_beta_2, "vk_beta_2")?,
                gamma_g2: g2(&raw.vk_gamma_2, "vk_gamma_2")?,
                delta_g2: g2(&raw.vk_delta_2, "vk_delta_2")?,
                gamma_abc_g1,
            },
        })
    }

    /// Loads a key file: `.bin` files are the binary cache, anything else is snarkjs json.
    pub fn load(version: &str, path: &Path) -> Result<Self, KeyError> {
        if path.extension().is_some_and(|ext| ext == "bin") {
            let key = Self::read_cache(path)?;
            if key.version != version {
                warn!(
                    expected = version,
                    found = %key.version,
                    path = %path.display(),
                    "cached key was written for another version"
                );
            }
            return Ok(Self {
                version: version.to_string(),
                ..key
            });
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_snarkjs_json(version, &json)
    }

    pub fn write_cache(&self, path: &Path) -> Result<(), KeyError> {
        let mut file = BufWriter::new(File::create(path)?);
        self.serialize_uncompressed(&mut file)?;
        file.flush()?;
        Ok(())
    }

    pub fn read_cache(path: &Path) -> Result<Self, KeyError> {
        let file = File::open(path)?;
        let key = Self::deserialize_with_mode(file, Compress::No, Validate::Yes)?;
        if key.vk.gamma_abc_g1.len() != PUBLIC_INPUT_COUNT + 1 {
            return Err(KeyError::InputCount {
                expected: PUBLIC_INPUT_COUNT + 1,
                actual: key.vk.gamma_abc_g1.len(),
            });
        }
        Ok(key)
    }
}
