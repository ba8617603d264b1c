//! Reaction proof verification.
//!
//! Policy first, cryptography second: a vulnerable circuit version is refused before its proof
//! bytes are even looked at, unknown versions are refused next, and only then is the proof
//! parsed and pairing-checked against the version's key. Every outcome is a [`Verdict`]; no
//! input can make verification fail with an error.

use ark_bn254::{Fq, Fq2, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_groth16::{prepare_verifying_key, PreparedVerifyingKey};
use common::{
    encoding::{field_from_be_bytes, field_to_be_bytes},
    CurvePoint, Snark, SnarkProof, E, EMOJI_SLOTS, F, FIELD_BYTES,
};
use std::{
    collections::{HashMap, HashSet},
    fmt,
};
use tracing::{debug, warn};

mod key;

pub use key::{KeyError, VerificationKey};

/// Proof blob width: A (64), B (128), C (64).
pub const PROOF_BYTES: usize = 256;

/// nullifier, message id, members root, author commitment, feed key (2), C1 (12), C2 (12).
pub const PUBLIC_INPUT_COUNT: usize = 4 + 2 + 4 * EMOJI_SLOTS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectCode {
    VulnerableCircuitVersion,
    UnknownCircuitVersion,
    InvalidProofFormat,
    InvalidProof,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::VulnerableCircuitVersion => "VULNERABLE_CIRCUIT_VERSION",
            RejectCode::UnknownCircuitVersion => "UNKNOWN_CIRCUIT_VERSION",
            RejectCode::InvalidProofFormat => "INVALID_PROOF_FORMAT",
            RejectCode::InvalidProof => "INVALID_PROOF",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectCode,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    AcceptWithWarning(String),
    Reject(Rejection),
}

impl Verdict {
    fn reject(code: RejectCode, message: impl Into<String>) -> Self {
        Verdict::Reject(Rejection {
            code,
            message: message.into(),
        })
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, Verdict::Reject(_))
    }

    pub fn reject_code(&self) -> Option<RejectCode> {
        match self {
            Verdict::Reject(r) => Some(r.code),
            _ => None,
        }
    }
}

/// The public statement of a reaction proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionPublicInputs {
    pub nullifier: F,
    pub message_id: F,
    pub members_root: F,
    pub author_commitment: F,
    pub feed_public_key: CurvePoint,
    pub c1: [CurvePoint; EMOJI_SLOTS],
    pub c2: [CurvePoint; EMOJI_SLOTS],
}

impl ReactionPublicInputs {
    /// The inputs in circuit order. The key's IC points are positional, so this order is part
    /// of every circuit version's contract.
    pub fn to_field_elements(&self) -> Vec<F> {
        let mut out = Vec::with_capacity(PUBLIC_INPUT_COUNT);
        out.extend([
            self.nullifier,
            self.message_id,
            self.members_root,
            self.author_commitment,
        ]);
        out.extend(self.feed_public_key.coordinates());
        out.extend(self.c1.iter().flat_map(CurvePoint::coordinates));
        out.extend(self.c2.iter().flat_map(CurvePoint::coordinates));
        out
    }
}

pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &[u8], inputs: &ReactionPublicInputs, circuit_version: &str)
        -> Verdict;

    fn current_version(&self) -> &str;

    fn is_version_supported(&self, circuit_version: &str) -> bool;

    fn is_vulnerable_version(&self, circuit_version: &str) -> bool;

    /// The verdict version policy alone forces, before any proof byte is read.
    fn policy_rejection(&self, circuit_version: &str) -> Option<Verdict> {
        if self.is_vulnerable_version(circuit_version) {
            return Some(Verdict::reject(
                RejectCode::VulnerableCircuitVersion,
                format!("circuit version {circuit_version} has a known vulnerability"),
            ));
        }
        if !self.is_version_supported(circuit_version) {
            return Some(Verdict::reject(
                RejectCode::UnknownCircuitVersion,
                format!("no verification key for circuit version {circuit_version}"),
            ));
        }
        None
    }
}

fn fq_at(bytes: &[u8], offset: usize) -> Option<Fq> {
    let word: &[u8; FIELD_BYTES] = bytes.get(offset..offset + FIELD_BYTES)?.try_into().ok()?;
    field_from_be_bytes(word)
}

/// All-zero coordinates encode the point at infinity.
fn g1_at(bytes: &[u8], offset: usize) -> Option<G1Affine> {
    let (x, y) = (fq_at(bytes, offset)?, fq_at(bytes, offset + FIELD_BYTES)?);
    if x == Fq::from(0u64) && y == Fq::from(0u64) {
        return Some(G1Affine::zero());
    }
    let p = G1Affine::new_unchecked(x, y);
    (p.is_on_curve() && p.is_in_correct_subgroup_assuming_on_curve()).then_some(p)
}

/// Coordinates are `x.c1 ‖ x.c0 ‖ y.c1 ‖ y.c0`.
fn g2_at(bytes: &[u8], offset: usize) -> Option<G2Affine> {
    let word = |i: usize| fq_at(bytes, offset + i * FIELD_BYTES);
    let x = Fq2::new(word(1)?, word(0)?);
    let y = Fq2::new(word(3)?, word(2)?);
    if x == Fq2::from(0u64) && y == Fq2::from(0u64) {
        return Some(G2Affine::zero());
    }
    let p = G2Affine::new_unchecked(x, y);
    (p.is_on_curve() && p.is_in_correct_subgroup_assuming_on_curve()).then_some(p)
}

/// Parses the fixed 256-byte proof layout, checking every point.
pub fn decode_proof(bytes: &[u8]) -> Option<SnarkProof> {
    if bytes.len() != PROOF_BYTES {
        return None;
    }
    Some(SnarkProof {
        a: g1_at(bytes, 0)?,
        b: g2_at(bytes, 64)?,
        c: g1_at(bytes, 192)?,
    })
}

fn put_g1(out: &mut Vec<u8>, p: &G1Affine) {
    match p.xy() {
        Some((x, y)) => {
            out.extend(field_to_be_bytes(&x));
            out.extend(field_to_be_bytes(&y));
        }
        None => out.extend([0u8; 2 * FIELD_BYTES]),
    }
}

/// Inverse of [`decode_proof`].
pub fn encode_proof(proof: &SnarkProof) -> Vec<u8> {
    let mut out = Vec::with_capacity(PROOF_BYTES);
    put_g1(&mut out, &proof.a);
    match proof.b.xy() {
        Some((x, y)) => {
            for c in [x.c1, x.c0, y.c1, y.c0] {
                out.extend(field_to_be_bytes(&c));
            }
        }
        None => out.extend([0u8; 4 * FIELD_BYTES]),
    }
    put_g1(&mut out, &proof.c);
    out
}

/// Pairing-checking verifier over BN254.
pub struct Groth16Verifier {
    current_version: String,
    keys: HashMap<String, PreparedVerifyingKey<E>>,
    deprecated: HashSet<String>,
    vulnerable: HashSet<String>,
}

impl Groth16Verifier {
    pub fn new(
        current_version: impl Into<String>,
        keys: impl IntoIterator<Item = VerificationKey>,
        deprecated: impl IntoIterator<Item = String>,
        vulnerable: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            current_version: current_version.into(),
            keys: keys
                .into_iter()
                .map(|k| (k.version, prepare_verifying_key(&k.vk)))
                .collect(),
            deprecated: deprecated.into_iter().collect(),
            vulnerable: vulnerable.into_iter().collect(),
        }
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(
        &self,
        proof: &[u8],
        inputs: &ReactionPublicInputs,
        circuit_version: &str,
    ) -> Verdict {
        if let Some(rejection) = self.policy_rejection(circuit_version) {
            warn!(circuit_version, ?rejection, "refused by version policy");
            return rejection;
        }
        let Some(pvk) = self.keys.get(circuit_version) else {
            return Verdict::reject(
                RejectCode::UnknownCircuitVersion,
                format!("no verification key for circuit version {circuit_version}"),
            );
        };
        let Some(proof) = decode_proof(proof) else {
            debug!(circuit_version, len = proof.len(), "malformed proof");
            return Verdict::reject(
                RejectCode::InvalidProofFormat,
                format!("proof must be {PROOF_BYTES} bytes of valid curve points"),
            );
        };

        match Snark::verify_proof(pvk, &proof, &inputs.to_field_elements()) {
            Ok(true) => {}
            Ok(false) => {
                return Verdict::reject(RejectCode::InvalidProof, "pairing check failed");
            }
            Err(e) => {
                warn!(circuit_version, error = %e, "verification key does not fit the inputs");
                return Verdict::reject(RejectCode::InvalidProof, e.to_string());
            }
        }

        if self.deprecated.contains(circuit_version) {
            return Verdict::AcceptWithWarning(format!(
                "circuit version {circuit_version} is deprecated, upgrade to {}",
                self.current_version
            ));
        }
        Verdict::Accept
    }

    fn current_version(&self) -> &str {
        &self.current_version
    }

    fn is_version_supported(&self, circuit_version: &str) -> bool {
        self.keys.contains_key(circuit_version) && !self.is_vulnerable_version(circuit_version)
    }

    fn is_vulnerable_version(&self, circuit_version: &str) -> bool {
        self.vulnerable.contains(circuit_version)
    }
}

/// Accepts every proof. Only for end-to-end runs without real circuits.
pub struct DevModeVerifier {
    current_version: String,
}

impl DevModeVerifier {
    pub fn new(current_version: impl Into<String>) -> Self {
        let current_version = current_version.into();
        warn!(%current_version, "DEV MODE VERIFIER ENABLED: reaction proofs are NOT checked");
        Self { current_version }
    }
}

impl ProofVerifier for DevModeVerifier {
    fn verify(&self, _: &[u8], _: &ReactionPublicInputs, circuit_version: &str) -> Verdict {
        warn!(circuit_version, "dev mode: accepting proof without verification");
        Verdict::AcceptWithWarning(
            "development verifier accepted this proof without checking it".to_string(),
        )
    }

    fn current_version(&self) -> &str {
        &self.current_version
    }

    fn is_version_supported(&self, _: &str) -> bool {
        true
    }

    fn is_vulnerable_version(&self, _: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ark_relations::{
        lc,
        r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError, Variable},
    };
    use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
    use ark_std::{
        rand::{rngs::StdRng, SeedableRng},
        UniformRand,
    };
    use common::{elgamal::encrypt_vote, elgamal::SecretKey, VK};
    use std::sync::OnceLock;

    /// Exposes exactly the reaction inputs and binds them to one witness, their sum.
    #[derive(Clone)]
    struct StatementCircuit {
        inputs: Vec<F>,
    }

    impl ConstraintSynthesizer<F> for StatementCircuit {
        fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
            let mut sum = lc!();
            let mut total = F::from(0u64);
            for x in self.inputs {
                let var = cs.new_input_variable(|| Ok(x))?;
                sum = sum + var;
                total += x;
            }
            let witness = cs.new_witness_variable(|| Ok(total))?;
            cs.enforce_constraint(sum, lc!() + Variable::One, lc!() + witness)?;
            Ok(())
        }
    }

    struct Fixture {
        pk: ark_groth16::ProvingKey<E>,
        vk: VK,
    }

    fn fixture() -> &'static Fixture {
        static FIXTURE: OnceLock<Fixture> = OnceLock::new();
        FIXTURE.get_or_init(|| {
            let mut rng = StdRng::seed_from_u64(7);
            let blank = StatementCircuit {
                inputs: vec![F::from(0u64); PUBLIC_INPUT_COUNT],
            };
            let (pk, vk) = Snark::circuit_specific_setup(blank, &mut rng).unwrap();
            Fixture { pk, vk }
        })
    }

    fn sample_inputs(rng: &mut StdRng) -> ReactionPublicInputs {
        let sk = SecretKey::generate(rng);
        let vote = encrypt_vote(&sk.public_key(), 3, rng).unwrap();
        ReactionPublicInputs {
            nullifier: F::rand(rng),
            message_id: F::rand(rng),
            members_root: F::rand(rng),
            author_commitment: F::rand(rng),
            feed_public_key: sk.public_key().0,
            c1: vote.c1(),
            c2: vote.c2(),
        }
    }

    fn prove(inputs: &ReactionPublicInputs, rng: &mut StdRng) -> Vec<u8> {
        let circuit = StatementCircuit {
            inputs: inputs.to_field_elements(),
        };
        let proof = Snark::prove(&fixture().pk, circuit, rng).unwrap();
        encode_proof(&proof)
    }

    fn verifier() -> Groth16Verifier {
        let key = |version: &str| VerificationKey {
            version: version.to_string(),
            vk: fixture().vk.clone(),
        };
        Groth16Verifier::new(
            "omega-v2",
            [key("omega-v2"), key("omega-v1"), key("omega-v0")],
            ["omega-v1".to_string()],
            ["omega-v0".to_string()],
        )
    }

    #[test]
    fn inputs_follow_circuit_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let fields = inputs.to_field_elements();
        assert_eq!(fields.len(), PUBLIC_INPUT_COUNT);
        assert_eq!(fields.len(), 30);
        assert_eq!(fields[0], inputs.nullifier);
        assert_eq!(fields[1], inputs.message_id);
        assert_eq!(fields[2], inputs.members_root);
        assert_eq!(fields[3], inputs.author_commitment);
        assert_eq!(fields[4..6], inputs.feed_public_key.coordinates());
        assert_eq!(fields[6], inputs.c1[0].x());
        assert_eq!(fields[7], inputs.c1[0].y());
        assert_eq!(fields[16], inputs.c1[5].x());
        assert_eq!(fields[18], inputs.c2[0].x());
        assert_eq!(fields[29], inputs.c2[5].y());
    }

    #[test]
    fn valid_proof_is_accepted() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let proof = prove(&inputs, &mut rng);
        assert_eq!(proof.len(), PROOF_BYTES);
        assert_eq!(verifier().verify(&proof, &inputs, "omega-v2"), Verdict::Accept);
    }

    #[test]
    fn proof_does_not_transfer_to_other_inputs() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let proof = prove(&inputs, &mut rng);

        let mut other_root = inputs.clone();
        other_root.members_root += F::from(1u64);
        assert_eq!(
            verifier().verify(&proof, &other_root, "omega-v2").reject_code(),
            Some(RejectCode::InvalidProof)
        );

        let mut swapped = inputs.clone();
        swapped.c1.swap(0, 1);
        assert_eq!(
            verifier().verify(&proof, &swapped, "omega-v2").reject_code(),
            Some(RejectCode::InvalidProof)
        );
    }

    #[test]
    fn deprecated_version_is_accepted_with_warning() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let proof = prove(&inputs, &mut rng);
        match verifier().verify(&proof, &inputs, "omega-v1") {
            Verdict::AcceptWithWarning(msg) => assert!(msg.contains("omega-v2")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn vulnerable_version_is_refused_before_parsing() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let v = verifier();
        // Garbage that would fail format checks if it were ever parsed.
        let verdict = v.verify(&[0xff; 3], &inputs, "omega-v0");
        assert_eq!(
            verdict.reject_code(),
            Some(RejectCode::VulnerableCircuitVersion)
        );
        // Even a valid proof is refused.
        let proof = prove(&inputs, &mut rng);
        assert_eq!(
            v.verify(&proof, &inputs, "omega-v0").reject_code(),
            Some(RejectCode::VulnerableCircuitVersion)
        );
        assert!(v.is_vulnerable_version("omega-v0"));
        assert!(!v.is_version_supported("omega-v0"));
    }

    #[test]
    fn unknown_version_is_refused() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let v = verifier();
        assert_eq!(
            v.verify(&[0u8; PROOF_BYTES], &inputs, "omega-v9").reject_code(),
            Some(RejectCode::UnknownCircuitVersion)
        );
        assert!(!v.is_version_supported("omega-v9"));
        assert!(v.is_version_supported("omega-v1"));
        assert_eq!(v.current_version(), "omega-v2");
    }

    #[test]
    fn malformed_proofs_are_format_errors() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let v = verifier();
        let proof = prove(&inputs, &mut rng);

        let mut long = proof.clone();
        long.push(0);
        for bad in [&proof[..255], long.as_slice()] {
            assert_eq!(
                v.verify(bad, &inputs, "omega-v2").reject_code(),
                Some(RejectCode::InvalidProofFormat)
            );
        }

        // A is no longer on the curve.
        let mut off_curve = proof.clone();
        off_curve[63] ^= 1;
        assert_eq!(
            v.verify(&off_curve, &inputs, "omega-v2").reject_code(),
            Some(RejectCode::InvalidProofFormat)
        );

        // Coordinate at or above the base field modulus.
        let mut non_canonical = proof;
        non_canonical[192..224].copy_from_slice(&[0xff; 32]);
        assert_eq!(
            v.verify(&non_canonical, &inputs, "omega-v2").reject_code(),
            Some(RejectCode::InvalidProofFormat)
        );
    }

    #[test]
    fn encoding_puts_g2_imaginary_part_first() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let bytes = prove(&inputs, &mut rng);
        let proof = decode_proof(&bytes).unwrap();
        let (x, _) = proof.b.xy().unwrap();
        assert_eq!(bytes[64..96], field_to_be_bytes(&x.c1));
        assert_eq!(bytes[96..128], field_to_be_bytes(&x.c0));
        assert_eq!(encode_proof(&proof), bytes);
    }

    #[test]
    fn dev_mode_accepts_anything_loudly() {
        let mut rng = StdRng::seed_from_u64(7);
        let inputs = sample_inputs(&mut rng);
        let v = DevModeVerifier::new("omega-v2");
        let verdict = v.verify(&[], &inputs, "whatever");
        assert!(matches!(verdict, Verdict::AcceptWithWarning(_)));
        assert!(verdict.is_accepted());
    }
}
