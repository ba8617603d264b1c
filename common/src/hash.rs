use crate::F;
use ark_crypto_primitives::sponge::{
    poseidon::{find_poseidon_ark_and_mds, PoseidonConfig, PoseidonDefaultConfigEntry, PoseidonSponge},
    CryptographicSponge,
};
use ark_ff::PrimeField;
use std::sync::OnceLock;

// Round parameters for the non-weight-optimized arkworks Poseidon family, following
//     https://github.com/arkworks-rs/crypto-primitives/blob/54b3ac24b8943fbd984863558c749997e96ff399/src/sponge/poseidon/traits.rs#L69
const PARAMS_SET: [PoseidonDefaultConfigEntry; 3] = [
    PoseidonDefaultConfigEntry::new(2, 17, 8, 31, 0),
    PoseidonDefaultConfigEntry::new(3, 5, 8, 56, 0),
    PoseidonDefaultConfigEntry::new(4, 5, 8, 56, 0),
];

/// Generates Poseidon parameters with the given rate and capacity 1.
///
/// Returns `None` for rates outside the supported set.
pub fn gen_poseidon_params<Fp: PrimeField>(rate: usize) -> Option<PoseidonConfig<Fp>> {
    PARAMS_SET
        .iter()
        .find(|p| p.rate == rate)
        .map(params_for)
}

fn params_for<Fp: PrimeField>(param: &PoseidonDefaultConfigEntry) -> PoseidonConfig<Fp> {
    let (ark, mds) = find_poseidon_ark_and_mds::<Fp>(
        Fp::MODULUS_BIT_SIZE as u64,
        param.rate,
        param.full_rounds as u64,
        param.partial_rounds as u64,
        param.skip_matrices as u64,
    );

    PoseidonConfig {
        full_rounds: param.full_rounds,
        partial_rounds: param.partial_rounds,
        alpha: param.alpha as u64,
        ark,
        mds,
        rate: param.rate,
        capacity: 1,
    }
}

/// The 2-ary compression used for every Merkle node.
pub fn poseidon2(left: F, right: F) -> F {
    static RATE_2: OnceLock<PoseidonConfig<F>> = OnceLock::new();
    let config = RATE_2.get_or_init(|| params_for(&PARAMS_SET[0]));
    let mut sponge = PoseidonSponge::<F>::new(config);
    sponge.absorb(&vec![left, right]);
    sponge.squeeze_field_elements::<F>(1)[0]
}
