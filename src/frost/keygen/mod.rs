// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! FROST distributed key generation.
//!
//! # High-level protocol description
//! Short-circuited CMP key generation without the Paillier machinery, run in
//! three rounds:
//! - Round one samples a random identifier and chain key (committed as a
//!   hash digest), a degree-`t` VSS polynomial, and a Schnorr proof over its
//!   constant coefficient, then broadcasts the polynomial, the proof, and
//!   the commitment.
//! - Round two verifies each peer's Schnorr proof against a peer-bound
//!   transcript hash and imports the polynomial; once all have arrived it
//!   opens the commitment and sends each peer its share `fᵢ(j)`.
//! - Round three verifies each received share against the sender's public
//!   polynomial in the exponent, sums shares into the signing share, and
//!   combines the public polynomials into the group key.

mod round1;
mod round2;
mod round3;

use std::sync::Arc;

use crate::{
    curve::SchnorrCurve,
    errors::Result,
    frost::Config,
    hash::{Commitment, Decommitment},
    keys::KeyPair,
    keystore::{Keystore, TypedStore},
    pool::Pool,
    protocol::{Identifier, PartyId, SessionConfig, SessionHelper},
    rid::Rid,
    round::Driver,
    vss::{ExponentPolynomial, Polynomial, Share},
};

pub(crate) const PROTOCOL: &str = "frost/keygen";
pub(crate) const FINAL_ROUND: u8 = 3;

pub(crate) use crate::cmp::keygen::attribute;

/// The key managers backing one key-generation session.
#[derive(Debug, Clone)]
pub(crate) struct Stores<C: SchnorrCurve> {
    pub(crate) ec: TypedStore<KeyPair<C>>,
    pub(crate) vss_secret: TypedStore<Polynomial<C>>,
    pub(crate) vss_public: TypedStore<ExponentPolynomial<C>>,
    pub(crate) shares: TypedStore<Share<C>>,
    pub(crate) rid: TypedStore<Rid>,
    pub(crate) chain_key: TypedStore<Rid>,
    pub(crate) commitments: TypedStore<Commitment>,
    pub(crate) decommitments: TypedStore<Decommitment>,
}

impl<C: SchnorrCurve> Stores<C> {
    fn new(backend: Arc<dyn Keystore>) -> Self {
        Self {
            ec: TypedStore::new(backend.clone(), "frost.keygen.ec"),
            vss_secret: TypedStore::new(backend.clone(), "frost.keygen.vss"),
            vss_public: TypedStore::new(backend.clone(), "frost.keygen.vss"),
            shares: TypedStore::new(backend.clone(), "frost.keygen.vss"),
            rid: TypedStore::new(backend.clone(), "frost.keygen.rid"),
            chain_key: TypedStore::new(backend.clone(), "frost.keygen.chainkey"),
            commitments: TypedStore::new(backend.clone(), "frost.keygen.commitment"),
            decommitments: TypedStore::new(backend, "frost.keygen.commitment"),
        }
    }
}

/// Build a key-generation session for one participant.
pub fn new_session<C: SchnorrCurve>(
    sid: Identifier,
    config: SessionConfig,
    backend: Arc<dyn Keystore>,
    pool: Arc<Pool>,
) -> Result<Driver<Config<C>>> {
    let helper = SessionHelper::<C>::new(PROTOCOL, sid, config, FINAL_ROUND, pool)?;
    let self_id = helper.self_id().clone();
    let party_ids = helper.party_ids().to_vec();
    let stores = Stores::new(backend);
    Ok(Driver::new(
        PROTOCOL,
        sid,
        self_id,
        party_ids,
        Box::new(round1::Round1 { helper, stores }),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        curve::{CurveTrait, ScalarTrait},
        ed25519::Ed25519,
        keystore::InMemoryKeystore,
        round::sim::Simulation,
        utils::testing::init_testing,
    };
    use rand::{CryptoRng, RngCore};

    /// Run FROST keygen to completion over edwards25519.
    pub(crate) fn run_keygen<R: RngCore + CryptoRng>(
        rng: &mut R,
        names: &[&str],
        threshold: usize,
    ) -> Vec<(PartyId, Config<Ed25519>)> {
        let sid = Identifier::random(rng);
        let party_ids: Vec<PartyId> = names.iter().map(|n| PartyId::from(*n)).collect();
        let pool = Arc::new(Pool::global());

        let drivers = party_ids
            .iter()
            .map(|id| {
                let config = SessionConfig::new(id.clone(), &party_ids, threshold).unwrap();
                let driver =
                    new_session::<Ed25519>(sid, config, InMemoryKeystore::new(), pool.clone())
                        .unwrap();
                (id.clone(), driver)
            })
            .collect();
        let mut sim = Simulation::new(drivers);
        sim.run(rng).unwrap();
        sim.outputs()
    }

    #[test]
    fn three_party_keygen_satisfies_the_feldman_checks() {
        let mut rng = init_testing();
        let outputs = run_keygen(&mut rng, &["a", "b", "c"], 1);
        assert_eq!(outputs.len(), 3);

        let reference = &outputs[0].1;
        for (party, config) in &outputs {
            assert_eq!(config.public_key(), reference.public_key());
            assert_eq!(config.rid(), reference.rid());
            assert_eq!(config.chain_key(), reference.chain_key());
            assert_eq!(config.public_shares(), reference.public_shares());

            // Each share matches the summed exponent polynomial's evaluation,
            // which is exactly the published public share.
            let expected = Ed25519::generator_mul(config.secret_share());
            assert_eq!(config.public_share(party).unwrap(), &expected);
        }

        // Shares recombine to the group secret's public point.
        let parties: Vec<PartyId> = outputs.iter().map(|(p, _)| p.clone()).collect();
        let points: Vec<_> = parties.iter().map(Ed25519::scalar_from_id).collect();
        let mut recombined = Ed25519::identity();
        for (i, (_, config)) in outputs.iter().enumerate() {
            let weight = crate::vss::lagrange_at_zero::<Ed25519>(&points, i).unwrap();
            recombined =
                recombined + Ed25519::generator_mul(config.secret_share()).mul(&weight);
        }
        assert_eq!(&recombined, reference.public_key());

        // The export round-trips byte-identically.
        let export = reference.export();
        let bytes = export.to_bytes();
        let back = crate::keys::KeyShareExport::<Ed25519>::from_bytes(&bytes).unwrap();
        assert_eq!(bytes, back.to_bytes());
    }

    #[test]
    fn secret_shares_differ_between_parties() {
        let mut rng = init_testing();
        let outputs = run_keygen(&mut rng, &["a", "b"], 1);
        assert_ne!(
            outputs[0].1.secret_share(),
            outputs[1].1.secret_share()
        );
        assert!(!outputs[0].1.secret_share().is_zero());
    }
}
