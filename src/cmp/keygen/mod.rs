// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! CMP distributed key generation.
//!
//! # High-level protocol description
//! The protocol runs in five rounds:
//! - In round one, each participant samples its Paillier key, ring-Pedersen
//!   parameters, ElGamal key, an ECDSA secret share with a degree-`t` VSS
//!   polynomial around it, a Schnorr pre-commitment, a random identifier, and
//!   a chain key, then broadcasts a hash commitment over all the public
//!   parts.
//! - Once all commitments have arrived, round two broadcasts the opening.
//! - Round three checks every opening against its commitment, imports the
//!   peers' key material, folds `RID = ⊕ⱼ RIDⱼ` and `ChainKey = ⊕ⱼ CKⱼ` into
//!   the transcript, then sends the `Π[mod]`/`Π[prm]` proofs to everyone and
//!   a Paillier-encrypted VSS share with a `Π[fac]` proof to each peer.
//! - Round four verifies the proofs, decrypts and Feldman-checks each
//!   incoming share, sums shares into the final signing share, combines the
//!   public polynomials, and broadcasts a Schnorr response for the new share
//!   bound to the fresh configuration.
//! - Round five verifies every peer's Schnorr proof and outputs the
//!   [`Config`].

mod round1;
mod round2;
mod round3;
mod round4;
mod round5;

use std::sync::Arc;

use crate::{
    cmp::Config,
    curve::EcdsaCurve,
    errors::{Result, ValidationError},
    hash::{Commitment, Decommitment},
    keys::KeyPair,
    keystore::{Keystore, TypedStore},
    paillier::PaillierKeyPair,
    pool::Pool,
    protocol::{Identifier, PartyId, SessionConfig, SessionHelper},
    rid::Rid,
    ring_pedersen::PedersenKeyPair,
    round::Driver,
    vss::{ExponentPolynomial, Polynomial, Share},
    zkp::pisch::SchnorrPrecommit,
};

pub(crate) const PROTOCOL: &str = "cmp/keygen";
pub(crate) const FINAL_ROUND: u8 = 5;

/// The key managers backing one key-generation session, all sharing one
/// keystore backend.
#[derive(Debug, Clone)]
pub(crate) struct Stores<C: EcdsaCurve> {
    pub(crate) paillier: TypedStore<PaillierKeyPair>,
    pub(crate) pedersen: TypedStore<PedersenKeyPair>,
    pub(crate) elgamal: TypedStore<KeyPair<C>>,
    pub(crate) ecdsa: TypedStore<KeyPair<C>>,
    pub(crate) vss_secret: TypedStore<Polynomial<C>>,
    pub(crate) vss_public: TypedStore<ExponentPolynomial<C>>,
    pub(crate) shares: TypedStore<Share<C>>,
    pub(crate) rid: TypedStore<Rid>,
    pub(crate) chain_key: TypedStore<Rid>,
    pub(crate) commitments: TypedStore<Commitment>,
    pub(crate) decommitments: TypedStore<Decommitment>,
    pub(crate) schnorr_precommits: TypedStore<SchnorrPrecommit<C>>,
    pub(crate) schnorr_commitments: TypedStore<KeyPair<C>>,
}

impl<C: EcdsaCurve> Stores<C> {
    fn new(backend: Arc<dyn Keystore>) -> Self {
        Self {
            paillier: TypedStore::new(backend.clone(), "cmp.keygen.paillier"),
            pedersen: TypedStore::new(backend.clone(), "cmp.keygen.pedersen"),
            elgamal: TypedStore::new(backend.clone(), "cmp.keygen.elgamal"),
            ecdsa: TypedStore::new(backend.clone(), "cmp.keygen.ecdsa"),
            vss_secret: TypedStore::new(backend.clone(), "cmp.keygen.vss"),
            vss_public: TypedStore::new(backend.clone(), "cmp.keygen.vss"),
            shares: TypedStore::new(backend.clone(), "cmp.keygen.vss"),
            rid: TypedStore::new(backend.clone(), "cmp.keygen.rid"),
            chain_key: TypedStore::new(backend.clone(), "cmp.keygen.chainkey"),
            commitments: TypedStore::new(backend.clone(), "cmp.keygen.commitment"),
            decommitments: TypedStore::new(backend.clone(), "cmp.keygen.commitment"),
            schnorr_precommits: TypedStore::new(backend.clone(), "cmp.keygen.schnorr"),
            schnorr_commitments: TypedStore::new(backend, "cmp.keygen.schnorr"),
        }
    }
}

/// Rewrap an unattributed validation failure so it names `from`.
pub(crate) fn attribute<T>(result: Result<T>, from: &PartyId) -> Result<T> {
    result.map_err(|error| match error {
        crate::errors::Error::Validation(v) if v.culprit.is_none() => {
            ValidationError::attributed(from, v.reason).into()
        }
        crate::errors::Error::Content(_) => {
            ValidationError::attributed(from, "malformed payload").into()
        }
        other => other,
    })
}

/// Build a key-generation session for one participant.
///
/// The returned driver must be kicked off with
/// [`Driver::start`](crate::round::Driver::start); the caller owns message
/// scheduling from there.
pub fn new_session<C: EcdsaCurve>(
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
        curve::{CurveTrait, ScalarTrait, TestCurve},
        keystore::InMemoryKeystore,
        messages::{Message, Recipient},
        round::{sim::Simulation, Status},
        utils::testing::init_testing,
    };
    use rand::{CryptoRng, RngCore};

    pub(crate) fn keygen_quorum<R: RngCore + CryptoRng>(
        rng: &mut R,
        names: &[&str],
        threshold: usize,
    ) -> (Identifier, Simulation<Config<TestCurve>>) {
        let sid = Identifier::random(rng);
        let party_ids: Vec<PartyId> = names.iter().map(|n| PartyId::from(*n)).collect();
        let pool = Arc::new(Pool::global());

        let drivers = party_ids
            .iter()
            .map(|id| {
                let config = SessionConfig::new(id.clone(), &party_ids, threshold).unwrap();
                let driver =
                    new_session::<TestCurve>(sid, config, InMemoryKeystore::new(), pool.clone())
                        .unwrap();
                (id.clone(), driver)
            })
            .collect();
        (sid, Simulation::new(drivers))
    }

    /// Run keygen to completion and hand back each party's config.
    pub(crate) fn run_keygen<R: RngCore + CryptoRng>(
        rng: &mut R,
        names: &[&str],
        threshold: usize,
    ) -> Vec<(PartyId, Config<TestCurve>)> {
        let (_, mut sim) = keygen_quorum(rng, names, threshold);
        sim.run(rng).unwrap();
        sim.outputs()
    }

    #[test]
    fn three_party_keygen_produces_consistent_configs() {
        let mut rng = init_testing();
        let outputs = run_keygen(&mut rng, &["a", "b", "c"], 1);
        assert_eq!(outputs.len(), 3);

        let reference = &outputs[0].1;
        for (party, config) in &outputs {
            // Everyone agrees on the folded randomness and the group key.
            assert_eq!(config.rid(), reference.rid());
            assert_eq!(config.chain_key(), reference.chain_key());
            assert_eq!(config.public_key(), reference.public_key());
            assert_eq!(config.public_shares(), reference.public_shares());

            // Every party's secret matches its published share.
            let expected = TestCurve::generator_mul(config.secret_share());
            assert_eq!(&config.public_share(party).unwrap().ecdsa, &expected);
        }

        // The folded rid is the XOR of contributions, so it is non-zero with
        // overwhelming probability.
        assert!(reference.rid().validate().is_ok());

        // Lagrange recombination of the shares lands on the group public key.
        let parties: Vec<PartyId> = outputs.iter().map(|(p, _)| p.clone()).collect();
        let points: Vec<_> = parties
            .iter()
            .map(TestCurve::scalar_from_id)
            .collect();
        let mut recombined = TestCurve::identity();
        for (i, (_, config)) in outputs.iter().enumerate() {
            let weight = crate::vss::lagrange_at_zero::<TestCurve>(&points, i).unwrap();
            recombined = recombined + TestCurve::generator_mul(config.secret_share()).mul(&weight);
        }
        assert_eq!(&recombined, reference.public_key());

        // The export round-trips byte-identically.
        let export = reference.export();
        let bytes = export.to_bytes();
        let back = crate::keys::KeyShareExport::<TestCurve>::from_bytes(&bytes).unwrap();
        assert_eq!(bytes, back.to_bytes());
    }

    #[test]
    fn duplicate_round_two_broadcast_is_a_no_op() {
        let mut rng = init_testing();
        let (_, mut sim) = keygen_quorum(&mut rng, &["a", "b", "c"], 1);
        sim.start(&mut rng).unwrap();

        // Track a replay of `a`'s first broadcast (consumed by round 2) and
        // inject the copy mid-run.
        let mut replay: Option<Message> = None;
        let mut injected = false;
        let mut steps = 0usize;
        while !sim.all_terminal() {
            if replay.is_none() {
                replay = sim.peek_from(&PartyId::from("a"), 2);
            }
            if !sim.step(&mut rng).unwrap() {
                panic!("quorum is stuck");
            }
            steps += 1;
            if let (false, Some(message)) = (injected, replay.clone()) {
                if steps > 4 {
                    sim.deliver(message);
                    injected = true;
                }
            }
        }
        assert!(injected, "replay was never injected");

        let outputs = sim.outputs();
        let reference = &outputs[0].1;
        for (_, config) in &outputs {
            assert_eq!(config.public_key(), reference.public_key());
            assert_eq!(config.rid(), reference.rid());
        }
    }

    #[test]
    fn tampered_vss_share_aborts_attributing_the_sender() {
        let mut rng = init_testing();
        let (_, mut sim) = keygen_quorum(&mut rng, &["a", "b", "c"], 1);
        sim.start(&mut rng).unwrap();

        let a = PartyId::from("a");
        let b = PartyId::from("b");

        // Flip a byte of the encrypted share `b` sends `a` in round 4.
        let mut tampered = false;
        loop {
            if !tampered {
                tampered = sim.corrupt_direct(&b, &a, 4);
            }
            let a_status = sim.driver_mut(&a).status();
            if a_status == Status::Aborted {
                break;
            }
            if !sim.step(&mut rng).unwrap() {
                panic!("ran out of messages before `a` aborted");
            }
        }
        assert!(tampered, "the targeted message never appeared");

        let abort = sim.driver_mut(&a).abort_info().unwrap().clone();
        assert_eq!(abort.culprit, Some(b));
        assert!(sim.driver_mut(&a).take_output().is_none());

        // Subsequent drives keep short-circuiting.
        let status = sim.driver_mut(&a).status();
        assert_eq!(status, Status::Aborted);
    }

    impl<O> Simulation<O> {
        /// A pending broadcast from `from` tagged for `round`, if any.
        pub(crate) fn peek_from(&self, from: &PartyId, round: u8) -> Option<Message> {
            self.pending()
                .find(|m| m.from() == from && m.round() == round && m.is_broadcast())
                .cloned()
        }

        /// Corrupt a payload byte of a pending direct message `from → to`
        /// tagged for `round`. The offset lands inside the first serialized
        /// field, past its length prefix. Returns true once corrupted.
        pub(crate) fn corrupt_direct(&mut self, from: &PartyId, to: &PartyId, round: u8) -> bool {
            self.pending_mut()
                .find(|m| {
                    m.from() == from
                        && m.round() == round
                        && matches!(m.to(), Recipient::Party(p) if p == to)
                })
                .map(|message| message.corrupt_content_byte(16))
                .is_some()
        }
    }
}
