// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! CMP threshold signing.
//!
//! # High-level protocol description
//! A `t+1`-or-larger cohort of key-generation participants signs a 32-byte
//! message digest in five rounds:
//! - Round one Lagrange-weights the signing share, samples the nonce shares
//!   `kᵢ, γᵢ`, broadcasts their Paillier encryptions `Kᵢ, Gᵢ`, and sends each
//!   peer a `Π[enc]` range proof for `Kᵢ` bound to that peer's Pedersen
//!   parameters.
//! - Round two verifies the range proofs and runs two
//!   multiplicative-to-additive conversions against every peer — one for
//!   `k·γ`, one for `k·x` — sending the affine ciphertexts with `Π[aff-p]`
//!   proofs, alongside a broadcast of `Γᵢ = γᵢ·G`.
//! - Round three verifies the conversion proofs, decrypts the additive
//!   shares, aggregates `Γ = Σ Γⱼ`, and broadcasts `δᵢ` with `Δᵢ = kᵢ·Γ`.
//! - Round four checks `δ·G = Σ Δⱼ`, derives `R = δ⁻¹·Γ` and `r = R|ₓ`, and
//!   broadcasts the partial signature `σᵢ = m·kᵢ + r·χᵢ`.
//! - Round five sums the partial signatures, low-S normalizes, and verifies
//!   the result under the group public key before returning it.

mod round1;
mod round2;
mod round3;
mod round4;
mod round5;

use sha3::{Digest, Keccak256};
use std::sync::Arc;

use crate::{
    cmp::Config,
    curve::{CurveTrait, EcdsaCurve, ScalarTrait},
    errors::{FatalError, Result},
    pool::Pool,
    protocol::{Identifier, PartyId, SessionConfig, SessionHelper},
    round::Driver,
};

pub(crate) const PROTOCOL: &str = "cmp/sign";
pub(crate) const FINAL_ROUND: u8 = 5;

pub(crate) use super::keygen::attribute;

/// Input for one signing session.
pub struct SignInput<C: EcdsaCurve> {
    config: Config<C>,
    digest: [u8; 32],
}

impl<C: EcdsaCurve> SignInput<C> {
    /// Sign `message`, hashing it with Keccak256 first.
    pub fn new(config: Config<C>, message: &[u8]) -> Self {
        Self {
            config,
            digest: Keccak256::digest(message).into(),
        }
    }

    /// Sign a caller-provided 32-byte digest.
    pub fn from_digest(config: Config<C>, digest: [u8; 32]) -> Self {
        Self { config, digest }
    }
}

/// Per-session signing context carried through the rounds.
pub(crate) struct SignContext<C: EcdsaCurve> {
    pub(crate) helper: SessionHelper<C>,
    pub(crate) config: Config<C>,
    pub(crate) digest: [u8; 32],
    /// This party's share, Lagrange-weighted to additive form over the
    /// signing cohort.
    pub(crate) weighted_secret: C::Scalar,
}

impl<C: EcdsaCurve> SignContext<C> {
    /// The message digest as a scalar.
    pub(crate) fn message_scalar(&self) -> C::Scalar {
        C::digest_to_scalar(&self.digest)
    }
}

/// Build a signing session for one participant.
///
/// The session's party set is the signing cohort: a subset of the
/// key-generation parties with at least `t+1` members, all of whom must be
/// running the same cohort.
pub fn new_session<C: EcdsaCurve>(
    sid: Identifier,
    session: SessionConfig,
    input: SignInput<C>,
    pool: Arc<Pool>,
) -> Result<Driver<C::Signature>> {
    let SignInput { config, digest } = input;

    if session.self_id() != config.party() {
        Err(FatalError::BadInput(
            "session self id does not match the key share owner".into(),
        ))?;
    }
    if session.party_ids().len() <= config.threshold() {
        Err(FatalError::BadInput(format!(
            "signing needs at least {} parties",
            config.threshold() + 1
        )))?;
    }
    for id in session.party_ids() {
        // Fails for cohort members that did not take part in keygen.
        let _ = config.public_share(id)?;
    }

    let mut helper = SessionHelper::<C>::new(PROTOCOL, sid, session, FINAL_ROUND, pool)?;

    // Weight shares to additive form and sanity-check that the cohort's
    // weighted public shares recombine to the group key.
    let mut recombined = C::identity();
    for id in helper.party_ids() {
        let weight = helper.lagrange_at_zero(id)?;
        recombined = recombined + config.public_share(id)?.ecdsa.mul(&weight);
    }
    if &recombined != config.public_key() {
        Err(FatalError::BadInput(
            "cohort shares do not recombine to the group public key".into(),
        ))?;
    }

    let weighted_secret = helper
        .lagrange_at_zero(helper.self_id())?
        .mul(config.secret_share());

    // Bind the key configuration and the digest into the session transcript.
    let config_bytes = config.transcript_bytes()?;
    helper.hash_mut().append(b"key config", &config_bytes);
    helper.hash_mut().append(b"message digest", &digest);

    let self_id = helper.self_id().clone();
    let party_ids = helper.party_ids().to_vec();
    let ctx = SignContext {
        helper,
        config,
        digest,
        weighted_secret,
    };
    Ok(Driver::new(
        PROTOCOL,
        sid,
        self_id,
        party_ids,
        Box::new(round1::Round1 { ctx }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmp::keygen::tests::run_keygen,
        curve::TestCurve,
        round::{sim::Simulation, Status},
        utils::testing::init_testing,
    };
    use k256::ecdsa::signature::hazmat::PrehashVerifier;
    use rand::{CryptoRng, RngCore};

    fn sign_quorum<R: RngCore + CryptoRng>(
        rng: &mut R,
        configs: Vec<(PartyId, Config<TestCurve>)>,
        cohort: &[PartyId],
        digest: [u8; 32],
    ) -> Simulation<<TestCurve as EcdsaCurve>::Signature> {
        let sid = Identifier::random(rng);
        let pool = Arc::new(Pool::global());

        let drivers = configs
            .into_iter()
            .filter(|(id, _)| cohort.contains(id))
            .map(|(id, config)| {
                let session = SessionConfig::new(id.clone(), cohort, config.threshold()).unwrap();
                let input = SignInput::from_digest(config, digest);
                let driver = new_session::<TestCurve>(sid, session, input, pool.clone()).unwrap();
                (id, driver)
            })
            .collect();
        Simulation::new(drivers)
    }

    #[test]
    fn signing_a_zero_digest_produces_a_verifying_signature() {
        let mut rng = init_testing();
        let configs = run_keygen(&mut rng, &["a", "b", "c"], 1);
        let verifying_key = configs[0].1.verifying_key().unwrap();

        // The all-zero 32-byte digest, signed by the full cohort.
        let digest = [0u8; 32];
        let cohort: Vec<PartyId> = configs.iter().map(|(id, _)| id.clone()).collect();
        let mut sim = sign_quorum(&mut rng, configs, &cohort, digest);
        sim.run(&mut rng).unwrap();

        let outputs = sim.outputs();
        assert_eq!(outputs.len(), 3);

        // Everyone computed the same signature.
        let signature = &outputs[0].1;
        assert!(outputs.iter().all(|(_, s)| s == signature));

        // r is non-zero by construction of the signature type; the signature
        // verifies under the group key.
        assert!(verifying_key.verify_prehash(&digest, signature).is_ok());
    }

    #[test]
    fn threshold_subset_signs() {
        let mut rng = init_testing();
        let configs = run_keygen(&mut rng, &["a", "b", "c"], 1);
        let verifying_key = configs[0].1.verifying_key().unwrap();

        // Any t+1 = 2 parties can sign.
        let cohort = vec![PartyId::from("a"), PartyId::from("c")];
        let digest: [u8; 32] = {
            use sha3::{Digest, Keccak256};
            Keccak256::digest(b"threshold subset message").into()
        };
        let mut sim = sign_quorum(&mut rng, configs, &cohort, digest);
        sim.run(&mut rng).unwrap();

        let outputs = sim.outputs();
        assert_eq!(outputs.len(), 2);
        assert!(verifying_key.verify_prehash(&digest, &outputs[0].1).is_ok());
    }

    #[test]
    fn too_small_cohort_is_rejected() {
        let mut rng = init_testing();
        // A cohort of t parties cannot start a session: the session config
        // itself requires threshold < n.
        let ids = [PartyId::from("a")];
        assert!(SessionConfig::new(ids[0].clone(), &ids, 1).is_err());
        let _ = rng;
    }

    #[test]
    fn signature_shares_from_an_inconsistent_delta_abort() {
        let mut rng = init_testing();
        let configs = run_keygen(&mut rng, &["a", "b", "c"], 1);
        let cohort: Vec<PartyId> = configs.iter().map(|(id, _)| id.clone()).collect();
        let digest = [7u8; 32];
        let mut sim = sign_quorum(&mut rng, configs, &cohort, digest);
        sim.start(&mut rng).unwrap();

        let a = PartyId::from("a");
        let b = PartyId::from("b");

        // Corrupt the payload of `b`'s round-4 broadcast (its δ share).
        let mut tampered = false;
        loop {
            if !tampered {
                tampered = sim.corrupt_broadcast(&b, 4);
            }
            if sim.driver_mut(&a).status() == Status::Aborted {
                break;
            }
            if !sim.step(&mut rng).unwrap() {
                panic!("ran out of messages before `a` aborted");
            }
        }
        // The δ-consistency failure is not attributable to a single party.
        let abort = sim.driver_mut(&a).abort_info().unwrap();
        assert!(abort.culprit.is_none());
    }

    impl<O> Simulation<O> {
        /// Corrupt a payload byte of a pending broadcast from `from` tagged
        /// for `round`. Returns true once corrupted.
        pub(crate) fn corrupt_broadcast(&mut self, from: &PartyId, round: u8) -> bool {
            let mut found = false;
            for message in self.pending_mut() {
                if message.from() == from && message.round() == round && message.is_broadcast() {
                    message.corrupt_content_byte(12);
                    found = true;
                }
            }
            found
        }
    }
}
