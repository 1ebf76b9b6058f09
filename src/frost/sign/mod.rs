// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! FROST threshold signing.
//!
//! # High-level protocol description
//! A `t+1`-or-larger cohort signs a message in three rounds:
//! - Round one samples the nonce pair `(dᵢ, eᵢ)` and broadcasts the
//!   commitments `Dᵢ = dᵢ·G`, `Eᵢ = eᵢ·G`.
//! - Round two rejects identity commitments, derives each signer's binding
//!   scalar `ρₗ = H(msg ∥ {Dⱼ, Eⱼ} ∥ l)`, aggregates the group commitment
//!   `R = Σ (Dₗ + ρₗ·Eₗ)`, forms the standard challenge `c = H(R ∥ Y ∥ msg)`,
//!   and broadcasts `zᵢ = dᵢ + ρᵢ·eᵢ + c·λᵢ·sᵢ`.
//! - Round three verifies `zⱼ·G == Rⱼ + c·λⱼ·Yⱼ` for every signer and
//!   outputs `(R, Σ zⱼ)`, a standard Schnorr signature under the group key.

mod round1;
mod round2;
mod round3;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    curve::{CurveTrait, SchnorrCurve},
    errors::{FatalError, Result},
    frost::Config,
    keys::KeyPair,
    keystore::{Keystore, TypedStore},
    pool::Pool,
    protocol::{Identifier, PartyId, SessionConfig, SessionHelper},
    round::Driver,
};

pub(crate) const PROTOCOL: &str = "frost/sign";
pub(crate) const FINAL_ROUND: u8 = 3;

/// A finished Schnorr signature `(R, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature<C: SchnorrCurve> {
    big_r: C,
    z: C::Scalar,
}

impl<C: SchnorrCurve> Signature<C> {
    /// The group commitment `R`.
    pub fn group_commitment(&self) -> &C {
        &self.big_r
    }

    /// The response scalar `z`.
    pub fn z(&self) -> &C::Scalar {
        &self.z
    }

    /// The standard wire encoding: `R` followed by `z`, 64 bytes for
    /// edwards25519 (RFC 8032 layout).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.big_r.to_bytes();
        bytes.extend_from_slice(&crate::curve::ScalarTrait::to_bytes(&self.z));
        bytes
    }

    /// Verify under the group's standard Schnorr equation.
    pub fn verify(&self, public_key: &C, msg: &[u8]) -> bool {
        C::verify_schnorr(public_key, msg, &self.big_r, &self.z)
    }
}

/// The nonce-key managers backing one signing session.
#[derive(Debug, Clone)]
pub(crate) struct Stores<C: SchnorrCurve> {
    pub(crate) nonce_d: TypedStore<KeyPair<C>>,
    pub(crate) nonce_e: TypedStore<KeyPair<C>>,
}

impl<C: SchnorrCurve> Stores<C> {
    fn new(backend: Arc<dyn Keystore>) -> Self {
        Self {
            nonce_d: TypedStore::new(backend.clone(), "frost.sign.nonce-d"),
            nonce_e: TypedStore::new(backend, "frost.sign.nonce-e"),
        }
    }
}

/// Per-session signing context carried through the rounds.
pub(crate) struct SignContext<C: SchnorrCurve> {
    pub(crate) helper: SessionHelper<C>,
    pub(crate) config: Config<C>,
    pub(crate) message: Vec<u8>,
    pub(crate) stores: Stores<C>,
}

/// Build a signing session for one participant. The session's party set is
/// the signing cohort: at least `t+1` key-generation parties.
pub fn new_session<C: SchnorrCurve>(
    sid: Identifier,
    session: SessionConfig,
    config: Config<C>,
    message: Vec<u8>,
    backend: Arc<dyn Keystore>,
    pool: Arc<Pool>,
) -> Result<Driver<Signature<C>>> {
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
        let _ = config.public_share(id)?;
    }

    let mut helper = SessionHelper::<C>::new(PROTOCOL, sid, session, FINAL_ROUND, pool)?;
    helper
        .hash_mut()
        .append(b"key config", &config.transcript_bytes()?);
    helper.hash_mut().append(b"message", &message);

    let self_id = helper.self_id().clone();
    let party_ids = helper.party_ids().to_vec();
    let ctx = SignContext {
        helper,
        config,
        message,
        stores: Stores::new(backend),
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
        curve::ScalarTrait,
        ed25519::Ed25519,
        frost::keygen::tests::run_keygen,
        keystore::InMemoryKeystore,
        messages::Message,
        round::{sim::Simulation, Status},
        utils::testing::init_testing,
    };
    use rand::{CryptoRng, RngCore};

    fn sign_quorum<R: RngCore + CryptoRng>(
        rng: &mut R,
        configs: Vec<(PartyId, Config<Ed25519>)>,
        cohort: &[PartyId],
        message: &[u8],
    ) -> Simulation<Signature<Ed25519>> {
        let sid = Identifier::random(rng);
        let pool = Arc::new(Pool::global());

        let drivers = configs
            .into_iter()
            .filter(|(id, _)| cohort.contains(id))
            .map(|(id, config)| {
                let session = SessionConfig::new(id.clone(), cohort, config.threshold()).unwrap();
                let driver = new_session::<Ed25519>(
                    sid,
                    session,
                    config,
                    message.to_vec(),
                    InMemoryKeystore::new(),
                    pool.clone(),
                )
                .unwrap();
                (id, driver)
            })
            .collect();
        Simulation::new(drivers)
    }

    #[test]
    fn two_of_three_signing_verifies_under_standard_ed25519() {
        use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};

        let mut rng = init_testing();
        let configs = run_keygen(&mut rng, &["a", "b", "c"], 1);
        let public_key = *configs[0].1.public_key();

        let message = "hello".as_bytes();
        let cohort = vec![PartyId::from("a"), PartyId::from("c")];
        let mut sim = sign_quorum(&mut rng, configs, &cohort, message);
        sim.run(&mut rng).unwrap();

        let outputs = sim.outputs();
        assert_eq!(outputs.len(), 2);

        let signature = &outputs[0].1;
        assert!(outputs.iter().all(|(_, s)| s == signature));
        assert!(signature.verify(&public_key, message));

        // The exact signature bytes verify under a standard Ed25519
        // implementation.
        let sig_bytes: [u8; 64] = signature.to_bytes().try_into().unwrap();
        let vk_bytes: [u8; 32] = crate::curve::CurveTrait::to_bytes(&public_key)
            .try_into()
            .unwrap();
        let vk = VerifyingKey::from_bytes(&vk_bytes).unwrap();
        assert!(vk
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok());
    }

    #[test]
    fn full_cohort_signing_also_verifies() {
        let mut rng = init_testing();
        let configs = run_keygen(&mut rng, &["a", "b", "c"], 1);
        let public_key = *configs[0].1.public_key();

        let message = b"all three of us";
        let cohort: Vec<PartyId> = configs.iter().map(|(id, _)| id.clone()).collect();
        let mut sim = sign_quorum(&mut rng, configs, &cohort, message);
        sim.run(&mut rng).unwrap();

        let outputs = sim.outputs();
        assert!(outputs[0].1.verify(&public_key, message));
    }

    #[test]
    fn identity_nonce_commitment_is_rejected() {
        let mut rng = init_testing();
        let configs = run_keygen(&mut rng, &["a", "b", "c"], 1);
        let cohort: Vec<PartyId> = configs.iter().map(|(id, _)| id.clone()).collect();
        let sid = Identifier::random(&mut rng);
        let pool = Arc::new(Pool::global());

        let a = PartyId::from("a");
        let b = PartyId::from("b");

        let (_, config) = configs
            .into_iter()
            .find(|(id, _)| id == &a)
            .unwrap();
        let session = SessionConfig::new(a.clone(), &cohort, config.threshold()).unwrap();
        let mut driver = new_session::<Ed25519>(
            sid,
            session,
            config,
            b"message".to_vec(),
            InMemoryKeystore::new(),
            pool,
        )
        .unwrap();

        let mut out = Vec::new();
        driver.start(&mut rng, &mut out).unwrap();

        // A forged round-one broadcast carrying the identity as `D`.
        let forged = Message::broadcast(
            PROTOCOL,
            sid,
            &b,
            2,
            &round2::Broadcast2::<Ed25519> {
                big_d: Ed25519::identity(),
                big_e: Ed25519::generator_mul(&<Ed25519 as CurveTrait>::Scalar::one()),
            },
        )
        .unwrap();

        let status = driver.handle_message(&mut rng, forged, &mut out).unwrap();
        assert_eq!(status, Status::Aborted);
        assert_eq!(driver.abort_info().unwrap().culprit, Some(b));
    }

    #[test]
    fn signature_scalar_is_nonzero() {
        let mut rng = init_testing();
        let configs = run_keygen(&mut rng, &["a", "b"], 1);
        let public_key = *configs[0].1.public_key();
        let cohort: Vec<PartyId> = configs.iter().map(|(id, _)| id.clone()).collect();
        let mut sim = sign_quorum(&mut rng, configs, &cohort, b"nonzero");
        sim.run(&mut rng).unwrap();
        let outputs = sim.outputs();
        assert!(!outputs[0].1.z().is_zero());
        assert!(outputs[0].1.verify(&public_key, b"nonzero"));
    }
}
