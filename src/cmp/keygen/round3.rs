// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    cmp::{keygen::Stores, Config},
    curve::{CurveTrait, EcdsaCurve},
    errors::{Error, Result, ValidationError},
    hash::Decommitment,
    keys::KeyPair,
    keystore::KeyOpts,
    messages::Message,
    paillier::PaillierKeyPair,
    protocol::SessionHelper,
    rid::Rid,
    ring_pedersen::PedersenKeyPair,
    round::{CryptoRngCore, Round, Transition},
    vss::{ConstantRule, ExponentPolynomial, Share},
    zkp::{pifac, pimod::PiModProof, piprm::PiPrmProof},
};

use super::{
    attribute,
    round4::{Broadcast4, Direct4, Round4},
};

/// The opening of the round-one commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast3<C: EcdsaCurve> {
    pub(super) rid: Rid,
    pub(super) chain_key: Rid,
    pub(super) ecdsa_key: Vec<u8>,
    #[serde(bound(deserialize = "C: EcdsaCurve"))]
    pub(super) vss_public: ExponentPolynomial<C>,
    pub(super) elgamal_key: Vec<u8>,
    pub(super) paillier_key: Vec<u8>,
    pub(super) pedersen_key: Vec<u8>,
    pub(super) schnorr_commitment: C,
    pub(super) decommitment: Decommitment,
}

/// The bytes a party commits to in round one and opens in round three.
#[allow(clippy::too_many_arguments)]
pub(super) fn opening_payload<C: EcdsaCurve>(
    rid: &Rid,
    chain_key: &Rid,
    ecdsa_key: &[u8],
    vss_public: &ExponentPolynomial<C>,
    elgamal_key: &[u8],
    paillier_key: &[u8],
    pedersen_key: &[u8],
    schnorr_commitment: &C,
) -> Result<Vec<u8>> {
    serialize!(&(
        rid,
        chain_key,
        ecdsa_key,
        vss_public,
        elgamal_key,
        paillier_key,
        pedersen_key,
        schnorr_commitment,
    ))
}

/// Round three: validate every opening, fold the session randomness, then
/// send the modulus proofs and the encrypted VSS shares.
pub(super) struct Round3<C: EcdsaCurve> {
    pub(super) helper: SessionHelper<C>,
    pub(super) stores: Stores<C>,
}

impl<C: EcdsaCurve> Round for Round3<C> {
    type Output = Config<C>;

    fn number(&self) -> u8 {
        3
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    /// - validate rid, chain key, and decommitment shape
    /// - import Paillier (modulus shape), Pedersen (over the same modulus),
    ///   ElGamal, the VSS exponent polynomial (degree `t`, non-identity
    ///   constant matching the ECDSA point), and the Schnorr commitment
    /// - verify the decommitment against the stored digest.
    #[instrument(skip_all)]
    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.helper.has_broadcast(3, from) {
            debug!("ignoring replayed round three opening from {from}");
            return Ok(());
        }
        info!("Handling round three keygen message from {from}.");

        let body: Broadcast3<C> = message.content()?;
        attribute(body.rid.validate(), from)?;
        attribute(body.chain_key.validate(), from)?;
        attribute(body.decommitment.validate(), from)?;

        let ecdsa = attribute(KeyPair::<C>::from_bytes(&body.ecdsa_key), from)?;
        let elgamal = attribute(KeyPair::<C>::from_bytes(&body.elgamal_key), from)?;
        let paillier = attribute(PaillierKeyPair::from_bytes(&body.paillier_key), from)?;
        let pedersen = attribute(PedersenKeyPair::from_bytes(&body.pedersen_key), from)?;
        if ecdsa.is_private() || elgamal.is_private() {
            Err(ValidationError::attributed(from, "private key material on the wire"))?;
        }
        // The Pedersen parameters must live over this party's own Paillier
        // modulus.
        if pedersen.params().modulus() != paillier.encryption_key().modulus() {
            Err(ValidationError::attributed(
                from,
                "Pedersen parameters not over the party's Paillier modulus",
            ))?;
        }

        attribute(
            body.vss_public
                .validate(self.helper.threshold(), ConstantRule::NonIdentity),
            from,
        )?;
        if body.vss_public.constant() != ecdsa.public_point() {
            Err(ValidationError::attributed(
                from,
                "vss constant does not match the published share point",
            ))?;
        }
        if body.schnorr_commitment.is_identity() {
            Err(ValidationError::attributed(
                from,
                "schnorr commitment is the identity",
            ))?;
        }

        let opts = KeyOpts::new(self.helper.sid(), from);
        let payload = opening_payload::<C>(
            &body.rid,
            &body.chain_key,
            &body.ecdsa_key,
            &body.vss_public,
            &body.elgamal_key,
            &body.paillier_key,
            &body.pedersen_key,
            &body.schnorr_commitment,
        )?;
        let commitment = self.stores.commitments.get(&opts)?;
        self.helper
            .hash()
            .verify_commitment(&commitment, &body.decommitment, from, &payload)?;

        self.stores.rid.import(&opts, &body.rid)?;
        self.stores.chain_key.import(&opts, &body.chain_key)?;
        self.stores.ecdsa.import(&opts, &ecdsa)?;
        self.stores.elgamal.import(&opts, &elgamal)?;
        self.stores.paillier.import(&opts, &paillier)?;
        self.stores.pedersen.import(&opts, &pedersen)?;
        self.stores.vss_public.import(&opts, &body.vss_public)?;
        self.stores
            .schnorr_commitments
            .import(&opts, &KeyPair::public_only(body.schnorr_commitment))?;
        self.stores.decommitments.import(&opts, &body.decommitment)?;

        self.helper.mark_broadcast(3, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.helper.has_all_broadcasts(3)
    }

    /// - fold `RID = ⊕ⱼ RIDⱼ` and `ChainKey = ⊕ⱼ CKⱼ` into the transcript
    /// - prove `Π[mod]` and `Π[prm]` for the own modulus and parameters
    /// - send each peer its Paillier-encrypted share `fᵢ(j)` plus a `Π[fac]`
    ///   proof bound to that peer's Pedersen parameters.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }
        info!("Generating round four keygen messages.");
        let mut rng = rng;

        let Self { mut helper, stores } = *self;
        let me = helper.self_id().clone();
        let sid = helper.sid();
        let own_opts = KeyOpts::new(sid, &me);

        // Fold contributions in sorted party order.
        let mut rid = Rid::empty();
        let mut chain_key = Rid::empty();
        for id in helper.party_ids() {
            let opts = KeyOpts::new(sid, id);
            rid.xor_assign(&stores.rid.get(&opts)?);
            chain_key.xor_assign(&stores.chain_key.get(&opts)?);
        }

        // Commit the folded randomness to the session transcript; all proof
        // transcripts from here on are bound to it.
        helper.hash_mut().append(b"rid", rid.as_bytes());
        helper.hash_mut().append(b"chain key", chain_key.as_bytes());

        let own_paillier = stores.paillier.get(&own_opts)?;
        let own_key = own_paillier.decryption_key()?;
        let own_pedersen = stores.pedersen.get(&own_opts)?;

        let mod_proof = PiModProof::prove(
            &mut rng,
            own_key,
            &mut helper.hash_for_id(&me),
            helper.pool(),
        )?;
        let prm_proof = PiPrmProof::prove(
            &mut rng,
            own_pedersen.params(),
            own_pedersen.secret()?,
            &mut helper.hash_for_id(&me),
        )?;
        out.push(Message::broadcast(
            helper.protocol(),
            sid,
            &me,
            4,
            &Broadcast4 {
                mod_proof,
                prm_proof,
            },
        )?);

        // One encrypted share and factoring proof per peer; proof generation
        // fans out through the pool with per-peer forked randomness.
        let vss = stores.vss_secret.get(&own_opts)?;
        let others = helper.other_ids().to_vec();
        let seeds: Vec<[u8; 32]> = others
            .iter()
            .map(|_| {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                seed
            })
            .collect();

        let own_modulus = own_paillier.encryption_key().modulus().clone();
        let (p, q) = own_key.primes();
        let directs = helper.pool().parallelize(others.len(), |i| {
            let mut local_rng = rand::rngs::StdRng::from_seed(seeds[i]);
            let peer = &others[i];
            let opts = KeyOpts::new(sid, peer);

            let peer_paillier = stores.paillier.get(&opts)?;
            let peer_pedersen = stores.pedersen.get(&opts)?;

            let fac_input = pifac::CommonInput::new(&own_modulus, peer_pedersen.params());
            let fac_proof = pifac::PiFacProof::<C>::prove(
                &mut local_rng,
                &fac_input,
                &pifac::ProverSecret::new(p, q),
                &mut helper.hash_for_id(&me),
            )?;

            let share = vss.evaluate(&helper.party_scalar(peer));
            let (ciphertext, _) = peer_paillier
                .encryption_key()
                .encrypt(&mut local_rng, &C::scalar_to_bn(&share))?;

            Message::direct(
                helper.protocol(),
                sid,
                &me,
                peer,
                4,
                &Direct4::<C> {
                    share: ciphertext,
                    fac_proof,
                },
            )
        });
        for direct in directs {
            out.push(direct?);
        }

        // Our own share of our own polynomial.
        let own_share = Share::<C>(vss.evaluate(&helper.party_scalar(&me)));
        stores.shares.import(&own_opts, &own_share)?;

        Ok(Transition::Next(Box::new(Round4 {
            helper,
            stores,
            rid,
            chain_key,
        })))
    }
}
