// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    cmp::{keygen::Stores, Config, PublicShare},
    curve::{CurveTrait, EcdsaCurve, ScalarTrait},
    errors::{Error, FatalError, Result, ValidationError},
    keystore::KeyOpts,
    messages::Message,
    paillier::Ciphertext,
    protocol::SessionHelper,
    rid::Rid,
    round::{CryptoRngCore, Round, Transition},
    vss::{ExponentPolynomial, Share},
    zkp::{pifac, pimod::PiModProof, piprm::PiPrmProof},
};

use super::{
    attribute,
    round5::{Broadcast5, Round5},
};

/// The modulus and parameter proofs every party broadcasts in round three.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast4 {
    pub(super) mod_proof: PiModProof,
    pub(super) prm_proof: PiPrmProof,
}

/// The per-peer payload of round three: an encrypted VSS share and a
/// factoring proof bound to the receiver's Pedersen parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Direct4<C: EcdsaCurve> {
    pub(super) share: Ciphertext,
    #[serde(bound(deserialize = "C: EcdsaCurve"))]
    pub(super) fac_proof: pifac::PiFacProof<C>,
}

/// Round four: verify the proofs, decrypt and Feldman-check the shares, and
/// assemble the final configuration.
pub(super) struct Round4<C: EcdsaCurve> {
    pub(super) helper: SessionHelper<C>,
    pub(super) stores: Stores<C>,
    pub(super) rid: Rid,
    pub(super) chain_key: Rid,
}

impl<C: EcdsaCurve> Round for Round4<C> {
    type Output = Config<C>;

    fn number(&self) -> u8 {
        4
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    fn expects_directs(&self) -> bool {
        true
    }

    /// Check the direct payload without touching state: the ciphertext must
    /// be well-formed for our Paillier key and the `Π[fac]` proof must verify
    /// against the sender's modulus and our Pedersen parameters.
    fn verify_message(&self, message: &Message) -> Result<()> {
        if message.is_broadcast() {
            return Ok(());
        }
        let from = message.from();
        let body: Direct4<C> = message.content()?;

        let own_opts = KeyOpts::new(self.helper.sid(), self.helper.self_id());
        let own_paillier = self.stores.paillier.get(&own_opts)?;
        if !own_paillier
            .encryption_key()
            .validate_ciphertext(&body.share)
        {
            Err(ValidationError::attributed(from, "malformed share ciphertext"))?;
        }

        let peer_modulus = self
            .stores
            .paillier
            .get(&KeyOpts::new(self.helper.sid(), from))?
            .encryption_key()
            .modulus()
            .clone();
        let own_pedersen = self.stores.pedersen.get(&own_opts)?;
        let fac_input = pifac::CommonInput::new(&peer_modulus, own_pedersen.params());
        attribute(
            body.fac_proof
                .verify(&fac_input, &mut self.helper.hash_for_id(from)),
            from,
        )?;
        Ok(())
    }

    /// Decrypt the share, check it lies in the scalar field, verify the
    /// Feldman condition `share·G == Fⱼ(i)`, and store it.
    #[instrument(skip_all)]
    fn store_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.helper.has_direct(4, from) {
            debug!("ignoring replayed round four share from {from}");
            return Ok(());
        }
        info!("Handling round four keygen share from {from}.");

        let body: Direct4<C> = message.content()?;
        let own_opts = KeyOpts::new(self.helper.sid(), self.helper.self_id());
        let own_key = self.stores.paillier.get(&own_opts)?;

        let decrypted = attribute(own_key.decryption_key()?.decrypt(&body.share), from)?;
        if decrypted >= C::order() {
            Err(ValidationError::attributed(from, "decrypted share out of range"))?;
        }
        let share = C::bn_to_scalar(&decrypted)?;

        let peer_poly = self
            .stores
            .vss_public
            .get(&KeyOpts::new(self.helper.sid(), from))?;
        let expected = peer_poly.evaluate(&self.helper.party_scalar(self.helper.self_id()));
        if C::generator_mul(&share) != expected {
            Err(ValidationError::attributed(from, "vss share fails the Feldman check"))?;
        }

        self.stores
            .shares
            .import(&KeyOpts::new(self.helper.sid(), from), &Share::<C>(share))?;
        self.helper.mark_direct(4, from);
        Ok(())
    }

    /// Verify the sender's `Π[mod]` and `Π[prm]` proofs.
    #[instrument(skip_all)]
    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.helper.has_broadcast(4, from) {
            debug!("ignoring replayed round four proofs from {from}");
            return Ok(());
        }
        info!("Handling round four keygen proofs from {from}.");

        let body: Broadcast4 = message.content()?;
        let opts = KeyOpts::new(self.helper.sid(), from);

        let modulus = self
            .stores
            .paillier
            .get(&opts)?
            .encryption_key()
            .modulus()
            .clone();
        attribute(
            body.mod_proof.verify(
                &modulus,
                &mut self.helper.hash_for_id(from),
                self.helper.pool(),
            ),
            from,
        )?;

        let pedersen = self.stores.pedersen.get(&opts)?;
        attribute(
            body.prm_proof
                .verify(pedersen.params(), &mut self.helper.hash_for_id(from)),
            from,
        )?;

        self.helper.mark_broadcast(4, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.helper.has_all_broadcasts(4) && self.helper.has_all_directs(4)
    }

    /// - sum all received shares into the final signing share
    /// - combine the public polynomials `F(X) = Σ Fⱼ(X)` and derive each
    ///   party's public share `F(j)` and the group key `F(0)`
    /// - bind the finished configuration into the transcript and broadcast a
    ///   Schnorr response for the new share.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }
        info!("Generating round five keygen messages.");

        let Self {
            mut helper,
            stores,
            rid,
            chain_key,
        } = *self;
        let me = helper.self_id().clone();
        let sid = helper.sid();
        let own_opts = KeyOpts::new(sid, &me);

        // Sum the shares received from every party (own included).
        let mut secret = C::Scalar::zero();
        for id in helper.party_ids() {
            let Share(share) = stores.shares.get(&KeyOpts::new(sid, id))?;
            secret = secret.add(&share);
        }

        // F(X) = Σ Fⱼ(X)
        let polynomials = helper
            .party_ids()
            .iter()
            .map(|id| stores.vss_public.get(&KeyOpts::new(sid, id)))
            .collect::<Result<Vec<_>>>()?;
        let combined = ExponentPolynomial::sum(&polynomials.iter().collect::<Vec<_>>())?;

        if C::generator_mul(&secret) != combined.evaluate(&helper.party_scalar(&me)) {
            Err(FatalError::InternalInvariantFailed)?;
        }

        let publics = helper
            .party_ids()
            .iter()
            .map(|id| {
                let opts = KeyOpts::new(sid, id);
                Ok((
                    id.clone(),
                    PublicShare {
                        ecdsa: combined.evaluate(&helper.party_scalar(id)),
                        elgamal: *stores.elgamal.get(&opts)?.public_point(),
                        paillier: stores.paillier.get(&opts)?.encryption_key().clone(),
                        pedersen: stores.pedersen.get(&opts)?.params().clone(),
                    },
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let own_paillier = stores.paillier.get(&own_opts)?;
        let elgamal_secret = *stores.elgamal.get(&own_opts)?.private_scalar()?;
        let config = Config::new(
            me.clone(),
            helper.threshold(),
            rid,
            chain_key,
            *combined.constant(),
            publics,
            secret,
            own_paillier.decryption_key()?.clone(),
            elgamal_secret,
        )?;

        // Bind the finished configuration, then prove knowledge of the new
        // share under the round-one commitment.
        helper
            .hash_mut()
            .append(b"config", &config.transcript_bytes()?);

        let precommit = stores.schnorr_precommits.get(&own_opts)?;
        let own_public = config.public_share(&me)?.ecdsa;
        let proof = precommit.respond(&own_public, &secret, &mut helper.hash_for_id(&me))?;

        out.push(Message::broadcast(
            helper.protocol(),
            sid,
            &me,
            5,
            &Broadcast5::<C> {
                schnorr_response: *proof.response(),
            },
        )?);

        Ok(Transition::Next(Box::new(Round5 {
            helper,
            stores,
            config,
        })))
    }
}
