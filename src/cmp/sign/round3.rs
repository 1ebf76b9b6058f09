// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::{
    cmp::sign::SignContext,
    curve::{CurveTrait, EcdsaCurve, ScalarTrait},
    errors::{Error, FatalError, Result, ValidationError},
    messages::Message,
    paillier::Ciphertext,
    parameters::{ELL_PRIME, EPSILON},
    protocol::PartyId,
    round::{CryptoRngCore, Round, Transition},
    utils::within_symmetric_bits,
    zkp::piaffp,
};

use super::{
    attribute,
    round4::{Broadcast4, Round4},
};

/// The nonce-point and weighted-share ciphertext every party broadcasts in
/// round two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast3<C: EcdsaCurve> {
    pub(super) gamma: C,
    pub(super) x_hat: Ciphertext,
}

/// The per-peer conversion payload of round two: affine ciphertexts and
/// proofs for both the `k·γ` and `k·x` conversions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Direct3<C: EcdsaCurve> {
    pub(super) delta_d: Ciphertext,
    pub(super) delta_f: Ciphertext,
    #[serde(bound(deserialize = "C: EcdsaCurve"))]
    pub(super) delta_proof: piaffp::PiAffpProof<C>,
    pub(super) chi_d: Ciphertext,
    pub(super) chi_f: Ciphertext,
    #[serde(bound(deserialize = "C: EcdsaCurve"))]
    pub(super) chi_proof: piaffp::PiAffpProof<C>,
}

/// Round three: verify the conversions, decrypt the additive shares, and
/// broadcast the `δ` opening.
pub(super) struct Round3<C: EcdsaCurve> {
    pub(super) ctx: SignContext<C>,
    pub(super) k: C::Scalar,
    pub(super) gamma: C::Scalar,
    pub(super) k_cts: BTreeMap<PartyId, Ciphertext>,
    pub(super) g_cts: BTreeMap<PartyId, Ciphertext>,
    pub(super) gammas: BTreeMap<PartyId, C>,
    pub(super) x_hats: BTreeMap<PartyId, Ciphertext>,
    pub(super) delta_betas: BTreeMap<PartyId, C::Scalar>,
    pub(super) chi_betas: BTreeMap<PartyId, C::Scalar>,
    pub(super) payloads: BTreeMap<PartyId, Direct3<C>>,
}

impl<C: EcdsaCurve> Round for Round3<C> {
    type Output = C::Signature;

    fn number(&self) -> u8 {
        3
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    fn expects_directs(&self) -> bool {
        true
    }

    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.ctx.helper.has_broadcast(3, from) {
            debug!("ignoring replayed round three gamma from {from}");
            return Ok(());
        }
        info!("Handling round three signing broadcast from {from}.");

        let body: Broadcast3<C> = message.content()?;
        if body.gamma.is_identity() {
            Err(ValidationError::attributed(from, "gamma share is the identity"))?;
        }
        let peer_paillier = &self.ctx.config.public_share(from)?.paillier;
        if !peer_paillier.validate_ciphertext(&body.x_hat) {
            Err(ValidationError::attributed(from, "malformed share ciphertext"))?;
        }

        let _ = self.gammas.insert(from.clone(), body.gamma);
        let _ = self.x_hats.insert(from.clone(), body.x_hat);
        self.ctx.helper.mark_broadcast(3, from);
        Ok(())
    }

    fn store_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.ctx.helper.has_direct(3, from) {
            debug!("ignoring replayed round three conversion from {from}");
            return Ok(());
        }

        let body: Direct3<C> = message.content()?;
        let own_paillier = &self
            .ctx
            .config
            .public_share(self.ctx.helper.self_id())?
            .paillier;
        if !own_paillier.validate_ciphertext(&body.delta_d)
            || !own_paillier.validate_ciphertext(&body.chi_d)
        {
            Err(ValidationError::attributed(from, "malformed conversion ciphertext"))?;
        }

        // Proof verification waits for the sender's round-three broadcast,
        // which carries the ciphertext the χ proof is checked against.
        let _ = self.payloads.insert(from.clone(), body);
        self.ctx.helper.mark_direct(3, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.ctx.helper.has_all_broadcasts(3) && self.ctx.helper.has_all_directs(3)
    }

    /// - verify both `Π[aff-p]` proofs per peer and decrypt the additive
    ///   shares
    /// - aggregate `Γ = Σ Γⱼ`, compute `δᵢ` and `χᵢ`
    /// - broadcast `(δᵢ, Δᵢ = kᵢ·Γ)`.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }
        info!("Generating round five signing inputs.");

        let Self {
            ctx,
            k,
            gamma,
            k_cts,
            g_cts,
            gammas,
            x_hats,
            delta_betas,
            chi_betas,
            payloads,
        } = *self;
        let me = ctx.helper.self_id().clone();
        let sid = ctx.helper.sid();
        let own_share = ctx.config.public_share(&me)?;
        let own_paillier = own_share.paillier.clone();
        let own_pedersen = own_share.pedersen.clone();
        let own_key = ctx.config.paillier_key();
        let own_k_ct = k_cts.get(&me).ok_or(FatalError::InternalInvariantFailed)?;

        let mut delta_alphas = BTreeMap::new();
        let mut chi_alphas = BTreeMap::new();
        for (from, body) in &payloads {
            let peer_paillier = &ctx.config.public_share(from)?.paillier;
            let g_j = g_cts.get(from).ok_or(FatalError::InternalInvariantFailed)?;
            let x_hat_j = x_hats
                .get(from)
                .ok_or(FatalError::InternalInvariantFailed)?;

            let delta_input = piaffp::CommonInput::new(
                own_k_ct,
                &body.delta_d,
                &body.delta_f,
                g_j,
                peer_paillier,
                &own_paillier,
                &own_pedersen,
            );
            attribute(
                body.delta_proof
                    .verify(&delta_input, &mut ctx.helper.hash_for_id(from)),
                from,
            )?;

            let chi_input = piaffp::CommonInput::new(
                own_k_ct,
                &body.chi_d,
                &body.chi_f,
                x_hat_j,
                peer_paillier,
                &own_paillier,
                &own_pedersen,
            );
            attribute(
                body.chi_proof
                    .verify(&chi_input, &mut ctx.helper.hash_for_id(from)),
                from,
            )?;

            for (d_ct, alphas) in [
                (&body.delta_d, &mut delta_alphas),
                (&body.chi_d, &mut chi_alphas),
            ] {
                let alpha = attribute(own_key.decrypt_signed(d_ct), from)?;
                if !within_symmetric_bits(&alpha, ELL_PRIME + EPSILON) {
                    Err(ValidationError::attributed(
                        from,
                        "conversion share out of range",
                    ))?;
                }
                let _ = alphas.insert(from.clone(), C::bn_to_scalar(&alpha)?);
            }
        }

        // Γ = Σ Γⱼ over the sorted cohort.
        let mut big_gamma = C::identity();
        for id in ctx.helper.party_ids() {
            let share = gammas.get(id).ok_or(FatalError::InternalInvariantFailed)?;
            big_gamma = big_gamma + *share;
        }
        let big_delta = big_gamma.mul(&k);

        // δᵢ = γᵢkᵢ + Σⱼ (αᵢⱼ + βᵢⱼ), χᵢ likewise with the weighted share.
        let mut delta = gamma.mul(&k);
        let mut chi = ctx.weighted_secret.mul(&k);
        for id in ctx.helper.other_ids() {
            delta = delta.add(&delta_alphas[id]).add(&delta_betas[id]);
            chi = chi.add(&chi_alphas[id]).add(&chi_betas[id]);
        }

        out.push(Message::broadcast(
            ctx.helper.protocol(),
            sid,
            &me,
            4,
            &Broadcast4::<C> {
                delta,
                big_delta,
            },
        )?);

        let mut deltas = BTreeMap::new();
        let _ = deltas.insert(me.clone(), delta);
        let mut big_deltas = BTreeMap::new();
        let _ = big_deltas.insert(me.clone(), big_delta);

        Ok(Transition::Next(Box::new(Round4 {
            ctx,
            k,
            chi,
            big_gamma,
            deltas,
            big_deltas,
        })))
    }
}
