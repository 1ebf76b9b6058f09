// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::{
    cmp::sign::SignContext,
    curve::{CurveTrait, EcdsaCurve},
    errors::{Error, Result, ValidationError},
    messages::Message,
    paillier::{Ciphertext, Nonce},
    parameters::ELL_PRIME,
    protocol::PartyId,
    round::{CryptoRngCore, Round, Transition},
    utils::sample_symmetric_bits,
    zkp::{piaffp, pienc},
};

use super::{
    attribute,
    round3::{Broadcast3, Direct3, Round3},
};

/// The Paillier-encrypted nonce shares every party broadcasts in round one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast2 {
    pub(super) k_ct: Ciphertext,
    pub(super) g_ct: Ciphertext,
}

/// The per-peer range proof sent in round one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Direct2<C: EcdsaCurve> {
    #[serde(bound(deserialize = "C: EcdsaCurve"))]
    pub(super) enc_proof: pienc::PiEncProof<C>,
}

/// Round two: collect the encrypted nonces, verify the range proofs, and run
/// the multiplicative-to-additive conversions.
pub(super) struct Round2<C: EcdsaCurve> {
    pub(super) ctx: SignContext<C>,
    pub(super) k: C::Scalar,
    pub(super) gamma: C::Scalar,
    pub(super) g_nonce: Nonce,
    pub(super) k_cts: BTreeMap<PartyId, Ciphertext>,
    pub(super) g_cts: BTreeMap<PartyId, Ciphertext>,
    pub(super) enc_proofs: BTreeMap<PartyId, pienc::PiEncProof<C>>,
}

impl<C: EcdsaCurve> Round for Round2<C> {
    type Output = C::Signature;

    fn number(&self) -> u8 {
        2
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    fn expects_directs(&self) -> bool {
        true
    }

    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.ctx.helper.has_broadcast(2, from) {
            debug!("ignoring replayed round two ciphertexts from {from}");
            return Ok(());
        }
        info!("Handling round two signing ciphertexts from {from}.");

        let body: Broadcast2 = message.content()?;
        let peer_paillier = &self.ctx.config.public_share(from)?.paillier;
        if !peer_paillier.validate_ciphertext(&body.k_ct)
            || !peer_paillier.validate_ciphertext(&body.g_ct)
        {
            Err(ValidationError::attributed(from, "malformed nonce ciphertext"))?;
        }

        let _ = self.k_cts.insert(from.clone(), body.k_ct);
        let _ = self.g_cts.insert(from.clone(), body.g_ct);
        self.ctx.helper.mark_broadcast(2, from);
        Ok(())
    }

    fn store_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.ctx.helper.has_direct(2, from) {
            debug!("ignoring replayed round two proof from {from}");
            return Ok(());
        }

        let body: Direct2<C> = message.content()?;
        let _ = self.enc_proofs.insert(from.clone(), body.enc_proof);
        self.ctx.helper.mark_direct(2, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.ctx.helper.has_all_broadcasts(2) && self.ctx.helper.has_all_directs(2)
    }

    /// - verify every peer's `Π[enc]` proof against its broadcast `Kⱼ`
    /// - for each peer run both conversions `γᵢ·kⱼ` and `(λᵢxᵢ)·kⱼ`,
    ///   sending the affine ciphertexts with `Π[aff-p]` proofs
    /// - broadcast `Γᵢ` and the encryption of the weighted share.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }
        info!("Generating round three signing messages.");
        let mut rng = rng;

        let Self {
            ctx,
            k,
            gamma,
            g_nonce,
            k_cts,
            g_cts,
            enc_proofs,
        } = *self;
        let me = ctx.helper.self_id().clone();
        let sid = ctx.helper.sid();
        let own_share = ctx.config.public_share(&me)?;
        let own_paillier = own_share.paillier.clone();
        let own_pedersen = own_share.pedersen.clone();

        // Range proofs first: they were stored unverified because a peer's
        // proof can arrive before its ciphertext.
        for (from, proof) in &enc_proofs {
            let k_ct = k_cts
                .get(from)
                .ok_or(crate::errors::FatalError::InternalInvariantFailed)?;
            let prover = &ctx.config.public_share(from)?.paillier;
            let input = pienc::CommonInput::new(k_ct, prover, &own_pedersen);
            attribute(
                proof.verify(&input, &mut ctx.helper.hash_for_id(from)),
                from,
            )?;
        }

        let gamma_point = C::generator_mul(&gamma);
        let gamma_bn = C::scalar_to_bn(&gamma);
        let x_star_bn = C::scalar_to_bn(&ctx.weighted_secret);
        let (x_hat, x_hat_nonce) = own_paillier.encrypt(&mut rng, &x_star_bn)?;

        out.push(Message::broadcast(
            ctx.helper.protocol(),
            sid,
            &me,
            3,
            &Broadcast3::<C> {
                gamma: gamma_point,
                x_hat: x_hat.clone(),
            },
        )?);

        // Two conversions per peer, fanned out through the pool.
        let others = ctx.helper.other_ids().to_vec();
        let seeds: Vec<[u8; 32]> = others
            .iter()
            .map(|_| {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                seed
            })
            .collect();

        let results = ctx.helper.pool().parallelize(others.len(), |i| {
            let mut local_rng = rand::rngs::StdRng::from_seed(seeds[i]);
            let peer = &others[i];
            let peer_share = ctx.config.public_share(peer)?;
            let peer_paillier = &peer_share.paillier;
            let peer_k = k_cts
                .get(peer)
                .ok_or(crate::errors::FatalError::InternalInvariantFailed)?;

            let mut convert = |multiplier_bn: &_, multiplier_ct: &Ciphertext, multiplier_nonce: &Nonce| {
                // beta masks the product; the peer receives alpha with
                // alpha + beta = multiplier · k_peer.
                let beta = sample_symmetric_bits(&mut local_rng, ELL_PRIME);
                let neg_beta = -beta.clone();

                let (f_ct, f_nonce) = own_paillier.encrypt(&mut local_rng, &neg_beta)?;
                let (mask_ct, mask_nonce) = peer_paillier.encrypt(&mut local_rng, &neg_beta)?;
                let d_ct = peer_paillier.add(
                    &peer_paillier.mul_scalar(peer_k, multiplier_bn)?,
                    &mask_ct,
                );

                let input = piaffp::CommonInput::new(
                    peer_k,
                    &d_ct,
                    &f_ct,
                    multiplier_ct,
                    &own_paillier,
                    peer_paillier,
                    &peer_share.pedersen,
                );
                let secret = piaffp::ProverSecret::new(
                    multiplier_bn,
                    &neg_beta,
                    &mask_nonce,
                    multiplier_nonce,
                    &f_nonce,
                );
                let proof = piaffp::PiAffpProof::<C>::prove(
                    &mut local_rng,
                    &input,
                    &secret,
                    &mut ctx.helper.hash_for_id(&me),
                )?;

                Ok::<_, Error>((d_ct, f_ct, proof, C::bn_to_scalar(&beta)?))
            };

            let (delta_d, delta_f, delta_proof, delta_beta) =
                convert(&gamma_bn, &g_cts[&me], &g_nonce)?;
            let (chi_d, chi_f, chi_proof, chi_beta) = convert(&x_star_bn, &x_hat, &x_hat_nonce)?;

            let message = Message::direct(
                ctx.helper.protocol(),
                sid,
                &me,
                peer,
                3,
                &Direct3::<C> {
                    delta_d,
                    delta_f,
                    delta_proof,
                    chi_d,
                    chi_f,
                    chi_proof,
                },
            )?;
            Ok::<_, Error>((peer.clone(), message, delta_beta, chi_beta))
        });

        let mut delta_betas = BTreeMap::new();
        let mut chi_betas = BTreeMap::new();
        for result in results {
            let (peer, message, delta_beta, chi_beta) = result?;
            out.push(message);
            let _ = delta_betas.insert(peer.clone(), delta_beta);
            let _ = chi_betas.insert(peer, chi_beta);
        }

        let mut gammas = BTreeMap::new();
        let _ = gammas.insert(me.clone(), gamma_point);
        let mut x_hats = BTreeMap::new();
        let _ = x_hats.insert(me.clone(), x_hat);

        Ok(Transition::Next(Box::new(Round3 {
            ctx,
            k,
            gamma,
            k_cts,
            g_cts,
            gammas,
            x_hats,
            delta_betas,
            chi_betas,
            payloads: BTreeMap::new(),
        })))
    }
}
