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
    curve::{CurveTrait, ScalarTrait, SchnorrCurve},
    errors::{Error, Result, ValidationError},
    frost::sign::{SignContext, Signature},
    keys::KeyPair,
    keystore::KeyOpts,
    messages::Message,
    protocol::PartyId,
    round::{CryptoRngCore, Round, Transition},
};

use super::round3::{Broadcast3, Round3};

/// The two nonce commitments every party broadcasts in round one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast2<C: SchnorrCurve> {
    pub(super) big_d: C,
    pub(super) big_e: C,
}

/// Round two: collect nonce commitments, derive the binding scalars and the
/// challenge, and broadcast the response share.
pub(super) struct Round2<C: SchnorrCurve> {
    pub(super) ctx: SignContext<C>,
}

impl<C: SchnorrCurve> Round for Round2<C> {
    type Output = Signature<C>;

    fn number(&self) -> u8 {
        2
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    /// Reject any nonce commitment equal to the identity point, then store
    /// the pair in the nonce key managers.
    #[instrument(skip_all)]
    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.ctx.helper.has_broadcast(2, from) {
            debug!("ignoring replayed round two commitments from {from}");
            return Ok(());
        }
        info!("Handling round two signing commitments from {from}.");

        let body: Broadcast2<C> = message.content()?;
        if body.big_d.is_identity() || body.big_e.is_identity() {
            Err(ValidationError::attributed(
                from,
                "nonce commitment is the identity point",
            ))?;
        }

        let opts = KeyOpts::new(self.ctx.helper.sid(), from);
        self.ctx
            .stores
            .nonce_d
            .import(&opts, &KeyPair::public_only(body.big_d))?;
        self.ctx
            .stores
            .nonce_e
            .import(&opts, &KeyPair::public_only(body.big_e))?;

        self.ctx.helper.mark_broadcast(2, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.ctx.helper.has_all_broadcasts(2)
    }

    /// - derive `ρₗ = H(msg ∥ {Dⱼ, Eⱼ} ∥ l)` for every signer `l`
    /// - aggregate `Rₗ = Dₗ + ρₗ·Eₗ` and `R = Σ Rₗ`
    /// - form `c = H(R ∥ Y ∥ msg)` and broadcast
    ///   `zᵢ = dᵢ + ρᵢ·eᵢ + c·λᵢ·sᵢ`.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }
        info!("Generating round three signing messages.");

        let Self { ctx } = *self;
        let me = ctx.helper.self_id().clone();
        let sid = ctx.helper.sid();

        // Fetch every signer's commitments from the nonce managers.
        let mut commitments: BTreeMap<PartyId, (C, C)> = BTreeMap::new();
        for id in ctx.helper.party_ids() {
            let opts = KeyOpts::new(sid, id);
            let big_d = *ctx.stores.nonce_d.get(&opts)?.public_point();
            let big_e = *ctx.stores.nonce_e.get(&opts)?.public_point();
            let _ = commitments.insert(id.clone(), (big_d, big_e));
        }

        // Binding scalars over the shared commitment list, in party order.
        let mut transcript_parts: Vec<Vec<u8>> = vec![ctx.message.clone()];
        for id in ctx.helper.party_ids() {
            let (big_d, big_e) = &commitments[id];
            transcript_parts.push(big_d.to_bytes());
            transcript_parts.push(big_e.to_bytes());
        }

        let mut rhos: BTreeMap<PartyId, C::Scalar> = BTreeMap::new();
        let mut big_r_shares: BTreeMap<PartyId, C> = BTreeMap::new();
        let mut big_r = C::identity();
        for id in ctx.helper.party_ids() {
            let mut parts: Vec<&[u8]> =
                transcript_parts.iter().map(|p| p.as_slice()).collect();
            let id_bytes = id.as_str().as_bytes();
            parts.push(id_bytes);
            let rho = C::hash_to_scalar(b"frost binding scalar", &parts);

            let (big_d, big_e) = &commitments[id];
            let share = *big_d + big_e.mul(&rho);
            big_r = big_r + share;
            let _ = rhos.insert(id.clone(), rho);
            let _ = big_r_shares.insert(id.clone(), share);
        }

        let challenge = C::challenge(&big_r, ctx.config.public_key(), &ctx.message);

        // zᵢ = dᵢ + ρᵢ·eᵢ + c·λᵢ·sᵢ
        let own_opts = KeyOpts::new(sid, &me);
        let d = *ctx.stores.nonce_d.get(&own_opts)?.private_scalar()?;
        let e = *ctx.stores.nonce_e.get(&own_opts)?.private_scalar()?;
        let lambda = ctx.helper.lagrange_at_zero(&me)?;
        let z = d
            .add(&rhos[&me].mul(&e))
            .add(&challenge.mul(&lambda).mul(ctx.config.secret_share()));

        out.push(Message::broadcast(
            ctx.helper.protocol(),
            sid,
            &me,
            3,
            &Broadcast3::<C> { z },
        )?);

        let mut responses = BTreeMap::new();
        let _ = responses.insert(me, z);

        Ok(Transition::Next(Box::new(Round3 {
            ctx,
            big_r,
            big_r_shares,
            challenge,
            responses,
        })))
    }
}
