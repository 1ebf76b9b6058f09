// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument};

use crate::{
    cmp::sign::SignContext,
    curve::{CurveTrait, EcdsaCurve, ScalarTrait},
    errors::{Error, FatalError, Result, ValidationError},
    messages::Message,
    protocol::PartyId,
    round::{AbortInfo, CryptoRngCore, Round, Transition},
};

use super::round5::{Broadcast5, Round5};

/// The `δ` opening every party broadcasts in round three.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast4<C: EcdsaCurve> {
    #[serde(bound(deserialize = "C: EcdsaCurve"))]
    pub(super) delta: C::Scalar,
    pub(super) big_delta: C,
}

/// Round four: check the `δ` consistency, derive the signature point, and
/// broadcast the partial signature.
pub(super) struct Round4<C: EcdsaCurve> {
    pub(super) ctx: SignContext<C>,
    pub(super) k: C::Scalar,
    pub(super) chi: C::Scalar,
    pub(super) big_gamma: C,
    pub(super) deltas: BTreeMap<PartyId, C::Scalar>,
    pub(super) big_deltas: BTreeMap<PartyId, C>,
}

impl<C: EcdsaCurve> Round for Round4<C> {
    type Output = C::Signature;

    fn number(&self) -> u8 {
        4
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.ctx.helper.has_broadcast(4, from) {
            debug!("ignoring replayed round four delta from {from}");
            return Ok(());
        }
        info!("Handling round four signing broadcast from {from}.");

        let body: Broadcast4<C> = message.content()?;
        if body.delta.is_zero() {
            Err(ValidationError::attributed(from, "delta share is zero"))?;
        }
        if body.big_delta.is_identity() {
            Err(ValidationError::attributed(from, "delta point is the identity"))?;
        }

        let _ = self.deltas.insert(from.clone(), body.delta);
        let _ = self.big_deltas.insert(from.clone(), body.big_delta);
        self.ctx.helper.mark_broadcast(4, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.ctx.helper.has_all_broadcasts(4)
    }

    /// - check `δ·G == Σ Δⱼ`; an inconsistency is not attributable to a
    ///   single party without the extra logging proofs, so the abort carries
    ///   no culprit
    /// - derive `R = δ⁻¹·Γ` and `r = R|ₓ`
    /// - broadcast `σᵢ = m·kᵢ + r·χᵢ`.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }

        let Self {
            ctx,
            k,
            chi,
            big_gamma,
            deltas,
            big_deltas,
        } = *self;
        let me = ctx.helper.self_id().clone();
        let sid = ctx.helper.sid();

        let mut delta = C::Scalar::zero();
        let mut big_delta = C::identity();
        for id in ctx.helper.party_ids() {
            delta = delta.add(deltas.get(id).ok_or(FatalError::InternalInvariantFailed)?);
            big_delta =
                big_delta + *big_deltas.get(id).ok_or(FatalError::InternalInvariantFailed)?;
        }

        // δ is supposed to open Σ Δⱼ = (Σ kⱼ)·Γ.
        if C::generator_mul(&delta) != big_delta {
            error!("delta opening does not match the aggregated points");
            return Ok(Transition::Abort(AbortInfo {
                culprit: None,
                reason: "inconsistent delta aggregation".into(),
            }));
        }

        let delta_inv = match delta.invert() {
            Some(inverse) => inverse,
            None => {
                return Ok(Transition::Abort(AbortInfo {
                    culprit: None,
                    reason: "aggregated delta is zero".into(),
                }))
            }
        };
        let big_r = big_gamma.mul(&delta_inv);
        let r = big_r.x_projection()?;
        if r.is_zero() {
            return Ok(Transition::Abort(AbortInfo {
                culprit: None,
                reason: "signature r component is zero".into(),
            }));
        }

        // σᵢ = m·kᵢ + r·χᵢ
        let m = ctx.message_scalar();
        let sigma = m.mul(&k).add(&r.mul(&chi));

        out.push(Message::broadcast(
            ctx.helper.protocol(),
            sid,
            &me,
            5,
            &Broadcast5::<C> { sigma },
        )?);

        let mut sigmas = BTreeMap::new();
        let _ = sigmas.insert(me.clone(), sigma);

        Ok(Transition::Next(Box::new(Round5 {
            ctx,
            r,
            sigmas,
        })))
    }
}
