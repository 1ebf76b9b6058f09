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
    curve::{CurveTrait, ScalarTrait, SchnorrCurve},
    errors::{Error, FatalError, Result, ValidationError},
    frost::sign::{SignContext, Signature},
    messages::Message,
    protocol::PartyId,
    round::{AbortInfo, CryptoRngCore, Round, Transition},
};

/// The response share every party broadcasts in round two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast3<C: SchnorrCurve> {
    #[serde(bound(deserialize = "C: SchnorrCurve"))]
    pub(super) z: C::Scalar,
}

/// Round three: verify every response share and assemble the signature.
pub(super) struct Round3<C: SchnorrCurve> {
    pub(super) ctx: SignContext<C>,
    pub(super) big_r: C,
    pub(super) big_r_shares: BTreeMap<PartyId, C>,
    pub(super) challenge: C::Scalar,
    pub(super) responses: BTreeMap<PartyId, C::Scalar>,
}

impl<C: SchnorrCurve> Round for Round3<C> {
    type Output = Signature<C>;

    fn number(&self) -> u8 {
        3
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    /// Check `zⱼ·G == Rⱼ + c·λⱼ·Yⱼ` before accepting the share.
    #[instrument(skip_all)]
    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.ctx.helper.has_broadcast(3, from) {
            debug!("ignoring replayed round three response from {from}");
            return Ok(());
        }
        info!("Handling round three signing response from {from}.");

        let body: Broadcast3<C> = message.content()?;
        if body.z.is_zero() {
            Err(ValidationError::attributed(from, "response share is zero"))?;
        }

        let big_r_share = self
            .big_r_shares
            .get(from)
            .ok_or(FatalError::InternalInvariantFailed)?;
        let public_share = self.ctx.config.public_share(from)?;
        let lambda = self.ctx.helper.lagrange_at_zero(from)?;

        let lhs = C::generator_mul(&body.z);
        let rhs = *big_r_share + public_share.mul(&self.challenge.mul(&lambda));
        if lhs != rhs {
            Err(ValidationError::attributed(from, "response share fails verification"))?;
        }

        let _ = self.responses.insert(from.clone(), body.z);
        self.ctx.helper.mark_broadcast(3, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.ctx.helper.has_all_broadcasts(3)
    }

    /// Output `(R, Σ zⱼ)` after a final self-check of the aggregate.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        _out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }

        let Self {
            ctx,
            big_r,
            responses,
            ..
        } = *self;

        let mut z = C::Scalar::zero();
        for id in ctx.helper.party_ids() {
            z = z.add(responses.get(id).ok_or(FatalError::InternalInvariantFailed)?);
        }

        let signature = Signature { big_r, z };
        if !signature.verify(ctx.config.public_key(), &ctx.message) {
            error!("assembled threshold signature failed to verify");
            return Ok(Transition::Abort(AbortInfo {
                culprit: None,
                reason: "assembled signature failed to verify".into(),
            }));
        }

        info!("Signing completed successfully.");
        Ok(Transition::Final(signature))
    }
}
