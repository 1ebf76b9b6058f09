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
    curve::{EcdsaCurve, ScalarTrait},
    errors::{Error, FatalError, Result, ValidationError},
    messages::Message,
    protocol::PartyId,
    round::{AbortInfo, CryptoRngCore, Round, Transition},
};

/// The partial signature every party broadcasts in round four.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast5<C: EcdsaCurve> {
    #[serde(bound(deserialize = "C: EcdsaCurve"))]
    pub(super) sigma: C::Scalar,
}

/// Round five: sum the partial signatures and verify the result.
pub(super) struct Round5<C: EcdsaCurve> {
    pub(super) ctx: SignContext<C>,
    pub(super) r: C::Scalar,
    pub(super) sigmas: BTreeMap<PartyId, C::Scalar>,
}

impl<C: EcdsaCurve> Round for Round5<C> {
    type Output = C::Signature;

    fn number(&self) -> u8 {
        5
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.ctx.helper.has_broadcast(5, from) {
            debug!("ignoring replayed round five sigma from {from}");
            return Ok(());
        }
        info!("Handling round five signing broadcast from {from}.");

        let body: Broadcast5<C> = message.content()?;
        if body.sigma.is_zero() {
            Err(ValidationError::attributed(from, "signature share is zero"))?;
        }
        let _ = self.sigmas.insert(from.clone(), body.sigma);
        self.ctx.helper.mark_broadcast(5, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.ctx.helper.has_all_broadcasts(5)
    }

    /// - compute `σ = Σ σⱼ`, low-S normalized
    /// - verify `(r, σ)` under the group public key and the digest; abort on
    ///   failure, otherwise return the signature.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        _out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }

        let Self { ctx, r, sigmas } = *self;

        let mut sigma = C::Scalar::zero();
        for id in ctx.helper.party_ids() {
            sigma = sigma.add(sigmas.get(id).ok_or(FatalError::InternalInvariantFailed)?);
        }
        if C::is_high(&sigma) {
            sigma = sigma.negate();
        }

        let signature = C::signature_from_scalars(&r, &sigma)?;
        let verifying_key = ctx.config.verifying_key()?;
        if C::verify_prehash(&verifying_key, &ctx.digest, &signature).is_err() {
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
