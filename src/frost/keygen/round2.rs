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
    curve::SchnorrCurve,
    errors::{Error, Result, ValidationError},
    frost::{keygen::Stores, Config},
    hash::Commitment,
    keys::KeyPair,
    keystore::KeyOpts,
    messages::Message,
    protocol::SessionHelper,
    round::{CryptoRngCore, Round, Transition},
    vss::{ConstantRule, ExponentPolynomial, Share},
    zkp::pisch::SchnorrProof,
};

use super::{
    attribute,
    round3::{Broadcast3, Direct3, Round3},
};

/// The polynomial, constant-term proof, and randomness commitment every
/// party broadcasts in round one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast2<C: SchnorrCurve> {
    #[serde(bound(deserialize = "C: SchnorrCurve"))]
    pub(super) vss_public: ExponentPolynomial<C>,
    #[serde(bound(deserialize = "C: SchnorrCurve"))]
    pub(super) schnorr_proof: SchnorrProof<C>,
    pub(super) commitment: Commitment,
}

/// Round two: verify each peer's polynomial and proof, then open the
/// commitment and distribute shares.
pub(super) struct Round2<C: SchnorrCurve> {
    pub(super) helper: SessionHelper<C>,
    pub(super) stores: Stores<C>,
}

impl<C: SchnorrCurve> Round for Round2<C> {
    type Output = Config<C>;

    fn number(&self) -> u8 {
        2
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    /// - verify the degree and non-identity constant of the polynomial
    /// - verify the Schnorr proof over the constant against a peer-bound
    ///   transcript hash
    /// - import the commitment, the polynomial, and the constant as the
    ///   peer's public key.
    #[instrument(skip_all)]
    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.helper.has_broadcast(2, from) {
            debug!("ignoring replayed round two broadcast from {from}");
            return Ok(());
        }
        info!("Handling round two keygen message from {from}.");

        let body: Broadcast2<C> = message.content()?;
        attribute(body.commitment.validate(), from)?;
        attribute(
            body.vss_public
                .validate(self.helper.threshold(), ConstantRule::NonIdentity),
            from,
        )?;
        if body.schnorr_proof.commitment().is_identity() {
            Err(ValidationError::attributed(from, "schnorr commitment is the identity"))?;
        }

        let public = *body.vss_public.constant();
        attribute(
            body.schnorr_proof
                .verify(&public, &mut self.helper.hash_for_id(from)),
            from,
        )?;

        let opts = KeyOpts::new(self.helper.sid(), from);
        self.stores.commitments.import(&opts, &body.commitment)?;
        self.stores.ec.import(&opts, &KeyPair::public_only(public))?;
        self.stores.vss_public.import(&opts, &body.vss_public)?;

        self.helper.mark_broadcast(2, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.helper.has_all_broadcasts(2)
    }

    /// Open the randomness commitment and send each peer its share `fᵢ(j)`.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }
        info!("Generating round three keygen messages.");

        let Self { helper, stores } = *self;
        let me = helper.self_id().clone();
        let sid = helper.sid();
        let opts = KeyOpts::new(sid, &me);

        out.push(Message::broadcast(
            helper.protocol(),
            sid,
            &me,
            3,
            &Broadcast3 {
                rid: stores.rid.get(&opts)?,
                chain_key: stores.chain_key.get(&opts)?,
                decommitment: stores.decommitments.get(&opts)?,
            },
        )?);

        let vss = stores.vss_secret.get(&opts)?;
        for peer in helper.other_ids() {
            let share = vss.evaluate(&helper.party_scalar(peer));
            out.push(Message::direct(
                helper.protocol(),
                sid,
                &me,
                peer,
                3,
                &Direct3::<C> {
                    share: Share(share),
                },
            )?);
        }

        // Our own share of our own polynomial.
        let own_share = Share::<C>(vss.evaluate(&helper.party_scalar(&me)));
        stores.shares.import(&opts, &own_share)?;

        Ok(Transition::Next(Box::new(Round3 { helper, stores })))
    }
}
