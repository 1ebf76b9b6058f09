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
    curve::{CurveTrait, ScalarTrait, SchnorrCurve},
    errors::{Error, FatalError, Result, ValidationError},
    frost::{keygen::Stores, Config},
    hash::Decommitment,
    keystore::KeyOpts,
    messages::Message,
    protocol::SessionHelper,
    rid::Rid,
    round::{CryptoRngCore, Round, Transition},
    vss::{ExponentPolynomial, Share},
};

use super::{attribute, round1::opening_payload};

/// The opening of the round-one randomness commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast3 {
    pub(super) rid: Rid,
    pub(super) chain_key: Rid,
    pub(super) decommitment: Decommitment,
}

/// The share `fᵢ(j)` sent to each peer in round two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Direct3<C: SchnorrCurve> {
    #[serde(bound(deserialize = "C: SchnorrCurve"))]
    pub(super) share: Share<C>,
}

/// Round three: verify shares and openings, then combine everything into the
/// final configuration.
pub(super) struct Round3<C: SchnorrCurve> {
    pub(super) helper: SessionHelper<C>,
    pub(super) stores: Stores<C>,
}

impl<C: SchnorrCurve> Round for Round3<C> {
    type Output = Config<C>;

    fn number(&self) -> u8 {
        3
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    fn expects_directs(&self) -> bool {
        true
    }

    #[instrument(skip_all)]
    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.helper.has_broadcast(3, from) {
            debug!("ignoring replayed round three opening from {from}");
            return Ok(());
        }
        info!("Handling round three keygen opening from {from}.");

        let body: Broadcast3 = message.content()?;
        attribute(body.rid.validate(), from)?;
        attribute(body.chain_key.validate(), from)?;
        attribute(body.decommitment.validate(), from)?;

        let opts = KeyOpts::new(self.helper.sid(), from);
        let commitment = self.stores.commitments.get(&opts)?;
        let payload = opening_payload(&body.rid, &body.chain_key)?;
        self.helper
            .hash()
            .verify_commitment(&commitment, &body.decommitment, from, &payload)?;

        self.stores.rid.import(&opts, &body.rid)?;
        self.stores.chain_key.import(&opts, &body.chain_key)?;
        self.stores.decommitments.import(&opts, &body.decommitment)?;

        self.helper.mark_broadcast(3, from);
        Ok(())
    }

    /// Verify the share against the sender's public polynomial in the
    /// exponent: `share·G == Fⱼ(i)`.
    #[instrument(skip_all)]
    fn store_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.helper.has_direct(3, from) {
            debug!("ignoring replayed round three share from {from}");
            return Ok(());
        }
        info!("Handling round three keygen share from {from}.");

        let body: Direct3<C> = message.content()?;
        let Share(share) = &body.share;

        let peer_poly = self
            .stores
            .vss_public
            .get(&KeyOpts::new(self.helper.sid(), from))?;
        let expected = peer_poly.evaluate(&self.helper.party_scalar(self.helper.self_id()));
        if C::generator_mul(share) != expected {
            Err(ValidationError::attributed(from, "vss share fails the Feldman check"))?;
        }

        self.stores
            .shares
            .import(&KeyOpts::new(self.helper.sid(), from), &body.share)?;
        self.helper.mark_direct(3, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.helper.has_all_broadcasts(3) && self.helper.has_all_directs(3)
    }

    /// - fold `RID = ⊕ⱼ RIDⱼ` and `ChainKey = ⊕ⱼ CKⱼ`
    /// - sum received shares into the signing share
    /// - combine the public polynomials and read off every party's public
    ///   share and the group key.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        _out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }
        info!("Keygen completed, assembling the configuration.");

        let Self { mut helper, stores } = *self;
        let me = helper.self_id().clone();
        let sid = helper.sid();

        let mut rid = Rid::empty();
        let mut chain_key = Rid::empty();
        let mut secret = C::Scalar::zero();
        let mut polynomials = Vec::with_capacity(helper.num_parties());
        for id in helper.party_ids() {
            let opts = KeyOpts::new(sid, id);
            rid.xor_assign(&stores.rid.get(&opts)?);
            chain_key.xor_assign(&stores.chain_key.get(&opts)?);
            let Share(share) = stores.shares.get(&opts)?;
            secret = secret.add(&share);
            polynomials.push(stores.vss_public.get(&opts)?);
        }

        let combined = ExponentPolynomial::sum(&polynomials.iter().collect::<Vec<_>>())?;
        if C::generator_mul(&secret) != combined.evaluate(&helper.party_scalar(&me)) {
            Err(FatalError::InternalInvariantFailed)?;
        }

        let public_shares = helper
            .party_ids()
            .iter()
            .map(|id| (id.clone(), combined.evaluate(&helper.party_scalar(id))))
            .collect();

        let config = Config::new(
            me,
            helper.threshold(),
            rid,
            chain_key,
            *combined.constant(),
            public_shares,
            secret,
        )?;

        helper
            .hash_mut()
            .append(b"config", &config.transcript_bytes()?);

        Ok(Transition::Final(config))
    }
}
