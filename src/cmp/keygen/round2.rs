// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    cmp::{keygen::Stores, Config},
    curve::EcdsaCurve,
    errors::{Error, Result},
    hash::Commitment,
    keystore::KeyOpts,
    messages::Message,
    protocol::SessionHelper,
    round::{CryptoRngCore, Round, Transition},
};

use super::round3::{Broadcast3, Round3};

/// The commitment digest every party broadcasts in round one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast2 {
    pub(super) commitment: Commitment,
}

/// Round two: collect all peers' commitments, then broadcast the opening.
pub(super) struct Round2<C: EcdsaCurve> {
    pub(super) helper: SessionHelper<C>,
    pub(super) stores: Stores<C>,
}

impl<C: EcdsaCurve> Round for Round2<C> {
    type Output = Config<C>;

    fn number(&self) -> u8 {
        2
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.helper.has_broadcast(2, from) {
            debug!("ignoring replayed round two commitment from {from}");
            return Ok(());
        }
        info!("Handling round two keygen message from {from}.");

        let body: Broadcast2 = message.content()?;
        super::attribute(body.commitment.validate(), from)?;
        self.stores
            .commitments
            .import(&KeyOpts::new(self.helper.sid(), from), &body.commitment)?;
        self.helper.mark_broadcast(2, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.helper.has_all_broadcasts(2)
    }

    /// Broadcast the opening of the round-one commitment: every sampled
    /// public value plus the decommitment nonce.
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
        let opts = KeyOpts::new(helper.sid(), &me);

        let broadcast = Broadcast3::<C> {
            rid: stores.rid.get(&opts)?,
            chain_key: stores.chain_key.get(&opts)?,
            ecdsa_key: stores.ecdsa.get(&opts)?.to_public().to_bytes(),
            vss_public: stores.vss_public.get(&opts)?,
            elgamal_key: stores.elgamal.get(&opts)?.to_public().to_bytes(),
            paillier_key: stores.paillier.get(&opts)?.to_public().to_bytes(),
            pedersen_key: stores.pedersen.get(&opts)?.to_public().to_bytes(),
            schnorr_commitment: *stores.schnorr_commitments.get(&opts)?.public_point(),
            decommitment: stores.decommitments.get(&opts)?,
        };

        out.push(Message::broadcast(
            helper.protocol(),
            helper.sid(),
            &me,
            3,
            &broadcast,
        )?);

        Ok(Transition::Next(Box::new(Round3 { helper, stores })))
    }
}
