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
    cmp::{keygen::Stores, Config},
    curve::EcdsaCurve,
    errors::{Error, Result},
    keystore::KeyOpts,
    messages::Message,
    protocol::SessionHelper,
    round::{CryptoRngCore, Round, Transition},
    zkp::pisch::SchnorrProof,
};

use super::attribute;

/// The Schnorr response every party broadcasts in round four.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Broadcast5<C: EcdsaCurve> {
    #[serde(bound(deserialize = "C: EcdsaCurve"))]
    pub(super) schnorr_response: C::Scalar,
}

/// Round five: verify every peer's proof of knowledge of its final share.
pub(super) struct Round5<C: EcdsaCurve> {
    pub(super) helper: SessionHelper<C>,
    pub(super) stores: Stores<C>,
    pub(super) config: Config<C>,
}

impl<C: EcdsaCurve> Round for Round5<C> {
    type Output = Config<C>;

    fn number(&self) -> u8 {
        5
    }

    fn expects_broadcasts(&self) -> bool {
        true
    }

    /// Reassemble the sender's proof from the commitment opened in round
    /// three and the response received now, and verify it against the
    /// sender's public share and the configuration-bound transcript.
    #[instrument(skip_all)]
    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let from = message.from();
        if self.helper.has_broadcast(5, from) {
            debug!("ignoring replayed round five response from {from}");
            return Ok(());
        }
        info!("Handling round five keygen message from {from}.");

        let body: Broadcast5<C> = message.content()?;
        let commitment = *self
            .stores
            .schnorr_commitments
            .get(&KeyOpts::new(self.helper.sid(), from))?
            .public_point();
        let public = self.config.public_share(from)?.ecdsa;

        let proof = SchnorrProof::from_parts(commitment, body.schnorr_response);
        attribute(
            proof.verify(&public, &mut self.helper.hash_for_id(from)),
            from,
        )?;

        self.helper.mark_broadcast(5, from);
        Ok(())
    }

    fn can_finalize(&self) -> bool {
        self.helper.has_all_broadcasts(5)
    }

    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        _out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        if !self.can_finalize() {
            return Err(Error::NotEnoughMessages);
        }
        info!("Keygen completed successfully.");
        Ok(Transition::Final(self.config))
    }
}
