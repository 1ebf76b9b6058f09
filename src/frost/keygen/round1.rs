// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use tracing::info;

use crate::{
    curve::SchnorrCurve,
    errors::Result,
    frost::{keygen::Stores, Config},
    keys::KeyPair,
    keystore::KeyOpts,
    messages::Message,
    protocol::SessionHelper,
    rid::Rid,
    round::{CryptoRngCore, Round, Transition},
    vss::Polynomial,
    zkp::pisch::SchnorrProof,
};

use super::round2::{Broadcast2, Round2};

/// Round one: sample the polynomial and randomness, broadcast the polynomial
/// with a proof of its constant term and a commitment to the randomness.
pub(super) struct Round1<C: SchnorrCurve> {
    pub(super) helper: SessionHelper<C>,
    pub(super) stores: Stores<C>,
}

/// The bytes a party commits to in round one and opens in round two.
pub(super) fn opening_payload(rid: &Rid, chain_key: &Rid) -> Result<Vec<u8>> {
    serialize!(&(rid, chain_key))
}

impl<C: SchnorrCurve> Round for Round1<C> {
    type Output = Config<C>;

    fn number(&self) -> u8 {
        1
    }

    fn can_finalize(&self) -> bool {
        true
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        info!("Generating round one keygen messages.");
        let mut rng = rng;

        let Self { helper, stores } = *self;
        let me = helper.self_id().clone();
        let opts = KeyOpts::new(helper.sid(), &me);

        let rid = Rid::random(&mut rng);
        let chain_key = Rid::random(&mut rng);
        let payload = opening_payload(&rid, &chain_key)?;
        let (commitment, decommitment) = helper.hash().commit(&mut rng, &me, &payload);

        let (x, big_x) = C::random_scalar_point_pair(&mut rng);
        let vss = Polynomial::<C>::sample(&mut rng, helper.threshold(), Some(x));
        let vss_public = vss.to_exponent();

        let schnorr_proof =
            SchnorrProof::<C>::prove(&mut rng, &big_x, &x, &mut helper.hash_for_id(&me))?;

        stores.ec.import(&opts, &KeyPair::new(x, big_x))?;
        stores.vss_secret.import(&opts, &vss)?;
        stores.vss_public.import(&opts, &vss_public)?;
        stores.rid.import(&opts, &rid)?;
        stores.chain_key.import(&opts, &chain_key)?;
        stores.commitments.import(&opts, &commitment)?;
        stores.decommitments.import(&opts, &decommitment)?;

        out.push(Message::broadcast(
            helper.protocol(),
            helper.sid(),
            &me,
            2,
            &Broadcast2::<C> {
                vss_public,
                schnorr_proof,
                commitment,
            },
        )?);

        Ok(Transition::Next(Box::new(Round2 { helper, stores })))
    }
}
