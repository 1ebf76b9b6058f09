// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use tracing::info;

use crate::{
    curve::{CurveTrait, SchnorrCurve},
    errors::Result,
    frost::sign::{SignContext, Signature},
    keys::KeyPair,
    keystore::KeyOpts,
    messages::Message,
    round::{CryptoRngCore, Round, Transition},
};

use super::round2::{Broadcast2, Round2};

/// Round one: sample the two-nonce pair and broadcast its commitments.
pub(super) struct Round1<C: SchnorrCurve> {
    pub(super) ctx: SignContext<C>,
}

impl<C: SchnorrCurve> Round for Round1<C> {
    type Output = Signature<C>;

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
        info!("Generating round one signing messages.");
        let mut rng = rng;

        let Self { ctx } = *self;
        let me = ctx.helper.self_id().clone();
        let opts = KeyOpts::new(ctx.helper.sid(), &me);

        let (d, big_d) = C::random_scalar_point_pair(&mut rng);
        let (e, big_e) = C::random_scalar_point_pair(&mut rng);

        ctx.stores.nonce_d.import(&opts, &KeyPair::new(d, big_d))?;
        ctx.stores.nonce_e.import(&opts, &KeyPair::new(e, big_e))?;

        out.push(Message::broadcast(
            ctx.helper.protocol(),
            ctx.helper.sid(),
            &me,
            2,
            &Broadcast2::<C> { big_d, big_e },
        )?);

        Ok(Transition::Next(Box::new(Round2 { ctx })))
    }
}
