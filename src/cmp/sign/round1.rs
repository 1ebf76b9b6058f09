// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::{
    cmp::sign::SignContext,
    curve::{CurveTrait, EcdsaCurve},
    errors::Result,
    messages::Message,
    round::{CryptoRngCore, Round, Transition},
    zkp::pienc,
};

use super::round2::{Broadcast2, Direct2, Round2};

/// Round one: sample the nonce shares and send their encryptions with range
/// proofs.
pub(super) struct Round1<C: EcdsaCurve> {
    pub(super) ctx: SignContext<C>,
}

impl<C: EcdsaCurve> Round for Round1<C> {
    type Output = C::Signature;

    fn number(&self) -> u8 {
        1
    }

    fn can_finalize(&self) -> bool {
        true
    }

    /// - sample `kᵢ, γᵢ`; encrypt both under the own Paillier key
    /// - broadcast `(Kᵢ, Gᵢ)`
    /// - send each peer a `Π[enc]` proof for `Kᵢ` bound to that peer's
    ///   Pedersen parameters.
    #[instrument(skip_all)]
    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>> {
        info!("Generating round one signing messages.");
        let mut rng = rng;

        let Self { ctx } = *self;
        let me = ctx.helper.self_id().clone();
        let sid = ctx.helper.sid();

        let own_paillier = ctx.config.public_share(&me)?.paillier.clone();

        let (k, _) = C::random_scalar_point_pair(&mut rng);
        let (gamma, _) = C::random_scalar_point_pair(&mut rng);
        let (k_ct, k_nonce) = own_paillier.encrypt(&mut rng, &C::scalar_to_bn(&k))?;
        let (g_ct, g_nonce) = own_paillier.encrypt(&mut rng, &C::scalar_to_bn(&gamma))?;

        out.push(Message::broadcast(
            ctx.helper.protocol(),
            sid,
            &me,
            2,
            &Broadcast2 {
                k_ct: k_ct.clone(),
                g_ct: g_ct.clone(),
            },
        )?);

        // Per-peer range proofs fan out through the pool with forked
        // randomness.
        let others = ctx.helper.other_ids().to_vec();
        let seeds: Vec<[u8; 32]> = others
            .iter()
            .map(|_| {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                seed
            })
            .collect();
        let k_bn = C::scalar_to_bn(&k);

        let directs = ctx.helper.pool().parallelize(others.len(), |i| {
            let mut local_rng = rand::rngs::StdRng::from_seed(seeds[i]);
            let peer = &others[i];
            let aux = &ctx.config.public_share(peer)?.pedersen;

            let input = pienc::CommonInput::new(&k_ct, &own_paillier, aux);
            let secret = pienc::ProverSecret::new(&k_bn, &k_nonce);
            let enc_proof = pienc::PiEncProof::<C>::prove(
                &mut local_rng,
                &input,
                &secret,
                &mut ctx.helper.hash_for_id(&me),
            )?;

            Message::direct(
                ctx.helper.protocol(),
                sid,
                &me,
                peer,
                2,
                &Direct2::<C> { enc_proof },
            )
        });
        for direct in directs {
            out.push(direct?);
        }

        let mut k_cts = BTreeMap::new();
        let mut g_cts = BTreeMap::new();
        let _ = k_cts.insert(me.clone(), k_ct);
        let _ = g_cts.insert(me.clone(), g_ct);

        drop(k_nonce);
        Ok(Transition::Next(Box::new(Round2 {
            ctx,
            k,
            gamma,
            g_nonce,
            k_cts,
            g_cts,
            enc_proofs: BTreeMap::new(),
        })))
    }
}
