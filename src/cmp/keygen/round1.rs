// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use tracing::info;

use crate::{
    cmp::{keygen::Stores, Config},
    curve::EcdsaCurve,
    errors::Result,
    keys::KeyPair,
    keystore::KeyOpts,
    messages::Message,
    paillier::{DecryptionKey, PaillierKeyPair},
    protocol::SessionHelper,
    rid::Rid,
    ring_pedersen::PedersenKeyPair,
    round::{CryptoRngCore, Round, Transition},
    vss::Polynomial,
    zkp::pisch::SchnorrPrecommit,
};

use super::{round2::Broadcast2, round2::Round2};

/// Round one: sample all key material and broadcast a commitment to the
/// public parts.
pub(super) struct Round1<C: EcdsaCurve> {
    pub(super) helper: SessionHelper<C>,
    pub(super) stores: Stores<C>,
}

impl<C: EcdsaCurve> Round for Round1<C> {
    type Output = Config<C>;

    fn number(&self) -> u8 {
        1
    }

    fn can_finalize(&self) -> bool {
        true
    }

    /// - sample Paillier (two safe primes), Pedersen over `N`, ElGamal,
    ///   an ECDSA share with its degree-`t` VSS polynomial, a Schnorr
    ///   pre-commitment, `RIDᵢ`, and `CKᵢ`
    /// - commit to all public parts and broadcast the digest only.
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

        let paillier = PaillierKeyPair::new(DecryptionKey::generate(&mut rng, helper.pool())?);
        let pedersen = PedersenKeyPair::generate(&mut rng, paillier.decryption_key()?)?;

        let (elgamal_secret, elgamal_point) = C::random_scalar_point_pair(&mut rng);
        let elgamal = KeyPair::new(elgamal_secret, elgamal_point);

        let (x, big_x) = C::random_scalar_point_pair(&mut rng);
        let ecdsa = KeyPair::new(x, big_x);
        let vss = Polynomial::<C>::sample(&mut rng, helper.threshold(), Some(x));
        let vss_public = vss.to_exponent();

        let schnorr = SchnorrPrecommit::<C>::sample(&mut rng);
        let rid = Rid::random(&mut rng);
        let chain_key = Rid::random(&mut rng);

        let payload = super::round3::opening_payload::<C>(
            &rid,
            &chain_key,
            &ecdsa.to_public().to_bytes(),
            &vss_public,
            &elgamal.to_public().to_bytes(),
            &paillier.to_public().to_bytes(),
            &pedersen.to_public().to_bytes(),
            schnorr.commitment(),
        )?;
        let (commitment, decommitment) = helper.hash().commit(&mut rng, &me, &payload);

        stores.paillier.import(&opts, &paillier)?;
        stores.pedersen.import(&opts, &pedersen)?;
        stores.elgamal.import(&opts, &elgamal)?;
        stores.ecdsa.import(&opts, &ecdsa)?;
        stores.vss_secret.import(&opts, &vss)?;
        stores.vss_public.import(&opts, &vss_public)?;
        stores.rid.import(&opts, &rid)?;
        stores.chain_key.import(&opts, &chain_key)?;
        stores.commitments.import(&opts, &commitment)?;
        stores.decommitments.import(&opts, &decommitment)?;
        stores.schnorr_precommits.import(&opts, &schnorr)?;
        stores
            .schnorr_commitments
            .import(&opts, &KeyPair::public_only(*schnorr.commitment()))?;

        out.push(Message::broadcast(
            helper.protocol(),
            helper.sid(),
            &me,
            2,
            &Broadcast2 { commitment },
        )?);

        Ok(Transition::Next(Box::new(Round2 { helper, stores })))
    }
}
