// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! ElGamal encryption in the exponent over a generic curve.
//!
//! Each CMP participant generates an ElGamal key during key generation and
//! carries every party's public key in its final configuration.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    curve::{CurveTrait, ScalarTrait},
    keys::KeyPair,
};

/// An ElGamal ciphertext `(L, M) = (b·G, m·G + b·Y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalCiphertext<C: CurveTrait> {
    l: C,
    m: C,
}

/// Encrypt `message` in the exponent under `public_key`, returning the
/// ciphertext and the blinding scalar.
pub fn encrypt<C: CurveTrait, R: RngCore + CryptoRng>(
    rng: &mut R,
    message: &C::Scalar,
    public_key: &C,
) -> (ElGamalCiphertext<C>, C::Scalar) {
    let blind = C::Scalar::random(rng);
    let l = C::generator_mul(&blind);
    let m = C::generator_mul(message) + public_key.mul(&blind);
    (ElGamalCiphertext { l, m }, blind)
}

/// Recover the message point `m·G` with the secret key. The message scalar
/// itself stays hidden behind the discrete log.
pub fn decrypt_point<C: CurveTrait>(key: &KeyPair<C>, ciphertext: &ElGamalCiphertext<C>) -> crate::errors::Result<C> {
    let secret = key.private_scalar()?;
    let shared = ciphertext.l.mul(secret);
    Ok(ciphertext.m + shared.mul(&C::Scalar::one().negate()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ed25519::Ed25519, k256::K256, utils::testing::init_testing};

    fn round_trip<C: CurveTrait>() {
        let mut rng = init_testing();
        let (secret, public) = C::random_scalar_point_pair(&mut rng);
        let key = KeyPair::<C>::new(secret, public);

        let message = C::Scalar::random(&mut rng);
        let (ciphertext, _) = encrypt(&mut rng, &message, key.public_point());

        let point = decrypt_point(&key, &ciphertext).unwrap();
        assert_eq!(point, C::generator_mul(&message));

        // A public-only key cannot decrypt.
        assert!(decrypt_point(&key.to_public(), &ciphertext).is_err());
    }

    #[test]
    fn k256_round_trip() {
        round_trip::<K256>();
    }

    #[test]
    fn ed25519_round_trip() {
        round_trip::<Ed25519>();
    }

    #[test]
    fn ciphertexts_are_randomized() {
        let mut rng = init_testing();
        let (_, public) = K256::random_scalar_point_pair(&mut rng);
        let message = <K256 as CurveTrait>::Scalar::random(&mut rng);
        let (c1, _) = encrypt(&mut rng, &message, &public);
        let (c2, _) = encrypt(&mut rng, &message, &public);
        assert_ne!(c1, c2);
    }
}
