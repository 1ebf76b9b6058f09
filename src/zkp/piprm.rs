// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that ring-Pedersen parameters are well-formed (`Π[prm]`).
//!
//! Cut-and-choose over [`SOUNDNESS`] iterations that the prover knows `λ`
//! with `t = s^λ mod N`.

use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    errors::{Result, ValidationError},
    hash::SessionHash,
    parameters::SOUNDNESS,
    ring_pedersen::{RingPedersen, RingPedersenSecret},
    utils::sample_below,
};

/// The proof: one commitment/response pair per challenge bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PiPrmProof {
    commitments: Vec<BigNumber>,
    responses: Vec<BigNumber>,
}

/// Expand transcript bytes into one challenge bit per iteration.
fn challenge_bits(hash: &mut SessionHash) -> Vec<bool> {
    let mut bytes = vec![0u8; SOUNDNESS.div_ceil(8)];
    hash.challenge_bytes(b"piprm challenge bits", &mut bytes);
    (0..SOUNDNESS)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1)
        .collect()
}

fn absorb_statement(hash: &mut SessionHash, params: &RingPedersen) -> Result<()> {
    hash.append_value(b"piprm params", params)
}

impl PiPrmProof {
    pub(crate) fn prove<R: rand::RngCore + rand::CryptoRng>(
        rng: &mut R,
        params: &RingPedersen,
        secret: &RingPedersenSecret,
        hash: &mut SessionHash,
    ) -> Result<Self> {
        let mut nonces = Vec::with_capacity(SOUNDNESS);
        let mut commitments = Vec::with_capacity(SOUNDNESS);
        for _ in 0..SOUNDNESS {
            let a = sample_below(rng, secret.totient());
            commitments.push(params.s().modpow(&a, params.modulus()));
            nonces.push(a);
        }

        absorb_statement(hash, params)?;
        hash.append_value(b"piprm commitments", &commitments)?;
        let bits = challenge_bits(hash);

        let responses = nonces
            .iter()
            .zip(bits.iter())
            .map(|(a, bit)| {
                if *bit {
                    (a + secret.lambda()).nmod(secret.totient())
                } else {
                    a.clone()
                }
            })
            .collect();

        for nonce in nonces.iter_mut() {
            nonce.zeroize();
        }

        Ok(Self {
            commitments,
            responses,
        })
    }

    pub(crate) fn verify(&self, params: &RingPedersen, hash: &mut SessionHash) -> Result<()> {
        params.validate()?;
        if self.commitments.len() != SOUNDNESS || self.responses.len() != SOUNDNESS {
            return Err(ValidationError::unattributed("piprm proof has wrong length").into());
        }

        absorb_statement(hash, params)?;
        hash.append_value(b"piprm commitments", &self.commitments)?;
        let bits = challenge_bits(hash);

        for ((commitment, response), bit) in self
            .commitments
            .iter()
            .zip(self.responses.iter())
            .zip(bits.iter())
        {
            if commitment.gcd(params.modulus()) != BigNumber::one() {
                return Err(
                    ValidationError::unattributed("piprm commitment not invertible").into(),
                );
            }
            // s^z == A · t^e
            let lhs = params.s().modpow(response, params.modulus());
            let mut rhs = commitment.clone();
            if *bit {
                rhs = rhs.modmul(params.t(), params.modulus());
            }
            if lhs != rhs {
                return Err(
                    ValidationError::unattributed("piprm equation failed").into(),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        paillier::DecryptionKey, pool::Pool, ring_pedersen::PedersenKeyPair,
        utils::testing::init_testing,
    };

    fn transcript() -> SessionHash {
        SessionHash::new(b"piprm test")
    }

    #[test]
    fn honest_proof_verifies_and_round_trips() {
        let mut rng = init_testing();
        let dk = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let pair = PedersenKeyPair::generate(&mut rng, &dk).unwrap();

        let proof = PiPrmProof::prove(
            &mut rng,
            pair.params(),
            pair.secret().unwrap(),
            &mut transcript(),
        )
        .unwrap();
        assert!(proof.verify(pair.params(), &mut transcript()).is_ok());

        let bytes = serialize!(&proof).unwrap();
        let back: PiPrmProof = deserialize!(&bytes).unwrap();
        assert_eq!(bytes, serialize!(&back).unwrap());
        assert!(back.verify(pair.params(), &mut transcript()).is_ok());
    }

    #[test]
    fn unrelated_parameters_are_rejected() {
        let mut rng = init_testing();
        let dk = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let pair = PedersenKeyPair::generate(&mut rng, &dk).unwrap();
        let other = PedersenKeyPair::generate(&mut rng, &dk).unwrap();

        let proof = PiPrmProof::prove(
            &mut rng,
            pair.params(),
            pair.secret().unwrap(),
            &mut transcript(),
        )
        .unwrap();
        assert!(proof.verify(other.params(), &mut transcript()).is_err());

        let mut diverged = transcript();
        diverged.append(b"x", b"diverged");
        assert!(proof.verify(pair.params(), &mut diverged).is_err());
    }
}
