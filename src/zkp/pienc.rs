// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that a Paillier ciphertext encrypts a value in range (`Π[enc]`).
//!
//! The statement is `K = Enc_N0(k; ρ)` with `|k| ≤ 2^ℓ`; the commitment aux
//! `(N̂, s, t)` belongs to the verifier.

use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, marker::PhantomData};
use zeroize::Zeroize;

use crate::{
    curve::CurveTrait,
    errors::{Result, ValidationError},
    hash::SessionHash,
    paillier::{Ciphertext, EncryptionKey, Nonce},
    parameters::{ELL, EPSILON},
    ring_pedersen::RingPedersen,
    utils::{
        signed_challenge, sample_unit, sample_symmetric_bits,
        sample_symmetric_scaled, within_symmetric_bits,
    },
};

/// The public statement.
#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    ciphertext: &'a Ciphertext,
    prover: &'a EncryptionKey,
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        ciphertext: &'a Ciphertext,
        prover: &'a EncryptionKey,
        aux: &'a RingPedersen,
    ) -> Self {
        Self {
            ciphertext,
            prover,
            aux,
        }
    }
}

/// The prover's secret: the plaintext and the encryption nonce.
pub(crate) struct ProverSecret<'a> {
    k: &'a BigNumber,
    rho: &'a Nonce,
}

impl Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("pienc::ProverSecret([redacted])")
    }
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(k: &'a BigNumber, rho: &'a Nonce) -> Self {
        Self { k, rho }
    }
}

/// The proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PiEncProof<C: CurveTrait> {
    s_cmt: BigNumber,
    a_ct: Ciphertext,
    c_cmt: BigNumber,
    z1: BigNumber,
    z2: BigNumber,
    z3: BigNumber,
    #[serde(skip)]
    _curve: PhantomData<C>,
}

fn absorb_statement(hash: &mut SessionHash, input: &CommonInput) -> Result<()> {
    hash.append_value(b"pienc prover modulus", input.prover.modulus())?;
    hash.append_value(b"pienc ciphertext", input.ciphertext)?;
    hash.append_value(b"pienc aux", input.aux)?;
    Ok(())
}

impl<C: CurveTrait> PiEncProof<C> {
    pub(crate) fn prove<R: rand::RngCore + rand::CryptoRng>(
        rng: &mut R,
        input: &CommonInput,
        secret: &ProverSecret,
        hash: &mut SessionHash,
    ) -> Result<Self> {
        let mut alpha = sample_symmetric_bits(rng, ELL + EPSILON);
        let mut mu = sample_symmetric_scaled(rng, ELL, input.aux.modulus());
        let mut r = sample_unit(rng, input.prover.modulus())?;
        let mut gamma = sample_symmetric_scaled(rng, ELL + EPSILON, input.aux.modulus());

        let s_cmt = input.aux.commit(secret.k, &mu);
        let a_ct = input
            .prover
            .encrypt_with_nonce(&alpha, &Nonce::from_bn(r.clone()))?;
        let c_cmt = input.aux.commit(&alpha, &gamma);

        absorb_statement(hash, input)?;
        hash.append_value(b"pienc S", &s_cmt)?;
        hash.append_value(b"pienc A", &a_ct)?;
        hash.append_value(b"pienc C", &c_cmt)?;
        let e = signed_challenge(hash, &C::order())?;

        let z1 = &alpha + &e * secret.k;
        let z2 = r.modmul(
            &secret.rho.as_bn().modpow(&e, input.prover.modulus()),
            input.prover.modulus(),
        );
        let z3 = &gamma + &e * &mu;

        alpha.zeroize();
        mu.zeroize();
        r.zeroize();
        gamma.zeroize();

        Ok(Self {
            s_cmt,
            a_ct,
            c_cmt,
            z1,
            z2,
            z3,
            _curve: PhantomData,
        })
    }

    pub(crate) fn verify(&self, input: &CommonInput, hash: &mut SessionHash) -> Result<()> {
        absorb_statement(hash, input)?;
        hash.append_value(b"pienc S", &self.s_cmt)?;
        hash.append_value(b"pienc A", &self.a_ct)?;
        hash.append_value(b"pienc C", &self.c_cmt)?;
        let e = signed_challenge(hash, &C::order())?;

        if !within_symmetric_bits(&self.z1, ELL + EPSILON) {
            return Err(ValidationError::unattributed("pienc response out of range").into());
        }

        // Enc(z1; z2) == A ⊕ e⊙K
        let lhs = input
            .prover
            .encrypt_with_nonce(&self.z1, &Nonce::from_bn(self.z2.clone()))?;
        let rhs = input
            .prover
            .add(&self.a_ct, &input.prover.mul_scalar(input.ciphertext, &e)?);
        if lhs != rhs {
            return Err(
                ValidationError::unattributed("pienc ciphertext equation failed").into(),
            );
        }

        // s^z1 t^z3 == C · S^e
        let lhs = input.aux.commit(&self.z1, &self.z3);
        let rhs = self
            .c_cmt
            .modmul(&self.s_cmt.modpow(&e, input.aux.modulus()), input.aux.modulus());
        if lhs != rhs {
            return Err(
                ValidationError::unattributed("pienc commitment equation failed").into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        k256::K256, paillier::DecryptionKey, pool::Pool, ring_pedersen::PedersenKeyPair,
        utils::testing::init_testing,
    };

    fn transcript() -> SessionHash {
        SessionHash::new(b"pienc test")
    }

    #[test]
    fn honest_proof_verifies_and_round_trips() {
        let mut rng = init_testing();
        let prover_dk = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let prover = prover_dk.encryption_key();
        let verifier_dk = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let aux = PedersenKeyPair::generate(&mut rng, &verifier_dk).unwrap();

        let k = sample_symmetric_bits(&mut rng, ELL);
        let (ciphertext, rho) = prover.encrypt(&mut rng, &k).unwrap();

        let input = CommonInput::new(&ciphertext, &prover, aux.params());
        let secret = ProverSecret::new(&k, &rho);
        let proof =
            PiEncProof::<K256>::prove(&mut rng, &input, &secret, &mut transcript()).unwrap();
        assert!(proof.verify(&input, &mut transcript()).is_ok());

        let bytes = serialize!(&proof).unwrap();
        let back: PiEncProof<K256> = deserialize!(&bytes).unwrap();
        assert_eq!(bytes, serialize!(&back).unwrap());
        assert!(back.verify(&input, &mut transcript()).is_ok());

        // A diverged transcript rejects.
        let mut diverged = transcript();
        diverged.append(b"x", b"diverged");
        assert!(proof.verify(&input, &mut diverged).is_err());

        // A different ciphertext rejects.
        let (other, _) = prover.encrypt(&mut rng, &k).unwrap();
        let other_input = CommonInput::new(&other, &prover, aux.params());
        assert!(proof.verify(&other_input, &mut transcript()).is_err());
    }

    #[test]
    fn out_of_range_plaintext_fails() {
        let mut rng = init_testing();
        let prover_dk = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let prover = prover_dk.encryption_key();
        let verifier_dk = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let aux = PedersenKeyPair::generate(&mut rng, &verifier_dk).unwrap();

        // Far outside the ±2^ℓ window the range check must catch it.
        let k = BigNumber::one() << (ELL + EPSILON + 8);
        let (ciphertext, rho) = prover.encrypt(&mut rng, &k).unwrap();

        let input = CommonInput::new(&ciphertext, &prover, aux.params());
        let secret = ProverSecret::new(&k, &rho);
        let proof =
            PiEncProof::<K256>::prove(&mut rng, &input, &secret, &mut transcript()).unwrap();
        assert!(proof.verify(&input, &mut transcript()).is_err());
    }
}
