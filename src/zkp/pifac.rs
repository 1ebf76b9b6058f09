// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that a Paillier modulus has no small factors (`Π[fac]`).
//!
//! The commitment aux `(N̂, s, t)` must be provided by the verifier; the
//! soundness of the range bounds depends on it.

use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, marker::PhantomData};
use zeroize::Zeroize;

use crate::{
    curve::CurveTrait,
    errors::{Result, ValidationError},
    hash::SessionHash,
    paillier::bit_length,
    parameters::{ELL, EPSILON},
    ring_pedersen::RingPedersen,
    utils::{signed_challenge, sample_symmetric_scaled, within_symmetric},
};

/// The public statement: the prover's modulus and the verifier's aux.
#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    modulus: &'a BigNumber,
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(modulus: &'a BigNumber, aux: &'a RingPedersen) -> Self {
        Self { modulus, aux }
    }
}

/// The prover's secret: the factors of the modulus.
pub(crate) struct ProverSecret<'a> {
    p: &'a BigNumber,
    q: &'a BigNumber,
}

impl Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("pifac::ProverSecret([redacted])")
    }
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(p: &'a BigNumber, q: &'a BigNumber) -> Self {
        Self { p, q }
    }
}

/// The proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PiFacProof<C: CurveTrait> {
    p_cmt: BigNumber,
    q_cmt: BigNumber,
    a_cmt: BigNumber,
    b_cmt: BigNumber,
    t_cmt: BigNumber,
    sigma: BigNumber,
    z1: BigNumber,
    z2: BigNumber,
    w1: BigNumber,
    w2: BigNumber,
    v: BigNumber,
    #[serde(skip)]
    _curve: PhantomData<C>,
}

/// `2^⌈bits(N0)/2⌉`, the bound standing in for `√N0` in the sampling windows.
fn sqrt_bound(modulus: &BigNumber) -> BigNumber {
    BigNumber::one() << bit_length(modulus).div_ceil(2)
}

fn absorb_statement(hash: &mut SessionHash, input: &CommonInput) -> Result<()> {
    hash.append_value(b"pifac modulus", input.modulus)?;
    hash.append_value(b"pifac aux", input.aux)?;
    Ok(())
}

impl<C: CurveTrait> PiFacProof<C> {
    pub(crate) fn prove<R: rand::RngCore + rand::CryptoRng>(
        rng: &mut R,
        input: &CommonInput,
        secret: &ProverSecret,
        hash: &mut SessionHash,
    ) -> Result<Self> {
        let n_hat = input.aux.modulus();
        let sqrt_n0 = sqrt_bound(input.modulus);

        let mut alpha = sample_symmetric_scaled(rng, ELL + EPSILON, &sqrt_n0);
        let mut beta = sample_symmetric_scaled(rng, ELL + EPSILON, &sqrt_n0);
        let mut mu = sample_symmetric_scaled(rng, ELL, n_hat);
        let mut nu = sample_symmetric_scaled(rng, ELL, n_hat);
        let sigma = sample_symmetric_scaled(rng, ELL, &(input.modulus * n_hat));
        let mut r = sample_symmetric_scaled(rng, ELL + EPSILON, &(input.modulus * n_hat));
        let mut x = sample_symmetric_scaled(rng, ELL + EPSILON, n_hat);
        let mut y = sample_symmetric_scaled(rng, ELL + EPSILON, n_hat);

        let p_cmt = input.aux.commit(secret.p, &mu);
        let q_cmt = input.aux.commit(secret.q, &nu);
        let a_cmt = input.aux.commit(&alpha, &x);
        let b_cmt = input.aux.commit(&beta, &y);
        let t_cmt = input.aux.commit_with_base(&q_cmt, &alpha, &r);

        absorb_statement(hash, input)?;
        hash.append_value(b"pifac P", &p_cmt)?;
        hash.append_value(b"pifac Q", &q_cmt)?;
        hash.append_value(b"pifac A", &a_cmt)?;
        hash.append_value(b"pifac B", &b_cmt)?;
        hash.append_value(b"pifac T", &t_cmt)?;
        hash.append_value(b"pifac sigma", &sigma)?;
        let e = signed_challenge(hash, &C::order())?;

        let sigma_hat = &sigma - &nu * secret.p;
        let z1 = &alpha + &e * secret.p;
        let z2 = &beta + &e * secret.q;
        let w1 = &x + &e * &mu;
        let w2 = &y + &e * &nu;
        let v = &r + &e * &sigma_hat;

        alpha.zeroize();
        beta.zeroize();
        mu.zeroize();
        nu.zeroize();
        r.zeroize();
        x.zeroize();
        y.zeroize();

        Ok(Self {
            p_cmt,
            q_cmt,
            a_cmt,
            b_cmt,
            t_cmt,
            sigma,
            z1,
            z2,
            w1,
            w2,
            v,
            _curve: PhantomData,
        })
    }

    pub(crate) fn verify(&self, input: &CommonInput, hash: &mut SessionHash) -> Result<()> {
        absorb_statement(hash, input)?;
        hash.append_value(b"pifac P", &self.p_cmt)?;
        hash.append_value(b"pifac Q", &self.q_cmt)?;
        hash.append_value(b"pifac A", &self.a_cmt)?;
        hash.append_value(b"pifac B", &self.b_cmt)?;
        hash.append_value(b"pifac T", &self.t_cmt)?;
        hash.append_value(b"pifac sigma", &self.sigma)?;
        let e = signed_challenge(hash, &C::order())?;

        let n_hat = input.aux.modulus();
        let bound = (BigNumber::one() << (ELL + EPSILON)) * sqrt_bound(input.modulus);
        if !within_symmetric(&self.z1, &bound) || !within_symmetric(&self.z2, &bound) {
            return Err(
                ValidationError::unattributed("pifac response out of range").into(),
            );
        }

        // s^z1 t^w1 == A · P^e
        let lhs = input.aux.commit(&self.z1, &self.w1);
        let rhs = self
            .a_cmt
            .modmul(&self.p_cmt.modpow(&e, n_hat), n_hat);
        if lhs != rhs {
            return Err(ValidationError::unattributed("pifac first equation failed").into());
        }

        // s^z2 t^w2 == B · Q^e
        let lhs = input.aux.commit(&self.z2, &self.w2);
        let rhs = self
            .b_cmt
            .modmul(&self.q_cmt.modpow(&e, n_hat), n_hat);
        if lhs != rhs {
            return Err(ValidationError::unattributed("pifac second equation failed").into());
        }

        // Q^z1 t^v == T · (s^N0 t^sigma)^e
        let lhs = input
            .aux
            .commit_with_base(&self.q_cmt, &self.z1, &self.v);
        let r_cmt = input.aux.commit(input.modulus, &self.sigma);
        let rhs = self.t_cmt.modmul(&r_cmt.modpow(&e, n_hat), n_hat);
        if lhs != rhs {
            return Err(ValidationError::unattributed("pifac third equation failed").into());
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
        SessionHash::new(b"pifac test")
    }

    #[test]
    fn honest_proof_verifies_and_round_trips() {
        let mut rng = init_testing();
        let prover_key = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let verifier_key = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let aux = PedersenKeyPair::generate(&mut rng, &verifier_key).unwrap();

        let (p, q) = prover_key.primes();
        let modulus = prover_key.encryption_key().modulus().clone();
        let input = CommonInput::new(&modulus, aux.params());
        let secret = ProverSecret::new(p, q);

        let proof = PiFacProof::<K256>::prove(&mut rng, &input, &secret, &mut transcript()).unwrap();
        assert!(proof.verify(&input, &mut transcript()).is_ok());

        let bytes = serialize!(&proof).unwrap();
        let back: PiFacProof<K256> = deserialize!(&bytes).unwrap();
        assert_eq!(bytes, serialize!(&back).unwrap());
        assert!(back.verify(&input, &mut transcript()).is_ok());
    }

    #[test]
    fn mismatched_statement_fails() {
        let mut rng = init_testing();
        let prover_key = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let other_key = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let verifier_key = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let aux = PedersenKeyPair::generate(&mut rng, &verifier_key).unwrap();

        let (p, q) = prover_key.primes();
        let modulus = prover_key.encryption_key().modulus().clone();
        let input = CommonInput::new(&modulus, aux.params());
        let secret = ProverSecret::new(p, q);
        let proof = PiFacProof::<K256>::prove(&mut rng, &input, &secret, &mut transcript()).unwrap();

        // Same proof against a different modulus.
        let other_modulus = other_key.encryption_key().modulus().clone();
        let other_input = CommonInput::new(&other_modulus, aux.params());
        assert!(proof.verify(&other_input, &mut transcript()).is_err());

        // Factors that do not multiply to the modulus.
        let (op, oq) = other_key.primes();
        let wrong_secret = ProverSecret::new(op, oq);
        let wrong =
            PiFacProof::<K256>::prove(&mut rng, &input, &wrong_secret, &mut transcript()).unwrap();
        assert!(wrong.verify(&input, &mut transcript()).is_err());
    }
}
