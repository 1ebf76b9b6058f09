// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paillier affine-group relation proof (`Π[aff-p]`).
//!
//! The statement ties a homomorphic affine operation on the verifier's
//! ciphertext to plaintexts the prover has committed to under its own key:
//!
//! - `D = x ⊙ K ⊕ Enc_N0(y; s)` under the verifier's key `N0`,
//! - `X = Enc_N1(x; r_x)` and `F = Enc_N1(y; r_y)` under the prover's key
//!   `N1`,
//! - `|x| ≤ 2^ℓ` and `|y| ≤ 2^ℓ'`.
//!
//! Signing uses one instance per multiplicative-to-additive conversion.

use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, marker::PhantomData};
use zeroize::Zeroize;

use crate::{
    curve::CurveTrait,
    errors::{Result, ValidationError},
    hash::SessionHash,
    paillier::{Ciphertext, EncryptionKey, Nonce},
    parameters::{ELL, ELL_PRIME, EPSILON},
    ring_pedersen::RingPedersen,
    utils::{
        signed_challenge, sample_unit, sample_symmetric_bits,
        sample_symmetric_scaled, within_symmetric_bits,
    },
};

/// The public statement.
#[derive(Clone)]
pub(crate) struct CommonInput<'a> {
    kv: &'a Ciphertext,
    dv: &'a Ciphertext,
    fp: &'a Ciphertext,
    xp: &'a Ciphertext,
    prover: &'a EncryptionKey,
    verifier: &'a EncryptionKey,
    aux: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kv: &'a Ciphertext,
        dv: &'a Ciphertext,
        fp: &'a Ciphertext,
        xp: &'a Ciphertext,
        prover: &'a EncryptionKey,
        verifier: &'a EncryptionKey,
        aux: &'a RingPedersen,
    ) -> Self {
        Self {
            kv,
            dv,
            fp,
            xp,
            prover,
            verifier,
            aux,
        }
    }
}

/// The prover's secret: the affine coefficients and all three nonces.
pub(crate) struct ProverSecret<'a> {
    x: &'a BigNumber,
    y: &'a BigNumber,
    s: &'a Nonce,
    rx: &'a Nonce,
    ry: &'a Nonce,
}

impl Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("piaffp::ProverSecret([redacted])")
    }
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(
        x: &'a BigNumber,
        y: &'a BigNumber,
        s: &'a Nonce,
        rx: &'a Nonce,
        ry: &'a Nonce,
    ) -> Self {
        Self { x, y, s, rx, ry }
    }
}

/// The proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PiAffpProof<C: CurveTrait> {
    a_ct: Ciphertext,
    bx_ct: Ciphertext,
    by_ct: Ciphertext,
    e_cmt: BigNumber,
    s_cmt: BigNumber,
    f_cmt: BigNumber,
    t_cmt: BigNumber,
    z1: BigNumber,
    z2: BigNumber,
    z3: BigNumber,
    z4: BigNumber,
    w: BigNumber,
    wx: BigNumber,
    wy: BigNumber,
    #[serde(skip)]
    _curve: PhantomData<C>,
}

fn absorb_statement(hash: &mut SessionHash, input: &CommonInput) -> Result<()> {
    hash.append_value(b"piaffp verifier modulus", input.verifier.modulus())?;
    hash.append_value(b"piaffp prover modulus", input.prover.modulus())?;
    hash.append_value(b"piaffp K", input.kv)?;
    hash.append_value(b"piaffp D", input.dv)?;
    hash.append_value(b"piaffp F", input.fp)?;
    hash.append_value(b"piaffp X", input.xp)?;
    hash.append_value(b"piaffp aux", input.aux)?;
    Ok(())
}

impl<C: CurveTrait> PiAffpProof<C> {
    fn absorb_commitments(&self, hash: &mut SessionHash) -> Result<()> {
        hash.append_value(b"piaffp A", &self.a_ct)?;
        hash.append_value(b"piaffp Bx", &self.bx_ct)?;
        hash.append_value(b"piaffp By", &self.by_ct)?;
        hash.append_value(b"piaffp E", &self.e_cmt)?;
        hash.append_value(b"piaffp S", &self.s_cmt)?;
        hash.append_value(b"piaffp F", &self.f_cmt)?;
        hash.append_value(b"piaffp T", &self.t_cmt)?;
        Ok(())
    }

    pub(crate) fn prove<R: rand::RngCore + rand::CryptoRng>(
        rng: &mut R,
        input: &CommonInput,
        secret: &ProverSecret,
        hash: &mut SessionHash,
    ) -> Result<Self> {
        let n_hat = input.aux.modulus();

        let mut alpha = sample_symmetric_bits(rng, ELL + EPSILON);
        let mut beta = sample_symmetric_bits(rng, ELL_PRIME + EPSILON);
        let mut r = sample_unit(rng, input.verifier.modulus())?;
        let mut rx = sample_unit(rng, input.prover.modulus())?;
        let mut ry = sample_unit(rng, input.prover.modulus())?;
        let mut gamma = sample_symmetric_scaled(rng, ELL + EPSILON, n_hat);
        let mut m = sample_symmetric_scaled(rng, ELL, n_hat);
        let mut delta = sample_symmetric_scaled(rng, ELL_PRIME + EPSILON, n_hat);
        let mut mu = sample_symmetric_scaled(rng, ELL, n_hat);

        // A = K^α ⊕ Enc_N0(β; r)
        let a_ct = input.verifier.add(
            &input.verifier.mul_scalar(input.kv, &alpha)?,
            &input
                .verifier
                .encrypt_with_nonce(&beta, &Nonce::from_bn(r.clone()))?,
        );
        let bx_ct = input
            .prover
            .encrypt_with_nonce(&alpha, &Nonce::from_bn(rx.clone()))?;
        let by_ct = input
            .prover
            .encrypt_with_nonce(&beta, &Nonce::from_bn(ry.clone()))?;
        let e_cmt = input.aux.commit(&alpha, &gamma);
        let s_cmt = input.aux.commit(secret.x, &m);
        let f_cmt = input.aux.commit(&beta, &delta);
        let t_cmt = input.aux.commit(secret.y, &mu);

        absorb_statement(hash, input)?;

        let mut proof = Self {
            a_ct,
            bx_ct,
            by_ct,
            e_cmt,
            s_cmt,
            f_cmt,
            t_cmt,
            z1: BigNumber::zero(),
            z2: BigNumber::zero(),
            z3: BigNumber::zero(),
            z4: BigNumber::zero(),
            w: BigNumber::zero(),
            wx: BigNumber::zero(),
            wy: BigNumber::zero(),
            _curve: PhantomData,
        };
        proof.absorb_commitments(hash)?;
        let e = signed_challenge(hash, &C::order())?;

        proof.z1 = &alpha + &e * secret.x;
        proof.z2 = &beta + &e * secret.y;
        proof.z3 = &gamma + &e * &m;
        proof.z4 = &delta + &e * &mu;
        proof.w = r.modmul(
            &secret.s.as_bn().modpow(&e, input.verifier.modulus()),
            input.verifier.modulus(),
        );
        proof.wx = rx.modmul(
            &secret.rx.as_bn().modpow(&e, input.prover.modulus()),
            input.prover.modulus(),
        );
        proof.wy = ry.modmul(
            &secret.ry.as_bn().modpow(&e, input.prover.modulus()),
            input.prover.modulus(),
        );

        alpha.zeroize();
        beta.zeroize();
        r.zeroize();
        rx.zeroize();
        ry.zeroize();
        gamma.zeroize();
        m.zeroize();
        delta.zeroize();
        mu.zeroize();

        Ok(proof)
    }

    pub(crate) fn verify(&self, input: &CommonInput, hash: &mut SessionHash) -> Result<()> {
        absorb_statement(hash, input)?;
        self.absorb_commitments(hash)?;
        let e = signed_challenge(hash, &C::order())?;

        if !within_symmetric_bits(&self.z1, ELL + EPSILON) {
            return Err(
                ValidationError::unattributed("piaffp first response out of range").into(),
            );
        }
        if !within_symmetric_bits(&self.z2, ELL_PRIME + EPSILON) {
            return Err(
                ValidationError::unattributed("piaffp second response out of range").into(),
            );
        }

        // K^z1 ⊕ Enc_N0(z2; w) == A ⊕ D^e
        let lhs = input.verifier.add(
            &input.verifier.mul_scalar(input.kv, &self.z1)?,
            &input
                .verifier
                .encrypt_with_nonce(&self.z2, &Nonce::from_bn(self.w.clone()))?,
        );
        let rhs = input
            .verifier
            .add(&self.a_ct, &input.verifier.mul_scalar(input.dv, &e)?);
        if lhs != rhs {
            return Err(
                ValidationError::unattributed("piaffp affine equation failed").into(),
            );
        }

        // Enc_N1(z1; wx) == Bx ⊕ X^e
        let lhs = input
            .prover
            .encrypt_with_nonce(&self.z1, &Nonce::from_bn(self.wx.clone()))?;
        let rhs = input
            .prover
            .add(&self.bx_ct, &input.prover.mul_scalar(input.xp, &e)?);
        if lhs != rhs {
            return Err(
                ValidationError::unattributed("piaffp x-consistency failed").into(),
            );
        }

        // Enc_N1(z2; wy) == By ⊕ F^e
        let lhs = input
            .prover
            .encrypt_with_nonce(&self.z2, &Nonce::from_bn(self.wy.clone()))?;
        let rhs = input
            .prover
            .add(&self.by_ct, &input.prover.mul_scalar(input.fp, &e)?);
        if lhs != rhs {
            return Err(
                ValidationError::unattributed("piaffp y-consistency failed").into(),
            );
        }

        // s^z1 t^z3 == E · S^e
        let n_hat = input.aux.modulus();
        let lhs = input.aux.commit(&self.z1, &self.z3);
        let rhs = self.e_cmt.modmul(&self.s_cmt.modpow(&e, n_hat), n_hat);
        if lhs != rhs {
            return Err(
                ValidationError::unattributed("piaffp x-commitment equation failed").into(),
            );
        }

        // s^z2 t^z4 == F · T^e
        let lhs = input.aux.commit(&self.z2, &self.z4);
        let rhs = self.f_cmt.modmul(&self.t_cmt.modpow(&e, n_hat), n_hat);
        if lhs != rhs {
            return Err(
                ValidationError::unattributed("piaffp y-commitment equation failed").into(),
            );
        }
        Ok(())
    }
}
