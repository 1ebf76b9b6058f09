// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that a Paillier modulus is a Blum integer (`Π[mod]`).
//!
//! For each transcript-derived challenge `y`, the prover exhibits an `N`-th
//! root of `y` and a fourth root of `(-1)^a w^b y` for the unique sign
//! choice that lands in the quadratic residues. Only a modulus with both
//! factors `≡ 3 (mod 4)` admits these roots for every challenge.

use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{FatalError, Result, ValidationError},
    hash::SessionHash,
    paillier::DecryptionKey,
    parameters::SOUNDNESS,
    pool::Pool,
    utils::{is_even, jacobi, unsigned_challenge, sample_below},
};

/// One challenge's worth of roots and sign choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PiModElement {
    fourth_root: BigNumber,
    negate: bool,
    multiply_w: bool,
    nth_root: BigNumber,
}

/// The proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PiModProof {
    w: BigNumber,
    elements: Vec<PiModElement>,
}

/// Legendre symbol via Euler's criterion; `p` must be an odd prime.
fn legendre(a: &BigNumber, p: &BigNumber) -> i32 {
    let exponent = (p - 1) >> 1;
    let result = a.modpow(&exponent, p);
    if result == BigNumber::one() {
        1
    } else if result == BigNumber::zero() {
        0
    } else {
        -1
    }
}

/// A square root of quadratic residue `a` mod prime `p ≡ 3 (mod 4)` that is
/// itself a quadratic residue.
fn sqrt_qr(a: &BigNumber, p: &BigNumber) -> BigNumber {
    let exponent = (p + 1) >> 2;
    let root = a.modpow(&exponent, p);
    // Of the two roots ±r, exactly one is a residue since -1 is not.
    if legendre(&root, p) == 1 {
        root
    } else {
        (p - &root).nmod(p)
    }
}

/// Combine residues mod `p` and `q` into a residue mod `p·q`.
fn crt(a_p: &BigNumber, a_q: &BigNumber, p: &BigNumber, q: &BigNumber) -> Result<BigNumber> {
    let p_inv = p.invert(q).ok_or(FatalError::InternalInvariantFailed)?;
    let diff = (a_q - a_p).nmod(q);
    let lift = diff.modmul(&p_inv, q);
    Ok((a_p + p * lift).nmod(&(p * q)))
}

fn absorb_statement(hash: &mut SessionHash, n: &BigNumber) -> Result<()> {
    hash.append_value(b"pimod modulus", n)
}

impl PiModProof {
    pub(crate) fn prove<R: rand::RngCore + rand::CryptoRng>(
        rng: &mut R,
        key: &DecryptionKey,
        hash: &mut SessionHash,
        pool: &Pool,
    ) -> Result<Self> {
        let (p, q) = key.primes();
        let n = key.encryption_key().modulus().clone();

        // A reference non-residue: half of all draws have Jacobi symbol -1.
        let mut w = None;
        for _ in 0..crate::utils::SAMPLING_RETRIES {
            let candidate = sample_below(rng, &n);
            if jacobi(&candidate, &n) == -1 {
                w = Some(candidate);
                break;
            }
        }
        let w = w.ok_or(FatalError::RetryFailed)?;

        absorb_statement(hash, &n)?;
        hash.append_value(b"pimod w", &w)?;

        // Challenges come out of the transcript sequentially; the root
        // computations fan out through the pool.
        let challenges = (0..SOUNDNESS)
            .map(|_| unsigned_challenge(hash, &n))
            .collect::<Result<Vec<_>>>()?;

        let n_inv = n
            .invert(key.totient())
            .ok_or(FatalError::InternalInvariantFailed)?;

        let elements = pool.parallelize(SOUNDNESS, |i| {
            let y = &challenges[i];
            let nth_root = y.modpow(&n_inv, &n);

            for (negate, multiply_w) in
                [(false, false), (false, true), (true, false), (true, true)]
            {
                let mut adjusted = y.clone();
                if multiply_w {
                    adjusted = adjusted.modmul(&w, &n);
                }
                if negate {
                    adjusted = (&n - &adjusted).nmod(&n);
                }
                if legendre(&adjusted, p) == 1 && legendre(&adjusted, q) == 1 {
                    let root_p = sqrt_qr(&sqrt_qr(&adjusted, p), p);
                    let root_q = sqrt_qr(&sqrt_qr(&adjusted, q), q);
                    let fourth_root = crt(&root_p, &root_q, p, q)?;
                    return Ok(PiModElement {
                        fourth_root,
                        negate,
                        multiply_w,
                        nth_root,
                    });
                }
            }
            Err(ValidationError::unattributed("modulus is not a Blum integer").into())
        });

        Ok(Self {
            w,
            elements: elements.into_iter().collect::<Result<Vec<_>>>()?,
        })
    }

    pub(crate) fn verify(
        &self,
        n: &BigNumber,
        hash: &mut SessionHash,
        pool: &Pool,
    ) -> Result<()> {
        if is_even(n) || n <= &BigNumber::one() {
            return Err(ValidationError::unattributed("modulus is not odd").into());
        }
        if n.is_prime() {
            return Err(ValidationError::unattributed("modulus is prime").into());
        }
        if self.elements.len() != SOUNDNESS {
            return Err(ValidationError::unattributed("pimod proof has wrong length").into());
        }
        if self.w <= BigNumber::zero() || &self.w >= n || jacobi(&self.w, n) != -1 {
            return Err(ValidationError::unattributed("pimod w is malformed").into());
        }

        absorb_statement(hash, n)?;
        hash.append_value(b"pimod w", &self.w)?;
        let challenges = (0..SOUNDNESS)
            .map(|_| unsigned_challenge(hash, n))
            .collect::<Result<Vec<_>>>()?;

        let checks = pool.parallelize(SOUNDNESS, |i| {
            let y = &challenges[i];
            let element = &self.elements[i];

            // z^N == y
            if element.nth_root.modpow(n, n) != *y {
                return false;
            }

            // x^4 == (-1)^a w^b y
            let mut expected = y.clone();
            if element.multiply_w {
                expected = expected.modmul(&self.w, n);
            }
            if element.negate {
                expected = (n - &expected).nmod(n);
            }
            let x_squared = element.fourth_root.modmul(&element.fourth_root, n);
            x_squared.modmul(&x_squared, n) == expected
        });

        if checks.iter().all(|ok| *ok) {
            Ok(())
        } else {
            Err(ValidationError::unattributed("pimod verification failed").into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    fn transcript() -> SessionHash {
        SessionHash::new(b"pimod test")
    }

    #[test]
    fn honest_proof_verifies_and_round_trips() {
        let mut rng = init_testing();
        let pool = Pool::global();
        let key = DecryptionKey::generate(&mut rng, &pool).unwrap();
        let n = key.encryption_key().modulus().clone();

        let proof = PiModProof::prove(&mut rng, &key, &mut transcript(), &pool).unwrap();
        assert!(proof.verify(&n, &mut transcript(), &pool).is_ok());

        let bytes = serialize!(&proof).unwrap();
        let back: PiModProof = deserialize!(&bytes).unwrap();
        assert_eq!(bytes, serialize!(&back).unwrap());
        assert!(back.verify(&n, &mut transcript(), &pool).is_ok());
    }

    #[test]
    fn wrong_modulus_or_transcript_fails() {
        let mut rng = init_testing();
        let pool = Pool::global();
        let key = DecryptionKey::generate(&mut rng, &pool).unwrap();
        let other = DecryptionKey::generate(&mut rng, &pool).unwrap();

        let proof = PiModProof::prove(&mut rng, &key, &mut transcript(), &pool).unwrap();
        assert!(proof
            .verify(other.encryption_key().modulus(), &mut transcript(), &pool)
            .is_err());

        let mut diverged = transcript();
        diverged.append(b"x", b"diverged");
        assert!(proof
            .verify(key.encryption_key().modulus(), &mut diverged, &pool)
            .is_err());
    }

    #[test]
    fn quartic_root_machinery_is_consistent() {
        let mut rng = init_testing();
        let pool = Pool::global();
        let key = DecryptionKey::generate(&mut rng, &pool).unwrap();
        let (p, q) = key.primes();
        let n = key.encryption_key().modulus();

        // A guaranteed residue and its fourth root.
        let x = sample_below(&mut rng, n);
        let y = x.modpow(&BigNumber::from_slice([4u8]), n);
        let root_p = sqrt_qr(&sqrt_qr(&y, p), p);
        let root_q = sqrt_qr(&sqrt_qr(&y, q), q);
        let fourth = crt(&root_p, &root_q, p, q).unwrap();
        let squared = fourth.modmul(&fourth, n);
        assert_eq!(squared.modmul(&squared, n), y);
    }
}
