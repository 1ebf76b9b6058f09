// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Feldman verifiable secret sharing.
//!
//! A [`Polynomial`] of degree `t` over the scalar field holds the sharing
//! secret as its constant term; the [`ExponentPolynomial`] exposes each
//! coefficient times the generator. Evaluating the former at a party's scalar
//! yields that party's share, evaluating the latter yields the share's public
//! point, and peers verify shares by comparing the two.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use zeroize::Zeroize;

use crate::{
    curve::{CurveTrait, ScalarTrait},
    errors::{FatalError, Result, ValidationError},
    keystore::StoreValue,
};

/// What the constant term of a received exponent polynomial must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantRule {
    /// Fresh key generation: the constant carries a secret and must not be
    /// the identity.
    NonIdentity,
    /// Key refresh: updates must sum to zero, so the constant must be the
    /// identity.
    Identity,
}

/// A secret polynomial of degree `t` over the scalar field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polynomial<C: CurveTrait> {
    coefficients: Vec<C::Scalar>,
}

impl<C: CurveTrait> Debug for Polynomial<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polynomial")
            .field("degree", &self.degree())
            .field("coefficients", &"[redacted]")
            .finish()
    }
}

impl<C: CurveTrait> Drop for Polynomial<C> {
    fn drop(&mut self) {
        for coefficient in self.coefficients.iter_mut() {
            coefficient.zeroize();
        }
    }
}

impl<C: CurveTrait> Polynomial<C> {
    /// Sample a degree-`degree` polynomial. When `constant` is given it
    /// becomes the shared secret `f(0)`.
    pub fn sample<R: RngCore + CryptoRng>(
        rng: &mut R,
        degree: usize,
        constant: Option<C::Scalar>,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(degree + 1);
        coefficients.push(constant.unwrap_or_else(|| C::Scalar::random(rng)));
        for _ in 0..degree {
            coefficients.push(C::Scalar::random(rng));
        }
        Self { coefficients }
    }

    /// The polynomial's degree `t`.
    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// The shared secret `f(0)`.
    pub fn constant_term(&self) -> &C::Scalar {
        &self.coefficients[0]
    }

    /// Evaluate at `x` (Horner's rule).
    pub fn evaluate(&self, x: &C::Scalar) -> C::Scalar {
        let mut acc = C::Scalar::zero();
        for coefficient in self.coefficients.iter().rev() {
            acc = acc.mul(x).add(coefficient);
        }
        acc
    }

    /// The coefficient-times-generator form.
    pub fn to_exponent(&self) -> ExponentPolynomial<C> {
        ExponentPolynomial {
            points: self
                .coefficients
                .iter()
                .map(C::generator_mul)
                .collect(),
        }
    }
}

impl<C: CurveTrait> StoreValue for Polynomial<C> {
    const KIND: &'static str = "vss-polynomial";

    fn encode(&self) -> Result<Vec<u8>> {
        serialize!(&self)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes)
    }
}

/// The public, in-the-exponent form of a [`Polynomial`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExponentPolynomial<C: CurveTrait> {
    points: Vec<C>,
}

impl<C: CurveTrait> ExponentPolynomial<C> {
    /// The polynomial's degree `t`.
    pub fn degree(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// The public point of the shared secret, `f(0)·G`.
    pub fn constant(&self) -> &C {
        &self.points[0]
    }

    /// Evaluate in the exponent at `x` (Horner's rule on points).
    pub fn evaluate(&self, x: &C::Scalar) -> C {
        let mut acc = C::identity();
        for point in self.points.iter().rev() {
            acc = acc.mul(x) + *point;
        }
        acc
    }

    /// Check the degree and the constant-term rule for a received
    /// polynomial.
    pub fn validate(&self, expected_degree: usize, rule: ConstantRule) -> Result<()> {
        if self.points.is_empty() {
            return Err(ValidationError::unattributed("empty vss polynomial").into());
        }
        if self.degree() != expected_degree {
            return Err(ValidationError::unattributed(format!(
                "vss polynomial has degree {}, expected {expected_degree}",
                self.degree()
            ))
            .into());
        }
        let constant_is_identity = self.constant().is_identity();
        match rule {
            ConstantRule::NonIdentity if constant_is_identity => {
                Err(ValidationError::unattributed("vss constant term is the identity").into())
            }
            ConstantRule::Identity if !constant_is_identity => {
                Err(ValidationError::unattributed("vss constant term is not the identity").into())
            }
            _ => Ok(()),
        }
    }

    /// Coefficient-wise sum `F(X) = Σ Fⱼ(X)`. All summands must share one
    /// degree.
    pub fn sum(polynomials: &[&Self]) -> Result<Self> {
        let first = polynomials
            .first()
            .ok_or(FatalError::InternalInvariantFailed)?;
        let degree = first.degree();
        let mut points = first.points.clone();
        for polynomial in &polynomials[1..] {
            if polynomial.degree() != degree {
                Err(ValidationError::unattributed(
                    "cannot sum vss polynomials of different degrees",
                ))?;
            }
            for (acc, point) in points.iter_mut().zip(polynomial.points.iter()) {
                *acc = *acc + *point;
            }
        }
        Ok(Self { points })
    }
}

impl<C: CurveTrait> StoreValue for ExponentPolynomial<C> {
    const KIND: &'static str = "vss-exponent";

    fn encode(&self) -> Result<Vec<u8>> {
        serialize!(&self)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes)
    }
}

/// The Lagrange coefficient at zero for `points[index]` over the distinct
/// evaluation points `points`.
pub fn lagrange_at_zero<C: CurveTrait>(
    points: &[C::Scalar],
    index: usize,
) -> Result<C::Scalar> {
    let x_i = points
        .get(index)
        .ok_or(FatalError::InternalInvariantFailed)?;
    let mut numerator = C::Scalar::one();
    let mut denominator = C::Scalar::one();
    for (j, x_j) in points.iter().enumerate() {
        if j == index {
            continue;
        }
        numerator = numerator.mul(x_j);
        denominator = denominator.mul(&x_j.sub(x_i));
    }
    let inverse = denominator
        .invert()
        .ok_or(FatalError::BadInput("duplicate evaluation points".into()))?;
    Ok(numerator.mul(&inverse))
}

/// A share received from a peer, stored by the VSS share manager.
#[derive(Clone, Serialize, Deserialize)]
pub struct Share<C: CurveTrait>(pub C::Scalar);

impl<C: CurveTrait> Debug for Share<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Share([redacted])")
    }
}

impl<C: CurveTrait> StoreValue for Share<C> {
    const KIND: &'static str = "vss-share";

    fn encode(&self) -> Result<Vec<u8>> {
        serialize!(&self)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ed25519::Ed25519, k256::K256, utils::testing::init_testing};

    fn shares_match_exponent_form<C: CurveTrait>() {
        let mut rng = init_testing();
        let threshold = 2;
        let secret = C::Scalar::random(&mut rng);
        let poly = Polynomial::<C>::sample(&mut rng, threshold, Some(secret));
        assert_eq!(poly.degree(), threshold);
        assert_eq!(*poly.constant_term(), secret);

        let exponent = poly.to_exponent();
        assert_eq!(*exponent.constant(), C::generator_mul(&secret));
        assert!(exponent.validate(threshold, ConstantRule::NonIdentity).is_ok());

        for x in [C::Scalar::one(), C::Scalar::random(&mut rng)] {
            let share = poly.evaluate(&x);
            assert_eq!(C::generator_mul(&share), exponent.evaluate(&x));
        }
    }

    #[test]
    fn k256_shares_match_exponent_form() {
        shares_match_exponent_form::<K256>();
    }

    #[test]
    fn ed25519_shares_match_exponent_form() {
        shares_match_exponent_form::<Ed25519>();
    }

    #[test]
    fn lagrange_reconstructs_the_secret() {
        let mut rng = init_testing();
        let threshold = 1;
        let secret = <K256 as CurveTrait>::Scalar::random(&mut rng);
        let poly = Polynomial::<K256>::sample(&mut rng, threshold, Some(secret));

        // Any t+1 points reconstruct f(0).
        let xs: Vec<_> = (0..2)
            .map(|_| <K256 as CurveTrait>::Scalar::random(&mut rng))
            .collect();
        let mut reconstructed = <K256 as CurveTrait>::Scalar::zero();
        for (i, x) in xs.iter().enumerate() {
            let weight = lagrange_at_zero::<K256>(&xs, i).unwrap();
            reconstructed = reconstructed.add(&weight.mul(&poly.evaluate(x)));
        }
        assert_eq!(reconstructed, secret);
    }

    #[test]
    fn sum_is_order_independent() {
        let mut rng = init_testing();
        let polys: Vec<_> = (0..3)
            .map(|_| Polynomial::<K256>::sample(&mut rng, 2, None).to_exponent())
            .collect();

        let forward =
            ExponentPolynomial::sum(&polys.iter().collect::<Vec<_>>()).unwrap();
        let backward =
            ExponentPolynomial::sum(&polys.iter().rev().collect::<Vec<_>>()).unwrap();
        assert_eq!(forward, backward);

        // Summed polynomial evaluates to the sum of evaluations.
        let x = <K256 as CurveTrait>::Scalar::random(&mut rng);
        let mut expected = K256::identity();
        for poly in &polys {
            expected = expected + poly.evaluate(&x);
        }
        assert_eq!(forward.evaluate(&x), expected);
    }

    #[test]
    fn degree_and_constant_rules_are_enforced() {
        let mut rng = init_testing();
        let poly = Polynomial::<K256>::sample(&mut rng, 2, None).to_exponent();

        assert!(poly.validate(3, ConstantRule::NonIdentity).is_err());
        assert!(poly.validate(2, ConstantRule::Identity).is_err());

        let zero_constant =
            Polynomial::<K256>::sample(&mut rng, 2, Some(<K256 as CurveTrait>::Scalar::zero()))
                .to_exponent();
        assert!(zero_constant.validate(2, ConstantRule::NonIdentity).is_err());
        assert!(zero_constant.validate(2, ConstantRule::Identity).is_ok());

        let mismatched = [&poly, &zero_constant];
        assert!(ExponentPolynomial::sum(&mismatched).is_ok());
        let shorter = Polynomial::<K256>::sample(&mut rng, 1, None).to_exponent();
        assert!(ExponentPolynomial::sum(&[&poly, &shorter]).is_err());
    }

    #[test]
    fn polynomial_encoding_round_trips() {
        let mut rng = init_testing();
        let poly = Polynomial::<K256>::sample(&mut rng, 2, None);
        let bytes = poly.encode().unwrap();
        let back = Polynomial::<K256>::decode(&bytes).unwrap();
        assert_eq!(poly, back);
        assert_eq!(bytes, back.encode().unwrap());

        let exponent = poly.to_exponent();
        let bytes = exponent.encode().unwrap();
        let back = ExponentPolynomial::<K256>::decode(&bytes).unwrap();
        assert_eq!(exponent, back);
        assert_eq!(bytes, back.encode().unwrap());
    }
}
