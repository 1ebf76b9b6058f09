// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Elliptic curve abstraction.
//!
//! [`CurveTrait`] covers the group operations every protocol needs;
//! [`EcdsaCurve`] adds the ECDSA-specific surface used by the CMP protocol
//! family, and [`SchnorrCurve`] the challenge/verification surface used by
//! the FROST family.

use crate::{errors::Result, protocol::PartyId};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, ops::Add};
use zeroize::Zeroize;

/// A point on one of the supported curves, together with the group
/// operations the rounds need.
pub trait CurveTrait:
    'static
    + Clone
    + Copy
    + Debug
    + Send
    + Sync
    + Eq
    + PartialEq
    + Serialize
    + for<'de> Deserialize<'de>
    + Add<Output = Self>
    + Zeroize
{
    /// Name of the group, used in key encodings.
    const NAME: &'static str;

    /// The group's scalar field.
    type Scalar: ScalarTrait;

    /// The generator point.
    fn generator() -> Self;

    /// The identity point.
    fn identity() -> Self;

    /// The order of the curve.
    fn order() -> BigNumber;

    /// Multiply the generator by a scalar.
    fn generator_mul(scalar: &Self::Scalar) -> Self;

    /// Multiply `self` by a scalar.
    fn mul(&self, scalar: &Self::Scalar) -> Self;

    /// True if this is the identity point.
    fn is_identity(&self) -> bool {
        self == &Self::identity()
    }

    /// Serialize the point in its canonical compressed encoding.
    fn to_bytes(&self) -> Vec<u8>;

    /// Deserialize a point from its canonical compressed encoding.
    fn try_from_bytes(bytes: &[u8]) -> Result<Self>;

    /// Reduce a [`BigNumber`] into the scalar field. Negative inputs land on
    /// their canonical residue.
    fn bn_to_scalar(bn: &BigNumber) -> Result<Self::Scalar>;

    /// Convert a scalar to a [`BigNumber`] in `[0, q)`.
    fn scalar_to_bn(scalar: &Self::Scalar) -> BigNumber;

    /// Deterministically map a party identifier to a non-zero scalar, used as
    /// the party's evaluation point for secret-sharing polynomials.
    fn scalar_from_id(id: &PartyId) -> Self::Scalar;

    /// Sample a scalar and its public point.
    fn random_scalar_point_pair<R: RngCore + CryptoRng>(rng: &mut R) -> (Self::Scalar, Self) {
        let scalar = Self::Scalar::random(rng);
        let point = Self::generator_mul(&scalar);
        (scalar, point)
    }
}

/// Scalar field element of a [`CurveTrait`] group.
///
/// Arithmetic goes through the named methods rather than operator traits so
/// generic round code reads the same over both scalar backends.
pub trait ScalarTrait:
    'static
    + Send
    + Sync
    + Clone
    + Copy
    + Debug
    + PartialEq
    + Eq
    + Zeroize
    + Serialize
    + for<'de> Deserialize<'de>
{
    /// The zero scalar.
    fn zero() -> Self;

    /// The one scalar.
    fn one() -> Self;

    /// Add two scalars.
    fn add(&self, other: &Self) -> Self;

    /// Subtract `other` from `self`.
    fn sub(&self, other: &Self) -> Self;

    /// Multiply two scalars.
    fn mul(&self, other: &Self) -> Self;

    /// Negate.
    fn negate(&self) -> Self;

    /// Multiplicative inverse; `None` for zero.
    fn invert(&self) -> Option<Self>;

    /// True for the zero scalar.
    fn is_zero(&self) -> bool {
        self == &Self::zero()
    }

    /// Sample a uniform scalar.
    fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self;

    /// Canonical byte encoding.
    fn to_bytes(&self) -> Vec<u8>;

    /// Decode a canonical byte encoding; `Ok(None)` for bytes that do not
    /// name a scalar.
    fn from_bytes(bytes: &[u8]) -> Result<Option<Self>>;
}

/// The ECDSA surface required by the CMP protocol family.
pub trait EcdsaCurve: CurveTrait {
    /// Verification key for finished signatures.
    type VerifyingKey: Clone + Debug + PartialEq + Send + Sync;

    /// Finished signature type.
    type Signature: Clone + Debug + PartialEq + Send + Sync;

    /// The x-projection of a point, as a scalar.
    fn x_projection(&self) -> Result<Self::Scalar>;

    /// Interpret this point as a verification key.
    fn verifying_key(&self) -> Result<Self::VerifyingKey>;

    /// Assemble a signature from its `(r, s)` scalars.
    fn signature_from_scalars(r: &Self::Scalar, s: &Self::Scalar) -> Result<Self::Signature>;

    /// Verify a signature over a 32-byte message digest.
    fn verify_prehash(
        key: &Self::VerifyingKey,
        digest: &[u8; 32],
        signature: &Self::Signature,
    ) -> Result<()>;

    /// Interpret a 32-byte digest as a scalar, reduced mod the curve order.
    fn digest_to_scalar(digest: &[u8; 32]) -> Self::Scalar;

    /// True if the scalar is larger than half the group order.
    fn is_high(scalar: &Self::Scalar) -> bool;
}

/// The Schnorr surface required by the FROST protocol family.
pub trait SchnorrCurve: CurveTrait {
    /// Hash arbitrary transcript parts to a scalar (used for the per-signer
    /// binding factor).
    fn hash_to_scalar(domain: &'static [u8], parts: &[&[u8]]) -> Self::Scalar;

    /// The signature challenge `c = H(R ∥ Y ∥ msg)` in the group's standard
    /// signature scheme.
    fn challenge(group_commitment: &Self, public_key: &Self, msg: &[u8]) -> Self::Scalar;

    /// Check `z·G == R + c·Y`, the standard Schnorr verification equation.
    fn verify_schnorr(
        public_key: &Self,
        msg: &[u8],
        group_commitment: &Self,
        z: &Self::Scalar,
    ) -> bool {
        let c = Self::challenge(group_commitment, public_key, msg);
        Self::generator_mul(z) == *group_commitment + public_key.mul(&c)
    }
}

/// Default curve type for the CMP protocol family.
pub type TestCurve = crate::k256::K256;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ed25519::Ed25519, k256::K256, utils::testing::init_testing};

    fn scalar_round_trips<C: CurveTrait>() {
        let mut rng = init_testing();
        let s = C::Scalar::random(&mut rng);
        let bytes = s.to_bytes();
        let back = C::Scalar::from_bytes(&bytes).unwrap().unwrap();
        assert_eq!(s, back);

        let bn = C::scalar_to_bn(&s);
        let back = C::bn_to_scalar(&bn).unwrap();
        assert_eq!(s, back);
    }

    fn point_round_trips<C: CurveTrait>() {
        let mut rng = init_testing();
        let (_, p) = C::random_scalar_point_pair(&mut rng);
        let bytes = p.to_bytes();
        let back = C::try_from_bytes(&bytes).unwrap();
        assert_eq!(p, back);
        // Second encode must be byte-identical
        assert_eq!(bytes, back.to_bytes());
    }

    fn party_scalars_are_distinct<C: CurveTrait>() {
        let ids = ["a", "b", "c", "alice", "bob"];
        let scalars = ids
            .iter()
            .map(|id| C::scalar_from_id(&PartyId::from(*id)))
            .collect::<Vec<_>>();
        for (i, s) in scalars.iter().enumerate() {
            assert!(!s.is_zero());
            for other in scalars.iter().skip(i + 1) {
                assert_ne!(s, other);
            }
        }
    }

    #[test]
    fn k256_scalar_and_point_encodings() {
        scalar_round_trips::<K256>();
        point_round_trips::<K256>();
        party_scalars_are_distinct::<K256>();
    }

    #[test]
    fn ed25519_scalar_and_point_encodings() {
        scalar_round_trips::<Ed25519>();
        point_round_trips::<Ed25519>();
        party_scalars_are_distinct::<Ed25519>();
    }

    #[test]
    fn bn_conversion_agrees_across_curves() {
        // The same integer reduces to scalars whose byte encodings carry the
        // same value in each curve's conventions.
        let five = BigNumber::from_slice([5u8]);
        let on_k256 = K256::bn_to_scalar(&five).unwrap();
        assert_eq!(K256::scalar_to_bn(&on_k256), five);
        let on_ed = Ed25519::bn_to_scalar(&five).unwrap();
        assert_eq!(Ed25519::scalar_to_bn(&on_ed), five);
    }
}
