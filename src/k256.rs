// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! secp256k1 instantiation of the curve traits.
//!
//! Points live in projective form for arithmetic but always cross the wire,
//! the transcript, and the keystore in their 33-byte compressed SEC1
//! encoding. Routing every serialization path through that one encoding is
//! what gives the commitment and round-trip invariants their "byte
//! identical" guarantee.

use crate::{
    curve::{CurveTrait, EcdsaCurve, ScalarTrait},
    errors::{ContentError, FatalError, Result, ValidationError},
    protocol::PartyId,
};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey},
    elliptic_curve::{
        bigint::Encoding,
        ops::Reduce,
        point::AffineCoordinates,
        scalar::IsHigh,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Curve, Field, PrimeField,
    },
    EncodedPoint, FieldBytes, ProjectivePoint, Scalar as K256Scalar, U256,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::error;
use zeroize::Zeroize;

/// A secp256k1 group element.
///
/// No structure beyond the point itself: the interesting part is the
/// serialization contract above, which [`Serialize`] and
/// [`CurveTrait::to_bytes`] share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroize)]
pub struct K256(ProjectivePoint);

impl From<ProjectivePoint> for K256 {
    fn from(point: ProjectivePoint) -> Self {
        Self(point)
    }
}

impl std::ops::Add for K256 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Serialize for K256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&CurveTrait::to_bytes(self))
    }
}

impl<'de> Deserialize<'de> for K256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        Self::try_from_bytes(&bytes)
            .map_err(|_| serde::de::Error::custom("not a compressed secp256k1 point"))
    }
}

/// The order of the secp256k1 scalar field as a big integer.
pub(crate) fn k256_order() -> BigNumber {
    BigNumber::from_slice(k256::Secp256k1::ORDER.to_be_bytes())
}

impl CurveTrait for K256 {
    const NAME: &'static str = "secp256k1";

    type Scalar = K256Scalar;

    fn generator() -> Self {
        Self(ProjectivePoint::GENERATOR)
    }

    fn identity() -> Self {
        Self(ProjectivePoint::IDENTITY)
    }

    fn order() -> BigNumber {
        k256_order()
    }

    fn generator_mul(scalar: &Self::Scalar) -> Self {
        Self(ProjectivePoint::GENERATOR * scalar)
    }

    fn mul(&self, scalar: &Self::Scalar) -> Self {
        Self(self.0 * scalar)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        // Only the compressed form is canonical here; accepting the 65-byte
        // uncompressed encoding would let one point arrive under two
        // different byte strings.
        if bytes.len() != 33 {
            error!("secp256k1 point encoding has wrong length");
            Err(ContentError::Deserialization)?;
        }
        let encoded =
            EncodedPoint::from_bytes(bytes).map_err(|_| ContentError::Deserialization)?;
        let point: Option<ProjectivePoint> = ProjectivePoint::from_encoded_point(&encoded).into();
        match point {
            Some(point) => Ok(Self(point)),
            None => {
                error!("secp256k1 point encoding is not on the curve");
                Err(ContentError::Deserialization)?
            }
        }
    }

    fn bn_to_scalar(bn: &BigNumber) -> Result<Self::Scalar> {
        // `nmod` lifts any input, negative included, to its canonical
        // residue in [0, q), so no sign handling is needed afterwards.
        let reduced = bn.nmod(&Self::order());
        let mut digits = reduced.to_bytes();
        if digits.len() > 32 {
            Err(FatalError::InternalInvariantFailed)?;
        }

        // Left-pad to the fixed-width representation the field type expects.
        let mut padded = [0u8; 32];
        padded[32 - digits.len()..].copy_from_slice(&digits);
        let scalar: Option<K256Scalar> = K256Scalar::from_repr(padded.into()).into();
        digits.zeroize();
        padded.zeroize();

        scalar.ok_or_else(|| {
            error!("reduced residue was rejected by the scalar field");
            FatalError::InternalInvariantFailed.into()
        })
    }

    fn scalar_to_bn(scalar: &Self::Scalar) -> BigNumber {
        BigNumber::from_slice(scalar.to_repr())
    }

    fn scalar_from_id(id: &PartyId) -> Self::Scalar {
        // Domain-separated hash-to-scalar; bump a counter in the negligible
        // case that the reduction lands on zero.
        for counter in 0u8..=u8::MAX {
            let digest = Sha256::new()
                .chain_update(b"threshold-sig secp256k1 party scalar")
                .chain_update([counter])
                .chain_update(id.as_str().as_bytes())
                .finalize();
            let scalar = <K256Scalar as Reduce<U256>>::reduce_bytes(&digest);
            if !ScalarTrait::is_zero(&scalar) {
                return scalar;
            }
        }
        unreachable!("256 consecutive hash outputs reduced to zero")
    }
}

impl ScalarTrait for K256Scalar {
    fn zero() -> Self {
        K256Scalar::ZERO
    }

    fn one() -> Self {
        K256Scalar::ONE
    }

    fn add(&self, other: &Self) -> Self {
        *self + *other
    }

    fn sub(&self, other: &Self) -> Self {
        *self - *other
    }

    fn mul(&self, other: &Self) -> Self {
        *self * *other
    }

    fn negate(&self) -> Self {
        -*self
    }

    fn invert(&self) -> Option<Self> {
        <K256Scalar as Field>::invert(self).into()
    }

    fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        <K256Scalar as Field>::random(rng)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.to_repr().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Option<Self>> {
        let repr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ContentError::Deserialization)?;
        Ok(K256Scalar::from_repr(repr.into()).into())
    }
}

impl EcdsaCurve for K256 {
    type VerifyingKey = VerifyingKey;
    type Signature = k256::ecdsa::Signature;

    fn x_projection(&self) -> Result<Self::Scalar> {
        // The x-coordinate is a base-field element and only reads back as a
        // scalar when it sits below the group order. The two moduli are
        // close enough that random points never land in the gap; a point
        // that does surfaces as an error rather than a wrong value.
        let x = self.0.to_affine().x();
        Option::from(K256Scalar::from_repr(x)).ok_or_else(|| {
            error!("x-coordinate exceeds the scalar field");
            FatalError::InternalInvariantFailed.into()
        })
    }

    fn verifying_key(&self) -> Result<Self::VerifyingKey> {
        VerifyingKey::from_sec1_bytes(&CurveTrait::to_bytes(self)).map_err(|_| {
            error!("group key is not a valid verifying key");
            FatalError::InternalInvariantFailed.into()
        })
    }

    fn signature_from_scalars(r: &Self::Scalar, s: &Self::Scalar) -> Result<Self::Signature> {
        k256::ecdsa::Signature::from_scalars(*r, *s)
            .map_err(|_| FatalError::InternalInvariantFailed.into())
    }

    fn verify_prehash(
        key: &Self::VerifyingKey,
        digest: &[u8; 32],
        signature: &Self::Signature,
    ) -> Result<()> {
        key.verify_prehash(digest, signature).map_err(|_| {
            ValidationError::unattributed("ECDSA signature verification failed").into()
        })
    }

    fn digest_to_scalar(digest: &[u8; 32]) -> Self::Scalar {
        let bytes: FieldBytes = (*digest).into();
        <K256Scalar as Reduce<U256>>::reduce_bytes(&bytes)
    }

    fn is_high(scalar: &Self::Scalar) -> bool {
        <K256Scalar as IsHigh>::is_high(scalar).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;
    use k256::elliptic_curve::Group;

    #[test]
    fn only_the_compressed_encoding_is_accepted() {
        let rng = &mut init_testing();
        let point = K256(ProjectivePoint::random(rng));

        let compressed = CurveTrait::to_bytes(&point);
        assert_eq!(compressed.len(), 33);
        assert_eq!(K256::try_from_bytes(&compressed).unwrap(), point);

        // The same point in uncompressed form is refused outright.
        let uncompressed = point.0.to_affine().to_encoded_point(false);
        assert_eq!(uncompressed.as_bytes().len(), 65);
        assert!(K256::try_from_bytes(uncompressed.as_bytes()).is_err());

        // So is a compressed string that names no curve point.
        let mut off_curve = compressed.clone();
        off_curve[1] ^= 0x01;
        let decoded = K256::try_from_bytes(&off_curve);
        if let Ok(other) = decoded {
            // Flipping a coordinate byte can land on another valid point;
            // it must at least not be the original.
            assert_ne!(other, point);
        }
    }

    #[test]
    fn serde_round_trip_matches_to_bytes() {
        let rng = &mut init_testing();
        let point = K256(ProjectivePoint::random(rng));
        let encoded = serialize!(&point).unwrap();
        let decoded: K256 = deserialize!(&encoded).unwrap();
        assert_eq!(decoded, point);
        assert_eq!(encoded, serialize!(&decoded).unwrap());
    }

    #[test]
    fn residues_lift_into_the_scalar_field() {
        // q reduces to zero, q - 1 to the largest scalar, and a negative
        // input lands on its canonical residue.
        let q = k256_order();
        assert_eq!(K256::bn_to_scalar(&q).unwrap(), K256Scalar::ZERO);

        let largest = K256::bn_to_scalar(&(q - 1)).unwrap();
        assert_eq!(largest, -K256Scalar::ONE);

        let minus_two = K256::bn_to_scalar(&-BigNumber::from_slice([2u8])).unwrap();
        assert_eq!(minus_two + K256Scalar::ONE + K256Scalar::ONE, K256Scalar::ZERO);
    }

    #[test]
    fn prehash_signatures_verify() {
        use k256::ecdsa::{signature::hazmat::PrehashSigner, SigningKey};
        let rng = &mut init_testing();
        let key = SigningKey::random(rng);
        let digest = [7u8; 32];
        let signature: k256::ecdsa::Signature = key.sign_prehash(&digest).unwrap();
        let vk = key.verifying_key();
        assert!(K256::verify_prehash(vk, &digest, &signature).is_ok());
        assert!(K256::verify_prehash(vk, &[8u8; 32], &signature).is_err());
    }

    #[test]
    fn zero_digest_reduces_to_the_zero_scalar() {
        assert_eq!(K256::digest_to_scalar(&[0u8; 32]), K256Scalar::ZERO);
    }
}
