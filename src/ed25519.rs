// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! edwards25519 instantiation of the curve traits.
//!
//! The [`SchnorrCurve`] challenge follows RFC 8032, so FROST signatures
//! produced over this curve verify under a standard Ed25519 verifier.

use crate::{
    curve::{CurveTrait, ScalarTrait, SchnorrCurve},
    errors::{ContentError, Result},
    protocol::PartyId,
};
use curve25519_dalek::{
    constants::ED25519_BASEPOINT_POINT,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar as DalekScalar,
    traits::Identity,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::error;
use zeroize::Zeroize;

/// An edwards25519 group element. Encodings are the 32-byte compressed form
/// throughout, matching RFC 8032's point serialization.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Zeroize, Serialize, Deserialize)]
pub struct Ed25519(pub EdwardsPoint);

impl From<EdwardsPoint> for Ed25519 {
    fn from(p: EdwardsPoint) -> Self {
        Self(p)
    }
}

impl std::ops::Add for Ed25519 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

/// The order of the edwards25519 group:
/// `2^252 + 27742317777372353535851937790883648493`.
pub(crate) fn ed25519_order() -> BigNumber {
    const ORDER_BE: [u8; 32] = [
        0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x14, 0xde, 0xf9, 0xde, 0xa2, 0xf7, 0x9c, 0xd6, 0x58, 0x12, 0x63, 0x1a, 0x5c, 0xf5,
        0xd3, 0xed,
    ];
    BigNumber::from_slice(ORDER_BE)
}

fn wide_reduce(digest: &[u8]) -> DalekScalar {
    let mut wide = [0u8; 64];
    wide.copy_from_slice(digest);
    DalekScalar::from_bytes_mod_order_wide(&wide)
}

impl CurveTrait for Ed25519 {
    const NAME: &'static str = "edwards25519";

    type Scalar = DalekScalar;

    fn generator() -> Self {
        Ed25519(ED25519_BASEPOINT_POINT)
    }

    fn identity() -> Self {
        Ed25519(EdwardsPoint::identity())
    }

    fn order() -> BigNumber {
        ed25519_order()
    }

    fn generator_mul(scalar: &Self::Scalar) -> Self {
        Ed25519(EdwardsPoint::mul_base(scalar))
    }

    fn mul(&self, scalar: &Self::Scalar) -> Self {
        Self(self.0 * scalar)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.compress().to_bytes().to_vec()
    }

    fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let compressed = CompressedEdwardsY::from_slice(bytes).map_err(|_| {
            error!("failed to decode bytes as an edwards25519 point");
            ContentError::Deserialization
        })?;
        match compressed.decompress() {
            Some(point) => Ok(Self(point)),
            None => {
                error!("failed to decode bytes as an edwards25519 point");
                Err(ContentError::Deserialization)?
            }
        }
    }

    fn bn_to_scalar(bn: &BigNumber) -> Result<Self::Scalar> {
        // Reduce into [0, L), then re-encode little-endian.
        let reduced = bn.nmod(&Self::order());
        let be_bytes = reduced.to_bytes();
        let mut le_bytes = [0u8; 32];
        for (i, byte) in be_bytes.iter().rev().enumerate() {
            le_bytes[i] = *byte;
        }
        // The reduction makes the encoding canonical.
        Ok(DalekScalar::from_bytes_mod_order(le_bytes))
    }

    fn scalar_to_bn(scalar: &Self::Scalar) -> BigNumber {
        let mut be_bytes = scalar.to_bytes();
        be_bytes.reverse();
        BigNumber::from_slice(be_bytes)
    }

    fn scalar_from_id(id: &PartyId) -> Self::Scalar {
        for counter in 0u8..=u8::MAX {
            let digest = Sha512::new()
                .chain_update(b"threshold-sig edwards25519 party scalar")
                .chain_update([counter])
                .chain_update(id.as_str().as_bytes())
                .finalize();
            let scalar = wide_reduce(&digest);
            if !ScalarTrait::is_zero(&scalar) {
                return scalar;
            }
        }
        unreachable!("256 consecutive hash outputs reduced to zero")
    }
}

impl ScalarTrait for DalekScalar {
    fn zero() -> Self {
        DalekScalar::ZERO
    }

    fn one() -> Self {
        DalekScalar::ONE
    }

    fn add(&self, other: &Self) -> Self {
        self + other
    }

    fn sub(&self, other: &Self) -> Self {
        self - other
    }

    fn mul(&self, other: &Self) -> Self {
        self * other
    }

    fn negate(&self) -> Self {
        -self
    }

    fn invert(&self) -> Option<Self> {
        if ScalarTrait::is_zero(self) {
            return None;
        }
        Some(DalekScalar::invert(self))
    }

    fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        let mut wide = [0u8; 64];
        rng.fill_bytes(&mut wide);
        DalekScalar::from_bytes_mod_order_wide(&wide)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Option<Self>> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ContentError::Deserialization)?;
        Ok(DalekScalar::from_canonical_bytes(arr).into())
    }
}

impl SchnorrCurve for Ed25519 {
    fn hash_to_scalar(domain: &'static [u8], parts: &[&[u8]]) -> Self::Scalar {
        let mut hasher = Sha512::new().chain_update(domain);
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        wide_reduce(&hasher.finalize())
    }

    fn challenge(group_commitment: &Self, public_key: &Self, msg: &[u8]) -> Self::Scalar {
        // RFC 8032: c = SHA-512(R ∥ A ∥ M), reduced mod L.
        let digest = Sha512::new()
            .chain_update(group_commitment.0.compress().as_bytes())
            .chain_update(public_key.0.compress().as_bytes())
            .chain_update(msg)
            .finalize();
        wide_reduce(&digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn order_constant_matches_dalek() {
        // L * 1 reduces to zero.
        let l = ed25519_order();
        let scalar = Ed25519::bn_to_scalar(&l).unwrap();
        assert!(ScalarTrait::is_zero(&scalar));
        // L - 1 is the largest canonical scalar.
        let l_minus_1 = l - BigNumber::one();
        let scalar = Ed25519::bn_to_scalar(&l_minus_1).unwrap();
        assert_eq!(scalar, -DalekScalar::ONE);
    }

    #[test]
    fn schnorr_equation_round_trip() {
        let mut rng = init_testing();
        let (x, public) = Ed25519::random_scalar_point_pair(&mut rng);
        let (k, big_r) = Ed25519::random_scalar_point_pair(&mut rng);

        let msg = b"hello";
        let c = Ed25519::challenge(&big_r, &public, msg);
        let z = k + c * x;

        assert!(Ed25519::verify_schnorr(&public, msg, &big_r, &z));
        assert!(!Ed25519::verify_schnorr(&public, b"other", &big_r, &z));
    }

    #[test]
    fn schnorr_signatures_match_standard_ed25519_verify() {
        use ed25519_dalek::{Signature, Verifier, VerifyingKey};

        let mut rng = init_testing();
        // Key and nonce sampled as free scalars, the way the threshold
        // protocol produces them (no clamping involved).
        let (x, public) = Ed25519::random_scalar_point_pair(&mut rng);
        let (k, big_r) = Ed25519::random_scalar_point_pair(&mut rng);

        let msg = b"interoperability check";
        let c = Ed25519::challenge(&big_r, &public, msg);
        let z = k + c * x;

        let mut sig_bytes = [0u8; 64];
        sig_bytes[..32].copy_from_slice(&CurveTrait::to_bytes(&big_r));
        sig_bytes[32..].copy_from_slice(z.as_bytes());

        let vk_bytes: [u8; 32] = CurveTrait::to_bytes(&public).try_into().unwrap();
        let vk = VerifyingKey::from_bytes(&vk_bytes).unwrap();
        assert!(vk.verify(msg, &Signature::from_bytes(&sig_bytes)).is_ok());
    }
}
