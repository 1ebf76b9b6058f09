// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Curve key objects held by the key managers.
//!
//! A [`KeyPair`] is either private (scalar plus point) or public-only. Its
//! byte encoding is self-describing: length-prefixed group name, then the
//! public point, then the private scalar when present. The serialized
//! identity ([`KeyPair::ski`]) is the SHA-256 of the canonical public-point
//! encoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use zeroize::Zeroize;

use crate::{
    curve::{CurveTrait, ScalarTrait},
    errors::{ContentError, Result, StoreError},
    keystore::StoreValue,
    utils::{write_prefixed, ByteReader},
};

/// A key over curve `C`: a public point with an optional private scalar.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair<C: CurveTrait> {
    private: Option<C::Scalar>,
    public: C,
}

impl<C: CurveTrait> Debug for KeyPair<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &self.private.as_ref().map(|_| "[redacted]"))
            .field("public", &self.public)
            .finish()
    }
}

impl<C: CurveTrait> Drop for KeyPair<C> {
    fn drop(&mut self) {
        if let Some(private) = self.private.as_mut() {
            private.zeroize();
        }
    }
}

impl<C: CurveTrait> KeyPair<C> {
    /// A key pair from a private scalar and its (caller-computed) point.
    pub fn new(private: C::Scalar, public: C) -> Self {
        Self {
            private: Some(private),
            public,
        }
    }

    /// A key pair derived from a private scalar.
    pub fn from_private(private: C::Scalar) -> Self {
        let public = C::generator_mul(&private);
        Self::new(private, public)
    }

    /// A public-only key.
    pub fn public_only(public: C) -> Self {
        Self {
            private: None,
            public,
        }
    }

    /// True if the private scalar is present.
    pub fn is_private(&self) -> bool {
        self.private.is_some()
    }

    /// The public point.
    pub fn public_point(&self) -> &C {
        &self.public
    }

    /// The private scalar; fails for public-only keys.
    pub fn private_scalar(&self) -> Result<&C::Scalar> {
        self.private
            .as_ref()
            .ok_or_else(|| StoreError::MissingEntry.into())
    }

    /// A public-only copy of this key.
    pub fn to_public(&self) -> Self {
        Self::public_only(self.public)
    }

    /// Subject key identifier: SHA-256 of the canonical public-point
    /// encoding.
    pub fn ski(&self) -> [u8; 32] {
        Sha256::digest(self.public.to_bytes()).into()
    }

    /// Length-prefixed encoding: group name, public point, optional private
    /// scalar.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_prefixed(&mut buf, C::NAME.as_bytes());
        write_prefixed(&mut buf, &self.public.to_bytes());
        if let Some(private) = &self.private {
            let mut scalar_bytes = private.to_bytes();
            write_prefixed(&mut buf, &scalar_bytes);
            scalar_bytes.zeroize();
        }
        buf
    }

    /// Decode the length-prefixed encoding, checking the group name.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        if reader.field()? != C::NAME.as_bytes() {
            Err(ContentError::Deserialization)?;
        }

        let public = C::try_from_bytes(reader.field()?)?;

        let private = if reader.is_empty() {
            None
        } else {
            let scalar = C::Scalar::from_bytes(reader.field()?)?
                .ok_or(ContentError::Deserialization)?;
            reader.expect_empty()?;
            Some(scalar)
        };

        if let Some(scalar) = &private {
            if C::generator_mul(scalar) != public {
                Err(crate::errors::ValidationError::unattributed(
                    "private scalar does not match public point",
                ))?;
            }
        }

        Ok(Self { private, public })
    }
}

impl<C: CurveTrait> StoreValue for KeyPair<C> {
    const KIND: &'static str = "curve-key";

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.to_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

/// The portable form of a finished key share, serialized with the same
/// length-prefixed scheme as the individual key objects:
/// `{group-name, threshold, party-id, rid, chain-key, secret-share,
/// public-shares[j]}`.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyShareExport<C: CurveTrait> {
    threshold: usize,
    party: crate::protocol::PartyId,
    rid: crate::rid::Rid,
    chain_key: crate::rid::Rid,
    secret_share: C::Scalar,
    public_shares: Vec<(crate::protocol::PartyId, C)>,
}

impl<C: CurveTrait> Debug for KeyShareExport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShareExport")
            .field("threshold", &self.threshold)
            .field("party", &self.party)
            .field("secret_share", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl<C: CurveTrait> Drop for KeyShareExport<C> {
    fn drop(&mut self) {
        self.secret_share.zeroize();
    }
}

impl<C: CurveTrait> KeyShareExport<C> {
    /// Assemble an export. `public_shares` must be sorted by party id.
    pub(crate) fn new(
        threshold: usize,
        party: crate::protocol::PartyId,
        rid: crate::rid::Rid,
        chain_key: crate::rid::Rid,
        secret_share: C::Scalar,
        public_shares: Vec<(crate::protocol::PartyId, C)>,
    ) -> Self {
        Self {
            threshold,
            party,
            rid,
            chain_key,
            secret_share,
            public_shares,
        }
    }

    /// The exporting party.
    pub fn party(&self) -> &crate::protocol::PartyId {
        &self.party
    }

    /// The reconstruction threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// This party's secret share.
    pub fn secret_share(&self) -> &C::Scalar {
        &self.secret_share
    }

    /// Every party's public share, sorted by party id.
    pub fn public_shares(&self) -> &[(crate::protocol::PartyId, C)] {
        &self.public_shares
    }

    /// Canonical byte encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_prefixed(&mut buf, C::NAME.as_bytes());
        buf.extend_from_slice(&(self.threshold as u64).to_le_bytes());
        write_prefixed(&mut buf, self.party.as_str().as_bytes());
        write_prefixed(&mut buf, self.rid.as_bytes());
        write_prefixed(&mut buf, self.chain_key.as_bytes());
        let mut scalar_bytes = self.secret_share.to_bytes();
        write_prefixed(&mut buf, &scalar_bytes);
        scalar_bytes.zeroize();
        buf.extend_from_slice(&(self.public_shares.len() as u64).to_le_bytes());
        for (party, point) in &self.public_shares {
            write_prefixed(&mut buf, party.as_str().as_bytes());
            write_prefixed(&mut buf, &point.to_bytes());
        }
        buf
    }

    /// Decode the canonical byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        use crate::keystore::StoreValue;

        let mut reader = ByteReader::new(bytes);
        if reader.field()? != C::NAME.as_bytes() {
            Err(ContentError::Deserialization)?;
        }
        let threshold = reader.integer()?;
        let party = crate::protocol::PartyId::from(
            String::from_utf8(reader.field()?.to_vec())
                .map_err(|_| ContentError::Deserialization)?,
        );
        let rid = crate::rid::Rid::decode(reader.field()?)?;
        let chain_key = crate::rid::Rid::decode(reader.field()?)?;
        let secret_share = C::Scalar::from_bytes(reader.field()?)?
            .ok_or(ContentError::Deserialization)?;

        let count = reader.integer()?;
        let mut public_shares = Vec::with_capacity(count);
        for _ in 0..count {
            let id = crate::protocol::PartyId::from(
                String::from_utf8(reader.field()?.to_vec())
                    .map_err(|_| ContentError::Deserialization)?,
            );
            let point = C::try_from_bytes(reader.field()?)?;
            public_shares.push((id, point));
        }
        reader.expect_empty()?;

        Ok(Self {
            threshold,
            party,
            rid,
            chain_key,
            secret_share,
            public_shares,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ed25519::Ed25519, k256::K256, utils::testing::init_testing};

    fn byte_round_trip<C: CurveTrait>() {
        let mut rng = init_testing();
        let (scalar, point) = C::random_scalar_point_pair(&mut rng);
        let pair = KeyPair::<C>::new(scalar, point);

        let bytes = pair.to_bytes();
        let back = KeyPair::<C>::from_bytes(&bytes).unwrap();
        assert_eq!(pair, back);
        // Second encode is byte-identical.
        assert_eq!(bytes, back.to_bytes());

        let public = pair.to_public();
        let bytes = public.to_bytes();
        let back = KeyPair::<C>::from_bytes(&bytes).unwrap();
        assert!(!back.is_private());
        assert!(back.private_scalar().is_err());
        assert_eq!(public.public_point(), back.public_point());

        // Public and private encodings share the SKI.
        assert_eq!(pair.ski(), public.ski());
    }

    #[test]
    fn k256_keys_round_trip() {
        byte_round_trip::<K256>();
    }

    #[test]
    fn ed25519_keys_round_trip() {
        byte_round_trip::<Ed25519>();
    }

    #[test]
    fn wrong_group_name_is_rejected() {
        let mut rng = init_testing();
        let (scalar, point) = K256::random_scalar_point_pair(&mut rng);
        let bytes = KeyPair::<K256>::new(scalar, point).to_bytes();
        assert!(KeyPair::<Ed25519>::from_bytes(&bytes).is_err());
    }

    #[test]
    fn key_share_export_round_trips() {
        use crate::{protocol::PartyId, rid::Rid};

        let mut rng = init_testing();
        let (secret, _) = K256::random_scalar_point_pair(&mut rng);
        let publics = ["a", "b", "c"]
            .iter()
            .map(|id| {
                let (_, point) = K256::random_scalar_point_pair(&mut rng);
                (PartyId::from(*id), point)
            })
            .collect::<Vec<_>>();

        let export = KeyShareExport::<K256>::new(
            1,
            PartyId::from("b"),
            Rid::random(&mut rng),
            Rid::random(&mut rng),
            secret,
            publics,
        );

        let bytes = export.to_bytes();
        let back = KeyShareExport::<K256>::from_bytes(&bytes).unwrap();
        assert_eq!(export, back);
        // Encode → decode → encode is byte-identical.
        assert_eq!(bytes, back.to_bytes());

        assert!(KeyShareExport::<Ed25519>::from_bytes(&bytes).is_err());
        assert!(KeyShareExport::<K256>::from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn mismatched_private_scalar_is_rejected() {
        let mut rng = init_testing();
        let (scalar, _) = K256::random_scalar_point_pair(&mut rng);
        let (_, other_point) = K256::random_scalar_point_pair(&mut rng);
        let pair = KeyPair::<K256>::new(scalar, other_point);
        let bytes = pair.to_bytes();
        assert!(KeyPair::<K256>::from_bytes(&bytes).is_err());
    }
}
