// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Fixed-length random session identifiers.
//!
//! Each participant contributes one [`Rid`] during key generation; the
//! session value is the XOR across all contributions, so no single party
//! controls it. Chain keys use the same type.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Result, ValidationError},
    keystore::StoreValue,
    parameters::RID_LENGTH,
};

/// A 32-byte random identifier contributed by one party, or the XOR-fold of
/// all contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rid([u8; RID_LENGTH]);

impl Rid {
    /// Sample a fresh contribution.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; RID_LENGTH];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The all-zero value, identity of the XOR fold.
    pub(crate) fn empty() -> Self {
        Self([0u8; RID_LENGTH])
    }

    /// Reject the all-zero value, which no honest party contributes.
    pub fn validate(&self) -> Result<()> {
        if self.0 == [0u8; RID_LENGTH] {
            return Err(ValidationError::unattributed("all-zero rid").into());
        }
        Ok(())
    }

    /// Fold another contribution into this one.
    pub(crate) fn xor_assign(&mut self, other: &Rid) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a ^= b;
        }
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; RID_LENGTH] {
        &self.0
    }
}

impl StoreValue for Rid {
    const KIND: &'static str = "rid";

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; RID_LENGTH] = bytes
            .try_into()
            .map_err(|_| crate::errors::StoreError::CorruptEntry)?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn xor_fold_is_order_independent() {
        let mut rng = init_testing();
        let contributions: Vec<Rid> = (0..4).map(|_| Rid::random(&mut rng)).collect();

        let mut forward = Rid::empty();
        for rid in &contributions {
            forward.xor_assign(rid);
        }
        let mut backward = Rid::empty();
        for rid in contributions.iter().rev() {
            backward.xor_assign(rid);
        }
        assert_eq!(forward, backward);
    }

    #[test]
    fn all_zero_rid_is_rejected() {
        let mut rng = init_testing();
        assert!(Rid::empty().validate().is_err());
        assert!(Rid::random(&mut rng).validate().is_ok());
    }

    #[test]
    fn encoding_round_trips() {
        let mut rng = init_testing();
        let rid = Rid::random(&mut rng);
        let bytes = rid.encode().unwrap();
        assert_eq!(Rid::decode(&bytes).unwrap(), rid);
        assert!(Rid::decode(&bytes[1..]).is_err());
    }
}
