// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Append-only session transcript and hash commitments.
//!
//! A [`SessionHash`] is the running transcript of one session. Two honest
//! participants that appended the same sequence of values read identical
//! digests. [`SessionHash::fork`] yields an independent copy whose mutations
//! do not affect the parent; forks serve as the Fiat–Shamir oracle for every
//! proof in this crate and as the basis of hash commitments.

use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::error;

use crate::{
    errors::{Result, ValidationError},
    protocol::PartyId,
};

/// Append-only running hash bound to one session.
#[derive(Clone)]
pub struct SessionHash {
    transcript: Transcript,
}

impl Debug for SessionHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionHash(..)")
    }
}

impl SessionHash {
    /// Start a transcript under a protocol domain label.
    pub(crate) fn new(domain: &'static [u8]) -> Self {
        Self {
            transcript: Transcript::new(domain),
        }
    }

    /// Append raw bytes under a label.
    pub(crate) fn append(&mut self, label: &'static [u8], bytes: &[u8]) {
        self.transcript.append_message(label, bytes);
    }

    /// Append a serializable value under a label.
    pub(crate) fn append_value<T: Serialize>(&mut self, label: &'static [u8], value: &T) -> Result<()> {
        let bytes = serialize!(value)?;
        self.append(label, &bytes);
        Ok(())
    }

    /// An independent fork of the current state.
    pub(crate) fn fork(&self) -> Self {
        self.clone()
    }

    /// A fork bound to a specific party.
    pub(crate) fn fork_for_party(&self, id: &PartyId) -> Self {
        let mut fork = self.fork();
        fork.append(b"party", id.as_str().as_bytes());
        fork
    }

    /// Fill `dest` with challenge bytes, advancing the state.
    pub(crate) fn challenge_bytes(&mut self, label: &'static [u8], dest: &mut [u8]) {
        self.transcript.challenge_bytes(label, dest);
    }

    /// A 32-byte challenge digest, advancing the state.
    pub(crate) fn digest32(&mut self, label: &'static [u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.challenge_bytes(label, &mut out);
        out
    }

    /// Commit to `data` as `sender`, returning the digest to broadcast now and
    /// the nonce to open with later.
    pub(crate) fn commit<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        sender: &PartyId,
        data: &[u8],
    ) -> (Commitment, Decommitment) {
        let decommit = Decommitment::random(rng);
        let commit = self.commitment_digest(sender, data, &decommit);
        (commit, decommit)
    }

    /// Check an opening against a previously received digest.
    pub(crate) fn verify_commitment(
        &self,
        commitment: &Commitment,
        decommitment: &Decommitment,
        sender: &PartyId,
        data: &[u8],
    ) -> Result<()> {
        commitment.validate()?;
        decommitment.validate()?;
        let rebuilt = self.commitment_digest(sender, data, decommitment);
        if rebuilt.0 != commitment.0 {
            error!("opening does not reproduce the committed digest");
            return Err(ValidationError::attributed(sender, "failed to decommit").into());
        }
        Ok(())
    }

    fn commitment_digest(
        &self,
        sender: &PartyId,
        data: &[u8],
        decommitment: &Decommitment,
    ) -> Commitment {
        let mut fork = self.fork();
        fork.append(b"committing party", sender.as_str().as_bytes());
        fork.append(b"committed data", data);
        fork.append(b"decommitment nonce", &decommitment.0);
        Commitment(fork.digest32(b"commitment"))
    }
}

/// A hash-commitment digest, broadcast before the committed values are
/// revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment([u8; 32]);

impl Commitment {
    /// Reject the all-zero digest, which no honest commit produces.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.0 == [0u8; 32] {
            return Err(ValidationError::unattributed("empty commitment digest").into());
        }
        Ok(())
    }
}

impl crate::keystore::StoreValue for Commitment {
    const KIND: &'static str = "hash-commitment";

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| crate::errors::StoreError::CorruptEntry)?;
        Ok(Self(digest))
    }
}

/// The nonce that opens a [`Commitment`] in a later round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment([u8; 32]);

impl Decommitment {
    fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut nonce = [0u8; 32];
        rng.fill_bytes(&mut nonce);
        Self(nonce)
    }

    /// Reject the all-zero nonce, which no honest commit produces.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.0 == [0u8; 32] {
            return Err(ValidationError::unattributed("empty decommitment nonce").into());
        }
        Ok(())
    }
}

impl crate::keystore::StoreValue for Decommitment {
    const KIND: &'static str = "hash-decommitment";

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let nonce: [u8; 32] = bytes
            .try_into()
            .map_err(|_| crate::errors::StoreError::CorruptEntry)?;
        Ok(Self(nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    fn party(s: &str) -> PartyId {
        PartyId::from(s)
    }

    #[test]
    fn identical_appends_produce_identical_digests() {
        let mut a = SessionHash::new(b"test");
        let mut b = SessionHash::new(b"test");
        a.append(b"x", b"hello");
        b.append(b"x", b"hello");
        assert_eq!(a.digest32(b"d"), b.digest32(b"d"));
    }

    #[test]
    fn forks_are_independent_of_the_parent() {
        let mut parent = SessionHash::new(b"test");
        parent.append(b"x", b"hello");

        let mut fork = parent.fork();
        fork.append(b"y", b"mutated");

        let mut parent_twin = SessionHash::new(b"test");
        parent_twin.append(b"x", b"hello");
        assert_eq!(parent.digest32(b"d"), parent_twin.digest32(b"d"));
    }

    #[test]
    fn party_forks_differ() {
        let base = SessionHash::new(b"test");
        let mut a = base.fork_for_party(&party("a"));
        let mut b = base.fork_for_party(&party("b"));
        assert_ne!(a.digest32(b"d"), b.digest32(b"d"));
    }

    #[test]
    fn commitment_opens_and_rejects_tampering() {
        let mut rng = init_testing();
        let hash = SessionHash::new(b"test");
        let sender = party("a");

        let (com, dec) = hash.commit(&mut rng, &sender, b"committed payload");
        assert!(hash
            .verify_commitment(&com, &dec, &sender, b"committed payload")
            .is_ok());

        // Wrong data
        assert!(hash
            .verify_commitment(&com, &dec, &sender, b"a different payload")
            .is_err());
        // Wrong party
        assert!(hash
            .verify_commitment(&com, &dec, &party("b"), b"committed payload")
            .is_err());
        // Wrong transcript state
        let mut other = hash.fork();
        other.append(b"x", b"diverged");
        assert!(other
            .verify_commitment(&com, &dec, &sender, b"committed payload")
            .is_err());
    }
}
