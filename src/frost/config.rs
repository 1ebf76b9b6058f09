// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The terminal result of FROST key generation.

use std::fmt::Debug;
use zeroize::Zeroize;

use crate::{
    curve::SchnorrCurve,
    errors::{FatalError, Result},
    keys::KeyShareExport,
    protocol::PartyId,
    rid::Rid,
};

/// A participant's view of a finished FROST key generation.
pub struct Config<C: SchnorrCurve> {
    party: PartyId,
    threshold: usize,
    rid: Rid,
    chain_key: Rid,
    public_key: C,
    public_shares: Vec<(PartyId, C)>,
    secret_share: C::Scalar,
}

impl<C: SchnorrCurve> Debug for Config<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("party", &self.party)
            .field("threshold", &self.threshold)
            .field("public_key", &self.public_key)
            .field("secret_share", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl<C: SchnorrCurve> Drop for Config<C> {
    fn drop(&mut self) {
        self.secret_share.zeroize();
    }
}

impl<C: SchnorrCurve> Config<C> {
    pub(crate) fn new(
        party: PartyId,
        threshold: usize,
        rid: Rid,
        chain_key: Rid,
        public_key: C,
        mut public_shares: Vec<(PartyId, C)>,
        secret_share: C::Scalar,
    ) -> Result<Self> {
        public_shares.sort_by(|a, b| a.0.cmp(&b.0));
        if !public_shares.iter().any(|(id, _)| id == &party) {
            Err(FatalError::BadInput(
                "own party id missing from public shares".into(),
            ))?;
        }
        Ok(Self {
            party,
            threshold,
            rid,
            chain_key,
            public_key,
            public_shares,
            secret_share,
        })
    }

    /// This participant's identifier.
    pub fn party(&self) -> &PartyId {
        &self.party
    }

    /// The reconstruction threshold `t`.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The session's folded random identifier.
    pub fn rid(&self) -> &Rid {
        &self.rid
    }

    /// The session's folded chain key.
    pub fn chain_key(&self) -> &Rid {
        &self.chain_key
    }

    /// The group public key `Y = Σ Fⱼ(0)`.
    pub fn public_key(&self) -> &C {
        &self.public_key
    }

    /// All parties' public shares, sorted by party id.
    pub fn public_shares(&self) -> &[(PartyId, C)] {
        &self.public_shares
    }

    /// A specific party's public share.
    pub fn public_share(&self, party: &PartyId) -> Result<&C> {
        self.public_shares
            .iter()
            .find(|(id, _)| id == party)
            .map(|(_, share)| share)
            .ok_or_else(|| FatalError::BadInput(format!("unknown party {party}")).into())
    }

    /// This party's secret signing share.
    pub fn secret_share(&self) -> &C::Scalar {
        &self.secret_share
    }

    /// The bytes all parties bind into their transcripts after key
    /// generation.
    pub(crate) fn transcript_bytes(&self) -> Result<Vec<u8>> {
        serialize!(&(
            &(self.threshold as u64),
            &self.rid,
            &self.chain_key,
            &self.public_key,
            &self.public_shares,
        ))
    }

    /// The portable key-share export.
    pub fn export(&self) -> KeyShareExport<C> {
        KeyShareExport::new(
            self.threshold,
            self.party.clone(),
            self.rid,
            self.chain_key,
            self.secret_share,
            self.public_shares.clone(),
        )
    }
}
