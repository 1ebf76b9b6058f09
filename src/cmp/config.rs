// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The terminal result of CMP key generation.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use zeroize::Zeroize;

use crate::{
    curve::{CurveTrait, EcdsaCurve, ScalarTrait},
    errors::{FatalError, Result},
    keys::KeyShareExport,
    paillier::{DecryptionKey, EncryptionKey},
    protocol::PartyId,
    rid::Rid,
    ring_pedersen::RingPedersen,
};

/// One party's public material in a finished key generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicShare<C: EcdsaCurve> {
    /// The party's public ECDSA share `F(j)·G`-side point.
    pub ecdsa: C,
    /// The party's ElGamal public key.
    pub elgamal: C,
    /// The party's Paillier public key.
    pub paillier: EncryptionKey,
    /// The party's ring-Pedersen commitment parameters.
    pub pedersen: RingPedersen,
}

/// A participant's view of a finished CMP key generation: every party's
/// public material, the session randomness, and this party's secrets.
pub struct Config<C: EcdsaCurve> {
    party: PartyId,
    threshold: usize,
    rid: Rid,
    chain_key: Rid,
    public_key: C,
    publics: Vec<(PartyId, PublicShare<C>)>,
    secret_share: C::Scalar,
    paillier: DecryptionKey,
    elgamal_secret: C::Scalar,
}

impl<C: EcdsaCurve> Debug for Config<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("party", &self.party)
            .field("threshold", &self.threshold)
            .field("public_key", &self.public_key)
            .field("secret_share", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl<C: EcdsaCurve> Drop for Config<C> {
    fn drop(&mut self) {
        self.secret_share.zeroize();
        self.elgamal_secret.zeroize();
    }
}

impl<C: EcdsaCurve> Config<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        party: PartyId,
        threshold: usize,
        rid: Rid,
        chain_key: Rid,
        public_key: C,
        mut publics: Vec<(PartyId, PublicShare<C>)>,
        secret_share: C::Scalar,
        paillier: DecryptionKey,
        elgamal_secret: C::Scalar,
    ) -> Result<Self> {
        publics.sort_by(|a, b| a.0.cmp(&b.0));
        if !publics.iter().any(|(id, _)| id == &party) {
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
            publics,
            secret_share,
            paillier,
            elgamal_secret,
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

    /// The group public key as a verifier.
    pub fn verifying_key(&self) -> Result<C::VerifyingKey> {
        self.public_key.verifying_key()
    }

    /// All parties' public shares, sorted by party id.
    pub fn public_shares(&self) -> &[(PartyId, PublicShare<C>)] {
        &self.publics
    }

    /// A specific party's public share.
    pub fn public_share(&self, party: &PartyId) -> Result<&PublicShare<C>> {
        self.publics
            .iter()
            .find(|(id, _)| id == party)
            .map(|(_, share)| share)
            .ok_or_else(|| FatalError::BadInput(format!("unknown party {party}")).into())
    }

    /// The party identifiers, sorted.
    pub fn party_ids(&self) -> Vec<PartyId> {
        self.publics.iter().map(|(id, _)| id.clone()).collect()
    }

    /// This party's secret signing share.
    pub fn secret_share(&self) -> &C::Scalar {
        &self.secret_share
    }

    /// This party's Paillier secret key.
    pub fn paillier_key(&self) -> &DecryptionKey {
        &self.paillier
    }

    /// This party's ElGamal secret.
    pub fn elgamal_secret(&self) -> &C::Scalar {
        &self.elgamal_secret
    }

    /// The bytes all parties bind into their transcripts after key
    /// generation: the public portion of the configuration, identical at
    /// every honest party.
    pub(crate) fn transcript_bytes(&self) -> Result<Vec<u8>> {
        serialize!(&(
            &(self.threshold as u64),
            &self.rid,
            &self.chain_key,
            &self.public_key,
            &self.publics,
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
            self.publics
                .iter()
                .map(|(id, share)| (id.clone(), share.ecdsa))
                .collect(),
        )
    }
}
