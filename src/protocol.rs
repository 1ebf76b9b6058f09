// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Session identity types and the per-session helper shared by all rounds.

use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
    sync::Arc,
};

use crate::{
    curve::{CurveTrait, ScalarTrait},
    errors::{FatalError, Result},
    hash::SessionHash,
    messages::MessageManager,
    pool::Pool,
};

/// A session identifier, unique per protocol execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(u128);

impl Identifier {
    /// Sample a fresh identifier.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(rng.gen())
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// An opaque short string uniquely naming one participant within a session.
///
/// Party identifiers order lexicographically; every fold over per-party data
/// (RID XOR, polynomial sums, binding hashes) iterates in that order so all
/// participants derive identical values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(String);

impl PartyId {
    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PartyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Caller-provided description of one participant's view of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    self_id: PartyId,
    party_ids: Vec<PartyId>,
    threshold: usize,
}

impl SessionConfig {
    /// Describe a session for `self_id` among `party_ids` (which must include
    /// `self_id`), with reconstruction threshold `threshold`.
    pub fn new(self_id: PartyId, party_ids: &[PartyId], threshold: usize) -> Result<Self> {
        let mut sorted = party_ids.to_vec();
        sorted.sort();

        let unique: HashSet<_> = sorted.iter().collect();
        if unique.len() != sorted.len() {
            Err(FatalError::BadInput("duplicate party identifiers".into()))?;
        }
        if !sorted.contains(&self_id) {
            Err(FatalError::BadInput(
                "own party id missing from the party set".into(),
            ))?;
        }
        if threshold == 0 || threshold >= sorted.len() {
            Err(FatalError::BadInput(format!(
                "threshold {threshold} is incompatible with {} parties",
                sorted.len()
            )))?;
        }

        Ok(Self {
            self_id,
            party_ids: sorted,
            threshold,
        })
    }

    /// This participant's identifier.
    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    /// All participant identifiers, sorted.
    pub fn party_ids(&self) -> &[PartyId] {
        &self.party_ids
    }

    /// The reconstruction threshold `t`; any `t + 1` parties can sign.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

/// Per-session context threaded through every round: identity, party set,
/// threshold, transcript hash, and worker pool. Issues per-peer derived
/// hashes and tracks message delivery for both channels.
pub(crate) struct SessionHelper<C: CurveTrait> {
    protocol: &'static str,
    sid: Identifier,
    config: SessionConfig,
    other_ids: Vec<PartyId>,
    final_round: u8,
    hash: SessionHash,
    pool: Arc<Pool>,
    pub(crate) broadcast_mgr: MessageManager,
    pub(crate) direct_mgr: MessageManager,
    _curve: PhantomData<C>,
}

impl<C: CurveTrait> Debug for SessionHelper<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHelper")
            .field("protocol", &self.protocol)
            .field("sid", &self.sid)
            .field("self_id", self.config.self_id())
            .field("final_round", &self.final_round)
            .finish_non_exhaustive()
    }
}

impl<C: CurveTrait> SessionHelper<C> {
    pub(crate) fn new(
        protocol: &'static str,
        sid: Identifier,
        config: SessionConfig,
        final_round: u8,
        pool: Arc<Pool>,
    ) -> Result<Self> {
        // The hash-to-scalar party mapping must be injective on this party
        // set, and no party may map to the zero evaluation point.
        let scalars = config
            .party_ids()
            .iter()
            .map(C::scalar_from_id)
            .collect::<Vec<_>>();
        for (i, scalar) in scalars.iter().enumerate() {
            if scalar.is_zero() {
                Err(FatalError::BadInput(
                    "party id maps to the zero scalar".into(),
                ))?;
            }
            if scalars.iter().skip(i + 1).any(|other| other == scalar) {
                Err(FatalError::BadInput(
                    "two party ids map to the same scalar".into(),
                ))?;
            }
        }

        let mut hash = SessionHash::new(b"threshold-sig session");
        hash.append(b"protocol", protocol.as_bytes());
        hash.append_value(b"session id", &sid)?;
        hash.append_value(b"party ids", &config.party_ids().to_vec())?;
        hash.append_value(b"threshold", &(config.threshold() as u64))?;
        hash.append(b"final round", &[final_round]);
        hash.append(b"group", C::NAME.as_bytes());

        let other_ids = config
            .party_ids()
            .iter()
            .filter(|id| *id != config.self_id())
            .cloned()
            .collect();

        Ok(Self {
            protocol,
            sid,
            config,
            other_ids,
            final_round,
            hash,
            pool,
            broadcast_mgr: MessageManager::new(),
            direct_mgr: MessageManager::new(),
            _curve: PhantomData,
        })
    }

    pub(crate) fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub(crate) fn sid(&self) -> Identifier {
        self.sid
    }

    pub(crate) fn self_id(&self) -> &PartyId {
        self.config.self_id()
    }

    pub(crate) fn party_ids(&self) -> &[PartyId] {
        self.config.party_ids()
    }

    pub(crate) fn other_ids(&self) -> &[PartyId] {
        &self.other_ids
    }

    pub(crate) fn threshold(&self) -> usize {
        self.config.threshold()
    }

    pub(crate) fn num_parties(&self) -> usize {
        self.config.party_ids().len()
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The session transcript. Written only at round commit points.
    pub(crate) fn hash(&self) -> &SessionHash {
        &self.hash
    }

    pub(crate) fn hash_mut(&mut self) -> &mut SessionHash {
        &mut self.hash
    }

    /// A transcript fork bound to a specific party.
    pub(crate) fn hash_for_id(&self, id: &PartyId) -> SessionHash {
        self.hash.fork_for_party(id)
    }

    /// The party's polynomial evaluation point.
    pub(crate) fn party_scalar(&self, id: &PartyId) -> C::Scalar {
        C::scalar_from_id(id)
    }

    /// Lagrange coefficient at zero for `id` over this session's party set.
    pub(crate) fn lagrange_at_zero(&self, id: &PartyId) -> Result<C::Scalar> {
        let points = self
            .party_ids()
            .iter()
            .map(|p| C::scalar_from_id(p))
            .collect::<Vec<_>>();
        let index = self
            .party_ids()
            .iter()
            .position(|p| p == id)
            .ok_or(FatalError::InternalInvariantFailed)?;
        crate::vss::lagrange_at_zero::<C>(&points, index)
    }

    /// Record a broadcast delivery for a round; `false` if it is a replay.
    pub(crate) fn mark_broadcast(&mut self, round: u8, from: &PartyId) -> bool {
        let sid = self.sid;
        self.broadcast_mgr.mark_received(sid, round, from)
    }

    /// Record a direct delivery for a round; `false` if it is a replay.
    pub(crate) fn mark_direct(&mut self, round: u8, from: &PartyId) -> bool {
        let sid = self.sid;
        self.direct_mgr.mark_received(sid, round, from)
    }

    /// True if this party's broadcast for `round` has already been stored.
    pub(crate) fn has_broadcast(&self, round: u8, from: &PartyId) -> bool {
        self.broadcast_mgr.has_received(self.sid, round, from)
    }

    /// True if this party's direct message for `round` has already been
    /// stored.
    pub(crate) fn has_direct(&self, round: u8, from: &PartyId) -> bool {
        self.direct_mgr.has_received(self.sid, round, from)
    }

    /// True iff every other participant's broadcast for `round` has arrived.
    pub(crate) fn has_all_broadcasts(&self, round: u8) -> bool {
        self.broadcast_mgr
            .has_all(self.sid, round, &self.other_ids)
    }

    /// True iff every other participant's direct message for `round` has
    /// arrived.
    pub(crate) fn has_all_directs(&self, round: u8) -> bool {
        self.direct_mgr.has_all(self.sid, round, &self.other_ids)
    }
}
