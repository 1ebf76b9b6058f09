// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Message envelope and per-round delivery tracking.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;

use crate::{
    errors::Result,
    protocol::{Identifier, PartyId},
};

/// Addressee of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Reliably delivered to every other participant.
    Broadcast,
    /// Delivered to a single participant.
    Party(PartyId),
}

/// The opaque envelope exchanged between participants.
///
/// Content bytes are produced with the crate's canonical encoding and are
/// treated as unverified input on receipt: each round deserializes them into
/// its own content type and validates from there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    protocol: String,
    sid: Identifier,
    from: PartyId,
    to: Recipient,
    round: u8,
    unverified_bytes: Vec<u8>,
}

impl Message {
    /// Build a broadcast message. `round` is the round that will consume it.
    pub(crate) fn broadcast<T: Serialize>(
        protocol: &str,
        sid: Identifier,
        from: &PartyId,
        round: u8,
        content: &T,
    ) -> Result<Self> {
        Ok(Self {
            protocol: protocol.to_string(),
            sid,
            from: from.clone(),
            to: Recipient::Broadcast,
            round,
            unverified_bytes: serialize!(content)?,
        })
    }

    /// Build a direct message. `round` is the round that will consume it.
    pub(crate) fn direct<T: Serialize>(
        protocol: &str,
        sid: Identifier,
        from: &PartyId,
        to: &PartyId,
        round: u8,
        content: &T,
    ) -> Result<Self> {
        Ok(Self {
            protocol: protocol.to_string(),
            sid,
            from: from.clone(),
            to: Recipient::Party(to.clone()),
            round,
            unverified_bytes: serialize!(content)?,
        })
    }

    /// The protocol identifier this message belongs to.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// The session this message belongs to.
    pub fn sid(&self) -> Identifier {
        self.sid
    }

    /// The sending party.
    pub fn from(&self) -> &PartyId {
        &self.from
    }

    /// The addressee.
    pub fn to(&self) -> &Recipient {
        &self.to
    }

    /// The round that consumes this message.
    pub fn round(&self) -> u8 {
        self.round
    }

    /// True for broadcast deliveries.
    pub fn is_broadcast(&self) -> bool {
        matches!(self.to, Recipient::Broadcast)
    }

    /// Deserialize the content into the consuming round's content type.
    pub(crate) fn content<T: DeserializeOwned>(&self) -> Result<T> {
        deserialize!(&self.unverified_bytes)
    }

    /// Flip one content byte, simulating a tampered payload.
    #[cfg(test)]
    pub(crate) fn corrupt_content_byte(&mut self, index: usize) {
        let index = index.min(self.unverified_bytes.len().saturating_sub(1));
        if let Some(byte) = self.unverified_bytes.get_mut(index) {
            *byte ^= 0x01;
        }
    }
}

/// Tracks which parties have delivered their message for each round of a
/// session. Separate instances track broadcast and direct deliveries.
#[derive(Debug, Default)]
pub(crate) struct MessageManager {
    received: HashSet<(Identifier, u8, PartyId)>,
}

impl MessageManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a delivery. Returns `false` if this `(session, round, party)`
    /// delivery was already recorded, making re-arrival idempotent.
    pub(crate) fn mark_received(&mut self, sid: Identifier, round: u8, from: &PartyId) -> bool {
        self.received.insert((sid, round, from.clone()))
    }

    /// True if this party's message for the round has been recorded.
    pub(crate) fn has_received(&self, sid: Identifier, round: u8, from: &PartyId) -> bool {
        self.received.contains(&(sid, round, from.clone()))
    }

    /// True iff every listed party has delivered for the round.
    pub(crate) fn has_all(&self, sid: Identifier, round: u8, parties: &[PartyId]) -> bool {
        parties
            .iter()
            .all(|party| self.has_received(sid, round, party))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn delivery_tracking_is_idempotent() {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let a = PartyId::from("a");
        let b = PartyId::from("b");

        let mut mgr = MessageManager::new();
        assert!(mgr.mark_received(sid, 2, &a));
        // Re-arrival is reported, not double counted.
        assert!(!mgr.mark_received(sid, 2, &a));

        assert!(!mgr.has_all(sid, 2, &[a.clone(), b.clone()]));
        assert!(mgr.mark_received(sid, 2, &b));
        assert!(mgr.has_all(sid, 2, &[a.clone(), b.clone()]));

        // Other rounds and sessions are unaffected.
        assert!(!mgr.has_received(sid, 3, &a));
        let other_sid = Identifier::random(&mut rng);
        assert!(!mgr.has_received(other_sid, 2, &a));
    }

    #[test]
    fn message_content_round_trips() {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let msg = Message::broadcast("test/protocol", sid, &PartyId::from("a"), 2, &vec![1u32, 2])
            .unwrap();
        assert!(msg.is_broadcast());
        assert_eq!(msg.round(), 2);
        let content: Vec<u32> = msg.content().unwrap();
        assert_eq!(content, vec![1, 2]);

        // Decoding into a shape that needs more bytes than the payload fails.
        let err: Result<[u64; 9]> = msg.content();
        assert!(err.is_err());
    }
}
