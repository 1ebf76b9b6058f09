// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The round contract and the session driver.
//!
//! A protocol is an ordered sequence of rounds. Each round accepts the
//! messages tagged with its own number, reports readiness through
//! [`Round::can_finalize`], and on finalization emits outgoing messages and
//! hands over to its successor, a terminal output, or an abort.
//!
//! The [`Driver`] owns the current round and enforces the envelope rules:
//! wrong-protocol, wrong-session, and misrouted messages are dropped; stale
//! rounds are dropped; future rounds are stashed and replayed after the next
//! transition; validation failures abort the session attributing the sender.

use rand::{CryptoRng, RngCore};
use std::fmt::{Debug, Display, Formatter};
use tracing::{debug, info, warn};

use crate::{
    errors::{ContentError, Error, Result, ValidationError},
    messages::{Message, Recipient},
    protocol::{Identifier, PartyId},
};

/// Object-safe bound for the RNG threaded through [`Round::finalize`].
pub trait CryptoRngCore: RngCore + CryptoRng {}

impl<T: RngCore + CryptoRng> CryptoRngCore for T {}

/// One round of a protocol, driven by a [`Driver`].
pub trait Round {
    /// The terminal result of the protocol this round belongs to.
    type Output;

    /// This round's number, monotonic from 1.
    fn number(&self) -> u8;

    /// True if this round consumes broadcast messages.
    fn expects_broadcasts(&self) -> bool {
        false
    }

    /// True if this round consumes direct messages.
    fn expects_directs(&self) -> bool {
        false
    }

    /// Cheap syntactic validation of an inbound message. Must be free of side
    /// effects.
    fn verify_message(&self, message: &Message) -> Result<()> {
        let _ = message;
        Ok(())
    }

    /// Persist a verified direct message.
    fn store_message(&mut self, message: &Message) -> Result<()> {
        let _ = message;
        Err(ContentError::UnexpectedKind {
            round: self.number(),
            kind: "direct",
        })?
    }

    /// Persist and cryptographically validate a broadcast.
    fn store_broadcast_message(&mut self, message: &Message) -> Result<()> {
        let _ = message;
        Err(ContentError::UnexpectedKind {
            round: self.number(),
            kind: "broadcast",
        })?
    }

    /// True once every message this round requires has been stored.
    fn can_finalize(&self) -> bool;

    /// Compute outgoing messages, emit them on `out`, and return the
    /// successor round (or a terminal result, or an abort).
    ///
    /// Must only be called when [`Round::can_finalize`] holds; otherwise it
    /// fails with [`Error::NotEnoughMessages`].
    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
        out: &mut Vec<Message>,
    ) -> Result<Transition<Self::Output>>;
}

/// What a round hands back from [`Round::finalize`].
pub enum Transition<O> {
    /// Continue with the next round.
    Next(Box<dyn Round<Output = O> + Send>),
    /// The protocol finished with a verified result.
    Final(O),
    /// The protocol failed; the session terminates.
    Abort(AbortInfo),
}

/// Terminal failure description, attributing the faulting party when known.
#[derive(Debug, Clone)]
pub struct AbortInfo {
    /// The party whose contribution caused the abort, if attributable.
    pub culprit: Option<PartyId>,
    /// Why the session aborted.
    pub reason: String,
}

impl Display for AbortInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.culprit {
            Some(p) => write!(f, "aborted, attributed to party {p}: {}", self.reason),
            None => write!(f, "aborted: {}", self.reason),
        }
    }
}

impl From<ValidationError> for AbortInfo {
    fn from(e: ValidationError) -> Self {
        Self {
            culprit: e.culprit,
            reason: e.reason,
        }
    }
}

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Waiting for more messages or local drives.
    InProgress,
    /// Terminated with an output; collect it with [`Driver::take_output`].
    Done,
    /// Terminated on a validation failure; see [`Driver::abort_info`].
    Aborted,
    /// Cancelled by the caller.
    Cancelled,
}

enum Delivery {
    Stored,
    Dropped,
    Aborted,
}

/// Drives one participant through a protocol's rounds.
///
/// The driver never blocks on I/O: outgoing messages are pushed to the `out`
/// sink owned by the caller, and the caller schedules delivery. Message
/// delivery is treated as at-least-once; duplicate arrivals are idempotent.
pub struct Driver<O> {
    protocol: &'static str,
    sid: Identifier,
    self_id: PartyId,
    party_ids: Vec<PartyId>,
    current: Option<Box<dyn Round<Output = O> + Send>>,
    stash: Vec<Message>,
    output: Option<O>,
    abort: Option<AbortInfo>,
    done: bool,
    cancelled: bool,
}

impl<O> Debug for Driver<O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("protocol", &self.protocol)
            .field("sid", &self.sid)
            .field("self_id", &self.self_id)
            .field("round", &self.current.as_ref().map(|r| r.number()))
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<O> Driver<O> {
    pub(crate) fn new(
        protocol: &'static str,
        sid: Identifier,
        self_id: PartyId,
        party_ids: Vec<PartyId>,
        first: Box<dyn Round<Output = O> + Send>,
    ) -> Self {
        Self {
            protocol,
            sid,
            self_id,
            party_ids,
            current: Some(first),
            stash: Vec::new(),
            output: None,
            abort: None,
            done: false,
            cancelled: false,
        }
    }

    /// Kick off the session: finalize every round that is ready without
    /// inbound messages (round 1 always is), emitting its messages on `out`.
    pub fn start<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        out: &mut Vec<Message>,
    ) -> Result<Status> {
        if self.is_terminal() {
            return Ok(self.status());
        }
        self.advance(rng, out)
    }

    /// Route one inbound message, then finalize as far as possible.
    pub fn handle_message<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: Message,
        out: &mut Vec<Message>,
    ) -> Result<Status> {
        if self.is_terminal() {
            debug!(
                "dropping message for terminated session {}: round {}, from {}",
                self.sid,
                message.round(),
                message.from()
            );
            return Ok(self.status());
        }

        if let Err(reason) = self.route(&message) {
            warn!("dropping message: {reason}");
            return Ok(self.status());
        }

        let current = match &self.current {
            Some(round) => round.number(),
            None => return Ok(self.status()),
        };

        if message.round() > current {
            // A peer that finalized before us legitimately runs ahead by a
            // round; keep the message for the successor.
            debug!(
                "stashing round {} message from {} while in round {current}",
                message.round(),
                message.from()
            );
            self.stash.push(message);
            return Ok(self.status());
        }

        match self.deliver(&message)? {
            Delivery::Aborted => return Ok(self.status()),
            Delivery::Dropped => return Ok(self.status()),
            Delivery::Stored => {}
        }

        self.advance(rng, out)
    }

    /// The session's externally visible state.
    pub fn status(&self) -> Status {
        if self.cancelled {
            Status::Cancelled
        } else if self.abort.is_some() {
            Status::Aborted
        } else if self.done {
            Status::Done
        } else {
            Status::InProgress
        }
    }

    /// The current round number, if the session is still in progress.
    pub fn current_round(&self) -> Option<u8> {
        self.current.as_ref().map(|r| r.number())
    }

    /// Collect the terminal output. Returns `None` until the session is
    /// [`Status::Done`], and on every call after the first.
    pub fn take_output(&mut self) -> Option<O> {
        self.output.take()
    }

    /// The abort description, once the session is [`Status::Aborted`].
    pub fn abort_info(&self) -> Option<&AbortInfo> {
        self.abort.as_ref()
    }

    /// Stop driving this session. No further messages are emitted; key
    /// manager contents are left intact for a potential restart.
    pub fn cancel(&mut self) {
        info!("session {} cancelled", self.sid);
        self.cancelled = true;
        self.current = None;
        self.stash.clear();
    }

    fn is_terminal(&self) -> bool {
        self.cancelled || self.done || self.abort.is_some()
    }

    /// Envelope checks: protocol, session, sender, addressee.
    fn route(&self, message: &Message) -> std::result::Result<(), ContentError> {
        if message.protocol() != self.protocol {
            return Err(ContentError::WrongProtocol {
                expected: self.protocol.to_string(),
                got: message.protocol().to_string(),
            });
        }
        if message.sid() != self.sid {
            return Err(ContentError::WrongSession);
        }
        if message.from() == &self.self_id || !self.party_ids.contains(message.from()) {
            return Err(ContentError::UnknownSender);
        }
        match message.to() {
            Recipient::Broadcast => {}
            Recipient::Party(to) if to == &self.self_id => {}
            Recipient::Party(_) => return Err(ContentError::Misrouted),
        }
        if let Some(current) = self.current.as_ref().map(|r| r.number()) {
            if message.round() < current {
                return Err(ContentError::StaleRound {
                    current,
                    got: message.round(),
                });
            }
        }
        Ok(())
    }

    /// Hand a current-round message to the round, applying the error policy:
    /// content errors drop the message, validation errors abort the session.
    fn deliver(&mut self, message: &Message) -> Result<Delivery> {
        let round = match self.current.as_mut() {
            Some(round) => round,
            None => return Ok(Delivery::Dropped),
        };

        let accepted = if message.is_broadcast() {
            round.expects_broadcasts()
        } else {
            round.expects_directs()
        };
        if !accepted {
            warn!(
                "round {} does not accept this delivery kind; dropping message from {}",
                round.number(),
                message.from()
            );
            return Ok(Delivery::Dropped);
        }

        let stored = round.verify_message(message).and_then(|()| {
            if message.is_broadcast() {
                round.store_broadcast_message(message)
            } else {
                round.store_message(message)
            }
        });

        match stored {
            Ok(()) => Ok(Delivery::Stored),
            Err(Error::Content(e)) => {
                warn!("dropping malformed message from {}: {e}", message.from());
                Ok(Delivery::Dropped)
            }
            Err(Error::Validation(e)) => {
                self.abort(e.into());
                Ok(Delivery::Aborted)
            }
            Err(e) => Err(e),
        }
    }

    /// Finalize rounds while their completion predicates hold, replaying
    /// stashed messages after every transition.
    fn advance<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        out: &mut Vec<Message>,
    ) -> Result<Status> {
        loop {
            let ready = matches!(&self.current, Some(round) if round.can_finalize());
            if !ready {
                break;
            }
            let round = self
                .current
                .take()
                .expect("readiness was checked on the current round");
            let number = round.number();

            match round.finalize(rng, out) {
                Ok(Transition::Next(next)) => {
                    info!(
                        "session {}: round {number} finalized, advancing to round {}",
                        self.sid,
                        next.number()
                    );
                    self.current = Some(next);
                    if !self.replay_stash()? {
                        return Ok(self.status());
                    }
                }
                Ok(Transition::Final(output)) => {
                    info!("session {}: terminated successfully", self.sid);
                    self.output = Some(output);
                    self.done = true;
                    return Ok(self.status());
                }
                Ok(Transition::Abort(info)) => {
                    self.abort(info);
                    return Ok(self.status());
                }
                Err(Error::Validation(e)) => {
                    self.abort(e.into());
                    return Ok(self.status());
                }
                Err(Error::NotEnoughMessages) => {
                    // The predicate held a moment ago; treat as not ready.
                    warn!("round {number} reported not enough messages after readiness");
                    return Ok(self.status());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.status())
    }

    /// Deliver stashed messages that now target the current round. Returns
    /// `false` if a delivery aborted the session.
    fn replay_stash(&mut self) -> Result<bool> {
        let current = match self.current.as_ref().map(|r| r.number()) {
            Some(n) => n,
            None => return Ok(true),
        };
        let mut pending = std::mem::take(&mut self.stash);
        let mut keep = Vec::with_capacity(pending.len());
        for message in pending.drain(..) {
            if message.round() == current {
                match self.deliver(&message)? {
                    Delivery::Aborted => return Ok(false),
                    Delivery::Stored | Delivery::Dropped => {}
                }
            } else if message.round() > current {
                keep.push(message);
            }
            // Stale stash entries are dropped.
        }
        self.stash = keep;
        Ok(true)
    }

    fn abort(&mut self, info: AbortInfo) {
        warn!("session {}: {info}", self.sid);
        self.abort = Some(info);
        self.current = None;
        self.stash.clear();
    }
}
