// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Error types produced by the round engine, the key managers, and the
//! protocol rounds.
//!
//! The taxonomy follows how the driver reacts to a failure:
//! - [`ContentError`]: the message was malformed for the current round. The
//!   driver logs and drops it without advancing.
//! - [`ValidationError`]: a cryptographic check failed. The session aborts,
//!   attributing the sending party where possible.
//! - [`StoreError`]: key material was missing or duplicated. Surfaced to the
//!   caller.
//! - [`Error::NotEnoughMessages`]: `finalize` was invoked before the round
//!   was ready; the caller should re-drive after more arrivals.
//! - [`FatalError`]: corrupt local state. The session terminates.

use thiserror::Error;

use crate::protocol::PartyId;

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The message had the wrong type, shape, or round for the receiving
    /// round. Dropped by the driver.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// A commitment, decommitment, proof, share, or nonce check failed.
    /// Aborts the session.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Duplicate or missing key material.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// `finalize` was called before the round's completion predicate held.
    #[error("round cannot finalize yet: not enough messages")]
    NotEnoughMessages,

    /// Corrupt local state or a broken internal invariant.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Syntactic problems with an incoming message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    /// The message named a different protocol.
    #[error("message carries protocol id `{got}`, session runs `{expected}`")]
    WrongProtocol {
        /// Protocol the session runs.
        expected: String,
        /// Protocol the message named.
        got: String,
    },
    /// The message named a different session.
    #[error("message belongs to a different session")]
    WrongSession,
    /// The message was tagged for an already-finalized round.
    #[error("message round {got} is behind the current round {current}")]
    StaleRound {
        /// Round the session is currently in.
        current: u8,
        /// Round the message was tagged for.
        got: u8,
    },
    /// The round does not accept this delivery kind (broadcast vs direct).
    #[error("round {round} does not accept {kind} messages")]
    UnexpectedKind {
        /// Current round number.
        round: u8,
        /// "broadcast" or "direct".
        kind: &'static str,
    },
    /// The message was addressed to a different party.
    #[error("message addressed to another party")]
    Misrouted,
    /// The message came from a party outside the session's party set, or
    /// echoes our own identifier.
    #[error("message sender is not a peer in this session")]
    UnknownSender,
    /// Content bytes failed to deserialize into the round's content type.
    #[error("message content failed to deserialize")]
    Deserialization,
}

/// A cryptographic check failed. Carries the party the failure is attributed
/// to, when one can be named.
#[derive(Debug, Error)]
#[error("validation failed ({reason}){}", .culprit.as_ref().map(|p| format!(", attributed to party {p}")).unwrap_or_default())]
pub struct ValidationError {
    /// Party whose contribution failed the check, if attributable.
    pub culprit: Option<PartyId>,
    /// Human-readable description of the failed check.
    pub reason: String,
}

impl ValidationError {
    /// A validation failure attributed to `culprit`.
    pub fn attributed(culprit: &PartyId, reason: impl Into<String>) -> Self {
        Self {
            culprit: Some(culprit.clone()),
            reason: reason.into(),
        }
    }

    /// A validation failure that cannot be pinned on a single party.
    pub fn unattributed(reason: impl Into<String>) -> Self {
        Self {
            culprit: None,
            reason: reason.into(),
        }
    }
}

/// Problems reading or writing a key manager.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// An entry already exists under this key with different contents.
    #[error("an entry already exists under this key")]
    DuplicateEntry,
    /// No entry exists under this key.
    #[error("no entry exists under this key")]
    MissingEntry,
    /// The stored bytes failed to decode into the expected object.
    #[error("stored bytes failed to decode")]
    CorruptEntry,
}

/// Unrecoverable local failures.
#[derive(Debug, Error)]
pub enum FatalError {
    /// An internal invariant did not hold; this is a bug.
    #[error("internal invariant failed")]
    InternalInvariantFailed,
    /// The caller supplied inconsistent configuration.
    #[error("bad session input: {0}")]
    BadInput(String),
    /// Serialization of a local object failed.
    #[error("serialization failed")]
    Serialization,
    /// A sampling loop exhausted its retry budget.
    #[error("cryptographic retry budget exhausted")]
    RetryFailed,
    /// The protocol has already reached a terminal state.
    #[error("session already terminated")]
    AlreadyTerminated,
}

/// Serialize an object with the crate-wide canonical encoding.
macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x).map_err(|_| {
            tracing::error!("failed to serialize object");
            $crate::errors::Error::from($crate::errors::FatalError::Serialization)
        })
    }};
}

/// Deserialize bytes received from the wire; failures are content errors.
macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x).map_err(|_| {
            $crate::errors::Error::from($crate::errors::ContentError::Deserialization)
        })
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_reports_culprit() {
        let e = ValidationError::attributed(&PartyId::from("bob"), "bad proof");
        assert_eq!(e.culprit, Some(PartyId::from("bob")));
        assert!(e.to_string().contains("bob"));

        let e = ValidationError::unattributed("inconsistent aggregate");
        assert!(e.culprit.is_none());
    }

    #[test]
    fn serialize_macros_round_trip() {
        let v: Vec<u32> = vec![1, 2, 3];
        let bytes = serialize!(&v).unwrap();
        let back: Vec<u32> = deserialize!(&bytes).unwrap();
        assert_eq!(v, back);

        let garbage = [0xffu8; 3];
        let result: crate::errors::Result<Vec<String>> = deserialize!(&garbage[..]);
        assert!(matches!(
            result,
            Err(Error::Content(ContentError::Deserialization))
        ));
    }
}
