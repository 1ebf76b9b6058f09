// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round-based multi-party computation for threshold signatures.
//!
//! A set of mutually-distrusting participants jointly generate a public key
//! whose private key is secret-shared among them, then cooperate to produce
//! signatures without ever reconstructing the private key. Two protocol
//! families are provided:
//!
//! - [`cmp`]: CMP-style threshold ECDSA over secp256k1, with Paillier-based
//!   multiplicative-to-additive conversion and the associated zero-knowledge
//!   proofs;
//! - [`frost`]: FROST-style threshold Schnorr over edwards25519, producing
//!   standard Ed25519 signatures.
//!
//! Each participant runs a [`round::Driver`] that dispatches incoming
//! messages into the current round, enforces the per-round completion
//! predicates, and finalizes into the successor round, a verified result, or
//! an abort naming the faulting party. Intermediate cryptographic objects —
//! commitments, VSS polynomials, nonce pairs, partial keys — live in typed
//! key managers keyed by `(session, party)`, all backed by a pluggable
//! [`keystore::Keystore`].
//!
//! This library deliberately stops at the session boundary: transport,
//! persistence beyond the in-memory keystore, and peer discovery belong to
//! the caller. The driver never blocks; it emits outgoing messages into a
//! caller-owned sink and expects the caller to schedule delivery. Delivery
//! may be at-least-once — duplicate arrivals are idempotent.

#![allow(non_snake_case)]
#![warn(missing_docs)]

#[macro_use]
pub mod errors;

pub mod cmp;
pub mod curve;
pub mod ed25519;
pub mod elgamal;
pub mod frost;
pub mod hash;
pub mod k256;
pub mod keys;
pub mod keystore;
pub mod messages;
pub mod paillier;
pub mod pool;
pub mod protocol;
pub mod rid;
pub mod ring_pedersen;
pub mod round;
pub mod vss;

mod parameters;
mod utils;
mod zkp;

pub use messages::{Message, Recipient};
pub use protocol::{Identifier, PartyId, SessionConfig};
pub use round::{AbortInfo, Driver, Status};
