// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Zero-knowledge proofs used by the protocols.
//!
//! Every proof follows the same shape: a `CommonInput` naming the public
//! statement, a prover secret, and `prove`/`verify` functions that use a
//! caller-provided [`SessionHash`](crate::hash::SessionHash) fork as the
//! Fiat–Shamir oracle. Proofs serialize canonically and round-trip
//! byte-identically.
//!
//! | Module    | Relation |
//! |-----------|----------|
//! | [`pisch`] | knowledge of a discrete log (Schnorr) |
//! | [`pienc`] | Paillier ciphertext encrypts a value in range |
//! | [`piaffp`]| Paillier affine-group relation, operands ciphertext-committed |
//! | [`pifac`] | Paillier modulus has no small factors |
//! | [`pimod`] | Paillier modulus is a Blum integer |
//! | [`piprm`] | ring-Pedersen parameters are well-formed |

pub(crate) mod piaffp;
pub(crate) mod pienc;
pub(crate) mod pifac;
pub(crate) mod pimod;
pub(crate) mod piprm;
pub(crate) mod pisch;

use libpaillier::unknown_order::BigNumber;

use crate::{curve::CurveTrait, errors::Result, hash::SessionHash};

/// Derive a challenge scalar for curve `C` from the transcript.
pub(crate) fn challenge_scalar<C: CurveTrait>(
    hash: &mut SessionHash,
    label: &'static [u8],
) -> Result<C::Scalar> {
    let mut bytes = [0u8; 64];
    hash.challenge_bytes(label, &mut bytes);
    C::bn_to_scalar(&BigNumber::from_slice(bytes))
}
