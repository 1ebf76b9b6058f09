// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Statistical and range parameters for the zero-knowledge proofs.
//!
//! The windows are sized so that every proof response stays well below the
//! modulus produced by two [`PRIME_BITS`]-bit safe primes, while honest
//! provers fail the range checks with probability at most `2^-128`.

/// Bit length of the plaintext range (`ℓ`): the curve order is 256 bits.
pub(crate) const ELL: usize = 256;

/// Bit length of the mask range (`ℓ'`) used by the multiplicative-to-additive
/// conversion.
pub(crate) const ELL_PRIME: usize = 512;

/// Slack parameter (`ε`) for statistical hiding of the range-proof responses.
pub(crate) const EPSILON: usize = 384;

/// Iteration count for the cut-and-choose proofs (`Π[mod]`, `Π[prm]`).
///
/// Each iteration halves the cheating probability. This setting matches the
/// test-grade prime sizes below; production deployments should raise it to 80
/// together with [`PRIME_BITS`] ≥ 1024.
pub(crate) const SOUNDNESS: usize = 16;

/// Bit length of each Paillier safe prime.
///
/// 512-bit primes keep test runs tractable; the resulting 1024-bit modulus is
/// not a production parameter.
pub(crate) const PRIME_BITS: usize = 512;

/// Byte length of session-binding random identifiers and chain keys.
pub(crate) const RID_LENGTH: usize = 32;
