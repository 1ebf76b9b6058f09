// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The FROST threshold Schnorr protocol family[^cite]: VSS-based key
//! generation and two-nonce commitment signing, instantiated over
//! edwards25519 to produce standard Ed25519 signatures.
//!
//! [^cite]: Chelsea Komlo and Ian Goldberg. FROST: Flexible Round-Optimized
//! Schnorr Threshold Signatures. [EPrint archive,
//! 2020](https://eprint.iacr.org/2020/852.pdf).

mod config;
pub mod keygen;
pub mod sign;

pub use config::Config;
pub use sign::Signature;
