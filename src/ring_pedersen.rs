// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Ring-Pedersen commitment parameters `(N, s, t)`.
//!
//! Generated over a party's own Paillier modulus: `s = r² mod N` for random
//! invertible `r`, and `t = s^λ mod N` for secret `λ`. The `Π[prm]` proof
//! shows the discrete-log relation between `s` and `t`; peers use the
//! parameters as the commitment aux of the range proofs.

use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use zeroize::Zeroize;

use crate::{
    errors::{FatalError, Result, StoreError, ValidationError},
    keystore::StoreValue,
    paillier::DecryptionKey,
    utils::{sample_below, sample_unit, write_prefixed, ByteReader},
};

/// Public ring-Pedersen parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingPedersen {
    n: BigNumber,
    s: BigNumber,
    t: BigNumber,
}

impl RingPedersen {
    /// The modulus the commitments live in.
    pub fn modulus(&self) -> &BigNumber {
        &self.n
    }

    /// The commitment base `s`.
    pub fn s(&self) -> &BigNumber {
        &self.s
    }

    /// The second base `t = s^λ`.
    pub fn t(&self) -> &BigNumber {
        &self.t
    }

    /// Check parameter shape: odd modulus, both bases invertible non-trivial
    /// residues, and distinct.
    pub fn validate(&self) -> Result<()> {
        if crate::utils::is_even(&self.n) || self.n <= BigNumber::one() {
            return Err(ValidationError::unattributed("Pedersen modulus is not odd").into());
        }
        for base in [&self.s, &self.t] {
            if base <= &BigNumber::one() || base >= &self.n {
                return Err(ValidationError::unattributed("Pedersen base out of range").into());
            }
            if base.gcd(&self.n) != BigNumber::one() {
                return Err(ValidationError::unattributed("Pedersen base not invertible").into());
            }
        }
        if self.s == self.t {
            return Err(ValidationError::unattributed("Pedersen bases are equal").into());
        }
        Ok(())
    }

    /// The commitment `s^x · t^y mod N`. Exponents may be negative.
    pub(crate) fn commit(&self, x: &BigNumber, y: &BigNumber) -> BigNumber {
        let sx = self.s.modpow(x, &self.n);
        let ty = self.t.modpow(y, &self.n);
        sx.modmul(&ty, &self.n)
    }

    /// `base^x · t^y mod N` for an arbitrary base, used by the factoring
    /// proof.
    pub(crate) fn commit_with_base(
        &self,
        base: &BigNumber,
        x: &BigNumber,
        y: &BigNumber,
    ) -> BigNumber {
        let bx = base.modpow(x, &self.n);
        let ty = self.t.modpow(y, &self.n);
        bx.modmul(&ty, &self.n)
    }
}

/// The secret exponent behind a party's own parameters, kept for proving
/// `Π[prm]`.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct RingPedersenSecret {
    lambda: BigNumber,
    totient: BigNumber,
}

impl Debug for RingPedersenSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RingPedersenSecret([redacted])")
    }
}

impl Drop for RingPedersenSecret {
    fn drop(&mut self) {
        self.lambda.zeroize();
        self.totient.zeroize();
    }
}

impl RingPedersenSecret {
    pub(crate) fn lambda(&self) -> &BigNumber {
        &self.lambda
    }

    pub(crate) fn totient(&self) -> &BigNumber {
        &self.totient
    }
}

/// A party's Pedersen parameters as held by the key manager: public for
/// peers, public plus `λ` for ourselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PedersenKeyPair {
    params: RingPedersen,
    secret: Option<RingPedersenSecret>,
}

impl PedersenKeyPair {
    /// Generate parameters over the modulus of `paillier_key`.
    pub fn generate<R: RngCore + CryptoRng>(
        rng: &mut R,
        paillier_key: &DecryptionKey,
    ) -> Result<Self> {
        let n = paillier_key.encryption_key().modulus().clone();
        let totient = paillier_key.totient().clone();

        let lambda = sample_below(rng, &totient);
        let r = sample_unit(rng, &n)?;
        let s = r.modmul(&r, &n);
        let t = s.modpow(&lambda, &n);

        let params = RingPedersen { n, s, t };
        params.validate()?;
        Ok(Self {
            params,
            secret: Some(RingPedersenSecret { lambda, totient }),
        })
    }

    /// A public-only entry for a peer's parameters.
    pub fn public_only(params: RingPedersen) -> Self {
        Self {
            params,
            secret: None,
        }
    }

    /// The public parameters.
    pub fn params(&self) -> &RingPedersen {
        &self.params
    }

    /// The proving secret; fails for public-only entries.
    pub(crate) fn secret(&self) -> Result<&RingPedersenSecret> {
        self.secret
            .as_ref()
            .ok_or_else(|| StoreError::MissingEntry.into())
    }

    /// A public-only copy.
    pub fn to_public(&self) -> Self {
        Self::public_only(self.params.clone())
    }

    /// Length-prefixed encoding: scheme name, `(N, s, t)`, optional
    /// `(λ, φ(N))`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_prefixed(&mut buf, b"ring-pedersen");
        write_prefixed(&mut buf, &self.params.n.to_bytes());
        write_prefixed(&mut buf, &self.params.s.to_bytes());
        write_prefixed(&mut buf, &self.params.t.to_bytes());
        if let Some(secret) = &self.secret {
            write_prefixed(&mut buf, &secret.lambda.to_bytes());
            write_prefixed(&mut buf, &secret.totient.to_bytes());
        }
        buf
    }

    /// Decode the length-prefixed encoding, revalidating parameter shape.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        if reader.field()? != b"ring-pedersen" {
            Err(crate::errors::ContentError::Deserialization)?;
        }
        let n = BigNumber::from_slice(reader.field()?);
        let s = BigNumber::from_slice(reader.field()?);
        let t = BigNumber::from_slice(reader.field()?);
        let params = RingPedersen { n, s, t };
        params.validate()?;

        if reader.is_empty() {
            return Ok(Self::public_only(params));
        }

        let lambda = BigNumber::from_slice(reader.field()?);
        let totient = BigNumber::from_slice(reader.field()?);
        reader.expect_empty()?;

        // The stored relation must still hold.
        if params.s.modpow(&lambda, &params.n) != params.t {
            Err(FatalError::BadInput("Pedersen secret does not match bases".into()))?;
        }
        Ok(Self {
            params,
            secret: Some(RingPedersenSecret { lambda, totient }),
        })
    }
}

impl StoreValue for PedersenKeyPair {
    const KIND: &'static str = "pedersen-params";

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.to_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pool::Pool, utils::testing::init_testing};

    pub(crate) fn test_pair() -> (DecryptionKey, PedersenKeyPair) {
        let mut rng = init_testing();
        let dk = DecryptionKey::generate(&mut rng, &Pool::global()).unwrap();
        let pedersen = PedersenKeyPair::generate(&mut rng, &dk).unwrap();
        (dk, pedersen)
    }

    #[test]
    fn generated_parameters_validate() {
        let (dk, pair) = test_pair();
        assert!(pair.params().validate().is_ok());
        assert_eq!(pair.params().modulus(), dk.encryption_key().modulus());

        // t really is s^λ.
        let secret = pair.secret().unwrap();
        assert_eq!(
            pair.params()
                .s()
                .modpow(secret.lambda(), pair.params().modulus()),
            *pair.params().t()
        );
    }

    #[test]
    fn commitments_are_homomorphic() {
        let mut rng = init_testing();
        let (_, pair) = test_pair();
        let params = pair.params();

        let x1 = crate::utils::sample_symmetric_bits(&mut rng, 128);
        let y1 = crate::utils::sample_symmetric_bits(&mut rng, 128);
        let x2 = crate::utils::sample_symmetric_bits(&mut rng, 128);
        let y2 = crate::utils::sample_symmetric_bits(&mut rng, 128);

        let lhs = params
            .commit(&x1, &y1)
            .modmul(&params.commit(&x2, &y2), params.modulus());
        let rhs = params.commit(&(&x1 + &x2), &(&y1 + &y2));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn encoding_round_trips() {
        let (_, pair) = test_pair();
        let bytes = pair.to_bytes();
        let back = PedersenKeyPair::from_bytes(&bytes).unwrap();
        assert_eq!(pair, back);
        assert_eq!(bytes, back.to_bytes());

        let public = pair.to_public();
        let back = PedersenKeyPair::from_bytes(&public.to_bytes()).unwrap();
        assert!(back.secret().is_err());
        assert_eq!(back.params(), pair.params());
    }

    #[test]
    fn degenerate_parameters_are_rejected() {
        let (_, pair) = test_pair();
        let n = pair.params().modulus().clone();

        let bad = RingPedersen {
            n: n.clone(),
            s: BigNumber::one(),
            t: pair.params().t().clone(),
        };
        assert!(bad.validate().is_err());

        let bad = RingPedersen {
            n: n.clone(),
            s: pair.params().s().clone(),
            t: pair.params().s().clone(),
        };
        assert!(bad.validate().is_err());
    }
}
