// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paillier encryption over `Z/N²Z` with `N = p·q`, `p ≡ q ≡ 3 (mod 4)` both
//! safe primes.
//!
//! Plaintexts are signed: any `m` with `|m| < N/2` embeds injectively, and
//! [`DecryptionKey::decrypt_signed`] recovers the centered representative.
//! This is what the multiplicative-to-additive conversion in signing relies
//! on.

use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    errors::{FatalError, Result, StoreError, ValidationError},
    keystore::StoreValue,
    parameters::PRIME_BITS,
    pool::Pool,
    utils::{sample_unit, write_prefixed, ByteReader},
};

/// Number of bits in a non-negative number.
pub(crate) fn bit_length(n: &BigNumber) -> usize {
    let bytes = n.to_bytes();
    match bytes.first() {
        None => 0,
        Some(first) => bytes.len() * 8 - first.leading_zeros() as usize,
    }
}

/// Check the public shape of a Paillier modulus: odd, composite-sized, with
/// the expected bit length.
pub(crate) fn validate_modulus(n: &BigNumber) -> Result<()> {
    if crate::utils::is_even(n) {
        return Err(ValidationError::unattributed("Paillier modulus is even").into());
    }
    let bits = bit_length(n);
    if bits < 2 * PRIME_BITS - 1 || bits > 2 * PRIME_BITS {
        return Err(ValidationError::unattributed(format!(
            "Paillier modulus has {bits} bits, expected about {}",
            2 * PRIME_BITS
        ))
        .into());
    }
    Ok(())
}

/// A Paillier ciphertext in `[1, N²)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(BigNumber);

/// The encryption randomness of a ciphertext, an element of `Z*_N`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Nonce(BigNumber);

impl Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Nonce([redacted])")
    }
}

impl Nonce {
    pub(crate) fn as_bn(&self) -> &BigNumber {
        &self.0
    }

    pub(crate) fn from_bn(nonce: BigNumber) -> Self {
        Self(nonce)
    }
}

/// Paillier public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    n: BigNumber,
}

impl EncryptionKey {
    /// The modulus `N`.
    pub fn modulus(&self) -> &BigNumber {
        &self.n
    }

    pub(crate) fn modulus_squared(&self) -> BigNumber {
        &self.n * &self.n
    }

    /// Encrypt a signed plaintext with fresh randomness, returning the
    /// ciphertext and the nonce.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        m: &BigNumber,
    ) -> Result<(Ciphertext, Nonce)> {
        let nonce = Nonce(sample_unit(rng, &self.n)?);
        let ciphertext = self.encrypt_with_nonce(m, &nonce)?;
        Ok((ciphertext, nonce))
    }

    /// Encrypt a signed plaintext under a caller-chosen nonce.
    pub fn encrypt_with_nonce(&self, m: &BigNumber, nonce: &Nonce) -> Result<Ciphertext> {
        let half_n = self.n.clone() >> 1;
        if !crate::utils::within_symmetric(m, &half_n) {
            error!("Paillier encryption failed, plaintext out of range");
            Err(FatalError::InternalInvariantFailed)?;
        }
        let nn = self.modulus_squared();
        // (1 + N)^m = 1 + m·N (mod N²)
        let g_to_m = (BigNumber::one() + m.nmod(&self.n) * &self.n).nmod(&nn);
        let blind = nonce.0.modpow(&self.n, &nn);
        Ok(Ciphertext(g_to_m.modmul(&blind, &nn)))
    }

    /// Homomorphic addition of plaintexts.
    pub fn add(&self, c1: &Ciphertext, c2: &Ciphertext) -> Ciphertext {
        let nn = self.modulus_squared();
        Ciphertext(c1.0.modmul(&c2.0, &nn))
    }

    /// Homomorphic multiplication of the plaintext by a (possibly negative)
    /// scalar.
    pub fn mul_scalar(&self, c: &Ciphertext, k: &BigNumber) -> Result<Ciphertext> {
        let nn = self.modulus_squared();
        if k >= &BigNumber::zero() {
            Ok(Ciphertext(c.0.modpow(k, &nn)))
        } else {
            let inverse = c
                .0
                .invert(&nn)
                .ok_or(FatalError::InternalInvariantFailed)?;
            Ok(Ciphertext(inverse.modpow(&-k.clone(), &nn)))
        }
    }

    /// True iff the ciphertext is well-formed for this key: in range and
    /// invertible mod `N²`.
    pub fn validate_ciphertext(&self, c: &Ciphertext) -> bool {
        let nn = self.modulus_squared();
        c.0 > BigNumber::zero() && c.0 < nn && c.0.gcd(&self.n) == BigNumber::one()
    }
}

/// Paillier secret key, holding the safe-prime factors of `N`.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey {
    p: BigNumber,
    q: BigNumber,
    n: BigNumber,
    phi: BigNumber,
    phi_inv: BigNumber,
}

impl Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("p", &"[redacted]")
            .field("q", &"[redacted]")
            .field("n", &self.n)
            .finish()
    }
}

impl Drop for DecryptionKey {
    fn drop(&mut self) {
        self.p.zeroize();
        self.q.zeroize();
        self.phi.zeroize();
        self.phi_inv.zeroize();
    }
}

impl DecryptionKey {
    /// Assemble a key from its prime factors, revalidating their shape:
    /// distinct safe primes of the expected size, both `≡ 3 (mod 4)`.
    pub fn from_primes(p: BigNumber, q: BigNumber) -> Result<Self> {
        for prime in [&p, &q] {
            if bit_length(prime) != PRIME_BITS {
                Err(FatalError::BadInput("prime has wrong bit length".into()))?;
            }
            // Safe primes greater than 3 are always ≡ 3 (mod 4); check both
            // properties anyway since the factors may come from storage.
            let low = prime.to_bytes().last().copied().unwrap_or(0);
            if low % 4 != 3 {
                Err(FatalError::BadInput("prime is not 3 mod 4".into()))?;
            }
            if !prime.is_prime() {
                Err(FatalError::BadInput("factor is not prime".into()))?;
            }
            let sophie_germain = (prime - 1) >> 1;
            if !sophie_germain.is_prime() {
                Err(FatalError::BadInput("factor is not a safe prime".into()))?;
            }
        }
        if p == q {
            Err(FatalError::BadInput("prime factors are equal".into()))?;
        }

        let n = &p * &q;
        let phi = (&p - 1) * (&q - 1);
        let phi_inv = phi
            .invert(&n)
            .ok_or(FatalError::InternalInvariantFailed)?;
        Ok(Self {
            p,
            q,
            n,
            phi,
            phi_inv,
        })
    }

    /// Sample a fresh key. The two safe primes are generated through the
    /// worker pool.
    #[allow(unused_variables)]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, pool: &Pool) -> Result<Self> {
        #[cfg(test)]
        {
            let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(rng, pool)?;
            Self::from_primes(p, q)
        }
        #[cfg(not(test))]
        {
            let primes = pool.parallelize(2, |_| BigNumber::safe_prime(PRIME_BITS));
            let mut iter = primes.into_iter();
            let p = iter.next().ok_or(FatalError::InternalInvariantFailed)?;
            let q = iter.next().ok_or(FatalError::InternalInvariantFailed)?;
            Self::from_primes(p, q)
        }
    }

    /// The corresponding public key.
    pub fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey { n: self.n.clone() }
    }

    /// The secret prime factors `(p, q)`.
    pub(crate) fn primes(&self) -> (&BigNumber, &BigNumber) {
        (&self.p, &self.q)
    }

    /// Euler's totient of the modulus.
    pub(crate) fn totient(&self) -> &BigNumber {
        &self.phi
    }

    /// Decrypt to the representative in `[0, N)`.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigNumber> {
        if !self.encryption_key().validate_ciphertext(c) {
            error!("Paillier decryption failed, ciphertext out of range");
            Err(ValidationError::unattributed("malformed ciphertext"))?;
        }
        let nn = &self.n * &self.n;
        let u = c.0.modpow(&self.phi, &nn);
        let ell = (u - BigNumber::one()) / &self.n;
        Ok(ell.modmul(&self.phi_inv, &self.n))
    }

    /// Decrypt to the centered representative in `(-N/2, N/2]`.
    pub fn decrypt_signed(&self, c: &Ciphertext) -> Result<BigNumber> {
        let m = self.decrypt(c)?;
        let half_n = self.n.clone() >> 1;
        Ok(if m > half_n { m - &self.n } else { m })
    }

    /// Decrypt and also recover the encryption randomness.
    pub fn decrypt_with_randomness(&self, c: &Ciphertext) -> Result<(BigNumber, Nonce)> {
        let m = self.decrypt_signed(c)?;
        let nn = &self.n * &self.n;

        // Strip the plaintext factor, leaving r^N mod N².
        let g_to_m = (BigNumber::one() + m.nmod(&self.n) * &self.n).nmod(&nn);
        let g_inv = g_to_m
            .invert(&nn)
            .ok_or(FatalError::InternalInvariantFailed)?;
        let r_to_n = c.0.modmul(&g_inv, &nn).nmod(&self.n);

        // N is invertible mod φ(N), so an N-th root mod N exists.
        let n_inv = self
            .n
            .invert(&self.phi)
            .ok_or(FatalError::InternalInvariantFailed)?;
        let r = r_to_n.modpow(&n_inv, &self.n);
        Ok((m, Nonce(r)))
    }
}

/// A party's Paillier key material as held by the key manager: public for
/// peers, public plus secret for ourselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaillierKeyPair {
    encryption_key: EncryptionKey,
    decryption_key: Option<DecryptionKey>,
}

impl PaillierKeyPair {
    /// A full key pair.
    pub fn new(decryption_key: DecryptionKey) -> Self {
        Self {
            encryption_key: decryption_key.encryption_key(),
            decryption_key: Some(decryption_key),
        }
    }

    /// A public-only entry for a peer's key.
    pub fn public_only(encryption_key: EncryptionKey) -> Self {
        Self {
            encryption_key,
            decryption_key: None,
        }
    }

    /// The public key.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// The secret key; fails for public-only entries.
    pub fn decryption_key(&self) -> Result<&DecryptionKey> {
        self.decryption_key
            .as_ref()
            .ok_or_else(|| StoreError::MissingEntry.into())
    }

    /// A public-only copy.
    pub fn to_public(&self) -> Self {
        Self::public_only(self.encryption_key.clone())
    }

    /// Length-prefixed encoding: scheme name, modulus, optional `(p, q)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_prefixed(&mut buf, b"paillier");
        write_prefixed(&mut buf, &self.encryption_key.n.to_bytes());
        if let Some(dk) = &self.decryption_key {
            write_prefixed(&mut buf, &dk.p.to_bytes());
            write_prefixed(&mut buf, &dk.q.to_bytes());
        }
        buf
    }

    /// Decode the length-prefixed encoding, revalidating key shape.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        if reader.field()? != b"paillier" {
            Err(crate::errors::ContentError::Deserialization)?;
        }
        let n = BigNumber::from_slice(reader.field()?);
        validate_modulus(&n)?;

        if reader.is_empty() {
            return Ok(Self::public_only(EncryptionKey { n }));
        }

        let p = BigNumber::from_slice(reader.field()?);
        let q = BigNumber::from_slice(reader.field()?);
        reader.expect_empty()?;

        let dk = DecryptionKey::from_primes(p, q)?;
        if dk.n != n {
            Err(FatalError::BadInput("modulus does not match factors".into()))?;
        }
        Ok(Self::new(dk))
    }
}

impl StoreValue for PaillierKeyPair {
    const KIND: &'static str = "paillier-key";

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.to_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

/// Safe-prime sourcing for tests.
///
/// Generating fresh 512-bit safe primes for every participant of every test
/// would dominate the suite's runtime, so tests draw from a process-wide pool
/// that is filled once, in parallel, on first use. The pool hands out
/// adjacent disjoint pairs; primes may repeat across sessions, which is
/// harmless in tests and totally insecure anywhere else.
#[cfg(test)]
pub(crate) mod prime_gen {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        OnceLock,
    };

    const POOL_SIZE: usize = 10;

    static POOL: OnceLock<Vec<BigNumber>> = OnceLock::new();
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    pub(crate) fn get_prime_pair_from_pool_insecure<R: RngCore + CryptoRng>(
        _rng: &mut R,
        pool: &Pool,
    ) -> Result<(BigNumber, BigNumber)> {
        let primes =
            POOL.get_or_init(|| pool.parallelize(POOL_SIZE, |_| BigNumber::safe_prime(PRIME_BITS)));
        let index = NEXT.fetch_add(2, Ordering::Relaxed);
        let p = primes[index % POOL_SIZE].clone();
        let q = primes[(index + 1) % POOL_SIZE].clone();
        Ok((p, q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    pub(crate) fn test_key() -> DecryptionKey {
        let mut rng = init_testing();
        DecryptionKey::generate(&mut rng, &Pool::global()).unwrap()
    }

    #[test]
    fn encryption_round_trips() {
        let mut rng = init_testing();
        let dk = test_key();
        let pk = dk.encryption_key();

        for m in [
            BigNumber::zero(),
            BigNumber::one(),
            -BigNumber::one(),
            crate::k256::k256_order() - 1,
            -(crate::k256::k256_order() - 1),
        ] {
            let (c, _) = pk.encrypt(&mut rng, &m).unwrap();
            assert!(pk.validate_ciphertext(&c));
            assert_eq!(dk.decrypt_signed(&c).unwrap(), m);
        }
    }

    #[test]
    fn randomness_is_recoverable() {
        let mut rng = init_testing();
        let dk = test_key();
        let pk = dk.encryption_key();

        let m = BigNumber::from_slice([42u8]);
        let (c, nonce) = pk.encrypt(&mut rng, &m).unwrap();
        let (decrypted, recovered) = dk.decrypt_with_randomness(&c).unwrap();
        assert_eq!(decrypted, m);
        assert_eq!(recovered.as_bn(), nonce.as_bn());

        // Re-encrypting under the recovered nonce reproduces the ciphertext.
        let again = pk.encrypt_with_nonce(&m, &recovered).unwrap();
        assert_eq!(again, c);
    }

    #[test]
    fn homomorphic_operations() {
        let mut rng = init_testing();
        let dk = test_key();
        let pk = dk.encryption_key();

        let (c1, _) = pk.encrypt(&mut rng, &BigNumber::from_slice([100u8])).unwrap();
        let (c2, _) = pk.encrypt(&mut rng, &BigNumber::from_slice([23u8])).unwrap();

        let sum = pk.add(&c1, &c2);
        assert_eq!(dk.decrypt_signed(&sum).unwrap(), BigNumber::from_slice([123u8]));

        let scaled = pk.mul_scalar(&c1, &BigNumber::from_slice([3u8])).unwrap();
        assert_eq!(
            dk.decrypt_signed(&scaled).unwrap(),
            BigNumber::from_slice([0x01u8, 0x2c])
        );

        let negated = pk
            .mul_scalar(&c2, &-BigNumber::from_slice([2u8]))
            .unwrap();
        assert_eq!(
            dk.decrypt_signed(&negated).unwrap(),
            -BigNumber::from_slice([46u8])
        );
    }

    #[test]
    fn malformed_ciphertexts_are_rejected() {
        let dk = test_key();
        let pk = dk.encryption_key();
        let nn = pk.modulus_squared();

        assert!(!pk.validate_ciphertext(&Ciphertext(BigNumber::zero())));
        assert!(!pk.validate_ciphertext(&Ciphertext(nn)));
        // A multiple of N shares a factor with N².
        assert!(!pk.validate_ciphertext(&Ciphertext(pk.modulus().clone())));
    }

    #[test]
    fn key_pair_encoding_round_trips() {
        let dk = test_key();
        let pair = PaillierKeyPair::new(dk);

        let bytes = pair.to_bytes();
        let back = PaillierKeyPair::from_bytes(&bytes).unwrap();
        assert_eq!(pair, back);
        assert_eq!(bytes, back.to_bytes());

        let public = pair.to_public();
        let bytes = public.to_bytes();
        let back = PaillierKeyPair::from_bytes(&bytes).unwrap();
        assert!(back.decryption_key().is_err());
        assert_eq!(back.encryption_key(), pair.encryption_key());
    }

    #[test]
    fn modulus_shape_is_checked() {
        // Too small
        assert!(validate_modulus(&BigNumber::from_slice([15u8])).is_err());
        // Even
        let dk = test_key();
        let even = dk.encryption_key().modulus() + 1;
        assert!(validate_modulus(&even).is_err());
        // Valid
        assert!(validate_modulus(dk.encryption_key().modulus()).is_ok());
    }
}
