// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Schnorr proof of knowledge of a discrete log.
//!
//! The commitment can be produced ahead of time with [`SchnorrPrecommit`]
//! and opened rounds later: CMP key generation commits to `A = α·G` in round
//! one and broadcasts only the response in round four.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use zeroize::Zeroize;

use crate::{
    curve::{CurveTrait, ScalarTrait},
    errors::{Result, ValidationError},
    hash::SessionHash,
    keystore::StoreValue,
    zkp::challenge_scalar,
};

/// The prover's half-finished proof: the nonce `α` and its commitment
/// `A = α·G`.
#[derive(Clone, Serialize, Deserialize)]
pub struct SchnorrPrecommit<C: CurveTrait> {
    alpha: C::Scalar,
    commitment: C,
}

impl<C: CurveTrait> Debug for SchnorrPrecommit<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchnorrPrecommit")
            .field("alpha", &"[redacted]")
            .field("commitment", &self.commitment)
            .finish()
    }
}

impl<C: CurveTrait> Drop for SchnorrPrecommit<C> {
    fn drop(&mut self) {
        self.alpha.zeroize();
    }
}

impl<C: CurveTrait> SchnorrPrecommit<C> {
    /// Sample a nonce and its commitment.
    pub fn sample<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        let (alpha, commitment) = C::random_scalar_point_pair(rng);
        Self { alpha, commitment }
    }

    /// The commitment `A`.
    pub fn commitment(&self) -> &C {
        &self.commitment
    }

    /// Finish the proof for `secret` under the transcript's challenge.
    pub fn respond(
        &self,
        public: &C,
        secret: &C::Scalar,
        hash: &mut SessionHash,
    ) -> Result<SchnorrProof<C>> {
        let e = challenge::<C>(hash, public, &self.commitment)?;
        let response = self.alpha.add(&e.mul(secret));
        Ok(SchnorrProof {
            commitment: self.commitment,
            response,
        })
    }
}

impl<C: CurveTrait> StoreValue for SchnorrPrecommit<C> {
    const KIND: &'static str = "schnorr-precommit";

    fn encode(&self) -> Result<Vec<u8>> {
        serialize!(&self)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes)
    }
}

/// A finished Schnorr proof `(A, z)` with `z = α + e·x`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProof<C: CurveTrait> {
    commitment: C,
    response: C::Scalar,
}

impl<C: CurveTrait> SchnorrProof<C> {
    /// One-shot proof for `secret` with `public = secret·G`.
    pub fn prove<R: rand::RngCore + rand::CryptoRng>(
        rng: &mut R,
        public: &C,
        secret: &C::Scalar,
        hash: &mut SessionHash,
    ) -> Result<Self> {
        SchnorrPrecommit::<C>::sample(rng).respond(public, secret, hash)
    }

    /// Reassemble a proof from a commitment received earlier and a response
    /// received now.
    pub fn from_parts(commitment: C, response: C::Scalar) -> Self {
        Self {
            commitment,
            response,
        }
    }

    /// The commitment `A`.
    pub fn commitment(&self) -> &C {
        &self.commitment
    }

    /// The response `z`.
    pub fn response(&self) -> &C::Scalar {
        &self.response
    }

    /// Verify `z·G == A + e·X` under the transcript's challenge.
    pub fn verify(&self, public: &C, hash: &mut SessionHash) -> Result<()> {
        // A live proof's commitment must not be the identity.
        if self.commitment.is_identity() {
            return Err(
                ValidationError::unattributed("schnorr commitment is the identity").into(),
            );
        }
        if self.response.is_zero() {
            return Err(ValidationError::unattributed("schnorr response is zero").into());
        }
        let e = challenge::<C>(hash, public, &self.commitment)?;
        let lhs = C::generator_mul(&self.response);
        let rhs = self.commitment + public.mul(&e);
        if lhs != rhs {
            return Err(
                ValidationError::unattributed("schnorr proof verification failed").into(),
            );
        }
        Ok(())
    }
}

fn challenge<C: CurveTrait>(
    hash: &mut SessionHash,
    public: &C,
    commitment: &C,
) -> Result<C::Scalar> {
    hash.append(b"schnorr public", &public.to_bytes());
    hash.append(b"schnorr commitment", &commitment.to_bytes());
    challenge_scalar::<C>(hash, b"schnorr challenge")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ed25519::Ed25519, k256::K256, utils::testing::init_testing};

    fn transcript() -> SessionHash {
        SessionHash::new(b"pisch test")
    }

    fn honest_proof_verifies<C: CurveTrait>() {
        let mut rng = init_testing();
        let (secret, public) = C::random_scalar_point_pair(&mut rng);

        let proof =
            SchnorrProof::<C>::prove(&mut rng, &public, &secret, &mut transcript()).unwrap();
        assert!(proof.verify(&public, &mut transcript()).is_ok());

        // Serialization round-trips byte-identically and still verifies.
        let bytes = serialize!(&proof).unwrap();
        let back: SchnorrProof<C> = deserialize!(&bytes).unwrap();
        assert_eq!(bytes, serialize!(&back).unwrap());
        assert!(back.verify(&public, &mut transcript()).is_ok());
    }

    #[test]
    fn k256_honest_proof_verifies() {
        honest_proof_verifies::<K256>();
    }

    #[test]
    fn ed25519_honest_proof_verifies() {
        honest_proof_verifies::<Ed25519>();
    }

    #[test]
    fn precommit_flow_matches_one_shot() {
        let mut rng = init_testing();
        let (secret, public) = K256::random_scalar_point_pair(&mut rng);

        let precommit = SchnorrPrecommit::<K256>::sample(&mut rng);
        let commitment = *precommit.commitment();
        let proof = precommit
            .respond(&public, &secret, &mut transcript())
            .unwrap();
        assert_eq!(proof.commitment(), &commitment);

        // The response can travel alone and be reassembled by the verifier.
        let reassembled = SchnorrProof::from_parts(commitment, *proof.response());
        assert!(reassembled.verify(&public, &mut transcript()).is_ok());
    }

    #[test]
    fn wrong_statement_or_transcript_fails() {
        let mut rng = init_testing();
        let (secret, public) = K256::random_scalar_point_pair(&mut rng);
        let proof =
            SchnorrProof::<K256>::prove(&mut rng, &public, &secret, &mut transcript()).unwrap();

        let (_, other_public) = K256::random_scalar_point_pair(&mut rng);
        assert!(proof.verify(&other_public, &mut transcript()).is_err());

        let mut diverged = transcript();
        diverged.append(b"x", b"diverged");
        assert!(proof.verify(&public, &mut diverged).is_err());
    }

    #[test]
    fn identity_commitment_is_rejected() {
        let mut rng = init_testing();
        let (secret, public) = K256::random_scalar_point_pair(&mut rng);
        let proof = SchnorrProof::<K256>::from_parts(K256::identity(), secret);
        assert!(proof.verify(&public, &mut transcript()).is_err());
    }
}
