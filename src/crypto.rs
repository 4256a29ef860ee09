// src/crypto.rs
use crate::types::ValidatorAddress;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use signature::{Signer, Verifier};

fn signing_key(seed: &[u8]) -> Option<SigningKey> {
    let seed: &[u8; 32] = seed.try_into().ok()?;
    Some(SigningKey::from_bytes(seed))
}

/// Check an ed25519 signature. Malformed keys or signatures never verify.
pub fn verify_bytes(pubkey: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    let (Ok(pubkey), Ok(sig)) = (<&[u8; 32]>::try_from(pubkey), <&[u8; 64]>::try_from(sig)) else {
        return false;
    };
    VerifyingKey::from_bytes(pubkey)
        .map(|vk| vk.verify(msg, &Signature::from_bytes(sig)).is_ok())
        .unwrap_or(false)
}

/// Sign `msg` with a 32-byte seed; `None` if the seed has the wrong length.
pub fn sign_bytes(seed: &[u8], msg: &[u8]) -> Option<Vec<u8>> {
    let sig: Signature = signing_key(seed)?.sign(msg);
    Some(sig.to_bytes().to_vec())
}

pub fn public_from_seed(seed: &[u8]) -> Option<Vec<u8>> {
    signing_key(seed).map(|sk| sk.verifying_key().to_bytes().to_vec())
}

/// Validator address: first 20 bytes of SHA-256(pubkey).
pub fn address_from_pubkey(pubkey: &[u8]) -> ValidatorAddress {
    let digest = Sha256::digest(pubkey);
    ValidatorAddress::new(digest[..20].to_vec())
}

#[derive(Serialize)]
struct CanonicalVoteExtension<'a> {
    chain_id: &'a str,
    height: i64,
    round: i64,
    #[serde(with = "hex::serde")]
    extension: &'a [u8],
}

/// Bytes a validator signs for its vote extension. Binding chain, height and
/// round prevents an extension from being replayed elsewhere.
pub fn extension_sign_bytes(chain_id: &str, height: i64, round: i32, extension: &[u8]) -> Vec<u8> {
    let canonical = CanonicalVoteExtension {
        chain_id,
        height,
        round: round as i64,
        extension,
    };
    // serializing plain fields into a Vec cannot fail
    serde_json::to_vec(&canonical).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let seed = [7u8; 32];
        let pubkey = public_from_seed(&seed).unwrap();
        let msg = extension_sign_bytes("chain", 10, 0, b"ext");

        let sig = sign_bytes(&seed, &msg).unwrap();
        assert!(verify_bytes(&pubkey, &msg, &sig));

        let other = extension_sign_bytes("chain", 11, 0, b"ext");
        assert!(!verify_bytes(&pubkey, &other, &sig));
    }

    #[test]
    fn test_bad_lengths_fail() {
        assert!(sign_bytes(&[1u8; 31], b"m").is_none());
        assert!(public_from_seed(&[1u8; 33]).is_none());
        assert!(!verify_bytes(&[0u8; 32], b"m", &[0u8; 10]));
    }

    #[test]
    fn test_address_is_twenty_bytes() {
        let pubkey = public_from_seed(&[3u8; 32]).unwrap();
        let address = address_from_pubkey(&pubkey);
        assert_eq!(address.as_bytes().len(), 20);
        assert_eq!(address, address_from_pubkey(&pubkey));
    }
}
