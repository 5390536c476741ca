//! Cryptographic primitives adapter
//!
//! Thin, allocation-friendly wrappers over the curve and AEAD crates so the
//! rest of the SDK can speak in terms of key types and byte slices:
//! - [`generate_keypair`], [`sign`], [`verify`] for the DID verification suites
//! - [`key_exchange`] (X25519) + [`derive_key`] (HKDF-SHA256) for session keys
//! - [`aead_encrypt`] / [`aead_decrypt`] (AES-256-GCM)
//!
//! Signature encodings:
//! - secp256k1 and secp256r1 signatures are emitted as fixed-length `R||S`
//!   (two 32-byte big-endian scalars); verification also accepts DER. The
//!   scheme is ECDSA-with-SHA256 over the input, and secp256r1 pre-hashes the
//!   input once more (double-SHA) to match the reference wallet-style scheme.
//! - Ed25519 signatures are the raw 64 bytes; Ed25519 hashes internally.

use aes_gcm::{
    aead::{Aead, Payload},
    Aes256Gcm, KeyInit, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// AES-GCM nonce length in bytes, prepended to every ciphertext.
pub const AEAD_NONCE_LEN: usize = 12;

/// Supported key algorithms, matching the DID verification-method suites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Secp256k1,
    Secp256r1,
    Ed25519,
    X25519,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Secp256k1 => "secp256k1",
            KeyType::Secp256r1 => "secp256r1",
            KeyType::Ed25519 => "ed25519",
            KeyType::X25519 => "x25519",
        }
    }
}

/// A freshly generated key pair. The secret is the raw 32-byte scalar or
/// seed; the public key is compressed SEC1 for the ECDSA curves and the raw
/// 32 bytes for the Edwards/Montgomery ones.
#[derive(Clone)]
pub struct KeyPair {
    pub key_type: KeyType,
    pub secret: Vec<u8>,
    pub public: Vec<u8>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the secret never reaches logs
        f.debug_struct("KeyPair")
            .field("key_type", &self.key_type)
            .field("public", &hex::encode(&self.public))
            .finish_non_exhaustive()
    }
}

/// Possible errors from the primitives adapter.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("malformed {0} key: {1}")]
    MalformedKey(&'static str, String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("AEAD failure: {0}")]
    Aead(String),
}

fn rand_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Generates a fresh key pair of the given type.
pub fn generate_keypair(key_type: KeyType) -> Result<KeyPair, CryptoError> {
    match key_type {
        KeyType::Secp256k1 => loop {
            let seed = rand_bytes::<32>();
            if let Ok(sk) = k256::ecdsa::SigningKey::from_slice(&seed) {
                return Ok(KeyPair {
                    key_type,
                    secret: seed.to_vec(),
                    public: sk.verifying_key().to_encoded_point(true).as_bytes().to_vec(),
                });
            }
            // out-of-range scalar, retry with a fresh seed
        },
        KeyType::Secp256r1 => loop {
            let seed = rand_bytes::<32>();
            if let Ok(sk) = p256::ecdsa::SigningKey::from_slice(&seed) {
                return Ok(KeyPair {
                    key_type,
                    secret: seed.to_vec(),
                    public: sk.verifying_key().to_encoded_point(true).as_bytes().to_vec(),
                });
            }
        },
        KeyType::Ed25519 => {
            let seed = rand_bytes::<32>();
            let sk = ed25519_dalek::SigningKey::from_bytes(&seed);
            Ok(KeyPair {
                key_type,
                secret: seed.to_vec(),
                public: sk.verifying_key().to_bytes().to_vec(),
            })
        }
        KeyType::X25519 => {
            let seed = rand_bytes::<32>();
            let sk = x25519_dalek::StaticSecret::from(seed);
            let pk = x25519_dalek::PublicKey::from(&sk);
            Ok(KeyPair {
                key_type,
                secret: seed.to_vec(),
                public: pk.to_bytes().to_vec(),
            })
        }
    }
}

fn secret_array(key_type: &'static str, secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    secret
        .try_into()
        .map_err(|_| CryptoError::MalformedKey(key_type, format!("{} bytes", secret.len())))
}

/// Signs a message with the given private key.
///
/// See the module docs for the per-type hashing and encoding contract.
pub fn sign(key_type: KeyType, secret: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key_type {
        KeyType::Secp256k1 => {
            use k256::ecdsa::signature::Signer;
            let sk = k256::ecdsa::SigningKey::from_slice(secret)
                .map_err(|err| CryptoError::MalformedKey("secp256k1", err.to_string()))?;
            let sig: k256::ecdsa::Signature = sk
                .try_sign(message)
                .map_err(|err| CryptoError::SigningFailed(err.to_string()))?;
            Ok(sig.to_bytes().to_vec())
        }
        KeyType::Secp256r1 => {
            use p256::ecdsa::signature::DigestSigner;
            let sk = p256::ecdsa::SigningKey::from_slice(secret)
                .map_err(|err| CryptoError::MalformedKey("secp256r1", err.to_string()))?;
            let digest = Sha256::new_with_prefix(Sha256::digest(message));
            let sig: p256::ecdsa::Signature = sk
                .try_sign_digest(digest)
                .map_err(|err| CryptoError::SigningFailed(err.to_string()))?;
            Ok(sig.to_bytes().to_vec())
        }
        KeyType::Ed25519 => {
            use ed25519_dalek::Signer;
            let sk = ed25519_dalek::SigningKey::from_bytes(&secret_array("ed25519", secret)?);
            Ok(sk.sign(message).to_bytes().to_vec())
        }
        KeyType::X25519 => Err(CryptoError::UnsupportedAlgorithm(
            "x25519 is a key-agreement key and cannot sign".to_string(),
        )),
    }
}

/// Verifies a signature against a public key.
///
/// Returns `Ok(false)` on a mismatch; malformed keys or signatures are errors.
pub fn verify(
    key_type: KeyType,
    public: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    match key_type {
        KeyType::Secp256k1 => {
            use k256::ecdsa::signature::Verifier;
            let vk = k256::ecdsa::VerifyingKey::from_sec1_bytes(public)
                .map_err(|err| CryptoError::MalformedKey("secp256k1", err.to_string()))?;
            let sig = k256::ecdsa::Signature::from_slice(signature)
                .or_else(|_| k256::ecdsa::Signature::from_der(signature))
                .map_err(|err| CryptoError::MalformedSignature(err.to_string()))?;
            Ok(vk.verify(message, &sig).is_ok())
        }
        KeyType::Secp256r1 => {
            use p256::ecdsa::signature::DigestVerifier;
            let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(public)
                .map_err(|err| CryptoError::MalformedKey("secp256r1", err.to_string()))?;
            let sig = p256::ecdsa::Signature::from_slice(signature)
                .or_else(|_| p256::ecdsa::Signature::from_der(signature))
                .map_err(|err| CryptoError::MalformedSignature(err.to_string()))?;
            let digest = Sha256::new_with_prefix(Sha256::digest(message));
            Ok(vk.verify_digest(digest, &sig).is_ok())
        }
        KeyType::Ed25519 => {
            use ed25519_dalek::Verifier;
            let public: [u8; 32] = public
                .try_into()
                .map_err(|_| CryptoError::MalformedKey("ed25519", format!("{} bytes", public.len())))?;
            let vk = ed25519_dalek::VerifyingKey::from_bytes(&public)
                .map_err(|err| CryptoError::MalformedKey("ed25519", err.to_string()))?;
            let sig = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|err| CryptoError::MalformedSignature(err.to_string()))?;
            Ok(vk.verify(message, &sig).is_ok())
        }
        KeyType::X25519 => Err(CryptoError::UnsupportedAlgorithm(
            "x25519 is a key-agreement key and cannot verify".to_string(),
        )),
    }
}

/// Expands a SEC1 public key to its uncompressed form (`0x04 || X || Y`),
/// the shape JWK coordinates are sliced from.
pub fn sec1_uncompressed(key_type: KeyType, public: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key_type {
        KeyType::Secp256k1 => {
            let vk = k256::ecdsa::VerifyingKey::from_sec1_bytes(public)
                .map_err(|err| CryptoError::MalformedKey("secp256k1", err.to_string()))?;
            Ok(vk.to_encoded_point(false).as_bytes().to_vec())
        }
        KeyType::Secp256r1 => {
            let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(public)
                .map_err(|err| CryptoError::MalformedKey("secp256r1", err.to_string()))?;
            Ok(vk.to_encoded_point(false).as_bytes().to_vec())
        }
        _ => Err(CryptoError::UnsupportedAlgorithm(format!(
            "{} has no SEC1 encoding",
            key_type.as_str()
        ))),
    }
}

/// X25519 Diffie-Hellman key exchange.
pub fn key_exchange(local_secret: &[u8], remote_public: &[u8]) -> Result<[u8; 32], CryptoError> {
    let sk = x25519_dalek::StaticSecret::from(secret_array("x25519", local_secret)?);
    let pk = x25519_dalek::PublicKey::from(secret_array("x25519", remote_public)?);
    Ok(sk.diffie_hellman(&pk).to_bytes())
}

/// Derives a 256-bit symmetric key from a shared secret with HKDF-SHA256.
pub fn derive_key(shared_secret: &[u8], salt: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut okm = [0u8; 32];
    hk.expand(b"anp-session-key", &mut okm)
        .map_err(|err| CryptoError::Aead(err.to_string()))?;
    Ok(okm)
}

/// AES-256-GCM encryption. The random 12-byte nonce is prepended to the
/// returned ciphertext.
pub fn aead_encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|err| CryptoError::MalformedKey("aes-256-gcm", err.to_string()))?;
    let nonce = rand_bytes::<AEAD_NONCE_LEN>();
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|err| CryptoError::Aead(err.to_string()))?;
    let mut out = Vec::with_capacity(AEAD_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// AES-256-GCM decryption of a nonce-prefixed ciphertext.
pub fn aead_decrypt(key: &[u8], data: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < AEAD_NONCE_LEN {
        return Err(CryptoError::Aead("ciphertext too short".to_string()));
    }
    let (nonce, ciphertext) = data.split_at(AEAD_NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|err| CryptoError::MalformedKey("aes-256-gcm", err.to_string()))?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|err| CryptoError::Aead(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNING_TYPES: [KeyType; 3] = [KeyType::Secp256k1, KeyType::Secp256r1, KeyType::Ed25519];

    #[test]
    fn sign_verify_roundtrip() {
        let msg = b"hello anp";
        for kt in SIGNING_TYPES {
            let kp = generate_keypair(kt).unwrap();
            let sig = sign(kt, &kp.secret, msg).unwrap();
            assert_eq!(sig.len(), 64, "{kt:?} emits fixed-length signatures");
            assert!(verify(kt, &kp.public, msg, &sig).unwrap(), "{kt:?}");
        }
    }

    #[test]
    fn signature_is_bit_sensitive() {
        let msg = b"hello anp".to_vec();
        for kt in SIGNING_TYPES {
            let kp = generate_keypair(kt).unwrap();
            let sig = sign(kt, &kp.secret, &msg).unwrap();

            let mut flipped_msg = msg.clone();
            flipped_msg[0] ^= 0x01;
            assert!(!verify(kt, &kp.public, &flipped_msg, &sig).unwrap());

            let mut flipped_sig = sig.clone();
            flipped_sig[10] ^= 0x80;
            // a flipped signature either fails to verify or fails to parse
            match verify(kt, &kp.public, &msg, &flipped_sig) {
                Ok(valid) => assert!(!valid),
                Err(CryptoError::MalformedSignature(_)) => {}
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
    }

    #[test]
    fn x25519_cannot_sign() {
        let kp = generate_keypair(KeyType::X25519).unwrap();
        assert!(matches!(
            sign(KeyType::X25519, &kp.secret, b"x"),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn exchange_and_seal() {
        let a = generate_keypair(KeyType::X25519).unwrap();
        let b = generate_keypair(KeyType::X25519).unwrap();

        let shared_a = key_exchange(&a.secret, &b.public).unwrap();
        let shared_b = key_exchange(&b.secret, &a.public).unwrap();
        assert_eq!(shared_a, shared_b);

        let key = derive_key(&shared_a, b"salt").unwrap();
        let sealed = aead_encrypt(&key, b"negotiated payload", b"frame").unwrap();
        let opened = aead_decrypt(&key, &sealed, b"frame").unwrap();
        assert_eq!(opened, b"negotiated payload");

        assert!(aead_decrypt(&key, &sealed, b"other-aad").is_err());
        let other_key = derive_key(&shared_a, b"other-salt").unwrap();
        assert!(aead_decrypt(&other_key, &sealed, b"frame").is_err());
    }

    #[test]
    fn malformed_keys_are_errors() {
        assert!(matches!(
            verify(KeyType::Secp256k1, &[1, 2, 3], b"m", &[0u8; 64]),
            Err(CryptoError::MalformedKey(_, _))
        ));
        assert!(matches!(
            sign(KeyType::Ed25519, &[0u8; 7], b"m"),
            Err(CryptoError::MalformedKey(_, _))
        ));
    }

    #[test]
    fn ecdsa_verify_accepts_der() {
        let kp = generate_keypair(KeyType::Secp256k1).unwrap();
        let sig = sign(KeyType::Secp256k1, &kp.secret, b"payload").unwrap();
        let parsed = k256::ecdsa::Signature::from_slice(&sig).unwrap();
        let der = parsed.to_der();
        assert!(verify(KeyType::Secp256k1, &kp.public, b"payload", der.as_bytes()).unwrap());
    }
}
