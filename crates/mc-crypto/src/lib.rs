//! Crypto primitives for the login protocol.
//!
//! The handshake works like the Notchian server's: a 1024-bit RSA keypair
//! whose public half travels in the encryption request as X.509
//! SubjectPublicKeyInfo DER, an RSA-decrypted 16-byte shared secret, and an
//! AES-128/CFB8 stream pair keyed with key = IV = that secret. The session
//! hash is Minecraft's signed SHA-1 hex digest.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use num_bigint::BigInt;
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use thiserror::Error;

pub mod session;

pub use session::{GameProfile, ProfileProperty, has_joined};

/// An AES-128 CFB-8 encryptor.
pub type Aes128Cfb8Enc = cfb8::Encryptor<aes::Aes128>;
/// An AES-128 CFB-8 decryptor.
pub type Aes128Cfb8Dec = cfb8::Decryptor<aes::Aes128>;

pub const RSA_KEY_BITS: usize = 1024;
pub const SHARED_SECRET_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("key encoding error: {0}")]
    Der(#[from] rsa::pkcs8::spki::Error),
    #[error("shared secret must be 16 bytes, got {0}")]
    InvalidSharedSecret(usize),
    #[error("session server error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session server rejected the session (status {0})")]
    SessionRejected(u16),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// RSA padding used for the encryption-response decrypt.
///
/// Modern launchers negotiate OAEP/SHA-1; historical Notchian clients
/// encrypt with PKCS#1 v1.5. Configurable rather than guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsaPadding {
    #[default]
    OaepSha1,
    Pkcs1V15,
}

/// The server's RSA keypair plus the DER form of its public half.
#[derive(Debug, Clone)]
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public_der: Vec<u8>,
}

impl ServerKeyPair {
    /// Generates a fresh 1024-bit keypair, public exponent 65537.
    pub fn generate() -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)?;
        let public_der = encode_public_key_der(&private.to_public_key())?;
        Ok(Self {
            private,
            public_der,
        })
    }

    /// X.509 SubjectPublicKeyInfo DER of the public key.
    #[must_use]
    pub fn public_der(&self) -> &[u8] {
        &self.public_der
    }

    #[must_use]
    pub fn public_key(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// Decrypts a ciphertext from the client with the configured padding.
    pub fn decrypt(&self, ciphertext: &[u8], padding: RsaPadding) -> Result<Vec<u8>> {
        let plain = match padding {
            RsaPadding::OaepSha1 => self.private.decrypt(Oaep::new::<Sha1>(), ciphertext)?,
            RsaPadding::Pkcs1V15 => self.private.decrypt(Pkcs1v15Encrypt, ciphertext)?,
        };
        Ok(plain)
    }
}

/// Encodes a public key as X.509 SubjectPublicKeyInfo DER.
pub fn encode_public_key_der(key: &RsaPublicKey) -> Result<Vec<u8>> {
    Ok(key.to_public_key_der()?.as_bytes().to_vec())
}

/// Decodes an X.509 SubjectPublicKeyInfo DER public key.
pub fn decode_public_key_der(der: &[u8]) -> Result<RsaPublicKey> {
    use rsa::pkcs8::DecodePublicKey;
    Ok(RsaPublicKey::from_public_key_der(der)?)
}

/// Encrypts with a public key - the client half of the exchange, kept for
/// symmetry and for exercising the server half.
pub fn encrypt_rsa(key: &RsaPublicKey, data: &[u8], padding: RsaPadding) -> Result<Vec<u8>> {
    let ciphertext = match padding {
        RsaPadding::OaepSha1 => key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), data)?,
        RsaPadding::Pkcs1V15 => key.encrypt(&mut OsRng, Pkcs1v15Encrypt, data)?,
    };
    Ok(ciphertext)
}

/// Builds the AES-128/CFB8 pair for a connection. Key and IV are both the
/// 16-byte shared secret.
pub fn gen_ciphers(shared_secret: &[u8]) -> Result<(Aes128Cfb8Enc, Aes128Cfb8Dec)> {
    if shared_secret.len() != SHARED_SECRET_LEN {
        return Err(CryptoError::InvalidSharedSecret(shared_secret.len()));
    }
    let encrypt = Aes128Cfb8Enc::new_from_slices(shared_secret, shared_secret)
        .map_err(|_| CryptoError::InvalidSharedSecret(shared_secret.len()))?;
    let decrypt = Aes128Cfb8Dec::new_from_slices(shared_secret, shared_secret)
        .map_err(|_| CryptoError::InvalidSharedSecret(shared_secret.len()))?;
    Ok((encrypt, decrypt))
}

/// Encrypts bytes in place. CFB8 has a one-byte block, so the stream can be
/// fed in arbitrary chunks.
pub fn encrypt_in_place(cipher: &mut Aes128Cfb8Enc, data: &mut [u8]) {
    for block in data.chunks_mut(1) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Decrypts bytes in place.
pub fn decrypt_in_place(cipher: &mut Aes128Cfb8Dec, data: &mut [u8]) {
    for block in data.chunks_mut(1) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Minecraft's session hash: SHA-1 over server id (ASCII), shared secret and
/// public-key DER, rendered as a signed big-endian hex integer - a leading
/// `-` for negative digests and no leading zeros.
#[must_use]
pub fn auth_hash(server_id: &str, shared_secret: &[u8], public_der: &[u8]) -> String {
    let mut sha = Sha1::new();
    sha.update(server_id.as_bytes());
    sha.update(shared_secret);
    sha.update(public_der);
    let digest = sha.finalize();
    BigInt::from_signed_bytes_be(&digest).to_str_radix(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The classic vectors: SHA-1 of just the name, signed-hex rendered.
    #[test]
    fn auth_hash_positive_digest() {
        assert_eq!(
            auth_hash("Notch", &[], &[]),
            "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48"
        );
    }

    #[test]
    fn auth_hash_negative_digest() {
        assert_eq!(
            auth_hash("jeb_", &[], &[]),
            "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1"
        );
    }

    #[test]
    fn auth_hash_strips_leading_zeros() {
        assert_eq!(
            auth_hash("simon", &[], &[]),
            "88e16a1019277b15d58faf0541e11910eb756f6"
        );
    }

    #[test]
    fn cipher_pair_round_trips() {
        let secret = [7u8; 16];
        let (mut enc, mut dec) = gen_ciphers(&secret).unwrap();
        let mut data = b"hello packet bytes".to_vec();
        encrypt_in_place(&mut enc, &mut data);
        assert_ne!(&data, b"hello packet bytes");
        decrypt_in_place(&mut dec, &mut data);
        assert_eq!(&data, b"hello packet bytes");
    }

    #[test]
    fn cipher_stream_is_chunking_independent() {
        let secret = [42u8; 16];
        let (mut enc_a, _) = gen_ciphers(&secret).unwrap();
        let (mut enc_b, _) = gen_ciphers(&secret).unwrap();

        let mut whole = b"0123456789abcdef0123".to_vec();
        encrypt_in_place(&mut enc_a, &mut whole);

        let mut split = b"0123456789abcdef0123".to_vec();
        let (head, tail) = split.split_at_mut(7);
        encrypt_in_place(&mut enc_b, head);
        encrypt_in_place(&mut enc_b, tail);

        assert_eq!(whole, split);
    }

    #[test]
    fn gen_ciphers_rejects_short_secret() {
        assert!(matches!(
            gen_ciphers(&[0u8; 8]),
            Err(CryptoError::InvalidSharedSecret(8))
        ));
    }

    #[test]
    fn keypair_decrypts_oaep_and_pkcs1v15() {
        let keypair = ServerKeyPair::generate().unwrap();
        // DER SEQUENCE header
        assert_eq!(keypair.public_der()[0], 0x30);

        let secret = [9u8; 16];
        let public = keypair.public_key();

        let oaep_ct = public
            .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &secret)
            .unwrap();
        assert_eq!(
            keypair.decrypt(&oaep_ct, RsaPadding::OaepSha1).unwrap(),
            secret
        );

        let v15_ct = public.encrypt(&mut OsRng, Pkcs1v15Encrypt, &secret).unwrap();
        assert_eq!(
            keypair.decrypt(&v15_ct, RsaPadding::Pkcs1V15).unwrap(),
            secret
        );
    }
}
