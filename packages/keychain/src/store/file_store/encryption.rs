//! AES-256-GCM sealing of secret item payloads

use crate::{KeychainError, Result};
use aes_gcm::{
    Aes256Gcm,
    aead::{Aead, KeyInit, Payload, generic_array::GenericArray},
};
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt `plaintext`, binding it to `aad`; output is nonce || ciphertext
pub(super) fn seal(plaintext: &[u8], master_key: &[u8; 32], aad: &[u8]) -> Result<Vec<u8>> {
    use rand::RngCore;

    let mut nonce = vec![0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| KeychainError::InvalidMasterKey(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(
            GenericArray::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| KeychainError::EncryptionFailed("item encryption failed".into()))?;

    let mut sealed = nonce;
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Reverse [`seal`]; fails if the key, `aad` or the bytes differ
pub(super) fn open(sealed: &[u8], master_key: &[u8; 32], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(KeychainError::DecryptionFailed(
            "sealed payload is truncated".into(),
        ));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| KeychainError::InvalidMasterKey(e.to_string()))?;
    let plaintext = cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            KeychainError::DecryptionFailed("wrong master key or corrupted item".into())
        })?;
    Ok(Zeroizing::new(plaintext))
}
