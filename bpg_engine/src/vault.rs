//! At-rest encryption for gateway merchant secrets.
//!
//! Secrets are encrypted with AES-128-CBC. The cipher key is derived from the process-wide server secret
//! (`HMAC-SHA256(nonce, server_secret)`, truncated to 16 bytes), and the IV from the highest gateway id
//! concatenated with the server secret. The IV is therefore deterministic per deployment rather than
//! per-record; it is embedded in the stored record (`<iv hex>:<base64 ciphertext>`) and decryption always
//! reads it back from there, so moving to random per-record IVs later would not change the record contract.
//!
//! Every encryption is immediately verified by decrypting its own output and comparing byte-for-byte with
//! the input. A mismatch aborts the operation: a record that cannot round-trip must never be persisted.

use bpg_common::Secret;
use log::error;
use thiserror::Error;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Fixed HMAC key for key/IV derivation. Changing this invalidates every stored secret record.
const VAULT_NONCE: &[u8] = b"bpg.secret-vault.v1";

#[derive(Debug, Clone, Error)]
pub enum VaultError {
    #[error("Cipher initialization failed. {0}")]
    CipherInit(String),
    #[error("Encrypted secret failed its round-trip self-verification; the record was discarded")]
    SelfCheckFailed,
    #[error("Malformed secret record. {0}")]
    MalformedRecord(String),
}

pub struct SecretVault {
    key: [u8; 16],
    server_secret: Secret<String>,
}

impl SecretVault {
    pub fn new(server_secret: Secret<String>) -> Self {
        let key = derive16(server_secret.reveal().as_bytes());
        Self { key, server_secret }
    }

    /// Encrypt a merchant secret for at-rest storage, returning the `ivHex:base64Ciphertext` record.
    ///
    /// `max_gateway_id` is the highest gateway id at the time of encryption and feeds the IV derivation.
    /// The returned record has already survived a decrypt-and-compare self check; on failure no record is
    /// produced and the caller must not persist anything.
    pub fn encrypt(&self, plaintext: &str, max_gateway_id: i64) -> Result<String, VaultError> {
        let iv = derive16(format!("{max_gateway_id}{}", self.server_secret.reveal()).as_bytes());
        let record = encrypt_raw(&self.key, &iv, plaintext)?;
        verify_round_trip(&self.key, &record, plaintext)?;
        Ok(record)
    }

    /// Decrypt a stored secret record. Any structural defect (missing delimiter, bad hex/base64, invalid
    /// padding) is data corruption and is never retried.
    pub fn decrypt(&self, record: &str) -> Result<String, VaultError> {
        decrypt_raw(&self.key, record)
    }
}

fn derive16(msg: &[u8]) -> [u8; 16] {
    let mut mac = HmacSha256::new_from_slice(VAULT_NONCE).expect("HMAC accepts keys of any length");
    mac.update(msg);
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

fn encrypt_raw(key: &[u8; 16], iv: &[u8; 16], plaintext: &str) -> Result<String, VaultError> {
    let cipher = Aes128CbcEnc::new_from_slices(key, iv).map_err(|e| VaultError::CipherInit(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(format!("{}:{}", hex::encode(iv), base64::encode(ciphertext)))
}

fn decrypt_raw(key: &[u8; 16], record: &str) -> Result<String, VaultError> {
    let (iv_hex, ct_b64) = record
        .split_once(':')
        .ok_or_else(|| VaultError::MalformedRecord("missing ':' delimiter".to_string()))?;
    let iv = hex::decode(iv_hex).map_err(|e| VaultError::MalformedRecord(format!("bad IV hex: {e}")))?;
    if iv.len() != 16 {
        return Err(VaultError::MalformedRecord(format!("IV is {} bytes, expected 16", iv.len())));
    }
    let ciphertext =
        base64::decode(ct_b64).map_err(|e| VaultError::MalformedRecord(format!("bad base64 ciphertext: {e}")))?;
    let cipher = Aes128CbcDec::new_from_slices(key, &iv).map_err(|e| VaultError::CipherInit(e.to_string()))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| VaultError::MalformedRecord("invalid ciphertext padding".to_string()))?;
    String::from_utf8(plaintext).map_err(|e| VaultError::MalformedRecord(format!("secret is not UTF-8: {e}")))
}

/// Decrypt `record` and compare against the original input. Called on every encryption before the record
/// is released; a mismatch means a cipher/key defect and the record must be discarded.
fn verify_round_trip(key: &[u8; 16], record: &str, plaintext: &str) -> Result<(), VaultError> {
    match decrypt_raw(key, record) {
        Ok(check) if check == plaintext => Ok(()),
        Ok(_) => {
            error!("🔒️ Secret self-verification mismatch: decrypted output differs from input");
            Err(VaultError::SelfCheckFailed)
        },
        Err(e) => {
            error!("🔒️ Secret self-verification could not decrypt its own record: {e}");
            Err(VaultError::SelfCheckFailed)
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::RngCore;

    fn vault() -> SecretVault {
        SecretVault::new(Secret::new("a-process-wide-server-secret".to_string()))
    }

    #[test]
    fn round_trips() {
        let v = vault();
        let mut random = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut random);
        let random = hex::encode(random);
        for plaintext in ["", random.as_str(), "merchant-秘密-ключ-🔑"] {
            let record = v.encrypt(plaintext, 42).unwrap();
            assert_eq!(v.decrypt(&record).unwrap(), plaintext);
        }
    }

    #[test]
    fn record_format_is_iv_hex_then_base64() {
        let v = vault();
        let record = v.encrypt("hunter2", 7).unwrap();
        let (iv_hex, ct_b64) = record.split_once(':').unwrap();
        assert_eq!(hex::decode(iv_hex).unwrap().len(), 16);
        assert!(!base64::decode(ct_b64).unwrap().is_empty());
    }

    #[test]
    fn iv_is_deterministic_per_deployment() {
        let v = vault();
        let a = v.encrypt("s3cret", 42).unwrap();
        let b = v.encrypt("s3cret", 42).unwrap();
        assert_eq!(a, b);
        // a different max gateway id shifts the IV
        let c = v.encrypt("s3cret", 43).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn malformed_records_are_data_corruption() {
        let v = vault();
        for record in ["no-delimiter", "zzzz:AAAA", "00ff:!!!not-base64!!!", "00ff:AAAA"] {
            assert!(matches!(v.decrypt(record), Err(VaultError::MalformedRecord(_))));
        }
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let v = vault();
        let record = v.encrypt("hunter2", 1).unwrap();
        let other = SecretVault::new(Secret::new("a-different-server-secret".to_string()));
        // Either the padding check rejects the garbage outright, or the "plaintext" is noise.
        assert!(other.decrypt(&record).map(|p| p != "hunter2").unwrap_or(true));
    }

    #[test]
    fn key_mismatch_fails_self_verification() {
        // Simulate a cipher/key defect: the record was produced with one key but verification runs with
        // another. The check must fail, so encrypt() would never release the record.
        let key_a = derive16(b"key material a");
        let key_b = derive16(b"key material b");
        let iv = derive16(b"iv material");
        let record = encrypt_raw(&key_a, &iv, "do not persist me").unwrap();
        assert!(matches!(
            verify_round_trip(&key_b, &record, "do not persist me"),
            Err(VaultError::SelfCheckFailed)
        ));
        // and the happy path passes
        verify_round_trip(&key_a, &record, "do not persist me").unwrap();
    }
}
