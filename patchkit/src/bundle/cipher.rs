//! Keystream cipher for encrypted bundles.
//!
//! The keystream is a chain of md5 blocks seeded by the bundle hash:
//! `k0 = md5(hash)`, `k(n+1) = md5(k(n))`. Encryption and decryption are the
//! same XOR.

use md5::{Digest, Md5};

/// XORs `data` in place with the keystream derived from `key`.
///
/// An empty key leaves the data untouched.
pub fn apply_keystream(data: &mut [u8], key: &str) {
    if key.is_empty() {
        return;
    }
    let mut block = [0u8; 16];
    block.copy_from_slice(&Md5::digest(key.as_bytes()));
    for chunk in data.chunks_mut(block.len()) {
        for (byte, k) in chunk.iter_mut().zip(block.iter()) {
            *byte ^= k;
        }
        let next = Md5::digest(block);
        block.copy_from_slice(&next);
    }
}

pub fn encrypt(mut data: Vec<u8>, key: &str) -> Vec<u8> {
    apply_keystream(&mut data, key);
    data
}

pub fn decrypt(mut data: Vec<u8>, key: &str) -> Vec<u8> {
    apply_keystream(&mut data, key);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrypt_inverts_encrypt() {
        let plain = b"assets/ui/hud.prefab and some longer payload bytes".to_vec();
        let cipher = encrypt(plain.clone(), "bundle-hash-01");
        assert_ne!(cipher, plain);
        assert_eq!(decrypt(cipher, "bundle-hash-01"), plain);
    }

    #[test]
    fn test_wrong_key_does_not_decrypt() {
        let plain = b"payload".to_vec();
        let cipher = encrypt(plain.clone(), "a");
        assert_ne!(decrypt(cipher, "b"), plain);
    }

    #[test]
    fn test_empty_key_is_identity() {
        let plain = b"payload".to_vec();
        assert_eq!(encrypt(plain.clone(), ""), plain);
    }

    #[test]
    fn test_random_payload_survives() {
        let plain: Vec<u8> = (0..257).map(|_| rand::random::<u8>()).collect();
        assert_eq!(decrypt(encrypt(plain.clone(), "k"), "k"), plain);
    }
}
