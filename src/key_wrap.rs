//! AES key wrap (RFC 3394)
//!
//! New keys sent to the NIC security setup objects are wrapped under the
//! current key encryption key (Blue Book 4.4.7, `key_transfer`).

use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

#[rustfmt::skip]
const DEFAULT_IV: [u8; 8] = [0xA6, 0xA6, 0xA6, 0xA6, 0xA6, 0xA6, 0xA6, 0xA6];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyWrapError {
    #[error("key data must be a non-empty multiple of 8 bytes, got {0}")]
    InvalidLength(usize),
    #[error("integrity check failed while unwrapping")]
    IntegrityCheck,
}

/// Wrap `key_data` under `kek`. The output is 8 bytes longer than the input.
pub fn wrap(kek: &[u8; 16], key_data: &[u8]) -> Result<Vec<u8>, KeyWrapError> {
    if key_data.len() < 16 || key_data.len() % 8 != 0 {
        return Err(KeyWrapError::InvalidLength(key_data.len()));
    }

    let cipher = Aes128::new(kek.into());
    let n = key_data.len() / 8;
    let mut a = DEFAULT_IV;
    let mut r: Vec<[u8; 8]> = key_data
        .chunks_exact(8)
        .map(|chunk| {
            let mut block = [0u8; 8];
            block.copy_from_slice(chunk);
            block
        })
        .collect();

    for j in 0..6 {
        for (i, ri) in r.iter_mut().enumerate() {
            let mut block = GenericArray::clone_from_slice(&[a, *ri].concat());
            cipher.encrypt_block(&mut block);

            let t = (n * j + i + 1) as u64;
            a.copy_from_slice(&block[..8]);
            for (byte, t_byte) in a.iter_mut().zip(t.to_be_bytes()) {
                *byte ^= t_byte;
            }
            ri.copy_from_slice(&block[8..]);
        }
    }

    let mut wrapped = Vec::with_capacity(8 * (n + 1));
    wrapped.extend_from_slice(&a);
    for ri in &r {
        wrapped.extend_from_slice(ri);
    }
    Ok(wrapped)
}

/// Inverse of [`wrap`], checking the default integrity value.
pub fn unwrap(kek: &[u8; 16], wrapped: &[u8]) -> Result<Vec<u8>, KeyWrapError> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(KeyWrapError::InvalidLength(wrapped.len()));
    }

    let cipher = Aes128::new(kek.into());
    let n = wrapped.len() / 8 - 1;
    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped[..8]);
    let mut r: Vec<[u8; 8]> = wrapped[8..]
        .chunks_exact(8)
        .map(|chunk| {
            let mut block = [0u8; 8];
            block.copy_from_slice(chunk);
            block
        })
        .collect();

    for j in (0..6).rev() {
        for i in (0..n).rev() {
            let t = (n * j + i + 1) as u64;
            for (byte, t_byte) in a.iter_mut().zip(t.to_be_bytes()) {
                *byte ^= t_byte;
            }

            let mut block = GenericArray::clone_from_slice(&[a, r[i]].concat());
            cipher.decrypt_block(&mut block);
            a.copy_from_slice(&block[..8]);
            r[i].copy_from_slice(&block[8..]);
        }
    }

    if a != DEFAULT_IV {
        return Err(KeyWrapError::IntegrityCheck);
    }
    Ok(r.concat())
}
