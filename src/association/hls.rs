//! High level security, mechanism 2 ("HIGH")
//!
//! 1. The client proposes a random challenge (CtoS) in the AARQ.
//! 2. The server answers with its own challenge (StoC) in the AARE.
//! 3. The client invokes `reply_to_HLS_authentication` on the association LN
//!    object with `f(StoC)`, the server returns `f(CtoS)`.
//!
//! `f` is AES-128-ECB keyed by the association secret, right padded with
//! zeroes to 16 bytes, over the challenge padded the same way.

use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};

use crate::ObisCode;
use crate::action::{ActionRequest, MethodDescriptor};
use crate::data::Data;

/// Current association, class 15 (association LN).
pub const CURRENT_ASSOCIATION: ObisCode = ObisCode::new(0, 0, 40, 0, 0, 255);
pub const ASSOCIATION_LN_CLASS_ID: u16 = 15;
pub const REPLY_TO_HLS_AUTHENTICATION: i8 = 1;

/// Length of the client-to-server challenge.
pub const CHALLENGE_LENGTH: usize = 16;

/// A fresh client-to-server challenge.
pub fn challenge() -> Result<Vec<u8>, getrandom::Error> {
    let mut challenge = vec![0u8; CHALLENGE_LENGTH];
    getrandom::getrandom(&mut challenge)?;
    Ok(challenge)
}

/// `f(challenge)` under `secret`.
pub fn process_challenge(secret: &[u8], challenge: &[u8]) -> Vec<u8> {
    let mut key = [0u8; 16];
    let len = secret.len().min(16);
    key[..len].copy_from_slice(&secret[..len]);
    let cipher = Aes128::new(&key.into());

    let mut data = challenge.to_vec();
    data.resize(challenge.len().div_ceil(16).max(1) * 16, 0);
    for block in data.chunks_exact_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    data
}

/// Whether `reply` is the server's proof for our `client_challenge`.
pub fn verify_server_reply(secret: &[u8], client_challenge: &[u8], reply: &[u8]) -> bool {
    process_challenge(secret, client_challenge) == reply
}

/// The ACTION carrying `f(StoC)` for the second leg of the association.
pub fn reply_request(invoke_id: u8, secret: &[u8], server_challenge: &[u8]) -> ActionRequest {
    ActionRequest {
        invoke_id,
        method: MethodDescriptor::new(
            ASSOCIATION_LN_CLASS_ID,
            CURRENT_ASSOCIATION,
            REPLY_TO_HLS_AUTHENTICATION,
        ),
        parameters: Some(Data::OctetString(process_challenge(secret, server_challenge))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_is_random() {
        let first = challenge().unwrap();
        let second = challenge().unwrap();

        assert_eq!(first.len(), CHALLENGE_LENGTH);
        assert_ne!(first, second);
    }

    #[test]
    fn test_process_challenge_fips_vector() {
        // FIPS-197 C.1 with a full length secret
        let secret = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F,
        ];
        let plaintext = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];

        assert_eq!(process_challenge(&secret, &plaintext), vec![
            0x69, 0xC4, 0xE0, 0xD8, 0x6A, 0x7B, 0x04, 0x30, 0xD8, 0xCD, 0xB7, 0x80, 0x70, 0xB4,
            0xC5, 0x5A
        ]);
    }

    #[test]
    fn test_short_secret_and_challenge_are_padded() {
        let mut padded_secret = [0u8; 16];
        padded_secret[..8].copy_from_slice(b"Secret12");

        let short = process_challenge(b"Secret12", b"P6wRJ21F");
        let padded = process_challenge(&padded_secret, b"P6wRJ21F\0\0\0\0\0\0\0\0");

        assert_eq!(short.len(), 16);
        assert_eq!(short, padded);
    }

    #[test]
    fn test_verify_server_reply() {
        let client_challenge = [0x42u8; 16];
        let reply = process_challenge(b"Secret12", &client_challenge);

        assert!(verify_server_reply(b"Secret12", &client_challenge, &reply));
        assert!(!verify_server_reply(b"Secret13", &client_challenge, &reply));
    }

    #[test]
    fn test_reply_request_targets_current_association() {
        let request = reply_request(0xC1, b"Secret12", b"P6wRJ21F");
        let encoded = request.encode();

        #[rustfmt::skip]
        let header = [
            0xC3, 0x01, 0xC1,
            0x00, 0x0F,
            0x00, 0x00, 0x28, 0x00, 0x00, 0xFF,
            0x01,
            0x01, 0x09, 0x10,
        ];
        assert_eq!(&encoded[..header.len()], &header[..]);
        assert_eq!(encoded.len(), header.len() + 16);
    }
}
