//! Ciphered xDLMS APDUs (security suite 0, AES-128-GCM)
//!
//! Two envelope shapes carry ciphered content:
//!
//! ```text
//! service-specific (glo-get-request, glo-set-response, glo-initiate-request, ...)
//!   tag | length | SC | IC (4) | information
//!
//! general-glo-ciphering (0xDB) / general-ded-ciphering (0xDC)
//!   tag | 0x08 | system title (8) | length | SC | IC (4) | information
//! ```
//!
//! The information field depends on the security control byte:
//!
//! | SC   | information                    | authenticated data        |
//! |------|--------------------------------|---------------------------|
//! | 0x10 | plaintext + GMAC tag (12)      | SC + AK + plaintext       |
//! | 0x20 | ciphertext                     | none                      |
//! | 0x30 | ciphertext + tag (12)          | SC + AK                   |
//!
//! The IV is the sender's system title followed by the big-endian invocation counter.
//!
//! Reference: DLMS Green Book Ed. 12, Section 9.2.7.2

use aes::Aes128;
use aes_gcm::AesGcm;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use nom::{
    IResult, Parser,
    bytes::streaming::take,
    multi::fill,
    number::streaming::{be_u32, u8},
};

use crate::data::{encode_length, parse_length};
use crate::{ByteBuffer, Security, SecurityControl};

/// AES-128-GCM with a 96 bit IV and the 12 byte tag used by suite 0.
type Aes128Gcm12 = AesGcm<Aes128, U12, U12>;

pub const TAG_LENGTH: usize = 12;

pub const GENERAL_GLO_CIPHERING: u8 = 0xDB;
pub const GENERAL_DED_CIPHERING: u8 = 0xDC;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("no {0} configured for the requested security")]
    MissingKey(&'static str),
    #[error("ciphered information shorter than the authentication tag")]
    Truncated,
    #[error("authentication tag mismatch")]
    TagMismatch,
    #[error("unexpected security control byte {0:#04x}")]
    UnsupportedSecurity(u8),
}

/// Keys used to protect or open one APDU.
#[derive(Clone, Copy)]
pub struct CipherKeys<'a> {
    pub block_cipher_key: Option<&'a [u8; 16]>,
    pub authentication_key: Option<&'a [u8; 16]>,
}

impl CipherKeys<'_> {
    fn cipher(&self) -> Result<Aes128Gcm12, CipherError> {
        let key = self.block_cipher_key.ok_or(CipherError::MissingKey("block cipher key"))?;
        Ok(Aes128Gcm12::new(key.into()))
    }

    fn authentication_key(&self) -> Result<&[u8; 16], CipherError> {
        self.authentication_key.ok_or(CipherError::MissingKey("authentication key"))
    }
}

fn initialization_vector(system_title: &[u8; 8], invocation_counter: u32) -> [u8; 12] {
    let mut iv = [0u8; 12];
    iv[..8].copy_from_slice(system_title);
    iv[8..].copy_from_slice(&invocation_counter.to_be_bytes());
    iv
}

/// Protect `plaintext`, returning the information field (ciphertext and/or tag).
pub fn protect(
    security_control: SecurityControl,
    system_title: &[u8; 8],
    invocation_counter: u32,
    keys: CipherKeys<'_>,
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let iv = initialization_vector(system_title, invocation_counter);
    let cipher = keys.cipher()?;
    let sc = security_control.byte();

    match security_control.security() {
        Security::None => Err(CipherError::UnsupportedSecurity(sc)),
        Security::Authentication => {
            let mut aad = Vec::with_capacity(17 + plaintext.len());
            aad.push_u8(sc);
            aad.push_bytes(keys.authentication_key()?);
            aad.push_bytes(plaintext);

            let tag = cipher
                .encrypt_in_place_detached(&iv.into(), &aad, &mut [])
                .map_err(|_| CipherError::TagMismatch)?;

            let mut information = plaintext.to_vec();
            information.push_bytes(&tag);
            Ok(information)
        }
        Security::Encryption => {
            let mut information = plaintext.to_vec();
            cipher
                .encrypt_in_place_detached(&iv.into(), &[], &mut information)
                .map_err(|_| CipherError::TagMismatch)?;
            Ok(information)
        }
        Security::AuthenticationEncryption => {
            let mut aad = [0u8; 17];
            aad[0] = sc;
            aad[1..].copy_from_slice(keys.authentication_key()?);

            let mut information = plaintext.to_vec();
            let tag = cipher
                .encrypt_in_place_detached(&iv.into(), &aad, &mut information)
                .map_err(|_| CipherError::TagMismatch)?;
            information.push_bytes(&tag);
            Ok(information)
        }
    }
}

/// Open an information field protected with [`protect`], verifying the tag when present.
pub fn unprotect(
    security_control: SecurityControl,
    system_title: &[u8; 8],
    invocation_counter: u32,
    keys: CipherKeys<'_>,
    information: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let iv = initialization_vector(system_title, invocation_counter);
    let cipher = keys.cipher()?;
    let sc = security_control.byte();

    match security_control.security() {
        Security::None => Err(CipherError::UnsupportedSecurity(sc)),
        Security::Authentication => {
            let split = information.len().checked_sub(TAG_LENGTH).ok_or(CipherError::Truncated)?;
            let (plaintext, tag) = information.split_at(split);

            let mut aad = Vec::with_capacity(17 + plaintext.len());
            aad.push_u8(sc);
            aad.push_bytes(keys.authentication_key()?);
            aad.push_bytes(plaintext);

            cipher
                .decrypt_in_place_detached(&iv.into(), &aad, &mut [], tag.into())
                .map_err(|_| CipherError::TagMismatch)?;
            Ok(plaintext.to_vec())
        }
        Security::Encryption => {
            // Without a tag GCM decryption is the same CTR keystream as encryption.
            let mut plaintext = information.to_vec();
            cipher
                .encrypt_in_place_detached(&iv.into(), &[], &mut plaintext)
                .map_err(|_| CipherError::TagMismatch)?;
            Ok(plaintext)
        }
        Security::AuthenticationEncryption => {
            let split = information.len().checked_sub(TAG_LENGTH).ok_or(CipherError::Truncated)?;
            let (ciphertext, tag) = information.split_at(split);

            let mut aad = [0u8; 17];
            aad[0] = sc;
            aad[1..].copy_from_slice(keys.authentication_key()?);

            let mut plaintext = ciphertext.to_vec();
            cipher
                .decrypt_in_place_detached(&iv.into(), &aad, &mut plaintext, tag.into())
                .map_err(|_| CipherError::TagMismatch)?;
            Ok(plaintext)
        }
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Service-specific global ciphering tag for a plaintext APDU tag.
pub fn glo_tag_for(plain_tag: u8) -> Option<u8> {
    match plain_tag {
        0x01 => Some(0x21),
        0x08 => Some(0x28),
        0xC0..=0xC7 => Some(plain_tag + 8),
        _ => None,
    }
}

/// Plaintext APDU tag behind a service-specific glo or ded tag.
pub fn plain_tag_for(ciphered_tag: u8) -> Option<u8> {
    match ciphered_tag {
        0x21 => Some(0x01),
        0x28 => Some(0x08),
        0xC8..=0xCF => Some(ciphered_tag - 8),
        0xD0..=0xD7 => Some(ciphered_tag - 16),
        _ => None,
    }
}

/// Whether `tag` opens any ciphered envelope (glo, ded or general ciphering).
pub fn is_ciphered_tag(tag: u8) -> bool {
    plain_tag_for(tag).is_some() || tag == GENERAL_GLO_CIPHERING || tag == GENERAL_DED_CIPHERING
}

/// Dedicated-key variants (ded-get-request 0xD0 .. ded-action-response 0xD7, 0xDC).
pub fn is_dedicated_tag(tag: u8) -> bool {
    matches!(tag, 0xD0..=0xD7 | GENERAL_DED_CIPHERING)
}

// ============================================================================
// Envelope
// ============================================================================

/// A parsed ciphered envelope, not yet opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipheredApdu {
    pub tag: u8,
    /// Only carried by general-glo/ded-ciphering.
    pub system_title: Option<[u8; 8]>,
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    pub information: Vec<u8>,
}

impl CipheredApdu {
    /// Protect a plaintext APDU into its service-specific glo envelope.
    pub fn seal(
        plaintext_apdu: &[u8],
        security: Security,
        system_title: &[u8; 8],
        invocation_counter: u32,
        keys: CipherKeys<'_>,
    ) -> Result<Self, CipherError> {
        let plain_tag = plaintext_apdu.first().copied().unwrap_or_default();
        let tag = glo_tag_for(plain_tag).unwrap_or(GENERAL_GLO_CIPHERING);
        let security_control = security.control();
        let information =
            protect(security_control, system_title, invocation_counter, keys, plaintext_apdu)?;

        Ok(Self {
            tag,
            system_title: (tag == GENERAL_GLO_CIPHERING).then_some(*system_title),
            security_control,
            invocation_counter,
            information,
        })
    }

    /// Open the envelope. `sender_system_title` is used when the envelope does not carry one.
    pub fn open(
        &self,
        sender_system_title: &[u8; 8],
        keys: CipherKeys<'_>,
    ) -> Result<Vec<u8>, CipherError> {
        let system_title = self.system_title.as_ref().unwrap_or(sender_system_title);
        unprotect(
            self.security_control,
            system_title,
            self.invocation_counter,
            keys,
            &self.information,
        )
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        if !is_ciphered_tag(tag) {
            return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
        }

        let general = tag == GENERAL_GLO_CIPHERING || tag == GENERAL_DED_CIPHERING;
        let (input, system_title) = if general {
            let (input, title_len) = u8(input)?;
            if title_len != 8 {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::LengthValue,
                )));
            }
            let mut system_title = [0u8; 8];
            let (input, ()) = fill(u8, &mut system_title).parse(input)?;
            (input, Some(system_title))
        } else {
            (input, None)
        };

        let (input, length) = parse_length(input)?;
        if length < 5 {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (input, security_control) = SecurityControl::parse(input)?;
        let (input, invocation_counter) = be_u32(input)?;
        let (input, information) = take(length - 5).parse(input)?;

        Ok((
            input,
            Self {
                tag,
                system_title,
                security_control,
                invocation_counter,
                information: information.to_vec(),
            },
        ))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.information.len() + 16);
        buf.push_u8(self.tag);
        if let Some(system_title) = &self.system_title {
            buf.push_u8(8);
            buf.push_bytes(system_title);
        }
        encode_length(&mut buf, self.information.len() + 5);
        buf.push_u8(self.security_control.byte());
        buf.push_u32(self.invocation_counter);
        buf.push_bytes(&self.information);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AK: [u8; 16] = [
        0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE,
        0xDF,
    ];
    const GUEK: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F,
    ];
    const SYSTEM_TITLE: [u8; 8] = *b"CLI12345";

    fn keys() -> CipherKeys<'static> {
        CipherKeys { block_cipher_key: Some(&GUEK), authentication_key: Some(&AK) }
    }

    #[test]
    fn test_green_book_authenticated_encryption_vector() {
        // Green Book Ed. 8, 9.2.7.2.4.6: glo-get-request, SC 0x30, IC 0x01234567
        let system_title = [0x4D, 0x4D, 0x4D, 0x00, 0x00, 0xBC, 0x61, 0x4E];
        #[rustfmt::skip]
        let plaintext = [
            0xC0, 0x01, 0x00,
            0x00, 0x08, 0x00, 0x00, 0x01, 0x00, 0x00, 0xFF, 0x02,
            0x00,
        ];

        let apdu = CipheredApdu::seal(
            &plaintext,
            Security::AuthenticationEncryption,
            &system_title,
            0x01234567,
            keys(),
        )
        .unwrap();

        #[rustfmt::skip]
        let expected = [
            0xC8, 0x1E, 0x30, 0x01, 0x23, 0x45, 0x67,
            0x41, 0x13, 0x12, 0xFF, 0x93, 0x5A, 0x47, 0x56, 0x68, 0x27, 0xC4, 0x67, 0xBC,
            0x7D, 0x82, 0x5C, 0x3B, 0xE4, 0xA7, 0x7C, 0x3F, 0xCC, 0x05, 0x6B, 0x6B,
        ];
        assert_eq!(apdu.encode(), expected.to_vec());
    }

    #[test]
    fn test_seal_then_open_each_security() {
        let plaintext = [0xC4, 0x01, 0xC1, 0x00, 0x09, 0x02, 0x31, 0x32];

        for security in [
            Security::Authentication,
            Security::Encryption,
            Security::AuthenticationEncryption,
        ] {
            let apdu = CipheredApdu::seal(&plaintext, security, &SYSTEM_TITLE, 7, keys()).unwrap();
            assert_eq!(apdu.tag, 0xCC);

            let encoded = apdu.encode();
            let (rest, parsed) = CipheredApdu::parse(&encoded).unwrap();
            assert!(rest.is_empty());
            assert_eq!(parsed.open(&SYSTEM_TITLE, keys()).unwrap(), plaintext.to_vec());
        }
    }

    #[test]
    fn test_authentication_only_keeps_plaintext_visible() {
        let plaintext = [0xC0, 0x01, 0xC1];
        let apdu =
            CipheredApdu::seal(&plaintext, Security::Authentication, &SYSTEM_TITLE, 1, keys())
                .unwrap();

        assert_eq!(&apdu.information[..3], &plaintext);
        assert_eq!(apdu.information.len(), 3 + TAG_LENGTH);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let plaintext = [0xC4, 0x01, 0xC1, 0x00, 0x00];
        let apdu = CipheredApdu::seal(
            &plaintext,
            Security::AuthenticationEncryption,
            &SYSTEM_TITLE,
            3,
            keys(),
        )
        .unwrap();

        let wrong = [0x55u8; 16];
        let result =
            apdu.open(&SYSTEM_TITLE, CipherKeys { block_cipher_key: Some(&wrong), ..keys() });
        assert_eq!(result, Err(CipherError::TagMismatch));
    }

    #[test]
    fn test_open_with_wrong_counter_fails() {
        let plaintext = [0xC4, 0x01, 0xC1, 0x00, 0x00];
        let mut apdu = CipheredApdu::seal(
            &plaintext,
            Security::AuthenticationEncryption,
            &SYSTEM_TITLE,
            3,
            keys(),
        )
        .unwrap();
        apdu.invocation_counter = 4;

        assert!(apdu.open(&SYSTEM_TITLE, keys()).is_err());
    }

    #[test]
    fn test_data_notification_uses_general_glo_ciphering() {
        let plaintext = [0x0F, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        let apdu = CipheredApdu::seal(
            &plaintext,
            Security::AuthenticationEncryption,
            &SYSTEM_TITLE,
            9,
            keys(),
        )
        .unwrap();
        let encoded = apdu.encode();

        assert_eq!(encoded[0], GENERAL_GLO_CIPHERING);
        assert_eq!(encoded[1], 0x08);
        assert_eq!(&encoded[2..10], b"CLI12345");

        let (_, parsed) = CipheredApdu::parse(&encoded).unwrap();
        // The envelope's own system title wins over the one supplied.
        assert_eq!(parsed.open(&[0u8; 8], keys()).unwrap(), plaintext.to_vec());
    }

    #[test]
    fn test_missing_authentication_key() {
        let only_guek = CipherKeys { block_cipher_key: Some(&GUEK), authentication_key: None };
        let result = protect(
            Security::AuthenticationEncryption.control(),
            &SYSTEM_TITLE,
            1,
            only_guek,
            &[0xC0],
        );

        assert_eq!(result, Err(CipherError::MissingKey("authentication key")));
    }

    #[test]
    fn test_tag_mapping() {
        assert_eq!(glo_tag_for(0xC0), Some(0xC8));
        assert_eq!(glo_tag_for(0xC3), Some(0xCB));
        assert_eq!(glo_tag_for(0x01), Some(0x21));
        assert_eq!(glo_tag_for(0x0F), None);
        assert_eq!(plain_tag_for(0xCF), Some(0xC7));
        assert_eq!(plain_tag_for(0xD4), Some(0xC4));
        assert_eq!(plain_tag_for(0x28), Some(0x08));
        assert!(is_ciphered_tag(0xDB));
        assert!(is_dedicated_tag(0xD5));
        assert!(!is_ciphered_tag(0xC4));
    }
}
