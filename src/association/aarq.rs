//! AARQ APDU (A-Associate Request)
//!
//! ```text
//! 60 len
//!   A1 09 06 07 <application context name>
//!   A6 0A 04 08 <calling AP title>              ciphered contexts only
//!   8A 02 07 80                                 sender ACSE requirements, if authenticated
//!   8B 07 <mechanism name>                      if authenticated
//!   AC len 80 len <calling authentication value>
//!   BE len 04 len <InitiateRequest | glo-initiate-request>
//! ```
//!
//! Reference: DLMS Green Book Ed. 12, Section 11.3 and Table 136-137

use nom::{IResult, Parser};

use super::ber::{
    TagType, encode_application, encode_context_specific, encode_object_identifier,
    encode_octet_string, parse_elements, parse_tagged,
};
use super::{AARQ_TAG, ApplicationContextName, Authentication};

/// The authentication functional unit bit of `sender-acse-requirements`.
const ACSE_REQUIREMENTS_AUTHENTICATION: [u8; 2] = [0x07, 0x80];

#[derive(Debug, Clone, PartialEq)]
pub struct AarqApdu {
    pub application_context_name: ApplicationContextName,
    /// Client system title, sent when the context uses ciphering.
    pub calling_ap_title: Option<[u8; 8]>,
    pub authentication: Authentication,
    /// Password (LLS) or client-to-server challenge (HLS).
    pub calling_authentication_value: Option<Vec<u8>>,
    /// Encoded xDLMS APDU, either an InitiateRequest or its glo-ciphered form.
    pub user_information: Vec<u8>,
}

impl AarqApdu {
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();

        let context = encode_object_identifier(self.application_context_name.oid_bytes());
        content.extend(encode_context_specific(1, TagType::Constructed, &context));

        if let Some(title) = &self.calling_ap_title {
            content.extend(encode_context_specific(
                6,
                TagType::Constructed,
                &encode_octet_string(title),
            ));
        }

        if self.authentication != Authentication::None {
            content.extend(encode_context_specific(
                10,
                TagType::Primitive,
                &ACSE_REQUIREMENTS_AUTHENTICATION,
            ));
            content.extend(encode_context_specific(
                11,
                TagType::Primitive,
                &self.authentication.mechanism_oid(),
            ));
            if let Some(value) = &self.calling_authentication_value {
                // GraphicString choice [0]
                let value = encode_context_specific(0, TagType::Primitive, value);
                content.extend(encode_context_specific(12, TagType::Constructed, &value));
            }
        }

        content.extend(encode_context_specific(
            30,
            TagType::Constructed,
            &encode_octet_string(&self.user_information),
        ));

        encode_application(AARQ_TAG & 0x1F, TagType::Constructed, &content)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, content) = parse_tagged(AARQ_TAG)(input)?;
        let (_, elements) = parse_elements(content)?;

        let mut application_context_name = None;
        let mut calling_ap_title = None;
        let mut authentication = Authentication::None;
        let mut calling_authentication_value = None;
        let mut user_information = Vec::new();

        for (tag, value) in elements {
            match tag {
                0xA1 => {
                    let (_, oid) = parse_tagged(0x06)(value)?;
                    application_context_name = ApplicationContextName::from_oid_bytes(oid);
                }
                0xA6 => {
                    let (_, title) = parse_tagged(0x04)(value)?;
                    calling_ap_title = <[u8; 8]>::try_from(title).ok();
                }
                0x8B => {
                    authentication =
                        Authentication::from_mechanism_oid(value).unwrap_or(Authentication::None);
                }
                0xAC => {
                    let (_, secret) = parse_tagged(0x80)(value)?;
                    calling_authentication_value = Some(secret.to_vec());
                }
                0xBE => {
                    let (_, info) = parse_tagged(0x04)(value)?;
                    user_information = info.to_vec();
                }
                _ => {}
            }
        }

        let Some(application_context_name) = application_context_name else {
            return nom::combinator::fail().parse(input);
        };

        Ok((
            rest,
            Self {
                application_context_name,
                calling_ap_title,
                authentication,
                calling_authentication_value,
                user_information,
            },
        ))
    }
}
