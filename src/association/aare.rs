//! AARE APDU (A-Associate Response)
//!
//! ```text
//! 61 len
//!   A1 09 06 07 <application context name>
//!   A2 03 02 01 <result>
//!   A3 05 (A1 | A2) 03 02 01 <diagnostic>       service user / service provider
//!   A4 0A 04 08 <responding AP title>           ciphered contexts only
//!   88 02 07 80                                 responder ACSE requirements
//!   89 07 <mechanism name>
//!   AA len 80 len <responding authentication value>
//!   BE len 04 len <InitiateResponse | glo-initiate-response | confirmed-service-error>
//! ```
//!
//! Reference: DLMS Green Book Ed. 12, Section 11.3 and Table 138

use nom::{
    IResult,
    error::{Error, ErrorKind},
};

use super::ber::{
    TagType, encode_application, encode_context_specific, encode_integer,
    encode_object_identifier, encode_octet_string, parse_element, parse_elements, parse_tagged,
};
use super::{
    AARE_TAG, AcseServiceUserDiagnostics, ApplicationContextName, AssociationResult,
    Authentication,
};

/// `result-source-diagnostic` of an AARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDiagnostic {
    ServiceUser(u8),
    ServiceProvider(u8),
}

impl SourceDiagnostic {
    pub fn service_user(&self) -> Option<AcseServiceUserDiagnostics> {
        match self {
            Self::ServiceUser(value) => AcseServiceUserDiagnostics::try_from(*value).ok(),
            Self::ServiceProvider(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AareApdu {
    pub application_context_name: ApplicationContextName,
    pub result: AssociationResult,
    pub result_source_diagnostic: SourceDiagnostic,
    /// Server system title, present in ciphered contexts.
    pub responding_ap_title: Option<[u8; 8]>,
    pub mechanism_name: Option<Authentication>,
    /// Server-to-client challenge (HLS).
    pub responding_authentication_value: Option<Vec<u8>>,
    /// Raw xDLMS APDU from the user-information field.
    pub user_information: Option<Vec<u8>>,
}

impl AareApdu {
    pub fn is_accepted(&self) -> bool {
        self.result == AssociationResult::Accepted
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, content) = parse_tagged(AARE_TAG)(input)?;
        let (_, elements) = parse_elements(content)?;

        let mut application_context_name = None;
        let mut result = None;
        let mut result_source_diagnostic = SourceDiagnostic::ServiceUser(0);
        let mut responding_ap_title = None;
        let mut mechanism_name = None;
        let mut responding_authentication_value = None;
        let mut user_information = None;

        for (tag, value) in elements {
            match tag {
                0xA1 => {
                    let (_, oid) = parse_tagged(0x06)(value)?;
                    application_context_name = ApplicationContextName::from_oid_bytes(oid);
                }
                0xA2 => {
                    let (_, integer) = parse_tagged(0x02)(value)?;
                    result = integer.last().and_then(|r| AssociationResult::try_from(*r).ok());
                }
                0xA3 => {
                    let (_, (choice, inner)) = parse_element(value)?;
                    let (_, integer) = parse_tagged(0x02)(inner)?;
                    let diagnostic = integer.last().copied().unwrap_or_default();
                    result_source_diagnostic = match choice {
                        0xA1 => SourceDiagnostic::ServiceUser(diagnostic),
                        _ => SourceDiagnostic::ServiceProvider(diagnostic),
                    };
                }
                0xA4 => {
                    let (_, title) = parse_tagged(0x04)(value)?;
                    responding_ap_title = <[u8; 8]>::try_from(title).ok();
                }
                0x89 => mechanism_name = Authentication::from_mechanism_oid(value),
                0xAA => {
                    let (_, challenge) = parse_tagged(0x80)(value)?;
                    responding_authentication_value = Some(challenge.to_vec());
                }
                0xBE => {
                    let (_, info) = parse_tagged(0x04)(value)?;
                    user_information = Some(info.to_vec());
                }
                _ => {}
            }
        }

        let (Some(application_context_name), Some(result)) = (application_context_name, result)
        else {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
        };

        Ok((
            rest,
            Self {
                application_context_name,
                result,
                result_source_diagnostic,
                responding_ap_title,
                mechanism_name,
                responding_authentication_value,
                user_information,
            },
        ))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();

        let context = encode_object_identifier(self.application_context_name.oid_bytes());
        content.extend(encode_context_specific(1, TagType::Constructed, &context));
        content.extend(encode_context_specific(
            2,
            TagType::Constructed,
            &encode_integer(self.result as u8),
        ));

        let (choice, diagnostic) = match self.result_source_diagnostic {
            SourceDiagnostic::ServiceUser(value) => (1, value),
            SourceDiagnostic::ServiceProvider(value) => (2, value),
        };
        let diagnostic =
            encode_context_specific(choice, TagType::Constructed, &encode_integer(diagnostic));
        content.extend(encode_context_specific(3, TagType::Constructed, &diagnostic));

        if let Some(title) = &self.responding_ap_title {
            content.extend(encode_context_specific(
                4,
                TagType::Constructed,
                &encode_octet_string(title),
            ));
        }

        if let Some(mechanism) = self.mechanism_name.filter(|m| *m != Authentication::None) {
            content.extend(encode_context_specific(8, TagType::Primitive, &[0x07, 0x80]));
            content.extend(encode_context_specific(
                9,
                TagType::Primitive,
                &mechanism.mechanism_oid(),
            ));
        }

        if let Some(challenge) = &self.responding_authentication_value {
            let value = encode_context_specific(0, TagType::Primitive, challenge);
            content.extend(encode_context_specific(10, TagType::Constructed, &value));
        }

        if let Some(info) = &self.user_information {
            content.extend(encode_context_specific(
                30,
                TagType::Constructed,
                &encode_octet_string(info),
            ));
        }

        encode_application(AARE_TAG & 0x1F, TagType::Constructed, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{Conformance, InitiateResponse};

    #[test]
    fn test_parse_green_book_aare() {
        #[rustfmt::skip]
        let input = [
            0x61, 0x29,
            0xA1, 0x09, 0x06, 0x07, 0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01,
            0xA2, 0x03, 0x02, 0x01, 0x00,
            0xA3, 0x05, 0xA1, 0x03, 0x02, 0x01, 0x00,
            0xBE, 0x10, 0x04, 0x0E,
            0x08, 0x00, 0x06, 0x5F, 0x1F, 0x04, 0x00, 0x00, 0x50, 0x1F, 0x01, 0xF4, 0x00, 0x07,
        ];
        let (rest, aare) = AareApdu::parse(&input).unwrap();

        assert!(rest.is_empty());
        assert!(aare.is_accepted());
        assert_eq!(aare.application_context_name, ApplicationContextName::LogicalNameReferencing);
        assert_eq!(aare.result_source_diagnostic, SourceDiagnostic::ServiceUser(0));
        assert_eq!(aare.responding_ap_title, None);

        let info = aare.user_information.unwrap();
        let (_, initiate) = InitiateResponse::parse(&info).unwrap();
        assert_eq!(initiate.server_max_receive_pdu_size, 0x01F4);
    }

    #[test]
    fn test_parse_rejected_authentication_failure() {
        #[rustfmt::skip]
        let input = [
            0x61, 0x17,
            0xA1, 0x09, 0x06, 0x07, 0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01,
            0xA2, 0x03, 0x02, 0x01, 0x01,
            0xA3, 0x05, 0xA1, 0x03, 0x02, 0x01, 0x0D,
        ];
        let (_, aare) = AareApdu::parse(&input).unwrap();

        assert!(!aare.is_accepted());
        assert_eq!(
            aare.result_source_diagnostic.service_user(),
            Some(AcseServiceUserDiagnostics::AuthenticationFailure)
        );
    }

    #[test]
    fn test_high_level_security_fields() {
        let aare = AareApdu {
            application_context_name: ApplicationContextName::LogicalNameReferencingWithCiphering,
            result: AssociationResult::Accepted,
            result_source_diagnostic: SourceDiagnostic::ServiceUser(14),
            responding_ap_title: Some(*b"TBC\x00\x00\x00\x30\x39"),
            mechanism_name: Some(Authentication::High),
            responding_authentication_value: Some(b"P6wRJ21F".to_vec()),
            user_information: Some(
                InitiateResponse::new(Conformance::CLIENT_LN, 0x0200).encode(),
            ),
        };
        let encoded = aare.encode();
        let (rest, parsed) = AareApdu::parse(&encoded).unwrap();

        assert!(rest.is_empty());
        assert_eq!(parsed, aare);
        assert_eq!(
            parsed.result_source_diagnostic.service_user(),
            Some(AcseServiceUserDiagnostics::AuthenticationRequired)
        );
    }

    #[test]
    fn test_parse_rejects_other_tag() {
        assert!(AareApdu::parse(&[0x60, 0x02, 0xA2, 0x00]).is_err());
    }
}
