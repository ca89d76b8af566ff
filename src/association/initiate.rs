//! xDLMS InitiateRequest and InitiateResponse APDUs
//!
//! Carried (plain or glo-ciphered) in the user-information field of AARQ/AARE.
//! Encoded in A-XDR.
//!
//! ```text
//! InitiateRequest:  01 [dedicated-key?] 00 00 06 5F 1F 04 00 [conformance:3] [max pdu:2]
//! InitiateResponse: 08 00 06 5F 1F 04 00 [conformance:3] [max pdu:2] 00 07
//! ```
//!
//! Reference: DLMS Green Book Ed. 12, Section 11.2 and Tables 134-135

use core::fmt;

use nom::{
    IResult, Parser,
    bytes::streaming::{tag, take},
    number::streaming::{be_u16, u8},
};

use super::{DLMS_VERSION, VAA_NAME_LN};
use crate::ByteBuffer;

pub const INITIATE_REQUEST_TAG: u8 = 0x01;
pub const INITIATE_RESPONSE_TAG: u8 = 0x08;

/// `[APPLICATION 31]` BIT STRING header of the conformance block.
const CONFORMANCE_HEADER: [u8; 4] = [0x5F, 0x1F, 0x04, 0x00];

/// xDLMS conformance block, bit 0 being the most significant of 24.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Conformance(u32);

impl Conformance {
    #[rustfmt::skip]
    pub const BLOCK_TRANSFER_WITH_GET:    Self = Self(1 << 12);
    #[rustfmt::skip]
    pub const BLOCK_TRANSFER_WITH_SET:    Self = Self(1 << 11);
    #[rustfmt::skip]
    pub const BLOCK_TRANSFER_WITH_ACTION: Self = Self(1 << 10);
    #[rustfmt::skip]
    pub const MULTIPLE_REFERENCES:        Self = Self(1 << 9);
    #[rustfmt::skip]
    pub const DATA_NOTIFICATION:          Self = Self(1 << 7);
    #[rustfmt::skip]
    pub const GET:                        Self = Self(1 << 4);
    #[rustfmt::skip]
    pub const SET:                        Self = Self(1 << 3);
    #[rustfmt::skip]
    pub const SELECTIVE_ACCESS:           Self = Self(1 << 2);
    #[rustfmt::skip]
    pub const EVENT_NOTIFICATION:         Self = Self(1 << 1);
    #[rustfmt::skip]
    pub const ACTION:                     Self = Self(1 << 0);

    /// Services proposed by a logical name referencing client (`00 7E 1F`).
    pub const CLIENT_LN: Self = Self(0x007E1F);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&CONFORMANCE_HEADER[..]).parse(input)?;
        let (input, bytes) = take(3usize).parse(input)?;
        Ok((input, Self::from_bytes([bytes[0], bytes[1], bytes[2]])))
    }
}

impl fmt::Debug for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conformance({:06X})", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    pub dedicated_key: Option<Vec<u8>>,
    pub proposed_conformance: Conformance,
    pub client_max_receive_pdu_size: u16,
}

impl InitiateRequest {
    pub fn new(dedicated_key: Option<Vec<u8>>, client_max_receive_pdu_size: u16) -> Self {
        Self {
            dedicated_key,
            proposed_conformance: Conformance::CLIENT_LN,
            client_max_receive_pdu_size,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(14);
        buf.push_u8(INITIATE_REQUEST_TAG);
        match &self.dedicated_key {
            Some(key) => {
                buf.push_u8(0x01);
                buf.push_u8(key.len() as u8);
                buf.push_bytes(key);
            }
            None => buf.push_u8(0x00),
        }
        // response-allowed left at its default (TRUE), no quality of service
        buf.push_u8(0x00);
        buf.push_u8(0x00);
        buf.push_u8(DLMS_VERSION);
        buf.push_bytes(&CONFORMANCE_HEADER);
        buf.push_bytes(&self.proposed_conformance.to_bytes());
        buf.push_u16(self.client_max_receive_pdu_size);
        buf
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[INITIATE_REQUEST_TAG][..]).parse(input)?;
        let (input, key_present) = u8(input)?;
        let (input, dedicated_key) = if key_present != 0 {
            let (input, len) = u8(input)?;
            let (input, key) = take(len).parse(input)?;
            (input, Some(key.to_vec()))
        } else {
            (input, None)
        };
        let (input, response_allowed_present) = u8(input)?;
        let (input, _) = take(usize::from(response_allowed_present != 0)).parse(input)?;
        let (input, qos_present) = u8(input)?;
        let (input, _) = take(usize::from(qos_present != 0)).parse(input)?;
        let (input, _version) = u8(input)?;
        let (input, proposed_conformance) = Conformance::parse(input)?;
        let (input, client_max_receive_pdu_size) = be_u16(input)?;

        Ok((input, Self { dedicated_key, proposed_conformance, client_max_receive_pdu_size }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiateResponse {
    pub negotiated_dlms_version_number: u8,
    pub negotiated_conformance: Conformance,
    pub server_max_receive_pdu_size: u16,
    pub vaa_name: u16,
}

impl InitiateResponse {
    pub fn new(negotiated_conformance: Conformance, server_max_receive_pdu_size: u16) -> Self {
        Self {
            negotiated_dlms_version_number: DLMS_VERSION,
            negotiated_conformance,
            server_max_receive_pdu_size,
            vaa_name: VAA_NAME_LN,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(14);
        buf.push_u8(INITIATE_RESPONSE_TAG);
        buf.push_u8(0x00);
        buf.push_u8(self.negotiated_dlms_version_number);
        buf.push_bytes(&CONFORMANCE_HEADER);
        buf.push_bytes(&self.negotiated_conformance.to_bytes());
        buf.push_u16(self.server_max_receive_pdu_size);
        buf.push_u16(self.vaa_name);
        buf
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[INITIATE_RESPONSE_TAG][..]).parse(input)?;
        let (input, qos_present) = u8(input)?;
        let (input, _) = take(usize::from(qos_present != 0)).parse(input)?;
        let (input, negotiated_dlms_version_number) = u8(input)?;
        let (input, negotiated_conformance) = Conformance::parse(input)?;
        let (input, server_max_receive_pdu_size) = be_u16(input)?;
        let (input, vaa_name) = be_u16(input)?;

        Ok((
            input,
            Self {
                negotiated_dlms_version_number,
                negotiated_conformance,
                server_max_receive_pdu_size,
                vaa_name,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_initiate_request_green_book() {
        let mut request = InitiateRequest::new(None, 0x04B0);
        request.proposed_conformance = Conformance::from_bytes([0x00, 0x7E, 0x1F]);

        #[rustfmt::skip]
        let expected = [
            0x01, 0x00, 0x00, 0x00, 0x06,
            0x5F, 0x1F, 0x04, 0x00, 0x00, 0x7E, 0x1F,
            0x04, 0xB0,
        ];
        assert_eq!(request.encode(), expected.to_vec());
    }

    #[test]
    fn test_initiate_request_with_dedicated_key() {
        let request = InitiateRequest::new(Some(vec![0xAB; 16]), 0xFFFF);
        let encoded = request.encode();

        assert_eq!(&encoded[..3], &[0x01, 0x01, 0x10][..]);
        let (rest, parsed) = InitiateRequest::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_parse_initiate_response() {
        #[rustfmt::skip]
        let input = [
            0x08, 0x00, 0x06,
            0x5F, 0x1F, 0x04, 0x00, 0x00, 0x10, 0x15,
            0x04, 0x00,
            0x00, 0x07,
        ];
        let (rest, response) = InitiateResponse::parse(&input).unwrap();

        assert!(rest.is_empty());
        assert_eq!(response.server_max_receive_pdu_size, 0x0400);
        assert!(response.negotiated_conformance.contains(Conformance::GET));
        assert!(response.negotiated_conformance.contains(Conformance::ACTION));
        assert!(!response.negotiated_conformance.contains(Conformance::SET));
        assert_eq!(response.vaa_name, VAA_NAME_LN);
        assert_eq!(response.encode(), input.to_vec());
    }

    #[test]
    fn test_client_conformance_services() {
        let conformance = Conformance::CLIENT_LN;

        for service in [
            Conformance::GET,
            Conformance::SET,
            Conformance::ACTION,
            Conformance::SELECTIVE_ACCESS,
            Conformance::BLOCK_TRANSFER_WITH_GET,
        ] {
            assert!(conformance.contains(service));
        }
        assert!(!conformance.contains(Conformance::DATA_NOTIFICATION));
    }
}
