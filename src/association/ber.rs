//! ASN.1 BER helpers
//!
//! The minimal subset of BER needed by the ACSE APDUs: single byte tags,
//! definite lengths up to 65535, and a generic TLV reader.
//!
//! Reference: ISO/IEC 8825-1:2015, DLMS Green Book Ed. 12 Section 11

use nom::{
    IResult, Parser,
    bytes::streaming::take,
    error::{Error, ErrorKind},
    number::streaming::u8 as nom_u8,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Primitive,
    Constructed,
}

impl TagType {
    pub const fn to_bit(self) -> u8 {
        match self {
            TagType::Primitive => 0b0000_0000,
            TagType::Constructed => 0b0010_0000,
        }
    }
}

const CONTEXT_SPECIFIC: u8 = 0b10_000000;
const APPLICATION: u8 = 0b01_000000;

// ============================================================================
// Length
// ============================================================================

pub fn encode_length(buf: &mut Vec<u8>, length: usize) {
    if length <= 0x7F {
        buf.push(length as u8);
    } else if length <= 0xFF {
        buf.extend_from_slice(&[0x81, length as u8]);
    } else {
        let length = length.min(u16::MAX as usize) as u16;
        buf.push(0x82);
        buf.extend_from_slice(&length.to_be_bytes());
    }
}

pub fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first_byte) = nom_u8(input)?;
    if first_byte & 0x80 == 0 {
        return Ok((input, first_byte as usize));
    }

    // Indefinite form and lengths over 65535 are not used by DLMS.
    let num_octets = (first_byte & 0x7F) as usize;
    if num_octets == 0 || num_octets > 2 {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::LengthValue)));
    }

    let (input, octets) = take(num_octets).parse(input)?;
    Ok((input, octets.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize)))
}

// ============================================================================
// Encoding
// ============================================================================

fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(content.len() + 4);
    result.push(tag);
    encode_length(&mut result, content.len());
    result.extend_from_slice(content);
    result
}

pub fn encode_object_identifier(oid_bytes: &[u8]) -> Vec<u8> {
    encode_tlv(0x06, oid_bytes)
}

pub fn encode_octet_string(octets: &[u8]) -> Vec<u8> {
    encode_tlv(0x04, octets)
}

pub fn encode_integer(value: u8) -> Vec<u8> {
    encode_tlv(0x02, &[value])
}

pub fn encode_context_specific(tag_number: u8, tag_type: TagType, content: &[u8]) -> Vec<u8> {
    encode_tlv(CONTEXT_SPECIFIC | tag_type.to_bit() | tag_number, content)
}

pub fn encode_application(tag_number: u8, tag_type: TagType, content: &[u8]) -> Vec<u8> {
    encode_tlv(APPLICATION | tag_type.to_bit() | tag_number, content)
}

// ============================================================================
// Parsing
// ============================================================================

/// One TLV element: the raw tag byte and its content.
pub fn parse_element(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (input, tag) = nom_u8(input)?;
    if tag & 0b000_11111 == 31 {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
    }
    let (input, length) = parse_length(input)?;
    let (input, content) = take(length).parse(input)?;
    Ok((input, (tag, content)))
}

/// Content of an element with exactly the tag `expected`.
pub fn parse_tagged(expected: u8) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8]> {
    move |input| {
        let (rest, (tag, content)) = parse_element(input)?;
        if tag != expected {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
        }
        Ok((rest, content))
    }
}

/// Every element of a constructed content, in order.
pub fn parse_elements(mut input: &[u8]) -> IResult<&[u8], Vec<(u8, &[u8])>> {
    let mut elements = Vec::new();
    while !input.is_empty() {
        let (rest, element) = parse_element(input)?;
        elements.push(element);
        input = rest;
    }
    Ok((input, elements))
}
