//! DLMS/TCP wrapper framing (IEC 62056-47)
//!
//! Every APDU exchanged with a NIC travels behind an eight byte header:
//!
//! ```text
//! [version:2 = 0x0001] [source wPort:2] [destination wPort:2] [length:2] [APDU]
//! ```
//!
//! The wPorts are the DLMS client address (16, 32, 48, 64, 80) and the server
//! address (1 for the meter, 100 for the NIC logical device).

use log::error;
use nom::{
    IResult, Parser,
    bytes::streaming::take,
    error::{Error, ErrorKind},
    number::streaming::be_u16,
};

use crate::ByteBuffer;

pub const WRAPPER_VERSION: u16 = 0x0001;
pub const WRAPPER_HEADER_LENGTH: usize = 8;

/// Smallest frame that may hold a DLMS APDU behind the wrapper.
pub const MIN_FRAME_LENGTH: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperHeader {
    pub source: u16,
    pub target: u16,
    pub length: u16,
}

impl WrapperHeader {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, version) = be_u16(input)?;
        if version != WRAPPER_VERSION {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
        }
        let (input, source) = be_u16(input)?;
        let (input, target) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        Ok((input, Self { source, target, length }))
    }

    pub fn encode(&self) -> [u8; WRAPPER_HEADER_LENGTH] {
        let mut header = [0u8; WRAPPER_HEADER_LENGTH];
        header[..2].copy_from_slice(&WRAPPER_VERSION.to_be_bytes());
        header[2..4].copy_from_slice(&self.source.to_be_bytes());
        header[4..6].copy_from_slice(&self.target.to_be_bytes());
        header[6..].copy_from_slice(&self.length.to_be_bytes());
        header
    }
}

/// A wrapper frame: header plus the APDU it announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperFrame {
    pub header: WrapperHeader,
    pub apdu: Vec<u8>,
}

impl WrapperFrame {
    pub fn new(source: u16, target: u16, apdu: Vec<u8>) -> Self {
        let header = WrapperHeader { source, target, length: apdu.len() as u16 };
        Self { header, apdu }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = WrapperHeader::parse(input)?;
        let (input, apdu) = take(header.length).parse(input)?;
        Ok((input, Self { header, apdu: apdu.to_vec() }))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WRAPPER_HEADER_LENGTH + self.apdu.len());
        buf.push_bytes(&self.header.encode());
        buf.push_bytes(&self.apdu);
        buf
    }
}

/// Wrap `apdu` from `source` to `target`.
pub fn wrap(source: u16, target: u16, apdu: &[u8]) -> Vec<u8> {
    WrapperFrame::new(source, target, apdu.to_vec()).encode()
}

/// `(source, target)` wPorts of a received frame, `(-1, -1)` when it is too
/// short to be a DLMS frame.
pub fn addresses(payload: &[u8]) -> (i32, i32) {
    if payload.len() < MIN_FRAME_LENGTH {
        error!("Received payload is too short to be a DLMS frame: {}", hex::encode(payload));
        return (-1, -1);
    }

    let source = u16::from_be_bytes([payload[2], payload[3]]);
    let target = u16::from_be_bytes([payload[4], payload[5]]);
    (i32::from(source), i32::from(target))
}
