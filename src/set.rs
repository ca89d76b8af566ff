//! SET service
//!
//! Writes attributes of COSEM objects. The with-list variant carries every
//! new credential of a NIC security material update in a single APDU.
//!
//! # APDU Tags
//! - SET-Request: 0xC1 (193)
//! - SET-Response: 0xC5 (197)
//!
//! # Green Book References
//! - Table 72: SET service request and response types
//! - Table 96: SET service types and APDUs

use nom::{
    IResult, Parser,
    multi::length_count,
    number::streaming::{be_u32, u8},
};

use crate::ByteBuffer;
use crate::data::{Data, encode_length, parse_length};
pub use crate::get::{AttributeDescriptor, DataAccessResult};

pub const SET_REQUEST_TAG: u8 = 0xC1;
pub const SET_RESPONSE_TAG: u8 = 0xC5;

#[derive(Debug, Clone, PartialEq)]
pub enum SetRequest {
    /// SET-Request-Normal (choice 0x01)
    ///
    /// ```text
    /// C1 01 [invoke_id] [class_id:2] [instance_id:6] [attr_id] 00 [value]
    /// ```
    Normal { invoke_id: u8, attribute: AttributeDescriptor, value: Data },
    /// SET-Request-With-List (choice 0x04)
    ///
    /// ```text
    /// C1 04 [invoke_id] [n] n x ([class_id:2] [instance_id:6] [attr_id] 00) [n] n x [value]
    /// ```
    WithList { invoke_id: u8, items: Vec<(AttributeDescriptor, Data)> },
}

impl SetRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(SET_REQUEST_TAG);

        match self {
            SetRequest::Normal { invoke_id, attribute, value } => {
                buf.push_u8(0x01);
                buf.push_u8(*invoke_id);
                attribute.encode_into(&mut buf);
                buf.push_u8(0x00);
                buf.push_bytes(&value.encode());
            }
            SetRequest::WithList { invoke_id, items } => {
                buf.push_u8(0x04);
                buf.push_u8(*invoke_id);
                encode_length(&mut buf, items.len());
                for (attribute, _) in items {
                    attribute.encode_into(&mut buf);
                    buf.push_u8(0x00);
                }
                encode_length(&mut buf, items.len());
                for (_, value) in items {
                    buf.push_bytes(&value.encode());
                }
            }
        }

        buf
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetResponse {
    /// SET-Response-Normal (choice 0x01)
    Normal { invoke_id: u8, result: DataAccessResult },
    /// SET-Response-Datablock (choice 0x02)
    DataBlock { invoke_id: u8, block_number: u32 },
    /// SET-Response-Last-Datablock (choice 0x03)
    LastDataBlock { invoke_id: u8, result: DataAccessResult, block_number: u32 },
    /// SET-Response-With-List (choice 0x05), one result per written attribute
    WithList { invoke_id: u8, results: Vec<DataAccessResult> },
}

impl SetResponse {
    pub fn invoke_id(&self) -> u8 {
        match self {
            SetResponse::Normal { invoke_id, .. }
            | SetResponse::DataBlock { invoke_id, .. }
            | SetResponse::LastDataBlock { invoke_id, .. }
            | SetResponse::WithList { invoke_id, .. } => *invoke_id,
        }
    }

    /// Results in request order.
    pub fn results(&self) -> Vec<DataAccessResult> {
        match self {
            SetResponse::Normal { result, .. } | SetResponse::LastDataBlock { result, .. } => {
                vec![*result]
            }
            SetResponse::DataBlock { .. } => Vec::new(),
            SetResponse::WithList { results, .. } => results.clone(),
        }
    }

    /// First non-success result. A with-list response with partial success is
    /// not an error: each slot is reported separately.
    pub fn access_error(&self) -> Option<DataAccessResult> {
        match self {
            SetResponse::Normal { result, .. } | SetResponse::LastDataBlock { result, .. } => {
                Some(*result).filter(|r| *r != DataAccessResult::Success)
            }
            SetResponse::WithList { results, .. }
                if results.iter().all(|r| *r != DataAccessResult::Success) =>
            {
                results.first().copied()
            }
            _ => None,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        if tag != SET_RESPONSE_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
        }
        let (input, choice) = u8(input)?;
        let (input, invoke_id) = u8(input)?;

        match choice {
            0x01 => {
                let (input, result) = DataAccessResult::parse(input)?;
                Ok((input, SetResponse::Normal { invoke_id, result }))
            }
            0x02 => {
                let (input, block_number) = be_u32(input)?;
                Ok((input, SetResponse::DataBlock { invoke_id, block_number }))
            }
            0x03 => {
                let (input, result) = DataAccessResult::parse(input)?;
                let (input, block_number) = be_u32(input)?;
                Ok((input, SetResponse::LastDataBlock { invoke_id, result, block_number }))
            }
            0x05 => {
                let (input, results) =
                    length_count(parse_length, DataAccessResult::parse).parse(input)?;
                Ok((input, SetResponse::WithList { invoke_id, results }))
            }
            _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Switch))),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(SET_RESPONSE_TAG);

        match self {
            SetResponse::Normal { invoke_id, result } => {
                buf.push_u8(0x01);
                buf.push_u8(*invoke_id);
                buf.push_u8(*result as u8);
            }
            SetResponse::DataBlock { invoke_id, block_number } => {
                buf.push_u8(0x02);
                buf.push_u8(*invoke_id);
                buf.push_u32(*block_number);
            }
            SetResponse::LastDataBlock { invoke_id, result, block_number } => {
                buf.push_u8(0x03);
                buf.push_u8(*invoke_id);
                buf.push_u8(*result as u8);
                buf.push_u32(*block_number);
            }
            SetResponse::WithList { invoke_id, results } => {
                buf.push_u8(0x05);
                buf.push_u8(*invoke_id);
                encode_length(&mut buf, results.len());
                for result in results {
                    buf.push_u8(*result as u8);
                }
            }
        }

        buf
    }
}
