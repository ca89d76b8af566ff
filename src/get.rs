//! GET service
//!
//! Reads attributes of COSEM objects, optionally with selective access.
//!
//! # APDU Tags
//! - GET-Request: 0xC0 (192)
//! - GET-Response: 0xC4 (196)
//!
//! # Green Book References
//! - Table 70: GET service request and response types
//! - Table 164: GET service example (C0 01 00 03 01 01 01 08 00 FF 02)

use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    IResult, Parser,
    bytes::streaming::take,
    multi::length_count,
    number::streaming::{be_u16, be_u32, u8},
};

use crate::ByteBuffer;
use crate::data::{Data, encode_length, parse_length};
use crate::obis_code::ObisCode;

pub const GET_REQUEST_TAG: u8 = 0xC0;
pub const GET_RESPONSE_TAG: u8 = 0xC4;

/// Data access result (Blue Book 4.1.8.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum DataAccessResult {
  Success                 =   0,
  HardwareFault           =   1,
  TemporaryFailure        =   2,
  ReadWriteDenied         =   3,
  ObjectUndefined         =   4,
  ObjectClassInconsistent =   9,
  ObjectUnavailable       =  11,
  TypeUnmatched           =  12,
  ScopeOfAccessViolated   =  13,
  DataBlockUnavailable    =  14,
  LongGetAborted          =  15,
  NoLongGetInProgress     =  16,
  LongSetAborted          =  17,
  NoLongSetInProgress     =  18,
  DataBlockNumberInvalid  =  19,
  OtherReason             = 250,
}

impl DataAccessResult {
    pub(crate) fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, value) = u8(input)?;
        let result = Self::try_from(value).map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify))
        })?;
        Ok((input, result))
    }
}

/// Selective access descriptor (Blue Book 4.1.5, profile generic selectors 1 and 2).
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSelector {
    pub selector: u8,
    pub parameters: Data,
}

/// Reference to one attribute: `class_id | instance_id | attribute_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub attribute_id: i8,
}

impl AttributeDescriptor {
    pub fn new(class_id: u16, instance_id: ObisCode, attribute_id: i8) -> Self {
        Self { class_id, instance_id, attribute_id }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push_u16(self.class_id);
        buf.push_bytes(&self.instance_id.encode());
        buf.push_u8(self.attribute_id as u8);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GetRequest {
    /// GET-Request-Normal (choice 0x01)
    Normal {
        invoke_id: u8,
        attribute: AttributeDescriptor,
        access_selection: Option<AccessSelector>,
    },
    /// GET-Request-Next (choice 0x02)
    Next { invoke_id: u8, block_number: u32 },
}

impl GetRequest {
    /// Encode the request.
    ///
    /// ```text
    /// C0 01 00 03 01 01 01 08 00 FF 02 00
    /// │  │  │  │     └───────────────┘ │  └── no access selection
    /// │  │  │  │        OBIS           └───── attribute_id
    /// │  │  │  └─── class_id
    /// │  │  └────── invoke_id
    /// │  └───────── choice: Normal
    /// └──────────── tag: GET-Request
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(GET_REQUEST_TAG);

        match self {
            GetRequest::Normal { invoke_id, attribute, access_selection } => {
                buf.push_u8(0x01);
                buf.push_u8(*invoke_id);
                attribute.encode_into(&mut buf);
                match access_selection {
                    Some(access) => {
                        buf.push_u8(0x01);
                        buf.push_u8(access.selector);
                        buf.push_bytes(&access.parameters.encode());
                    }
                    None => buf.push_u8(0x00),
                }
            }
            GetRequest::Next { invoke_id, block_number } => {
                buf.push_u8(0x02);
                buf.push_u8(*invoke_id);
                buf.push_u32(*block_number);
            }
        }

        buf
    }
}

/// Result of reading one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum GetDataResult {
    Data(Data),
    DataAccessError(DataAccessResult),
}

impl GetDataResult {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, choice) = u8(input)?;
        match choice {
            0x00 => {
                let (input, data) = Data::parse(input)?;
                Ok((input, GetDataResult::Data(data)))
            }
            0x01 => {
                let (input, result) = DataAccessResult::parse(input)?;
                Ok((input, GetDataResult::DataAccessError(result)))
            }
            _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Switch))),
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            GetDataResult::Data(data) => {
                buf.push_u8(0x00);
                buf.push_bytes(&data.encode());
            }
            GetDataResult::DataAccessError(result) => {
                buf.push_u8(0x01);
                buf.push_u8(*result as u8);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GetResponse {
    /// GET-Response-Normal (choice 0x01)
    Normal { invoke_id: u8, result: GetDataResult },
    /// GET-Response-With-Datablock (choice 0x02); raw data is an octet-string fragment.
    WithDataBlock {
        invoke_id: u8,
        last_block: bool,
        block_number: u32,
        raw_data: Result<Vec<u8>, DataAccessResult>,
    },
    /// GET-Response-With-List (choice 0x03)
    WithList { invoke_id: u8, results: Vec<GetDataResult> },
}

impl GetResponse {
    pub fn invoke_id(&self) -> u8 {
        match self {
            GetResponse::Normal { invoke_id, .. }
            | GetResponse::WithDataBlock { invoke_id, .. }
            | GetResponse::WithList { invoke_id, .. } => *invoke_id,
        }
    }

    /// The first data access error carried by this response, if any.
    pub fn access_error(&self) -> Option<DataAccessResult> {
        match self {
            GetResponse::Normal { result: GetDataResult::DataAccessError(e), .. } => Some(*e),
            GetResponse::WithDataBlock { raw_data: Err(e), .. } => Some(*e),
            GetResponse::WithList { results, .. } => results.iter().find_map(|r| match r {
                GetDataResult::DataAccessError(e) => Some(*e),
                GetDataResult::Data(_) => None,
            }),
            _ => None,
        }
    }

    /// The value read. A single, last data block is decoded in place.
    pub fn value(&self) -> Option<Data> {
        match self {
            GetResponse::Normal { result: GetDataResult::Data(data), .. } => Some(data.clone()),
            GetResponse::WithDataBlock {
                last_block: true,
                block_number: 1,
                raw_data: Ok(raw),
                ..
            } => {
                Data::parse(raw).ok().map(|(_, data)| data)
            }
            GetResponse::WithList { results, .. } => Some(Data::Array(
                results
                    .iter()
                    .map(|r| match r {
                        GetDataResult::Data(data) => data.clone(),
                        GetDataResult::DataAccessError(_) => Data::Null,
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        if tag != GET_RESPONSE_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
        }
        let (input, choice) = u8(input)?;
        let (input, invoke_id) = u8(input)?;

        match choice {
            0x01 => {
                let (input, result) = GetDataResult::parse(input)?;
                Ok((input, GetResponse::Normal { invoke_id, result }))
            }
            0x02 => {
                let (input, last_block) = u8(input)?;
                let (input, block_number) = be_u32(input)?;
                let (input, choice) = u8(input)?;
                let (input, raw_data) = if choice == 0x00 {
                    let (input, len) = parse_length(input)?;
                    let (input, raw) = take(len).parse(input)?;
                    (input, Ok(raw.to_vec()))
                } else {
                    let (input, result) = DataAccessResult::parse(input)?;
                    (input, Err(result))
                };

                Ok((
                    input,
                    GetResponse::WithDataBlock {
                        invoke_id,
                        last_block: last_block != 0,
                        block_number,
                        raw_data,
                    },
                ))
            }
            0x03 => {
                let (input, results) =
                    length_count(parse_length, GetDataResult::parse).parse(input)?;
                Ok((input, GetResponse::WithList { invoke_id, results }))
            }
            _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Switch))),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(GET_RESPONSE_TAG);

        match self {
            GetResponse::Normal { invoke_id, result } => {
                buf.push_u8(0x01);
                buf.push_u8(*invoke_id);
                result.encode_into(&mut buf);
            }
            GetResponse::WithDataBlock { invoke_id, last_block, block_number, raw_data } => {
                buf.push_u8(0x02);
                buf.push_u8(*invoke_id);
                buf.push_u8(*last_block as u8);
                buf.push_u32(*block_number);
                match raw_data {
                    Ok(raw) => {
                        buf.push_u8(0x00);
                        encode_length(&mut buf, raw.len());
                        buf.push_bytes(raw);
                    }
                    Err(result) => {
                        buf.push_u8(0x01);
                        buf.push_u8(*result as u8);
                    }
                }
            }
            GetResponse::WithList { invoke_id, results } => {
                buf.push_u8(0x03);
                buf.push_u8(*invoke_id);
                encode_length(&mut buf, results.len());
                for result in results {
                    result.encode_into(&mut buf);
                }
            }
        }

        buf
    }
}

/// Parse the class and OBIS of a GET-Request-Normal, used to label XML renderings.
pub(crate) fn parse_request_descriptor(input: &[u8]) -> IResult<&[u8], AttributeDescriptor> {
    let (input, _tag) = u8(input)?;
    let (input, _choice) = u8(input)?;
    let (input, _invoke_id) = u8(input)?;
    let (input, class_id) = be_u16(input)?;
    let (input, instance_id) = ObisCode::parse(input)?;
    let (input, attribute_id) = u8(input)?;
    Ok((input, AttributeDescriptor::new(class_id, instance_id, attribute_id as i8)))
}
