//! ACTION service
//!
//! Invokes methods of COSEM objects: disconnect control, image transfer
//! verify/activate and the HLS `reply_to_HLS_authentication` of the
//! association object.
//!
//! # APDU Tags
//! - ACTION-Request: 0xC3 (195)
//! - ACTION-Response: 0xC7 (199)
//!
//! # Green Book References
//! - Table 74: ACTION service request and response types
//! - Table 97: ACTION service types and APDUs

use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    IResult,
    number::streaming::{be_u16, u8},
};

use crate::ByteBuffer;
use crate::data::Data;
use crate::get::{DataAccessResult, GetDataResult};
use crate::obis_code::ObisCode;

pub const ACTION_REQUEST_TAG: u8 = 0xC3;
pub const ACTION_RESPONSE_TAG: u8 = 0xC7;

/// Action result (Blue Book 4.1.8.3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum ActionResult {
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
  LongActionAborted       =  15,
  NoLongActionInProgress  =  16,
  OtherReason             = 250,
}

/// Reference to one method: `class_id | instance_id | method_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub method_id: i8,
}

impl MethodDescriptor {
    pub fn new(class_id: u16, instance_id: ObisCode, method_id: i8) -> Self {
        Self { class_id, instance_id, method_id }
    }
}

/// ACTION-Request-Normal (choice 0x01).
///
/// ```text
/// C3 01 [invoke_id] [class_id:2] [instance_id:6] [method_id] [01 parameters | 00]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub invoke_id: u8,
    pub method: MethodDescriptor,
    pub parameters: Option<Data>,
}

impl ActionRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(ACTION_REQUEST_TAG);
        buf.push_u8(0x01);
        buf.push_u8(self.invoke_id);
        buf.push_u16(self.method.class_id);
        buf.push_bytes(&self.method.instance_id.encode());
        buf.push_u8(self.method.method_id as u8);
        match &self.parameters {
            Some(parameters) => {
                buf.push_u8(0x01);
                buf.push_bytes(&parameters.encode());
            }
            None => buf.push_u8(0x00),
        }
        buf
    }

    /// Parse the method descriptor of an encoded request, used to label XML renderings.
    pub(crate) fn parse_descriptor(input: &[u8]) -> IResult<&[u8], MethodDescriptor> {
        let (input, _tag) = u8(input)?;
        let (input, _choice) = u8(input)?;
        let (input, _invoke_id) = u8(input)?;
        let (input, class_id) = be_u16(input)?;
        let (input, instance_id) = ObisCode::parse(input)?;
        let (input, method_id) = u8(input)?;
        Ok((input, MethodDescriptor::new(class_id, instance_id, method_id as i8)))
    }
}

/// ACTION-Response-Normal (choice 0x01).
///
/// ```text
/// C7 01 [invoke_id] [result] [01 Get-Data-Result | 00]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    pub invoke_id: u8,
    pub result: ActionResult,
    pub return_parameters: Option<GetDataResult>,
}

impl ActionResponse {
    /// Returned data, if the method produced any.
    pub fn value(&self) -> Option<Data> {
        match &self.return_parameters {
            Some(GetDataResult::Data(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn return_error(&self) -> Option<DataAccessResult> {
        match &self.return_parameters {
            Some(GetDataResult::DataAccessError(error)) => Some(*error),
            _ => None,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        if tag != ACTION_RESPONSE_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
        }
        let (input, choice) = u8(input)?;
        if choice != 0x01 {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Switch,
            )));
        }
        let (input, invoke_id) = u8(input)?;
        let (input, result) = u8(input)?;
        let result = ActionResult::try_from(result).map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify))
        })?;

        // Some servers stop right after the result when nothing is returned.
        if input.is_empty() {
            return Ok((input, Self { invoke_id, result, return_parameters: None }));
        }

        let (input, present) = u8(input)?;
        let (input, return_parameters) = if present != 0 {
            let (input, choice) = u8(input)?;
            if choice == 0x00 {
                let (input, data) = Data::parse(input)?;
                (input, Some(GetDataResult::Data(data)))
            } else {
                let (input, error) = DataAccessResult::parse(input)?;
                (input, Some(GetDataResult::DataAccessError(error)))
            }
        } else {
            (input, None)
        };

        Ok((input, Self { invoke_id, result, return_parameters }))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(ACTION_RESPONSE_TAG);
        buf.push_u8(0x01);
        buf.push_u8(self.invoke_id);
        buf.push_u8(self.result as u8);
        match &self.return_parameters {
            Some(GetDataResult::Data(data)) => {
                buf.push_u8(0x01);
                buf.push_u8(0x00);
                buf.push_bytes(&data.encode());
            }
            Some(GetDataResult::DataAccessError(error)) => {
                buf.push_u8(0x01);
                buf.push_u8(0x01);
                buf.push_u8(*error as u8);
            }
            None => buf.push_u8(0x00),
        }
        buf
    }
}
