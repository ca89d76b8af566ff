//! Error APDUs returned instead of a regular response
//!
//! ```text
//! exception-response:       D8 [state-error] [service-error] ([invocation counter:4])
//! confirmed-service-error:  0E [service] [error choice] [value]
//! ```
//!
//! Reference: DLMS Green Book Ed. 12, Section 9.5 (xDLMS APDUs)

use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    IResult,
    error::{Error, ErrorKind},
    number::streaming::{be_u32, u8},
};

use crate::ByteBuffer;

pub const EXCEPTION_RESPONSE_TAG: u8 = 0xD8;
pub const CONFIRMED_SERVICE_ERROR_TAG: u8 = 0x0E;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[rustfmt::skip]
pub enum StateError {
  ServiceNotAllowed = 1,
  ServiceUnknown    = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[rustfmt::skip]
pub enum ExceptionServiceError {
  OperationNotPossible   = 1,
  ServiceNotSupported    = 2,
  OtherReason            = 3,
  PduTooLong             = 4,
  DecipheringError       = 5,
  InvocationCounterError = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub state_error: StateError,
    pub service_error: ExceptionServiceError,
    /// Expected invocation counter, sent along with `InvocationCounterError`.
    pub invocation_counter: Option<u32>,
}

impl ExceptionResponse {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        if tag != EXCEPTION_RESPONSE_TAG {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
        }
        let (input, state_error) = u8(input)?;
        let state_error = StateError::try_from(state_error)
            .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Verify)))?;
        let (input, service_error) = u8(input)?;
        let service_error = ExceptionServiceError::try_from(service_error)
            .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Verify)))?;

        let (input, invocation_counter) =
            if service_error == ExceptionServiceError::InvocationCounterError && input.len() >= 4 {
                let (input, counter) = be_u32(input)?;
                (input, Some(counter))
            } else {
                (input, None)
            };

        Ok((input, Self { state_error, service_error, invocation_counter }))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(7);
        buf.push_u8(EXCEPTION_RESPONSE_TAG);
        buf.push_u8(self.state_error as u8);
        buf.push_u8(self.service_error as u8);
        if let Some(counter) = self.invocation_counter {
            buf.push_u32(counter);
        }
        buf
    }
}

/// The `ServiceError` choice of a confirmed-service-error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[rustfmt::skip]
pub enum ServiceErrorKind {
  ApplicationReference =  0,
  HardwareResource     =  1,
  VdeStateError        =  2,
  Service              =  3,
  Definition           =  4,
  Access               =  5,
  Initiate             =  6,
  LoadDataSet          =  7,
  ChangeScope          =  8,
  Task                 =  9,
  Other                = 10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedServiceError {
    /// 1 for initiate errors, the failing service otherwise.
    pub service: u8,
    pub kind: ServiceErrorKind,
    pub value: u8,
}

impl ConfirmedServiceError {
    pub fn service_name(&self) -> &'static str {
        match self.service {
            1 => "InitiateError",
            2 => "GetStatus",
            3 => "GetNameList",
            4 => "GetVariableAttribute",
            5 => "Read",
            6 => "Write",
            _ => "Service",
        }
    }

    /// Name of `value` for the initiate errors a NIC reports during association.
    pub fn value_name(&self) -> &'static str {
        match (self.kind, self.value) {
            (ServiceErrorKind::Initiate, 1) => "DlmsVersionTooLow",
            (ServiceErrorKind::Initiate, 2) => "IncompatibleConformance",
            (ServiceErrorKind::Initiate, 3) => "PduSizeTooShort",
            (ServiceErrorKind::Initiate, 4) => "RefusedByTheVDEHandler",
            (ServiceErrorKind::Access, 1) => "ScopeOfAccessViolated",
            (ServiceErrorKind::Access, 2) => "ObjectAccessInvalid",
            (ServiceErrorKind::Access, 3) => "HardwareFault",
            (ServiceErrorKind::Access, 4) => "ObjectUnavailable",
            _ => "Other",
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        if tag != CONFIRMED_SERVICE_ERROR_TAG {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
        }
        let (input, service) = u8(input)?;
        let (input, kind) = u8(input)?;
        let kind = ServiceErrorKind::try_from(kind)
            .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Verify)))?;
        let (input, value) = u8(input)?;

        Ok((input, Self { service, kind, value }))
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![CONFIRMED_SERVICE_ERROR_TAG, self.service, self.kind as u8, self.value]
    }
}
